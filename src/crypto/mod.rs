//! Primitive adapters consumed by the context engine.
//!
//! - `algorithms`: COSE identifiers, sizes, capability tables
//! - `kdf`: CBOR info encoding and HKDF
//! - `keys`: counter-signature keys and static-static agreement
//! - `aead`: seal/open (requires the `aead` feature)

pub mod algorithms;
pub mod kdf;
pub mod keys;

#[cfg(feature = "aead")]
#[cfg_attr(docsrs, doc(cfg(feature = "aead")))]
pub mod aead;

pub use algorithms::{AeadAlgorithm, CounterSignCapabilities, KdfAlgorithm, SignatureAlgorithm};
pub use kdf::{encode_info, expand, InfoLabel};
pub use keys::CounterSignKey;
