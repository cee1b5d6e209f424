//! # oscore-context
//!
//! Security-context engine for OSCORE and Group OSCORE.
//!
//! A security context turns a shared master secret into per-identity keys
//! and base IVs, hands out unique per-message nonces from a monotonically
//! increasing sequence counter, and rejects replayed messages with a
//! sliding-window bitmap. Group contexts add counter-signature parameters,
//! any number of recipients, and pairwise sub-contexts derived by
//! static-static key agreement.
//!
//! ## Feature Flags
//!
//! - `aead` (default): seal/open on security contexts (AES-CCM, AES-GCM,
//!   ChaCha20-Poly1305)
//!
//! ## Modules
//!
//! - [`core`]: constants, configuration and error types
//! - [`crypto`]: algorithm tables, HKDF, counter-signature keys, AEAD
//! - [`context`]: replay windows, entities, contexts, events, registry
//!
//! ## Example Usage
//!
//! ```rust
//! use oscore_context::prelude::*;
//!
//! let counter = ContextCounter::new();
//! let keying = MasterKeying::new((1u8..=16).collect::<Vec<_>>())
//!     .with_salt(vec![0x9e, 0x7c, 0xa9, 0x22, 0x23, 0x78, 0x63, 0x40]);
//!
//! let client = SecurityContext::derive(keying.clone(), &[], &[0x01], &counter)?;
//! let server = SecurityContext::derive(keying, &[0x01], &[], &counter)?;
//!
//! // the client's sender is the server's recipient
//! let nonce = client.next_nonce()?;
//! assert_eq!(nonce.nonce, server.recipient_nonce(&[], &nonce.partial_iv)?);
//!
//! server.record(&[], nonce.sequence_number)?;
//! assert!(server.is_replay(&[], nonce.sequence_number)?);
//! # Ok::<(), oscore_context::ContextError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Primitive adapters
pub mod crypto;

// Context engine
pub mod context;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::*;

    pub use crate::crypto::{
        AeadAlgorithm, CounterSignCapabilities, CounterSignKey, KdfAlgorithm, SignatureAlgorithm,
    };

    pub use crate::context::*;
}

// Re-export commonly used items at crate root
pub use crate::core::{ContextConfig, ContextError, CryptoError};

pub use context::{
    ContextEvent, ContextHandle, ContextSet, EntityContext, EventCode, GroupParams,
    GroupSecurityContext, MasterKeying, ReplayWindow, SecurityContext,
};
