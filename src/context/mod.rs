//! The security-context engine.
//!
//! - `replay`: anti-replay sliding window
//! - `entity`: per-identity key, IV and sequence state
//! - `keying`: derivation input and context numbering
//! - `security`: entity derivation and the two-party context
//! - `group`: group contexts and pairwise derivation
//! - `event`: events and the observer channel
//! - `params`: derivation from a CBOR parameter map
//! - `set`: registry resolving incoming identifiers
//! - `blockwise`: per-context blockwise transfer state

pub mod blockwise;
pub mod entity;
pub mod event;
pub mod group;
pub mod keying;
pub mod params;
pub mod replay;
pub mod security;
pub mod set;

pub use blockwise::{BlockwiseStatus, BlockwiseStore, ExchangeKey, SecureBlockwiseData};
pub use entity::{decode_partial_iv, encode_partial_iv, EntityContext, SequenceAdvance, SharedEntity};
pub use event::{ContextEvent, ContextHandle, EventChannel, EventCode, SubscriptionId};
pub use group::{GroupParams, GroupSecurityContext};
pub use keying::{ContextCounter, MasterKeying};
pub use params::{ContextParams, EndpointRole};
pub use replay::ReplayWindow;
#[cfg(feature = "aead")]
pub use security::SealedMessage;
pub use security::{derive_entity_context, Role, SecurityContext, SenderNonce};
pub use set::{ContextSet, Resolution};
