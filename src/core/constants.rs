//! Protocol constants and defaults.
//!
//! Values marked as protocol limits MUST NOT be changed; defaults can be
//! overridden through [`ContextConfig`](super::ContextConfig).

// =============================================================================
// SEQUENCE NUMBERS / PARTIAL IV
// =============================================================================

/// Largest sequence number a Partial IV can carry (5 bytes on the wire).
pub const MAX_SEQUENCE_NUMBER_CEILING: u64 = (1 << 40) - 1;

/// Default ceiling for a sender sequence number (20 bits).
pub const DEFAULT_MAX_SEQUENCE_NUMBER: u64 = 0xF_FFFF;

/// Default cadence of the sender-IV persistence advisory.
pub const DEFAULT_SEQUENCE_INTERVAL: u64 = 100;

/// Number of trailing base-IV bytes reserved for the Partial IV.
pub const PARTIAL_IV_RESERVED: usize = 5;

/// Maximum encoded Partial IV length.
pub const MAX_PARTIAL_IV_LEN: usize = 5;

/// An entity id must leave this many base-IV bytes untouched
/// (length byte plus the reserved Partial IV region).
pub const IV_ID_OVERHEAD: usize = 6;

// =============================================================================
// ANTI-REPLAY
// =============================================================================

/// Default replay window size in bits.
pub const DEFAULT_REPLAY_WINDOW_SIZE: usize = 64;

// =============================================================================
// KEY DERIVATION
// =============================================================================

/// Info label used when deriving an entity key.
pub const LABEL_KEY: &str = "Key";

/// Info label used when deriving the common IV.
pub const LABEL_IV: &str = "IV";

/// Size of the padded static-static shared secret used as pairwise salt.
pub const PAIRWISE_SECRET_SIZE: usize = 32;

// =============================================================================
// INPUT PARAMETER MAP LABELS
// =============================================================================

/// Master secret.
pub const PARAM_MASTER_SECRET: i64 = 1;

/// Client identifier.
pub const PARAM_CLIENT_ID: i64 = 2;

/// Server identifier.
pub const PARAM_SERVER_ID: i64 = 3;

/// Key derivation function.
pub const PARAM_HKDF: i64 = 4;

/// AEAD algorithm.
pub const PARAM_ALG: i64 = 5;

/// Master salt.
pub const PARAM_SALT: i64 = 6;

/// ID context (group identifier).
pub const PARAM_CONTEXT_ID: i64 = 7;

// =============================================================================
// RESPONSE CODES
// =============================================================================

/// 4.01 Unauthorized, returned when an identifier cannot be resolved.
pub const CODE_UNAUTHORIZED: u8 = 0x81;
