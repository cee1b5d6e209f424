//! Error types for the security-context engine.

use thiserror::Error;

/// Errors raised by the primitive adapters (AEAD, HKDF, signatures, CBOR).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// AEAD or KDF identifier is not supported.
    #[error("unknown algorithm: {0}")]
    UnknownAlgorithm(i64),

    /// Signature algorithm identifier is not supported.
    #[error("unsupported signature algorithm: {0}")]
    UnsupportedSignatureAlgorithm(i64),

    /// HKDF could not produce the requested output.
    #[error("key derivation failed")]
    KeyDerivationFailed,

    /// CBOR encoding of derivation input failed.
    #[error("encoding failed: {0}")]
    Encoding(String),

    /// Key material could not be parsed or has the wrong size.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Nonce length does not match the AEAD algorithm.
    #[error("invalid nonce length: expected {expected}, got {actual}")]
    InvalidNonceLength {
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// AEAD encryption failed.
    #[error("AEAD encryption failed")]
    EncryptionFailed,

    /// AEAD decryption failed (invalid tag or corrupted).
    #[error("AEAD decryption failed (invalid tag or corrupted)")]
    DecryptionFailed,

    /// Signing failed.
    #[error("signing failed")]
    SignatureFailed,

    /// Signature did not verify.
    #[error("signature verification failed")]
    SignatureInvalid,

    /// Static-static key agreement failed.
    #[error("key agreement failed: {0}")]
    KeyAgreementFailed(String),
}

/// Errors raised by security-context operations.
///
/// All of these are synchronous precondition failures and are never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContextError {
    /// Primitive failure.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// A member signing key declares an algorithm other than the group's.
    #[error("wrong algorithm for signing key")]
    WrongAlgorithm,

    /// A replacement sender key does not match the context's signature algorithm.
    #[error("signature algorithm mismatch")]
    AlgorithmMismatch,

    /// Recipient ids and recipient keys differ in length.
    #[error("recipient ids ({ids}) and signing keys ({keys}) do not match")]
    ArgumentMismatch {
        /// Number of ids supplied.
        ids: usize,
        /// Number of keys supplied.
        keys: usize,
    },

    /// Entity id does not fit the IV.
    #[error("entity id of {len} bytes exceeds the {max} bytes available in the IV")]
    IdentityTooLong {
        /// Length of the id.
        len: usize,
        /// Maximum length allowed by the AEAD nonce size.
        max: usize,
    },

    /// No recipient with this id exists in the context.
    #[error("unknown recipient {0:02x?}")]
    UnknownRecipient(Vec<u8>),

    /// A recipient with this id already exists in the context.
    #[error("duplicate recipient {0:02x?}")]
    DuplicateRecipient(Vec<u8>),

    /// Sender id is already held by the current sender or a recipient.
    #[error("sender id {0:02x?} already in use")]
    SenderIdInUse(Vec<u8>),

    /// Sender sequence numbers are used up; the context must be replaced.
    #[error("sequence number exhausted (max {max})")]
    SequenceExhausted {
        /// Configured ceiling.
        max: u64,
    },

    /// Configured bound lies outside the permitted range.
    #[error("value {value} outside permitted range (ceiling {ceiling})")]
    InvalidBound {
        /// Rejected value.
        value: u64,
        /// Largest permitted value.
        ceiling: u64,
    },

    /// Partial IV is empty or longer than the protocol allows.
    #[error("invalid partial IV of {0} bytes")]
    InvalidPartialIv(usize),

    /// Sequence number was already seen or lies below the replay window.
    #[error("replay detected for sequence number {0}")]
    ReplayDetected(u64),

    /// Input parameter map is malformed.
    #[error("invalid context parameters: {0}")]
    InvalidParameters(String),
}

impl ContextError {
    /// True for unknown AEAD/KDF identifiers.
    pub fn is_unknown_algorithm(&self) -> bool {
        matches!(self, ContextError::Crypto(CryptoError::UnknownAlgorithm(_)))
    }

    /// True for unknown signature algorithm identifiers.
    pub fn is_unsupported_signature_algorithm(&self) -> bool {
        matches!(
            self,
            ContextError::Crypto(CryptoError::UnsupportedSignatureAlgorithm(_))
        )
    }
}
