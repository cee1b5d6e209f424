//! Shared derivation input and the context-number counter.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use zeroize::Zeroizing;

use crate::core::ContextConfig;
use crate::crypto::AeadAlgorithm;

/// Master secret, salt, ID context and algorithm choice shared by every
/// entity derived for one context.
///
/// Algorithm identifiers are kept as raw COSE values and resolved at
/// derivation time, so an unknown identifier fails there.
#[derive(Clone)]
pub struct MasterKeying {
    secret: Zeroizing<Vec<u8>>,
    salt: Vec<u8>,
    id_context: Option<Vec<u8>>,
    aead: i64,
    kdf: Option<i64>,
    config: ContextConfig,
}

impl MasterKeying {
    /// Keying with an empty salt, no ID context, AES-CCM-16-64-128 and the
    /// default HKDF.
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: Zeroizing::new(secret.into()),
            salt: Vec::new(),
            id_context: None,
            aead: AeadAlgorithm::DEFAULT_COSE,
            kdf: None,
            config: ContextConfig::default(),
        }
    }

    /// Set the master salt.
    pub fn with_salt(mut self, salt: impl Into<Vec<u8>>) -> Self {
        self.salt = salt.into();
        self
    }

    /// Set the ID context (group id).
    pub fn with_id_context(mut self, id_context: impl Into<Vec<u8>>) -> Self {
        self.id_context = Some(id_context.into());
        self
    }

    /// Set the AEAD algorithm by COSE identifier.
    pub fn with_aead(mut self, aead: i64) -> Self {
        self.aead = aead;
        self
    }

    /// Set the HKDF algorithm by COSE identifier.
    pub fn with_kdf(mut self, kdf: i64) -> Self {
        self.kdf = Some(kdf);
        self
    }

    /// Set the limits applied to derived entities.
    pub fn with_config(mut self, config: ContextConfig) -> Self {
        self.config = config;
        self
    }

    /// Master secret.
    pub fn secret(&self) -> &[u8] {
        &self.secret
    }

    /// Master salt.
    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    /// ID context, if any.
    pub fn id_context(&self) -> Option<&[u8]> {
        self.id_context.as_deref()
    }

    /// AEAD COSE identifier.
    pub fn aead(&self) -> i64 {
        self.aead
    }

    /// HKDF COSE identifier, if set.
    pub fn kdf(&self) -> Option<i64> {
        self.kdf
    }

    /// Entity limits.
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }
}

impl fmt::Debug for MasterKeying {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterKeying")
            .field("secret", &"<redacted>")
            .field("salt", &self.salt)
            .field("id_context", &self.id_context)
            .field("aead", &self.aead)
            .field("kdf", &self.kdf)
            .field("config", &self.config)
            .finish()
    }
}

/// Monotonic source of context numbers, owned by a context registry.
#[derive(Debug, Default)]
pub struct ContextCounter(AtomicU64);

impl ContextCounter {
    /// Counter starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Next context number. Numbers start at 1.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Last number handed out (0 if none).
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_is_monotonic() {
        let counter = ContextCounter::new();
        assert_eq!(counter.current(), 0);
        assert_eq!(counter.next(), 1);
        assert_eq!(counter.next(), 2);
        assert_eq!(counter.current(), 2);
    }

    #[test]
    fn test_keying_defaults() {
        let keying = MasterKeying::new(vec![1u8; 16]);
        assert_eq!(keying.aead(), 10);
        assert_eq!(keying.kdf(), None);
        assert!(keying.salt().is_empty());
        assert!(keying.id_context().is_none());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let keying = MasterKeying::new(vec![0xAB; 16]);
        let debug = format!("{keying:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("171"));
    }
}
