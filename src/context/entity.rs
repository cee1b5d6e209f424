//! Per-identity key, IV and sequence state.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use zeroize::Zeroizing;

use crate::core::{
    ContextError, DEFAULT_MAX_SEQUENCE_NUMBER, DEFAULT_SEQUENCE_INTERVAL, MAX_PARTIAL_IV_LEN,
    MAX_SEQUENCE_NUMBER_CEILING,
};
use crate::crypto::CounterSignKey;

use super::replay::ReplayWindow;

/// Entity shared between a context and the events that refer to it.
pub type SharedEntity = Arc<Mutex<EntityContext>>;

/// Outcome of a successful sequence-number increment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SequenceAdvance {
    /// New sequence number.
    pub sequence_number: u64,
    /// The new value is a multiple of the sequence interval and should be
    /// persisted before any IV derived from it goes on the wire.
    pub persist: bool,
}

/// One cryptographic identity inside a security context.
///
/// Role is given by the slot the entity occupies: the sender slot uses the
/// sequence counter, recipient slots carry a replay window.
pub struct EntityContext {
    id: Vec<u8>,
    key: Zeroizing<Vec<u8>>,
    base_iv: Vec<u8>,
    sequence_number: u64,
    max_sequence_number: u64,
    sequence_interval: u64,
    replay_window: Option<ReplayWindow>,
    signing_key: Option<CounterSignKey>,
}

impl EntityContext {
    /// Assemble an entity from derived material.
    pub(crate) fn new(id: Vec<u8>, key: Zeroizing<Vec<u8>>, base_iv: Vec<u8>) -> Self {
        Self {
            id,
            key,
            base_iv,
            sequence_number: 0,
            max_sequence_number: DEFAULT_MAX_SEQUENCE_NUMBER,
            sequence_interval: DEFAULT_SEQUENCE_INTERVAL,
            replay_window: None,
            signing_key: None,
        }
    }

    /// Deep copy with the same keys and sequence number and, for
    /// recipients, a fresh replay window of the same size.
    pub fn duplicate(&self) -> Self {
        let replay_window = self.replay_window.as_ref().map(ReplayWindow::cleared);
        Self {
            id: self.id.clone(),
            key: self.key.clone(),
            base_iv: self.base_iv.clone(),
            sequence_number: self.sequence_number,
            max_sequence_number: self.max_sequence_number,
            sequence_interval: self.sequence_interval,
            replay_window,
            signing_key: self.signing_key.clone(),
        }
    }

    /// Entity identifier (the key id on the wire).
    pub fn id(&self) -> &[u8] {
        &self.id
    }

    /// Symmetric key.
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Base IV with the entity id folded in.
    pub fn base_iv(&self) -> &[u8] {
        &self.base_iv
    }

    /// Current sequence number.
    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    /// Restore a persisted sequence number. It may only move forward.
    pub fn restore_sequence_number(&mut self, value: u64) -> Result<(), ContextError> {
        if value < self.sequence_number || value > self.max_sequence_number {
            return Err(ContextError::InvalidBound {
                value,
                ceiling: self.max_sequence_number,
            });
        }
        self.sequence_number = value;
        Ok(())
    }

    /// Configured sequence ceiling.
    pub fn max_sequence_number(&self) -> u64 {
        self.max_sequence_number
    }

    /// Set the sequence ceiling. It must not exceed the Partial IV bound
    /// nor fall below the current sequence number.
    pub fn set_max_sequence_number(&mut self, max: u64) -> Result<(), ContextError> {
        if max > MAX_SEQUENCE_NUMBER_CEILING || max < self.sequence_number {
            return Err(ContextError::InvalidBound {
                value: max,
                ceiling: MAX_SEQUENCE_NUMBER_CEILING,
            });
        }
        self.max_sequence_number = max;
        Ok(())
    }

    /// Cadence of the persistence advisory.
    pub fn sequence_interval(&self) -> u64 {
        self.sequence_interval
    }

    /// Set the advisory cadence; zero is rejected.
    pub fn set_sequence_interval(&mut self, interval: u64) -> Result<(), ContextError> {
        if interval == 0 {
            return Err(ContextError::InvalidBound {
                value: 0,
                ceiling: MAX_SEQUENCE_NUMBER_CEILING,
            });
        }
        self.sequence_interval = interval;
        Ok(())
    }

    /// True once no further sequence number may be used.
    pub fn is_exhausted(&self) -> bool {
        self.sequence_number >= self.max_sequence_number
    }

    /// Advance the sequence number by one.
    ///
    /// Fails without changing state once the ceiling is reached.
    pub fn increment_sequence_number(&mut self) -> Result<SequenceAdvance, ContextError> {
        if self.is_exhausted() {
            return Err(ContextError::SequenceExhausted {
                max: self.max_sequence_number,
            });
        }
        self.sequence_number += 1;
        Ok(SequenceAdvance {
            sequence_number: self.sequence_number,
            persist: self.sequence_number % self.sequence_interval == 0,
        })
    }

    /// Minimal big-endian encoding of the current sequence number.
    pub fn partial_iv(&self) -> Vec<u8> {
        encode_partial_iv(self.sequence_number)
    }

    /// Full nonce for `partial_iv`: the base IV with the partial IV XORed
    /// into its trailing bytes.
    pub fn full_iv(&self, partial_iv: &[u8]) -> Result<Vec<u8>, ContextError> {
        if partial_iv.is_empty() || partial_iv.len() > MAX_PARTIAL_IV_LEN.min(self.base_iv.len()) {
            return Err(ContextError::InvalidPartialIv(partial_iv.len()));
        }
        let mut iv = self.base_iv.clone();
        let offset = iv.len() - partial_iv.len();
        iv[offset..]
            .iter_mut()
            .zip(partial_iv)
            .for_each(|(byte, piv)| *byte ^= piv);
        Ok(iv)
    }

    /// Replay window (recipient slots only).
    pub fn replay_window(&self) -> Option<&ReplayWindow> {
        self.replay_window.as_ref()
    }

    /// Mutable replay window (recipient slots only).
    pub fn replay_window_mut(&mut self) -> Option<&mut ReplayWindow> {
        self.replay_window.as_mut()
    }

    pub(crate) fn attach_replay_window(&mut self, window: ReplayWindow) {
        self.replay_window = Some(window);
    }

    pub(crate) fn apply_limits(&mut self, max: u64, interval: u64) {
        self.max_sequence_number = max;
        self.sequence_interval = interval;
    }

    /// Counter-signature key.
    pub fn signing_key(&self) -> Option<&CounterSignKey> {
        self.signing_key.as_ref()
    }

    /// Attach a counter-signature key.
    pub fn set_signing_key(&mut self, key: CounterSignKey) {
        self.signing_key = Some(key);
    }
}

/// Minimal big-endian encoding of `sequence`; zero encodes as one zero byte.
pub fn encode_partial_iv(sequence: u64) -> Vec<u8> {
    let bytes = sequence.to_be_bytes();
    let first = bytes
        .iter()
        .position(|&b| b != 0)
        .unwrap_or(bytes.len() - 1);
    bytes[first..].to_vec()
}

/// Decode a Partial IV back into a sequence number.
pub fn decode_partial_iv(partial_iv: &[u8]) -> Result<u64, ContextError> {
    if partial_iv.is_empty() || partial_iv.len() > MAX_PARTIAL_IV_LEN {
        return Err(ContextError::InvalidPartialIv(partial_iv.len()));
    }
    Ok(partial_iv
        .iter()
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
}

impl fmt::Debug for EntityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityContext")
            .field("id", &self.id)
            .field("key", &"<redacted>")
            .field("base_iv", &self.base_iv)
            .field("sequence_number", &self.sequence_number)
            .field("max_sequence_number", &self.max_sequence_number)
            .field("replay_window", &self.replay_window.as_ref().map(ReplayWindow::base_value))
            .field("signing_key", &self.signing_key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(base_iv: Vec<u8>) -> EntityContext {
        EntityContext::new(vec![0x01], Zeroizing::new(vec![0u8; 16]), base_iv)
    }

    #[test]
    fn test_partial_iv_encoding() {
        assert_eq!(encode_partial_iv(0), vec![0x00]);
        assert_eq!(encode_partial_iv(1), vec![0x01]);
        assert_eq!(encode_partial_iv(0xff), vec![0xff]);
        assert_eq!(encode_partial_iv(0x100), vec![0x01, 0x00]);
        assert_eq!(encode_partial_iv(0xF_FFFF), vec![0x0f, 0xff, 0xff]);
    }

    #[test]
    fn test_partial_iv_decoding() {
        assert_eq!(decode_partial_iv(&[0x00]).unwrap(), 0);
        assert_eq!(decode_partial_iv(&[0x01, 0x00]).unwrap(), 256);
        assert!(decode_partial_iv(&[]).is_err());
        assert!(decode_partial_iv(&[1, 2, 3, 4, 5, 6]).is_err());
    }

    #[test]
    fn test_full_iv_xor() {
        let base = vec![0x10; 13];
        let ctx = entity(base.clone());

        let iv = ctx.full_iv(&[0x01, 0x02]).unwrap();
        let mut expected = base.clone();
        expected[11] ^= 0x01;
        expected[12] ^= 0x02;
        assert_eq!(iv, expected);

        // base IV untouched
        assert_eq!(ctx.base_iv(), base.as_slice());
    }

    #[test]
    fn test_full_iv_rejects_bad_partial() {
        let ctx = entity(vec![0; 13]);
        assert!(ctx.full_iv(&[]).is_err());
        assert!(ctx.full_iv(&[0; 6]).is_err());
    }

    #[test]
    fn test_exhaustion() {
        let mut ctx = entity(vec![0; 13]);
        ctx.set_max_sequence_number(5).unwrap();

        for expected in 1..=5 {
            assert_eq!(ctx.increment_sequence_number().unwrap().sequence_number, expected);
        }
        assert_eq!(
            ctx.increment_sequence_number(),
            Err(ContextError::SequenceExhausted { max: 5 })
        );
        assert_eq!(
            ctx.increment_sequence_number(),
            Err(ContextError::SequenceExhausted { max: 5 })
        );
        assert_eq!(ctx.sequence_number(), 5);
    }

    #[test]
    fn test_persist_advisory() {
        let mut ctx = entity(vec![0; 13]);
        ctx.set_sequence_interval(3).unwrap();

        let flags: Vec<bool> = (0..6)
            .map(|_| ctx.increment_sequence_number().unwrap().persist)
            .collect();
        assert_eq!(flags, vec![false, false, true, false, false, true]);
    }

    #[test]
    fn test_max_sequence_bound() {
        let mut ctx = entity(vec![0; 13]);
        assert!(ctx.set_max_sequence_number(MAX_SEQUENCE_NUMBER_CEILING).is_ok());
        assert!(matches!(
            ctx.set_max_sequence_number(MAX_SEQUENCE_NUMBER_CEILING + 1),
            Err(ContextError::InvalidBound { .. })
        ));
    }

    #[test]
    fn test_max_sequence_not_below_current() {
        let mut ctx = entity(vec![0; 13]);
        ctx.restore_sequence_number(50).unwrap();
        assert!(matches!(
            ctx.set_max_sequence_number(49),
            Err(ContextError::InvalidBound { value: 49, .. })
        ));
        assert_eq!(ctx.max_sequence_number(), DEFAULT_MAX_SEQUENCE_NUMBER);

        // equal to the current number is accepted and exhausts the sender
        ctx.set_max_sequence_number(50).unwrap();
        assert!(ctx.is_exhausted());
    }

    #[test]
    fn test_restore_sequence_number() {
        let mut ctx = entity(vec![0; 13]);
        ctx.restore_sequence_number(200).unwrap();
        assert_eq!(ctx.partial_iv(), vec![0xc8]);
        assert!(ctx.restore_sequence_number(100).is_err());
    }

    #[test]
    fn test_duplicate_resets_window() {
        let mut ctx = entity(vec![0; 13]);
        ctx.attach_replay_window(ReplayWindow::new(0, 64).unwrap());
        ctx.replay_window_mut().unwrap().set_hit(10);
        ctx.increment_sequence_number().unwrap();

        let copy = ctx.duplicate();
        assert_eq!(copy.key(), ctx.key());
        assert_eq!(copy.sequence_number(), 1);
        assert!(!copy.replay_window().unwrap().hit_test(10));
        assert!(ctx.replay_window().unwrap().hit_test(10));
    }
}
