//! Per-entity limits applied at derivation time.

use super::{
    ContextError, DEFAULT_MAX_SEQUENCE_NUMBER, DEFAULT_REPLAY_WINDOW_SIZE,
    DEFAULT_SEQUENCE_INTERVAL, MAX_SEQUENCE_NUMBER_CEILING,
};

/// Limits copied into every [`EntityContext`](crate::context::EntityContext)
/// derived from a [`MasterKeying`](crate::context::MasterKeying).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContextConfig {
    /// Highest sequence number a sender may reach.
    pub max_sequence_number: u64,
    /// Cadence of the `SenderIvSave` advisory.
    pub sequence_interval: u64,
    /// Replay window size in bits for recipient entities.
    pub replay_window_size: usize,
}

impl ContextConfig {
    /// Check every field against its permitted range.
    pub fn validate(&self) -> Result<(), ContextError> {
        if self.max_sequence_number > MAX_SEQUENCE_NUMBER_CEILING {
            return Err(ContextError::InvalidBound {
                value: self.max_sequence_number,
                ceiling: MAX_SEQUENCE_NUMBER_CEILING,
            });
        }
        if self.sequence_interval == 0 {
            return Err(ContextError::InvalidBound {
                value: 0,
                ceiling: MAX_SEQUENCE_NUMBER_CEILING,
            });
        }
        if self.replay_window_size == 0 {
            return Err(ContextError::InvalidBound {
                value: 0,
                ceiling: u64::MAX,
            });
        }
        Ok(())
    }

    /// Override the sequence ceiling.
    pub fn with_max_sequence_number(mut self, max: u64) -> Self {
        self.max_sequence_number = max;
        self
    }

    /// Override the advisory cadence.
    pub fn with_sequence_interval(mut self, interval: u64) -> Self {
        self.sequence_interval = interval;
        self
    }

    /// Override the replay window size.
    pub fn with_replay_window_size(mut self, size: usize) -> Self {
        self.replay_window_size = size;
        self
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_sequence_number: DEFAULT_MAX_SEQUENCE_NUMBER,
            sequence_interval: DEFAULT_SEQUENCE_INTERVAL,
            replay_window_size: DEFAULT_REPLAY_WINDOW_SIZE,
        }
    }
}
