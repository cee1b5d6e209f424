//! Anti-replay sliding window.
//!
//! The window tracks `size` sequence numbers starting at `base`. Numbers
//! below `base` are always treated as replays. A hit up to half a window
//! past the end slides the window by half its size; anything further
//! discards history and restarts the window at the new number.

use crate::core::ContextError;

/// Sliding bitmap of recently accepted sequence numbers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplayWindow {
    /// Smallest sequence number still tracked.
    base: u64,
    /// Window length in bits.
    size: usize,
    /// Bit `i` set means `base + i` was seen.
    bitmap: Vec<u64>,
}

impl ReplayWindow {
    /// Create a window of `size` bits starting at `base`.
    pub fn new(base: u64, size: usize) -> Result<Self, ContextError> {
        if size == 0 {
            return Err(ContextError::InvalidBound {
                value: 0,
                ceiling: u64::MAX,
            });
        }
        Ok(Self {
            base,
            size,
            bitmap: vec![0; size.div_ceil(64)],
        })
    }

    /// Smallest sequence number still tracked.
    pub fn base_value(&self) -> u64 {
        self.base
    }

    /// Window length in bits.
    pub fn window_size(&self) -> usize {
        self.size
    }

    /// Report whether `sequence` must be treated as a replay.
    pub fn hit_test(&self, sequence: u64) -> bool {
        if sequence < self.base {
            return true;
        }
        let index = sequence - self.base;
        if index >= self.size as u64 {
            return false;
        }
        self.get(index as usize)
    }

    /// Record `sequence` as seen. Returns true if the window moved.
    pub fn set_hit(&mut self, sequence: u64) -> bool {
        if sequence < self.base {
            return false;
        }
        let mut index = sequence - self.base;
        let size = self.size as u64;
        if index < size {
            self.set(index as usize);
            return false;
        }

        if index < size * 3 / 2 {
            let half = self.size / 2;
            self.shift(half);
            index -= half as u64;
        } else {
            self.bitmap.iter_mut().for_each(|word| *word = 0);
            self.base = sequence;
            index = 0;
        }
        self.set(index as usize);
        true
    }

    /// Empty window of the same size, starting at zero.
    pub fn cleared(&self) -> Self {
        Self {
            base: 0,
            size: self.size,
            bitmap: vec![0; self.bitmap.len()],
        }
    }

    /// Forget all history and restart at `base` (e.g. after restoring state).
    pub fn reset(&mut self, base: u64) {
        self.bitmap.iter_mut().for_each(|word| *word = 0);
        self.base = base;
    }

    /// Drop the lowest `by` bits and advance the base accordingly.
    fn shift(&mut self, by: usize) {
        let mut shifted = vec![0u64; self.bitmap.len()];
        for i in 0..self.size - by {
            if self.get(i + by) {
                shifted[i / 64] |= 1 << (i % 64);
            }
        }
        self.bitmap = shifted;
        self.base += by as u64;
    }

    fn get(&self, index: usize) -> bool {
        (self.bitmap[index / 64] >> (index % 64)) & 1 == 1
    }

    fn set(&mut self, index: usize) {
        self.bitmap[index / 64] |= 1 << (index % 64);
    }
}
