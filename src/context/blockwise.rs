//! Per-context store for blockwise transfers in progress.
//!
//! Entries are keyed by exchange and written from many protocol threads at
//! once; same-key races are last-writer-wins.

use std::net::SocketAddr;

use dashmap::DashMap;

/// Identifies one exchange: token, peer endpoint and direction.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExchangeKey {
    /// Message token.
    pub token: Vec<u8>,
    /// Peer endpoint.
    pub endpoint: SocketAddr,
    /// True for the response direction.
    pub is_response: bool,
}

impl ExchangeKey {
    /// Key for the request direction.
    pub fn request(token: impl Into<Vec<u8>>, endpoint: SocketAddr) -> Self {
        Self {
            token: token.into(),
            endpoint,
            is_response: false,
        }
    }

    /// Key for the response direction.
    pub fn response(token: impl Into<Vec<u8>>, endpoint: SocketAddr) -> Self {
        Self {
            token: token.into(),
            endpoint,
            is_response: true,
        }
    }
}

/// Progress of a blockwise transfer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockwiseStatus {
    /// Current block number.
    pub current_num: u32,
    /// Current block size exponent (block size is `16 << szx`).
    pub current_szx: u8,
    /// Last block seen.
    pub complete: bool,
    /// Content format of the body, if known.
    pub content_format: Option<u16>,
    /// Body collected so far.
    pub buffer: Vec<u8>,
}

impl BlockwiseStatus {
    /// Block size in bytes.
    pub fn block_size(&self) -> usize {
        16usize << self.current_szx.min(6)
    }

    /// Append the next block and advance the block number.
    pub fn push_block(&mut self, block: &[u8], more: bool) {
        self.buffer.extend_from_slice(block);
        self.current_num += 1;
        self.complete = !more;
    }
}

/// Attachment stored per exchange.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SecureBlockwiseData {
    /// Transfer progress, or `None` for a transfer that is not blockwise.
    pub status: Option<BlockwiseStatus>,
    /// Protected response currently being sent block by block.
    pub open_response: Option<Vec<u8>>,
}

/// Concurrent exchange-to-attachment map.
#[derive(Debug, Default)]
pub struct BlockwiseStore {
    entries: DashMap<ExchangeKey, SecureBlockwiseData>,
}

impl BlockwiseStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `data`, returning whatever was there before.
    pub fn insert(&self, key: ExchangeKey, data: SecureBlockwiseData) -> Option<SecureBlockwiseData> {
        self.entries.insert(key, data)
    }

    /// Copy of the entry for `key`.
    pub fn get(&self, key: &ExchangeKey) -> Option<SecureBlockwiseData> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Update the entry for `key` in place, creating it if missing.
    pub fn update<F>(&self, key: ExchangeKey, f: F)
    where
        F: FnOnce(&mut SecureBlockwiseData),
    {
        f(&mut self.entries.entry(key).or_default());
    }

    /// Remove and return the entry for `key`.
    pub fn remove(&self, key: &ExchangeKey) -> Option<SecureBlockwiseData> {
        self.entries.remove(key).map(|(_, data)| data)
    }

    /// Number of exchanges tracked.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }
}
