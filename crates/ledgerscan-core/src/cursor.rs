//! Scan cursor — the persisted (height, hash) marking scan progress.

use serde::{Deserialize, Serialize};

/// The last successfully scanned and accepted position.
///
/// Single writer: only the scan loop advances or re-anchors the cursor. It is
/// read back at startup so scanning resumes where the previous cycle stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCursor {
    /// Height of the last accepted block.
    pub height: u64,
    /// Hash of the last accepted block.
    pub hash: String,
}

impl ScanCursor {
    /// Create a cursor at the given position.
    pub fn new(height: u64, hash: impl Into<String>) -> Self {
        Self {
            height,
            hash: hash.into(),
        }
    }

    /// Advance to a newly accepted block.
    pub fn advance(&mut self, height: u64, hash: impl Into<String>) {
        self.height = height;
        self.hash = hash.into();
    }

    /// Next height to fetch (cursor + 1).
    pub fn next_height(&self) -> u64 {
        self.height + 1
    }

    /// The height scanning re-anchors to after block `fetched` turned out to
    /// sit on a forked chain: two below the fetched height, never below 1.
    pub fn fork_rewind_height(fetched: u64) -> u64 {
        fetched.saturating_sub(2).max(1)
    }
}
