//! Error types for the scanning pipeline.

use thiserror::Error;

/// Errors that can occur while scanning.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Notify error: {0}")]
    Notify(String),

    #[error("Extraction failed at block {block_height}: {failed} transaction(s) unrecovered")]
    Extraction { block_height: u64, failed: usize },

    #[error("Cannot resolve rewind anchor at block {block_height}")]
    AnchorUnresolved { block_height: u64 },

    #[error("Rescan height must be greater than 0")]
    InvalidRescanHeight,

    #[error("{0}")]
    Other(String),
}

impl ScanError {
    /// Returns `true` if the current scan cycle cannot continue. The cursor is
    /// left at its last good value for the next invocation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AnchorUnresolved { .. })
    }
}
