//! Local ledger store seam — persisted scan bookkeeping.
//!
//! The store keeps three things on behalf of the scan loop: the cursor, a
//! copy of every accepted block (fork recovery needs the orphaned block and a
//! rewind anchor), and the retry queue of unscanned records.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cursor::ScanCursor;
use crate::error::ScanError;
use crate::types::Block;

/// Reason marker for retry records whose transaction can never be found.
///
/// Client implementations surface permanently missing transactions with this
/// text; records carrying it are purged in bulk by
/// [`LedgerStore::delete_unscan_records_without_tx`].
pub const REASON_TX_NOT_FOUND: &str = "transaction not found";

/// A durable retry marker for a height (and optionally one transaction) that
/// failed processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnscanRecord {
    pub block_height: u64,
    /// Empty means "retry the whole block".
    pub tx_id: String,
    pub reason: String,
    /// Unix timestamp the record was created.
    pub created_at: i64,
}

impl UnscanRecord {
    pub fn new(block_height: u64, tx_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            block_height,
            tx_id: tx_id.into(),
            reason: reason.into(),
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Returns `true` if the record asks for a whole-block retry.
    pub fn is_whole_block(&self) -> bool {
        self.tx_id.is_empty()
    }
}

/// Trait for the scanner's local persistence.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Load the persisted scan cursor, if any.
    async fn cursor(&self) -> Result<Option<ScanCursor>, ScanError>;

    /// Persist (upsert) the scan cursor.
    async fn save_cursor(&self, cursor: &ScanCursor) -> Result<(), ScanError>;

    /// Persist a raw block for later fork recovery and orphan notification.
    async fn save_block(&self, block: &Block) -> Result<(), ScanError>;

    /// Load a previously persisted block by height.
    async fn block(&self, height: u64) -> Result<Option<Block>, ScanError>;

    async fn save_unscan_record(&self, record: &UnscanRecord) -> Result<(), ScanError>;

    /// Delete every retry record for `height`.
    async fn delete_unscan_records(&self, height: u64) -> Result<(), ScanError>;

    async fn unscan_records(&self) -> Result<Vec<UnscanRecord>, ScanError>;

    /// Bulk cleanup of records marked [`REASON_TX_NOT_FOUND`], so permanently
    /// unresolvable entries cannot grow the queue without bound.
    async fn delete_unscan_records_without_tx(&self) -> Result<(), ScanError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_block_marker() {
        let whole = UnscanRecord::new(50, "", "height 50 unavailable");
        assert!(whole.is_whole_block());

        let single = UnscanRecord::new(50, "tx-1", "");
        assert!(!single.is_whole_block());
    }
}
