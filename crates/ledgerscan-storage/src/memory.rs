//! In-memory storage backend.
//!
//! Keeps the cursor, accepted blocks, and retry records in RAM. Useful for
//! tests and short-lived scanners that don't need persistence.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use ledgerscan_core::cursor::ScanCursor;
use ledgerscan_core::error::ScanError;
use ledgerscan_core::store::{LedgerStore, UnscanRecord, REASON_TX_NOT_FOUND};
use ledgerscan_core::types::Block;

/// In-memory ledger store. All data is lost when the process exits.
#[derive(Default)]
pub struct InMemoryLedgerStore {
    cursor: Mutex<Option<ScanCursor>>,
    blocks: Mutex<HashMap<u64, Block>>,
    unscan: Mutex<Vec<UnscanRecord>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of retry records currently queued.
    pub fn unscan_count(&self) -> usize {
        self.unscan.lock().unwrap().len()
    }

    /// Number of blocks persisted.
    pub fn block_count(&self) -> usize {
        self.blocks.lock().unwrap().len()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn cursor(&self) -> Result<Option<ScanCursor>, ScanError> {
        Ok(self.cursor.lock().unwrap().clone())
    }

    async fn save_cursor(&self, cursor: &ScanCursor) -> Result<(), ScanError> {
        *self.cursor.lock().unwrap() = Some(cursor.clone());
        Ok(())
    }

    async fn save_block(&self, block: &Block) -> Result<(), ScanError> {
        self.blocks.lock().unwrap().insert(block.height, block.clone());
        Ok(())
    }

    async fn block(&self, height: u64) -> Result<Option<Block>, ScanError> {
        Ok(self.blocks.lock().unwrap().get(&height).cloned())
    }

    async fn save_unscan_record(&self, record: &UnscanRecord) -> Result<(), ScanError> {
        self.unscan.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn delete_unscan_records(&self, height: u64) -> Result<(), ScanError> {
        self.unscan.lock().unwrap().retain(|r| r.block_height != height);
        Ok(())
    }

    async fn unscan_records(&self) -> Result<Vec<UnscanRecord>, ScanError> {
        Ok(self.unscan.lock().unwrap().clone())
    }

    async fn delete_unscan_records_without_tx(&self) -> Result<(), ScanError> {
        self.unscan
            .lock()
            .unwrap()
            .retain(|r| !r.reason.contains(REASON_TX_NOT_FOUND));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(height: u64) -> Block {
        Block {
            height,
            hash: format!("0x{height}"),
            prev_hash: format!("0x{}", height - 1),
            time: 0,
        }
    }

    #[tokio::test]
    async fn cursor_roundtrip() {
        let store = InMemoryLedgerStore::new();
        assert!(store.cursor().await.unwrap().is_none());

        store.save_cursor(&ScanCursor::new(100, "0xabc")).await.unwrap();
        let cursor = store.cursor().await.unwrap().unwrap();
        assert_eq!(cursor.height, 100);
        assert_eq!(cursor.hash, "0xabc");

        // Second save overwrites the first.
        store.save_cursor(&ScanCursor::new(101, "0xdef")).await.unwrap();
        assert_eq!(store.cursor().await.unwrap().unwrap().height, 101);
    }

    #[tokio::test]
    async fn block_roundtrip() {
        let store = InMemoryLedgerStore::new();
        store.save_block(&block(5)).await.unwrap();

        assert_eq!(store.block(5).await.unwrap().unwrap().hash, "0x5");
        assert!(store.block(6).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unscan_records_delete_by_height() {
        let store = InMemoryLedgerStore::new();
        store
            .save_unscan_record(&UnscanRecord::new(50, "", "unreachable"))
            .await
            .unwrap();
        store
            .save_unscan_record(&UnscanRecord::new(50, "tx-9", "unreachable"))
            .await
            .unwrap();
        store
            .save_unscan_record(&UnscanRecord::new(51, "", "unreachable"))
            .await
            .unwrap();

        store.delete_unscan_records(50).await.unwrap();

        let rest = store.unscan_records().await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].block_height, 51);
    }

    #[tokio::test]
    async fn not_found_cleanup_is_selective() {
        let store = InMemoryLedgerStore::new();
        store
            .save_unscan_record(&UnscanRecord::new(60, "tx-1", REASON_TX_NOT_FOUND))
            .await
            .unwrap();
        store
            .save_unscan_record(&UnscanRecord::new(61, "", "rpc timeout"))
            .await
            .unwrap();

        store.delete_unscan_records_without_tx().await.unwrap();

        let rest = store.unscan_records().await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].block_height, 61);
    }
}
