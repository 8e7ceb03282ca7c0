//! Observer traits, registry, and the notifier.
//!
//! Observers are assembled into an [`ObserverRegistry`] before the scanner is
//! built; the [`Notifier`] owns the registry and a store handle, so delivery
//! failures become durable retry records instead of being dropped.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, warn};

use crate::error::ScanError;
use crate::extract::TxExtractData;
use crate::store::{LedgerStore, UnscanRecord};
use crate::types::BlockHeader;

/// Reason recorded when an observer rejects extracted data.
pub const REASON_NOTIFY_FAILED: &str = "extract data notify failed";

/// Receives scan progress and extracted wallet data.
#[async_trait]
pub trait BlockScanObserver: Send + Sync {
    /// A block was accepted (`fork = false`) or orphaned (`fork = true`).
    async fn on_new_block(&self, header: &BlockHeader) -> Result<(), ScanError>;

    /// One extracted record set for one subscribing account.
    async fn on_extract_data(
        &self,
        account_key: &str,
        data: &TxExtractData,
    ) -> Result<(), ScanError>;
}

/// The set of observers a scanner delivers to, fixed at construction.
#[derive(Default, Clone)]
pub struct ObserverRegistry {
    observers: Vec<Arc<dyn BlockScanObserver>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, observer: Arc<dyn BlockScanObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

/// Delivers block headers and extracted data to every registered observer.
pub struct Notifier {
    registry: ObserverRegistry,
    store: Arc<dyn LedgerStore>,
}

impl Notifier {
    pub fn new(registry: ObserverRegistry, store: Arc<dyn LedgerStore>) -> Self {
        Self { registry, store }
    }

    /// Best-effort header broadcast. Failures are logged, never retried.
    pub async fn notify_block(&self, header: &BlockHeader) {
        for observer in &self.registry.observers {
            if let Err(e) = observer.on_new_block(header).await {
                warn!(
                    height = header.height,
                    fork = header.fork,
                    error = %e,
                    "block notify rejected"
                );
            }
        }
    }

    /// Deliver every (account, record set) pair to every observer. One failed
    /// delivery becomes one retry record and does not stop the rest.
    pub async fn notify_extract_data(
        &self,
        block_height: u64,
        extract_data: &HashMap<String, Vec<TxExtractData>>,
    ) {
        for observer in &self.registry.observers {
            for (account_key, sets) in extract_data {
                for data in sets {
                    if let Err(e) = observer.on_extract_data(account_key, data).await {
                        error!(
                            height = block_height,
                            account = %account_key,
                            error = %e,
                            "extract data notify rejected"
                        );
                        let record = UnscanRecord::new(block_height, "", REASON_NOTIFY_FAILED);
                        if let Err(e) = self.store.save_unscan_record(&record).await {
                            error!(height = block_height, error = %e, "saving retry record failed");
                        }
                    }
                }
            }
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::ScanCursor;
    use crate::extract::TransactionSummary;
    use crate::types::{Block, Coin};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Store stub that only records retry records.
    #[derive(Default)]
    struct RecordingStore {
        unscan: Mutex<Vec<UnscanRecord>>,
    }

    #[async_trait]
    impl LedgerStore for RecordingStore {
        async fn cursor(&self) -> Result<Option<ScanCursor>, ScanError> {
            Ok(None)
        }
        async fn save_cursor(&self, _cursor: &ScanCursor) -> Result<(), ScanError> {
            Ok(())
        }
        async fn save_block(&self, _block: &Block) -> Result<(), ScanError> {
            Ok(())
        }
        async fn block(&self, _height: u64) -> Result<Option<Block>, ScanError> {
            Ok(None)
        }
        async fn save_unscan_record(&self, record: &UnscanRecord) -> Result<(), ScanError> {
            self.unscan.lock().unwrap().push(record.clone());
            Ok(())
        }
        async fn delete_unscan_records(&self, _height: u64) -> Result<(), ScanError> {
            Ok(())
        }
        async fn unscan_records(&self) -> Result<Vec<UnscanRecord>, ScanError> {
            Ok(self.unscan.lock().unwrap().clone())
        }
        async fn delete_unscan_records_without_tx(&self) -> Result<(), ScanError> {
            Ok(())
        }
    }

    struct CountingObserver {
        delivered: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl BlockScanObserver for CountingObserver {
        async fn on_new_block(&self, _header: &BlockHeader) -> Result<(), ScanError> {
            Ok(())
        }
        async fn on_extract_data(
            &self,
            _account_key: &str,
            _data: &TxExtractData,
        ) -> Result<(), ScanError> {
            if self.fail {
                return Err(ScanError::Notify("subscriber offline".into()));
            }
            self.delivered.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    fn sample_data() -> HashMap<String, Vec<TxExtractData>> {
        let summary = TransactionSummary {
            wx_id: "wx".into(),
            tx_id: "tx-1".into(),
            coin: Coin::default(),
            block_hash: "0xb".into(),
            block_height: 9,
            decimals: 8,
            amount: "0.00001000".into(),
            fees: "0".into(),
            confirm_time: 0,
            from: vec![],
            to: vec![],
            status: "1".into(),
            reason: String::new(),
        };
        let mut data = HashMap::new();
        data.insert(
            "acct-1".to_string(),
            vec![TxExtractData {
                transaction: summary,
                inputs: vec![],
                outputs: vec![],
            }],
        );
        data
    }

    #[tokio::test]
    async fn delivery_failure_becomes_retry_record_and_others_still_deliver() {
        let store = Arc::new(RecordingStore::default());
        let failing = Arc::new(CountingObserver {
            delivered: AtomicU32::new(0),
            fail: true,
        });
        let healthy = Arc::new(CountingObserver {
            delivered: AtomicU32::new(0),
            fail: false,
        });

        let mut registry = ObserverRegistry::new();
        registry.register(Arc::clone(&failing) as Arc<dyn BlockScanObserver>);
        registry.register(Arc::clone(&healthy) as Arc<dyn BlockScanObserver>);

        let notifier = Notifier::new(registry, Arc::clone(&store) as Arc<dyn LedgerStore>);
        notifier.notify_extract_data(9, &sample_data()).await;

        assert_eq!(healthy.delivered.load(Ordering::Relaxed), 1);

        let records = store.unscan.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].block_height, 9);
        assert_eq!(records[0].reason, REASON_NOTIFY_FAILED);
        assert!(records[0].is_whole_block());
    }

    #[tokio::test]
    async fn block_notify_is_best_effort() {
        let store = Arc::new(RecordingStore::default());
        let registry = ObserverRegistry::new();
        let notifier = Notifier::new(registry, store as Arc<dyn LedgerStore>);

        // No observers registered: nothing to do, nothing recorded.
        let header = BlockHeader {
            height: 1,
            hash: "0xa".into(),
            prev_hash: "0x0".into(),
            time: 0,
            symbol: "COIN".into(),
            fork: false,
        };
        notifier.notify_block(&header).await;
    }
}
