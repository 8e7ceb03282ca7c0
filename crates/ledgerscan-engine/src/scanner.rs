//! The scan loop — advances block by block, detects forks by prev-hash
//! mismatch, unwinds and re-anchors on fork, and reprocesses failed heights.
//!
//! # Cycle shape
//!
//! One `scan_task` call drives one full cycle:
//! 1. resume from the persisted cursor (seeded at tip − 1 on first run),
//! 2. advance until the chain tip, queueing unreachable heights for retry,
//! 3. tail-rescan the last N blocks below the stop height,
//! 4. reprocess the persisted retry queue.
//!
//! The loop never busy-waits at the tip; the host invokes it on a schedule.
//! Cross-block ordering is strict — block N+1 is not fetched until block N's
//! extraction has fully completed.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use ledgerscan_core::client::LedgerClient;
use ledgerscan_core::config::{ScannerConfig, ScannerState};
use ledgerscan_core::cursor::ScanCursor;
use ledgerscan_core::error::ScanError;
use ledgerscan_core::extract::{
    AddressResolver, ExtractResult, ExtractionEngine, TxExtractData,
};
use ledgerscan_core::observer::{Notifier, ObserverRegistry};
use ledgerscan_core::pipeline::{ExtractionPipeline, ResultSink, TxExtractor};
use ledgerscan_core::store::{LedgerStore, UnscanRecord};
use ledgerscan_core::types::{Block, BlockHeader, Transaction};

/// Reorg-safe block scanner over a [`LedgerClient`] / [`LedgerStore`] pair.
pub struct BlockScanner {
    config: ScannerConfig,
    client: Arc<dyn LedgerClient>,
    store: Arc<dyn LedgerStore>,
    notifier: Arc<Notifier>,
    pipeline: ExtractionPipeline,
    engine: ExtractionEngine,
    extractor: Arc<dyn TxExtractor>,
    sink: Arc<dyn ResultSink>,
    state: ScannerState,
}

impl BlockScanner {
    pub fn new(
        config: ScannerConfig,
        client: Arc<dyn LedgerClient>,
        store: Arc<dyn LedgerStore>,
        observers: ObserverRegistry,
        resolver: Arc<dyn AddressResolver>,
    ) -> Self {
        let notifier = Arc::new(Notifier::new(observers, Arc::clone(&store)));
        let engine = ExtractionEngine::new(&config.symbol, config.decimals);
        let extractor = Arc::new(ScanExtractor {
            engine: engine.clone(),
            client: Arc::clone(&client),
            resolver,
        });
        let sink = Arc::new(ScanSink {
            store: Arc::clone(&store),
            notifier: Arc::clone(&notifier),
        });
        Self {
            pipeline: ExtractionPipeline::new(config.max_extracting),
            engine,
            extractor,
            sink,
            client,
            store,
            notifier,
            state: ScannerState::IdleAtTip,
            config,
        }
    }

    /// Current state of the scan loop.
    pub fn state(&self) -> ScannerState {
        self.state
    }

    /// Drive one full scan cycle. Intended to be invoked on a recurring
    /// schedule by the host.
    pub async fn scan_task(&mut self) -> Result<(), ScanError> {
        let header = self.scanned_block_header().await?;
        let mut current_height = header.height;
        let mut current_hash = header.hash;
        // Cleared after a skipped height: the next block cannot be
        // fork-checked against a hash we never saw.
        let mut prev_hash_known = true;

        self.state = ScannerState::Advancing;
        let mut cycle_err: Option<ScanError> = None;

        loop {
            let max_height = match self.client.current_block().await {
                Ok(tip) => tip.height,
                Err(e) => {
                    warn!(error = %e, "cannot read chain tip");
                    break;
                }
            };

            if current_height >= max_height {
                info!(height = max_height, "scanned up to the chain tip");
                self.state = ScannerState::IdleAtTip;
                break;
            }

            current_height += 1;
            info!(height = current_height, "scanning height");

            let block = match self.client.block_by_height(current_height).await {
                Ok(block) => block,
                Err(e) => {
                    warn!(height = current_height, error = %e, "block fetch failed; queueing for retry");
                    let record = UnscanRecord::new(current_height, "", e.to_string());
                    self.save_unscan_record(&record).await;
                    prev_hash_known = false;
                    continue;
                }
            };

            if prev_hash_known && block.prev_hash != current_hash {
                // Fork: the chain the remote reports no longer contains the
                // block we accepted at the previous height.
                self.state = ScannerState::ForkRecovering;
                let orphaned = current_height - 1;
                warn!(
                    height = current_height,
                    local = %current_hash,
                    remote = %block.prev_hash,
                    "chain forked below fetched block"
                );

                // Grab the local copy of the orphaned block before its
                // bookkeeping is cleared.
                let orphaned_block = self.store.block(orphaned).await.ok().flatten();

                if let Err(e) = self.store.delete_unscan_records(orphaned).await {
                    warn!(height = orphaned, error = %e, "deleting retry records failed");
                }

                current_height = ScanCursor::fork_rewind_height(current_height);

                let anchor = match self.resolve_anchor(current_height).await {
                    Ok(anchor) => anchor,
                    Err(e) => {
                        error!(height = current_height, error = %e, "cannot resolve rewind anchor");
                        cycle_err = Some(e);
                        break;
                    }
                };
                current_height = anchor.height;
                current_hash = anchor.hash.clone();
                info!(height = current_height, hash = %current_hash, "re-anchored below fork");

                self.store
                    .save_cursor(&ScanCursor::new(anchor.height, &anchor.hash))
                    .await?;

                if let Some(orphan) = orphaned_block {
                    let mut header = orphan.header(&self.config.symbol);
                    header.fork = true;
                    self.notifier.notify_block(&header).await;
                }

                prev_hash_known = true;
                self.state = ScannerState::Advancing;
            } else {
                if let Err(e) = self.batch_extract(&block).await {
                    error!(height = block.height, error = %e, "block extraction incomplete");
                    return Err(e);
                }

                current_hash = block.hash.clone();
                self.store
                    .save_cursor(&ScanCursor::new(block.height, &block.hash))
                    .await?;
                self.store.save_block(&block).await?;

                self.notifier
                    .notify_block(&block.header(&self.config.symbol))
                    .await;

                prev_hash_known = true;
            }
        }

        // Tail rescan: the last N blocks below the stop height, bounded at
        // genesis.
        if self.config.rescan_last_block_count > 0 {
            let from = current_height
                .saturating_sub(self.config.rescan_last_block_count)
                .max(1);
            for height in from..current_height {
                if let Err(e) = self.scan_block_inner(height).await {
                    warn!(height, error = %e, "tail rescan failed");
                }
            }
        }

        self.rescan_failed_records().await;

        match cycle_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Scan one specific height on demand and notify observers of it.
    pub async fn scan_block(&self, height: u64) -> Result<(), ScanError> {
        let block = self.scan_block_inner(height).await?;
        self.notifier
            .notify_block(&block.header(&self.config.symbol))
            .await;
        Ok(())
    }

    /// Reset the cursor so scanning resumes at `height`; the anchor is the
    /// block below it.
    pub async fn rescan_from(&self, height: u64) -> Result<(), ScanError> {
        if height == 0 {
            return Err(ScanError::InvalidRescanHeight);
        }
        let anchor_height = height - 1;
        let block = self.client.block_by_height(anchor_height).await?;
        self.store
            .save_cursor(&ScanCursor::new(anchor_height, &block.hash))
            .await
    }

    /// Fetch a block by hash straight from the ledger.
    pub async fn block_by_hash(&self, hash: &str) -> Result<Block, ScanError> {
        self.client.block_by_hash(hash).await
    }

    /// Header of the remote chain tip.
    pub async fn current_block_header(&self) -> Result<BlockHeader, ScanError> {
        let tip = self.client.current_block().await?;
        Ok(tip.header(&self.config.symbol))
    }

    /// Height of the remote chain tip.
    pub async fn current_block_height(&self) -> Result<u64, ScanError> {
        Ok(self.client.current_block().await?.height)
    }

    /// Header of the last accepted block; seeds from (tip − 1) when no cursor
    /// has been persisted yet.
    pub async fn scanned_block_header(&self) -> Result<BlockHeader, ScanError> {
        if let Some(cursor) = self.store.cursor().await? {
            return Ok(BlockHeader {
                height: cursor.height,
                hash: cursor.hash,
                prev_hash: String::new(),
                time: 0,
                symbol: self.config.symbol.clone(),
                fork: false,
            });
        }

        // First run: start one below the remote tip.
        let tip = self.client.current_block().await?;
        let height = tip.height.saturating_sub(1);
        let block = self.client.block_by_height(height).await?;
        Ok(block.header(&self.config.symbol))
    }

    /// Height of the last accepted block (0 when nothing was scanned yet).
    pub async fn scanned_block_height(&self) -> Result<u64, ScanError> {
        Ok(self
            .store
            .cursor()
            .await?
            .map(|cursor| cursor.height)
            .unwrap_or(0))
    }

    /// Ad-hoc extraction of a single transaction outside the scan loop.
    pub async fn extract_transaction_data(
        &self,
        tx_id: &str,
        resolver: &dyn AddressResolver,
    ) -> Result<HashMap<String, Vec<TxExtractData>>, ScanError> {
        let mut tx = self.client.transaction(tx_id).await?;
        if tx.block_hash.is_empty() {
            // Best-effort anchor fill from the transaction's own height.
            if let Ok(block) = self.client.block_by_height(tx.block_height).await {
                tx.block_hash = block.hash;
                tx.block_height = block.height;
            }
        }
        let hash = tx.block_hash.clone();
        let result = self
            .engine
            .extract_transaction(tx.block_height, &hash, &tx, resolver);
        Ok(result.extract_data)
    }

    /// Extract every transaction of `block` through the bounded pipeline.
    async fn batch_extract(&self, block: &Block) -> Result<(), ScanError> {
        let txs = self.client.transactions_by_height(block.height).await?;
        if txs.is_empty() {
            return Ok(());
        }
        self.pipeline
            .process_block(
                block.height,
                &block.hash,
                txs,
                Arc::clone(&self.extractor),
                Arc::clone(&self.sink),
            )
            .await
    }

    /// Fetch + extract one height, queueing it for retry when the fetch
    /// fails. Extraction shortfalls are logged; the block is still returned.
    async fn scan_block_inner(&self, height: u64) -> Result<Block, ScanError> {
        let block = match self.client.block_by_height(height).await {
            Ok(block) => block,
            Err(e) => {
                warn!(height, error = %e, "block fetch failed; queueing for retry");
                let record = UnscanRecord::new(height, "", e.to_string());
                self.save_unscan_record(&record).await;
                return Err(e);
            }
        };

        info!(height = block.height, "scanning height");
        if let Err(e) = self.batch_extract(&block).await {
            warn!(height, error = %e, "extraction incomplete");
        }
        Ok(block)
    }

    /// The block scanning re-anchors to: prefer the locally stored copy, fall
    /// back to the remote ledger.
    async fn resolve_anchor(&self, height: u64) -> Result<Block, ScanError> {
        match self.store.block(height).await {
            Ok(Some(block)) => return Ok(block),
            Ok(None) => {}
            Err(e) => warn!(height, error = %e, "local block lookup failed"),
        }
        info!(height, "anchor not in local store; asking the ledger");
        self.client
            .block_by_height(height)
            .await
            .map_err(|_| ScanError::AnchorUnresolved {
                block_height: height,
            })
    }

    /// Reprocess every height sitting in the retry queue, dropping records
    /// that succeed and bulk-cleaning records whose transaction is gone.
    async fn rescan_failed_records(&self) {
        let records = match self.store.unscan_records().await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "cannot load retry queue");
                return;
            }
        };

        let heights: BTreeSet<u64> = records
            .iter()
            .map(|r| r.block_height)
            .filter(|height| *height > 0)
            .collect();

        for height in heights {
            info!(height, "re-scanning failed height");

            let block = match self.client.block_by_height(height).await {
                Ok(block) => block,
                Err(e) => {
                    warn!(height, error = %e, "block fetch failed during retry");
                    continue;
                }
            };

            if let Err(e) = self.batch_extract(&block).await {
                warn!(height, error = %e, "retry extraction failed");
                continue;
            }

            if let Err(e) = self.store.delete_unscan_records(height).await {
                warn!(height, error = %e, "deleting retry records failed");
            }
        }

        if let Err(e) = self.store.delete_unscan_records_without_tx().await {
            warn!(error = %e, "retry queue cleanup failed");
        }
    }

    async fn save_unscan_record(&self, record: &UnscanRecord) {
        if let Err(e) = self.store.save_unscan_record(record).await {
            error!(height = record.block_height, error = %e, "saving retry record failed");
        }
    }
}

/// Pipeline adapter running the extraction engine, resolving a missing block
/// anchor from the client when needed.
struct ScanExtractor {
    engine: ExtractionEngine,
    client: Arc<dyn LedgerClient>,
    resolver: Arc<dyn AddressResolver>,
}

#[async_trait]
impl TxExtractor for ScanExtractor {
    async fn extract(
        &self,
        block_height: u64,
        block_hash: &str,
        mut tx: Transaction,
    ) -> ExtractResult {
        if block_hash.is_empty() {
            if let Ok(block) = self.client.block_by_height(tx.block_height).await {
                tx.block_hash = block.hash;
                tx.block_height = block.height;
            }
            let hash = tx.block_hash.clone();
            return self
                .engine
                .extract_transaction(tx.block_height, &hash, &tx, self.resolver.as_ref());
        }
        self.engine
            .extract_transaction(block_height, block_hash, &tx, self.resolver.as_ref())
    }
}

/// Pipeline sink: successful results go to the notifier, failures become
/// retry records.
struct ScanSink {
    store: Arc<dyn LedgerStore>,
    notifier: Arc<Notifier>,
}

#[async_trait]
impl ResultSink for ScanSink {
    async fn consume(&self, block_height: u64, result: ExtractResult) -> Result<(), ScanError> {
        if result.success {
            self.notifier
                .notify_extract_data(block_height, &result.extract_data)
                .await;
            return Ok(());
        }

        let record = UnscanRecord::new(block_height, "", "extract failed");
        if let Err(e) = self.store.save_unscan_record(&record).await {
            error!(height = block_height, error = %e, "saving retry record failed");
        }
        Err(ScanError::Extraction {
            block_height,
            failed: 1,
        })
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
