//! Bounded-parallelism fan-out/fan-in for one block's transactions.
//!
//! Three primitives form a producer/consumer triad:
//! - a counting admission gate capping in-flight extraction tasks,
//! - an unbounded producer channel of results,
//! - a completion signal fired once every submitted transaction's result has
//!   been consumed.
//!
//! One arbitration loop owns the in-memory result queue; nothing else mutates
//! it. Backpressure applies only at the gate — the queue itself is unbounded,
//! its size bounded in practice by the gate size times per-transaction
//! latency. Results may complete out of submission order; the block is done
//! only when all of them have been consumed.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tracing::warn;

use crate::error::ScanError;
use crate::extract::ExtractResult;
use crate::types::Transaction;

/// Runs extraction for one transaction. Implementations are stateless with
/// respect to each other; each task reads only its own transaction.
#[async_trait]
pub trait TxExtractor: Send + Sync {
    async fn extract(&self, block_height: u64, block_hash: &str, tx: Transaction)
        -> ExtractResult;
}

/// Consumes one completed result: forward it for notification, or turn it
/// into a retry record. An `Err` counts toward the block's aggregate failure.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn consume(&self, block_height: u64, result: ExtractResult) -> Result<(), ScanError>;
}

/// Bounded-concurrency extraction pipeline for a single block.
pub struct ExtractionPipeline {
    max_in_flight: usize,
}

impl ExtractionPipeline {
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            max_in_flight: max_in_flight.max(1),
        }
    }

    /// Fan the block's transactions out across extraction tasks and fan the
    /// results back into `sink`, returning once every result is consumed.
    ///
    /// Individual failures never stop the remaining transactions; they are
    /// collected and surfaced as one aggregate error at the end.
    pub async fn process_block(
        &self,
        block_height: u64,
        block_hash: &str,
        txs: Vec<Transaction>,
        extractor: Arc<dyn TxExtractor>,
        sink: Arc<dyn ResultSink>,
    ) -> Result<(), ScanError> {
        let total = txs.len();
        if total == 0 {
            return Ok(());
        }

        let gate = Arc::new(Semaphore::new(self.max_in_flight));
        let (producer_tx, mut producer_rx) = mpsc::unbounded_channel::<ExtractResult>();
        let (handoff_tx, mut handoff_rx) = mpsc::channel::<ExtractResult>(1);
        let (quit_tx, mut quit_rx) = oneshot::channel::<()>();
        let failed = Arc::new(AtomicUsize::new(0));

        // Single consumer: the only task that counts completions.
        let consumer = tokio::spawn({
            let sink = Arc::clone(&sink);
            let failed = Arc::clone(&failed);
            async move {
                let mut done = 0usize;
                while let Some(result) = handoff_rx.recv().await {
                    if let Err(e) = sink.consume(block_height, result).await {
                        failed.fetch_add(1, Ordering::Relaxed);
                        warn!(height = block_height, error = %e, "extraction result rejected");
                    }
                    done += 1;
                    if done == total {
                        let _ = quit_tx.send(());
                        break;
                    }
                }
            }
        });

        // Submitters: one task per transaction, gated by the semaphore. The
        // permit is released only after the result reached the producer
        // channel.
        let submitter = tokio::spawn({
            let gate = Arc::clone(&gate);
            let extractor = Arc::clone(&extractor);
            let producer_tx = producer_tx.clone();
            let block_hash = block_hash.to_string();
            async move {
                for tx in txs {
                    let Ok(permit) = Arc::clone(&gate).acquire_owned().await else {
                        break;
                    };
                    let extractor = Arc::clone(&extractor);
                    let producer_tx = producer_tx.clone();
                    let block_hash = block_hash.clone();
                    tokio::spawn(async move {
                        let result = extractor.extract(block_height, &block_hash, tx).await;
                        let _ = producer_tx.send(result);
                        drop(permit);
                    });
                }
            }
        });
        drop(producer_tx);

        // Arbitration: the only owner of the result queue. Three-way select
        // over a new result, the completion signal, and (queue non-empty)
        // handing the front of the queue to the consumer.
        let mut queue: VecDeque<ExtractResult> = VecDeque::new();
        loop {
            tokio::select! {
                Some(result) = producer_rx.recv() => queue.push_back(result),
                _ = &mut quit_rx => break,
                Ok(permit) = handoff_tx.reserve(), if !queue.is_empty() => {
                    if let Some(result) = queue.pop_front() {
                        permit.send(result);
                    }
                }
            }
        }
        drop(handoff_tx);

        let _ = submitter.await;
        let _ = consumer.await;

        let failed = failed.load(Ordering::Relaxed);
        if failed > 0 {
            Err(ScanError::Extraction {
                block_height,
                failed,
            })
        } else {
            Ok(())
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
