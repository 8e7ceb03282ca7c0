//! Ledger client seam — remote node access used by the scanner.

use async_trait::async_trait;

use crate::error::ScanError;
use crate::types::{Block, Transaction};

/// Trait for fetching chain data from a remote wallet/node RPC.
///
/// Timeout and retry semantics belong to the implementation; the scanner
/// treats any failure like a missing block and leans on its retry queue.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// The current chain tip.
    async fn current_block(&self) -> Result<Block, ScanError>;

    async fn block_by_height(&self, height: u64) -> Result<Block, ScanError>;

    async fn block_by_hash(&self, hash: &str) -> Result<Block, ScanError>;

    async fn transaction(&self, tx_id: &str) -> Result<Transaction, ScanError>;

    /// All transactions confirmed at `height`.
    async fn transactions_by_height(&self, height: u64) -> Result<Vec<Transaction>, ScanError>;
}
