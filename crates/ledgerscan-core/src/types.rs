//! Shared types for the scanning pipeline.

use serde::{Deserialize, Serialize};

// ─── Block ────────────────────────────────────────────────────────────────────

/// A block as returned by the ledger client — enough for the scan loop to
/// verify hash-chain continuity and track progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block height.
    pub height: u64,
    /// Block hash.
    pub hash: String,
    /// Hash of the previous block.
    pub prev_hash: String,
    /// Unix timestamp of the block (seconds since epoch).
    pub time: i64,
}

impl Block {
    /// Returns `true` if `parent` is the direct parent of `self`.
    pub fn extends(&self, parent: &Block) -> bool {
        self.height == parent.height + 1 && self.prev_hash == parent.hash
    }

    /// Project the header observers receive. `fork` starts out clear.
    pub fn header(&self, symbol: &str) -> BlockHeader {
        BlockHeader {
            height: self.height,
            hash: self.hash.clone(),
            prev_hash: self.prev_hash.clone(),
            time: self.time,
            symbol: symbol.to_string(),
            fork: false,
        }
    }
}

// ─── BlockHeader ──────────────────────────────────────────────────────────────

/// What observers receive for every accepted — or orphaned — block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub height: u64,
    pub hash: String,
    pub prev_hash: String,
    pub time: i64,
    /// Asset symbol of the chain this header belongs to.
    pub symbol: String,
    /// Set when this header announces an orphaned block.
    pub fork: bool,
}

// ─── Transaction ──────────────────────────────────────────────────────────────

/// A raw transfer as returned by the ledger client. Immutable input to
/// extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub tx_id: String,
    pub block_height: u64,
    pub block_hash: String,
    pub sender: String,
    pub receiver: String,
    /// Transfer value in minor units.
    pub value: u64,
    /// Fee in minor units.
    pub fee: u64,
    /// Unix timestamp the transfer was created.
    pub create_time: i64,
}

// ─── Coin ─────────────────────────────────────────────────────────────────────

/// Asset descriptor carried on every transfer record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub symbol: String,
    pub is_contract: bool,
    /// Contract identifier; empty for the chain's native asset.
    pub contract_id: String,
}

// ─── ScanTarget ───────────────────────────────────────────────────────────────

/// How an address is modeled when the resolver is asked whether it belongs to
/// a subscribing account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BalanceModel {
    /// Balance tracked per address.
    Address,
    /// Balance tracked per account (many addresses).
    Account,
}

/// One side of a transaction handed to the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanTarget {
    pub address: String,
    pub balance_model: BalanceModel,
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn block(height: u64, hash: &str, prev: &str) -> Block {
        Block {
            height,
            hash: hash.into(),
            prev_hash: prev.into(),
            time: (height * 60) as i64,
        }
    }

    #[test]
    fn block_extends_parent() {
        let parent = block(100, "0xaaa", "0x000");
        let child = block(101, "0xbbb", "0xaaa");
        assert!(child.extends(&parent));
        assert!(!parent.extends(&child));
    }

    #[test]
    fn block_extends_false_on_gap() {
        let a = block(100, "0xaaa", "0x000");
        let b = block(102, "0xccc", "0xaaa"); // gap
        assert!(!b.extends(&a));
    }

    #[test]
    fn header_projection() {
        let b = block(42, "0xf00", "0xeff");
        let header = b.header("BEAM");
        assert_eq!(header.height, 42);
        assert_eq!(header.hash, "0xf00");
        assert_eq!(header.symbol, "BEAM");
        assert!(!header.fork);
    }
}
