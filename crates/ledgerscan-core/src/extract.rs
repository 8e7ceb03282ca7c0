//! Extraction engine — converts one raw transaction into zero, one, or two
//! normalized record sets, keyed by subscribing account.
//!
//! A transaction contributes:
//! - one combined input+output set under a single key when both sides resolve
//!   to the same account (a self-transfer is never double counted),
//! - otherwise an input-only set under the sender's account and/or an
//!   output-only set under the receiver's account, independently.
//!
//! The input side always carries two debit lines: the transfer value and the
//! fee as a separate zero-indexed entry. The output side carries one credit of
//! the transfer value.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::{BalanceModel, Coin, ScanTarget, Transaction};

// ─── Resolver ─────────────────────────────────────────────────────────────────

/// Resolves an address to the subscribing account it belongs to.
///
/// Returns `Some(account_key)` when the address is watched, `None` otherwise.
pub trait AddressResolver: Send + Sync {
    fn resolve(&self, target: &ScanTarget) -> Option<String>;
}

impl<F> AddressResolver for F
where
    F: Fn(&ScanTarget) -> Option<String> + Send + Sync,
{
    fn resolve(&self, target: &ScanTarget) -> Option<String> {
        self(target)
    }
}

// ─── Records ──────────────────────────────────────────────────────────────────

/// One ledger-side entry — a debit on the input side, a credit on the output
/// side — attributed to a watched address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    /// Deterministic record identifier; identical across repeated extraction
    /// of the same transaction.
    pub sid: String,
    pub tx_id: String,
    pub address: String,
    pub coin: Coin,
    /// Amount as an exact decimal string in major units.
    pub amount: String,
    pub block_hash: String,
    pub block_height: u64,
    /// Line index inside the record set (account model: always 0).
    pub index: u64,
    pub created_at: i64,
}

/// The normalized transaction attached to every record set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSummary {
    /// Deterministic transaction-level identifier for downstream
    /// de-duplication.
    pub wx_id: String,
    pub tx_id: String,
    pub coin: Coin,
    pub block_hash: String,
    pub block_height: u64,
    pub decimals: u32,
    pub amount: String,
    pub fees: String,
    pub confirm_time: i64,
    /// `address:amount` pairs on the sending side.
    pub from: Vec<String>,
    /// `address:amount` pairs on the receiving side.
    pub to: Vec<String>,
    pub status: String,
    pub reason: String,
}

/// One record set extracted for one subscribing account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxExtractData {
    pub transaction: TransactionSummary,
    pub inputs: Vec<TransferRecord>,
    pub outputs: Vec<TransferRecord>,
}

/// Everything extracted from a single transaction. Built exactly once; the
/// pipeline moves it to the consumer untouched.
#[derive(Debug, Clone)]
pub struct ExtractResult {
    pub block_height: u64,
    pub tx_id: String,
    pub success: bool,
    /// Account key → record sets, in extraction order.
    pub extract_data: HashMap<String, Vec<TxExtractData>>,
}

// ─── Identifiers ──────────────────────────────────────────────────────────────

/// Deterministic record identifier, collision-resistant over
/// (side, tx id, symbol, contract id, index).
pub fn gen_record_sid(side: &str, tx_id: &str, coin: &Coin, index: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(side.as_bytes());
    hasher.update(b":");
    hasher.update(tx_id.as_bytes());
    hasher.update(b":");
    hasher.update(coin.symbol.as_bytes());
    hasher.update(b":");
    hasher.update(coin.contract_id.as_bytes());
    hasher.update(b":");
    hasher.update(index.to_be_bytes());
    hex::encode(hasher.finalize())
}

/// Deterministic transaction-level identifier over the normalized
/// transaction's canonical fields.
pub fn gen_wx_id(tx_id: &str, coin: &Coin) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"tx:");
    hasher.update(tx_id.as_bytes());
    hasher.update(b":");
    hasher.update(coin.symbol.as_bytes());
    hasher.update(b":");
    hasher.update(coin.contract_id.as_bytes());
    hex::encode(hasher.finalize())
}

/// Convert minor units to an exact decimal string at `decimals` places.
///
/// Returns `None` when the scale cannot be represented; never rounds.
pub fn to_decimal_string(value: u64, decimals: u32) -> Option<String> {
    Decimal::try_from_i128_with_scale(value as i128, decimals)
        .ok()
        .map(|d| d.to_string())
}

// ─── Engine ───────────────────────────────────────────────────────────────────

/// Which side(s) of the transaction a record set covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Both,
    Input,
    Output,
}

/// Stateless extraction engine for one asset.
#[derive(Debug, Clone)]
pub struct ExtractionEngine {
    coin: Coin,
    decimals: u32,
}

impl ExtractionEngine {
    pub fn new(symbol: impl Into<String>, decimals: u32) -> Self {
        Self {
            coin: Coin {
                symbol: symbol.into(),
                is_contract: false,
                contract_id: String::new(),
            },
            decimals,
        }
    }

    /// Extract one transaction against the resolver.
    ///
    /// Never fails outright: an amount that cannot be represented at the
    /// configured scale yields `success = false`, which the scan loop routes
    /// through the retry queue. A transaction touching no watched address is a
    /// success with empty data.
    pub fn extract_transaction(
        &self,
        block_height: u64,
        block_hash: &str,
        tx: &Transaction,
        resolver: &dyn AddressResolver,
    ) -> ExtractResult {
        let mut result = ExtractResult {
            block_height,
            tx_id: tx.tx_id.clone(),
            success: true,
            extract_data: HashMap::new(),
        };

        // The anchor comes from the caller (scan loop) or, for ad-hoc
        // extraction, from the transaction itself.
        let (height, hash) = if block_hash.is_empty() {
            (tx.block_height, tx.block_hash.as_str())
        } else {
            (block_height, block_hash)
        };
        result.block_height = height;

        let sender_key = resolver.resolve(&ScanTarget {
            address: tx.sender.clone(),
            balance_model: BalanceModel::Address,
        });
        let receiver_key = resolver.resolve(&ScanTarget {
            address: tx.receiver.clone(),
            balance_model: BalanceModel::Address,
        });

        match (&sender_key, &receiver_key) {
            (Some(a), Some(b)) if a == b && !a.is_empty() => {
                if !self.push_record_set(tx, height, hash, a, Side::Both, &mut result) {
                    result.success = false;
                }
            }
            _ => {
                if let Some(key) = &sender_key {
                    if !self.push_record_set(tx, height, hash, key, Side::Input, &mut result) {
                        result.success = false;
                    }
                }
                if let Some(key) = &receiver_key {
                    if !self.push_record_set(tx, height, hash, key, Side::Output, &mut result) {
                        result.success = false;
                    }
                }
            }
        }

        result
    }

    /// Append one record set for `key`. Returns `false` when an amount cannot
    /// be represented.
    fn push_record_set(
        &self,
        tx: &Transaction,
        height: u64,
        hash: &str,
        key: &str,
        side: Side,
        result: &mut ExtractResult,
    ) -> bool {
        let (Some(amount), Some(fees)) = (
            to_decimal_string(tx.value, self.decimals),
            to_decimal_string(tx.fee, self.decimals),
        ) else {
            return false;
        };

        let summary = TransactionSummary {
            wx_id: gen_wx_id(&tx.tx_id, &self.coin),
            tx_id: tx.tx_id.clone(),
            coin: self.coin.clone(),
            block_hash: hash.to_string(),
            block_height: height,
            decimals: self.decimals,
            amount: amount.clone(),
            fees: fees.clone(),
            confirm_time: tx.create_time,
            from: vec![format!("{}:{}", tx.sender, amount)],
            to: vec![format!("{}:{}", tx.receiver, amount)],
            status: "1".into(),
            reason: String::new(),
        };

        let mut data = TxExtractData {
            transaction: summary,
            inputs: Vec::new(),
            outputs: Vec::new(),
        };

        if matches!(side, Side::Both | Side::Input) {
            let value_debit = TransferRecord {
                sid: gen_record_sid("input", &tx.tx_id, &self.coin, 0),
                tx_id: tx.tx_id.clone(),
                address: tx.sender.clone(),
                coin: self.coin.clone(),
                amount: amount.clone(),
                block_hash: hash.to_string(),
                block_height: height,
                index: 0,
                created_at: tx.create_time,
            };
            // The fee is its own line item, not subtracted from the value; it
            // keeps the zero index of the record set it belongs to.
            let mut fee_debit = value_debit.clone();
            fee_debit.amount = fees.clone();
            data.inputs.push(value_debit);
            data.inputs.push(fee_debit);
        }

        if matches!(side, Side::Both | Side::Output) {
            data.outputs.push(TransferRecord {
                sid: gen_record_sid("output", &tx.tx_id, &self.coin, 0),
                tx_id: tx.tx_id.clone(),
                address: tx.receiver.clone(),
                coin: self.coin.clone(),
                amount,
                block_hash: hash.to_string(),
                block_height: height,
                index: 0,
                created_at: tx.create_time,
            });
        }

        result
            .extract_data
            .entry(key.to_string())
            .or_default()
            .push(data);
        true
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(sender: &str, receiver: &str, value: u64, fee: u64) -> Transaction {
        Transaction {
            tx_id: "tx-1".into(),
            block_height: 77,
            block_hash: "0xblock77".into(),
            sender: sender.into(),
            receiver: receiver.into(),
            value,
            fee,
            create_time: 1_700_000_000,
        }
    }

    fn engine() -> ExtractionEngine {
        ExtractionEngine::new("BEAM", 8)
    }

    fn watch_prefix(
        prefix: &'static str,
    ) -> impl Fn(&ScanTarget) -> Option<String> + Send + Sync {
        move |target: &ScanTarget| {
            target
                .address
                .starts_with(prefix)
                .then(|| format!("acct-{}", target.address))
        }
    }

    #[test]
    fn minor_units_convert_exactly() {
        assert_eq!(to_decimal_string(1000, 8).unwrap(), "0.00001000");
        assert_eq!(to_decimal_string(10, 8).unwrap(), "0.00000010");
        assert_eq!(to_decimal_string(0, 8).unwrap(), "0.00000000");
        assert_eq!(to_decimal_string(123_456_789, 4).unwrap(), "12345.6789");
        assert!(to_decimal_string(1, 40).is_none()); // unrepresentable scale
    }

    #[test]
    fn self_transfer_yields_one_combined_set() {
        let resolver = |_: &ScanTarget| Some("acct-1".to_string());
        let tx = tx("w-alice", "w-alice-2", 1000, 10);

        let result = engine().extract_transaction(77, "0xblock77", &tx, &resolver);

        assert!(result.success);
        assert_eq!(result.extract_data.len(), 1);
        let sets = &result.extract_data["acct-1"];
        assert_eq!(sets.len(), 1, "one combined set, never two");
        assert_eq!(sets[0].inputs.len(), 2);
        assert_eq!(sets[0].outputs.len(), 1);
    }

    #[test]
    fn two_sided_extraction_is_independent() {
        let resolver = watch_prefix("w-");
        let tx = tx("w-alice", "w-bob", 1000, 10);

        let result = engine().extract_transaction(77, "0xblock77", &tx, &resolver);

        assert!(result.success);
        assert_eq!(result.extract_data.len(), 2);

        let sender_sets = &result.extract_data["acct-w-alice"];
        assert_eq!(sender_sets[0].inputs.len(), 2);
        assert!(sender_sets[0].outputs.is_empty());

        let receiver_sets = &result.extract_data["acct-w-bob"];
        assert!(receiver_sets[0].inputs.is_empty());
        assert_eq!(receiver_sets[0].outputs.len(), 1);

        // Both sides derive from the same transfer amount.
        assert_eq!(sender_sets[0].inputs[0].amount, receiver_sets[0].outputs[0].amount);
    }

    #[test]
    fn one_sided_match_extracts_that_side_only() {
        let resolver = watch_prefix("w-");
        let outgoing = tx("w-alice", "x-stranger", 1000, 10);

        let result = engine().extract_transaction(77, "0xblock77", &outgoing, &resolver);
        assert_eq!(result.extract_data.len(), 1);
        assert!(result.extract_data.contains_key("acct-w-alice"));

        let incoming = tx("x-stranger", "w-bob", 1000, 10);
        let result = engine().extract_transaction(77, "0xblock77", &incoming, &resolver);
        assert_eq!(result.extract_data.len(), 1);
        assert!(result.extract_data.contains_key("acct-w-bob"));
    }

    #[test]
    fn unwatched_transaction_is_empty_success() {
        let resolver = |_: &ScanTarget| None::<String>;
        let tx = tx("x-a", "x-b", 1000, 10);

        let result = engine().extract_transaction(77, "0xblock77", &tx, &resolver);

        assert!(result.success, "nothing to extract is not an error");
        assert!(result.extract_data.is_empty());
    }

    #[test]
    fn value_and_fee_are_separate_debit_lines() {
        let resolver = watch_prefix("w-");
        let tx = tx("w-alice", "x-b", 1000, 10);

        let result = engine().extract_transaction(77, "0xblock77", &tx, &resolver);
        let set = &result.extract_data["acct-w-alice"][0];

        assert_eq!(set.inputs[0].amount, "0.00001000");
        assert_eq!(set.inputs[1].amount, "0.00000010");
        assert_eq!(set.inputs[0].index, 0);
        assert_eq!(set.inputs[1].index, 0);
        assert_eq!(set.transaction.fees, "0.00000010");
    }

    #[test]
    fn output_credit_carries_transfer_value() {
        let resolver = watch_prefix("w-");
        let tx = tx("x-a", "w-bob", 1000, 10);

        let result = engine().extract_transaction(77, "0xblock77", &tx, &resolver);
        let set = &result.extract_data["acct-w-bob"][0];

        assert_eq!(set.outputs[0].amount, "0.00001000");
        assert_eq!(set.outputs[0].address, "w-bob");
    }

    #[test]
    fn repeated_extraction_is_idempotent() {
        let resolver = watch_prefix("w-");
        let tx = tx("w-alice", "w-bob", 1000, 10);
        let eng = engine();

        let first = eng.extract_transaction(77, "0xblock77", &tx, &resolver);
        let second = eng.extract_transaction(77, "0xblock77", &tx, &resolver);

        let sid_of = |r: &ExtractResult, key: &str| r.extract_data[key][0].inputs[0].sid.clone();
        assert_eq!(sid_of(&first, "acct-w-alice"), sid_of(&second, "acct-w-alice"));
        assert_eq!(
            first.extract_data["acct-w-alice"][0].transaction.wx_id,
            second.extract_data["acct-w-alice"][0].transaction.wx_id,
        );
    }

    #[test]
    fn input_and_output_sids_differ() {
        let coin = Coin {
            symbol: "BEAM".into(),
            is_contract: false,
            contract_id: String::new(),
        };
        assert_ne!(
            gen_record_sid("input", "tx-1", &coin, 0),
            gen_record_sid("output", "tx-1", &coin, 0),
        );
        assert_ne!(
            gen_record_sid("input", "tx-1", &coin, 0),
            gen_record_sid("input", "tx-2", &coin, 0),
        );
    }

    #[test]
    fn anchor_falls_back_to_transaction_fields() {
        let resolver = watch_prefix("w-");
        let tx = tx("w-alice", "x-b", 1000, 10);

        // No caller-side anchor: use the transaction's own height and hash.
        let result = engine().extract_transaction(0, "", &tx, &resolver);
        let set = &result.extract_data["acct-w-alice"][0];
        assert_eq!(set.transaction.block_height, 77);
        assert_eq!(set.transaction.block_hash, "0xblock77");
        assert_eq!(result.block_height, 77);
    }

    #[test]
    fn unrepresentable_scale_marks_failure() {
        let resolver = watch_prefix("w-");
        let tx = tx("w-alice", "x-b", 1000, 10);

        let result = ExtractionEngine::new("BEAM", 40).extract_transaction(
            77,
            "0xblock77",
            &tx,
            &resolver,
        );
        assert!(!result.success);
    }
}
