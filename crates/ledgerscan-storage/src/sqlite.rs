//! SQLite storage backend for LedgerScan.
//!
//! Persists the cursor, accepted blocks, and retry records to a single SQLite
//! file. Uses `sqlx` with WAL mode for concurrent read performance. Rows are
//! scoped by a scanner id so several scanners can share one file.
//!
//! # Usage
//! ```rust,no_run
//! use ledgerscan_storage::sqlite::SqliteLedgerStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteLedgerStore::open("./scan.db", "beam-main").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteLedgerStore::in_memory("beam-main").await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use ledgerscan_core::cursor::ScanCursor;
use ledgerscan_core::error::ScanError;
use ledgerscan_core::store::{LedgerStore, UnscanRecord, REASON_TX_NOT_FOUND};
use ledgerscan_core::types::Block;

/// SQLite-backed ledger store.
pub struct SqliteLedgerStore {
    pool: SqlitePool,
    scanner_id: String,
}

impl SqliteLedgerStore {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./scan.db"`) or a full SQLite URL
    /// (`"sqlite:./scan.db?mode=rwc"`).
    pub async fn open(path: &str, scanner_id: &str) -> Result<Self, ScanError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url)
            .await
            .map_err(|e| ScanError::Storage(e.to_string()))?;

        let store = Self {
            pool,
            scanner_id: scanner_id.to_string(),
        };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory SQLite database.
    ///
    /// All data is lost when the pool is dropped. Ideal for tests. The pool
    /// is pinned to one connection — every `:memory:` connection is its own
    /// database.
    pub async fn in_memory(scanner_id: &str) -> Result<Self, ScanError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| ScanError::Storage(e.to_string()))?;

        let store = Self {
            pool,
            scanner_id: scanner_id.to_string(),
        };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create tables and enable WAL mode.
    async fn init_schema(&self) -> Result<(), ScanError> {
        // WAL mode — better concurrent read throughput
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(|e| ScanError::Storage(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS scan_cursor (
                scanner_id TEXT    NOT NULL PRIMARY KEY,
                height     INTEGER NOT NULL,
                hash       TEXT    NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ScanError::Storage(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS blocks (
                scanner_id TEXT    NOT NULL,
                height     INTEGER NOT NULL,
                hash       TEXT    NOT NULL,
                prev_hash  TEXT    NOT NULL,
                time       INTEGER NOT NULL,
                PRIMARY KEY (scanner_id, height)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ScanError::Storage(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS unscan_records (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                scanner_id   TEXT    NOT NULL,
                block_height INTEGER NOT NULL,
                tx_id        TEXT    NOT NULL,
                reason       TEXT    NOT NULL,
                created_at   INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ScanError::Storage(e.to_string()))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_unscan_height
             ON unscan_records (scanner_id, block_height);",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ScanError::Storage(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn cursor(&self) -> Result<Option<ScanCursor>, ScanError> {
        let row = sqlx::query("SELECT height, hash FROM scan_cursor WHERE scanner_id = ?")
            .bind(&self.scanner_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ScanError::Storage(e.to_string()))?;

        Ok(row.map(|r| ScanCursor {
            height: r.get::<i64, _>("height") as u64,
            hash: r.get("hash"),
        }))
    }

    async fn save_cursor(&self, cursor: &ScanCursor) -> Result<(), ScanError> {
        sqlx::query(
            "INSERT OR REPLACE INTO scan_cursor (scanner_id, height, hash)
             VALUES (?, ?, ?)",
        )
        .bind(&self.scanner_id)
        .bind(cursor.height as i64)
        .bind(&cursor.hash)
        .execute(&self.pool)
        .await
        .map_err(|e| ScanError::Storage(e.to_string()))?;

        debug!(height = cursor.height, hash = %cursor.hash, "cursor saved");
        Ok(())
    }

    async fn save_block(&self, block: &Block) -> Result<(), ScanError> {
        sqlx::query(
            "INSERT OR REPLACE INTO blocks (scanner_id, height, hash, prev_hash, time)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&self.scanner_id)
        .bind(block.height as i64)
        .bind(&block.hash)
        .bind(&block.prev_hash)
        .bind(block.time)
        .execute(&self.pool)
        .await
        .map_err(|e| ScanError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn block(&self, height: u64) -> Result<Option<Block>, ScanError> {
        let row = sqlx::query(
            "SELECT height, hash, prev_hash, time FROM blocks
             WHERE scanner_id = ? AND height = ?",
        )
        .bind(&self.scanner_id)
        .bind(height as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ScanError::Storage(e.to_string()))?;

        Ok(row.map(|r| Block {
            height: r.get::<i64, _>("height") as u64,
            hash: r.get("hash"),
            prev_hash: r.get("prev_hash"),
            time: r.get("time"),
        }))
    }

    async fn save_unscan_record(&self, record: &UnscanRecord) -> Result<(), ScanError> {
        sqlx::query(
            "INSERT INTO unscan_records (scanner_id, block_height, tx_id, reason, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&self.scanner_id)
        .bind(record.block_height as i64)
        .bind(&record.tx_id)
        .bind(&record.reason)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| ScanError::Storage(e.to_string()))?;

        debug!(height = record.block_height, "retry record saved");
        Ok(())
    }

    async fn delete_unscan_records(&self, height: u64) -> Result<(), ScanError> {
        sqlx::query("DELETE FROM unscan_records WHERE scanner_id = ? AND block_height = ?")
            .bind(&self.scanner_id)
            .bind(height as i64)
            .execute(&self.pool)
            .await
            .map_err(|e| ScanError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn unscan_records(&self) -> Result<Vec<UnscanRecord>, ScanError> {
        let rows = sqlx::query(
            "SELECT block_height, tx_id, reason, created_at FROM unscan_records
             WHERE scanner_id = ? ORDER BY block_height, id",
        )
        .bind(&self.scanner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ScanError::Storage(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|r| UnscanRecord {
                block_height: r.get::<i64, _>("block_height") as u64,
                tx_id: r.get("tx_id"),
                reason: r.get("reason"),
                created_at: r.get("created_at"),
            })
            .collect())
    }

    async fn delete_unscan_records_without_tx(&self) -> Result<(), ScanError> {
        sqlx::query("DELETE FROM unscan_records WHERE scanner_id = ? AND reason LIKE ?")
            .bind(&self.scanner_id)
            .bind(format!("%{REASON_TX_NOT_FOUND}%"))
            .execute(&self.pool)
            .await
            .map_err(|e| ScanError::Storage(e.to_string()))?;

        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
