//! ledgerscan-core — foundation for the reorg-safe wallet block scanner.
//!
//! # Architecture
//!
//! ```text
//! ScannerBuilder → BlockScanner (ledgerscan-engine)
//!                      ├── ScanCursor         (persisted scan position)
//!                      ├── ExtractionPipeline (bounded fan-out per block)
//!                      ├── ExtractionEngine   (tx → normalized transfer records)
//!                      ├── Notifier           (observer delivery + retry records)
//!                      └── LedgerClient / LedgerStore (external seams)
//! ```

pub mod client;
pub mod config;
pub mod cursor;
pub mod error;
pub mod extract;
pub mod observer;
pub mod pipeline;
pub mod store;
pub mod types;

pub use client::LedgerClient;
pub use config::{ScannerConfig, ScannerState};
pub use cursor::ScanCursor;
pub use error::ScanError;
pub use extract::{
    AddressResolver, ExtractResult, ExtractionEngine, TransactionSummary, TransferRecord,
    TxExtractData,
};
pub use observer::{BlockScanObserver, Notifier, ObserverRegistry};
pub use pipeline::{ExtractionPipeline, ResultSink, TxExtractor};
pub use store::{LedgerStore, UnscanRecord};
pub use types::{BalanceModel, Block, BlockHeader, Coin, ScanTarget, Transaction};
