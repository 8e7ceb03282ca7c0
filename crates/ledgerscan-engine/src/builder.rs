//! Fluent builder API for scanner configuration.
//!
//! # Example
//!
//! ```rust
//! use ledgerscan_engine::ScannerBuilder;
//!
//! let config = ScannerBuilder::new()
//!     .id("beam-main")
//!     .symbol("BEAM")
//!     .decimals(8)
//!     .max_extracting(10)
//!     .rescan_last_block_count(5)
//!     .build_config();
//! ```

use ledgerscan_core::config::ScannerConfig;

/// Fluent builder for [`ScannerConfig`].
#[derive(Default)]
pub struct ScannerBuilder {
    config: ScannerConfig,
}

impl ScannerBuilder {
    pub fn new() -> Self {
        Self {
            config: ScannerConfig::default(),
        }
    }

    /// Set the scanner id (used to scope persisted rows).
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.config.id = id.into();
        self
    }

    /// Set the asset symbol stamped on extracted records.
    pub fn symbol(mut self, symbol: impl Into<String>) -> Self {
        self.config.symbol = symbol.into();
        self
    }

    /// Set the decimal places of the asset's minor unit.
    pub fn decimals(mut self, decimals: u32) -> Self {
        self.config.decimals = decimals;
        self
    }

    /// Set the maximum number of concurrent extraction tasks per block.
    pub fn max_extracting(mut self, max: usize) -> Self {
        self.config.max_extracting = max;
        self
    }

    /// Set how many blocks below the stop height are unconditionally
    /// re-scanned after each cycle.
    pub fn rescan_last_block_count(mut self, count: u64) -> Self {
        self.config.rescan_last_block_count = count;
        self
    }

    /// Build the [`ScannerConfig`].
    pub fn build_config(self) -> ScannerConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let cfg = ScannerBuilder::new().build_config();
        assert_eq!(cfg.id, "default");
        assert_eq!(cfg.max_extracting, 10);
        assert_eq!(cfg.rescan_last_block_count, 0);
    }

    #[test]
    fn builder_custom() {
        let cfg = ScannerBuilder::new()
            .id("beam-main")
            .symbol("BEAM")
            .decimals(8)
            .max_extracting(4)
            .rescan_last_block_count(20)
            .build_config();

        assert_eq!(cfg.id, "beam-main");
        assert_eq!(cfg.symbol, "BEAM");
        assert_eq!(cfg.decimals, 8);
        assert_eq!(cfg.max_extracting, 4);
        assert_eq!(cfg.rescan_last_block_count, 20);
    }
}
