//! Scanner configuration and state types.

use serde::{Deserialize, Serialize};

/// Configuration for a block scanner instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Unique name for this scanner (used to scope persisted rows).
    pub id: String,
    /// Asset symbol stamped on extracted records.
    pub symbol: String,
    /// Decimal places of the asset's minor unit.
    pub decimals: u32,
    /// Maximum number of concurrent extraction tasks per block.
    pub max_extracting: usize,
    /// How many blocks below the stop height to unconditionally re-scan after
    /// each cycle (defends against eventually-consistent remote state).
    pub rescan_last_block_count: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            id: "default".into(),
            symbol: "COIN".into(),
            decimals: 8,
            max_extracting: 10,
            rescan_last_block_count: 0,
        }
    }
}

/// Runtime state of the scan loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScannerState {
    /// Walking the chain forward block by block.
    Advancing,
    /// Unwinding and re-anchoring after a fork.
    ForkRecovering,
    /// Caught up with the chain tip; waiting for the next invocation.
    IdleAtTip,
}

impl std::fmt::Display for ScannerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Advancing => write!(f, "advancing"),
            Self::ForkRecovering => write!(f, "fork-recovering"),
            Self::IdleAtTip => write!(f, "idle-at-tip"),
        }
    }
}
