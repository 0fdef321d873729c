//! Configuration schema for the ledger and the auditor.
//!
//! Every section and field has a default, so an empty TOML document is a
//! valid configuration.
//!
//! Example:
//! ```toml
//! [ledger]
//! storage_timeout_ms = 5000
//!
//! [replay]
//! batch_size = 64
//! clock_skew_secs = 300
//! max_execution_lag_secs = 86400
//! valid_from = "2020-01-01T00:00:00Z"
//! min_signatures = 2
//!
//! [coverage]
//! require_counter = false
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ledger persistence settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    /// Upper bound on a single storage call. A call that takes longer is
    /// surfaced to the caller as `StorageTimeout`.
    pub storage_timeout_ms: u64,
}

impl LedgerSettings {
    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            storage_timeout_ms: 5_000,
        }
    }
}

/// Replay and detector settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplaySettings {
    /// Entries processed between cancellation checks.
    pub batch_size: usize,

    /// Tolerated clock skew before a timestamp counts as being in the future.
    pub clock_skew_secs: i64,

    /// Largest tolerated gap between a decision's own clock reading and the
    /// ledger timestamp.
    pub max_execution_lag_secs: i64,

    /// Entries stamped before this instant are anomalous. Must be quoted in
    /// TOML (`valid_from = "2020-01-01T00:00:00Z"`).
    pub valid_from: Option<DateTime<Utc>>,

    /// Release signatures a spec needs to count as signed.
    pub min_signatures: usize,
}

impl Default for ReplaySettings {
    fn default() -> Self {
        Self {
            batch_size: 64,
            clock_skew_secs: 300,
            max_execution_lag_secs: 86_400,
            valid_from: None,
            min_signatures: 2,
        }
    }
}

/// Coverage settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageSettings {
    /// Refuse to build an engine without a decision counter instead of
    /// falling back to assumed coverage.
    pub require_counter: bool,
}

/// The top-level structure deserialized from a TOML configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub ledger: LedgerSettings,
    pub replay: ReplaySettings,
    pub coverage: CoverageSettings,
}
