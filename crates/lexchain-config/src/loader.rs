//! TOML configuration loading and validation.
//!
//! `AuditConfig` is read from a TOML string or file and validated before it
//! is handed to the ledger or the replay engine. Parsing and validation
//! failures both surface as `LexchainError::ConfigError`.

use std::path::Path;

use tracing::debug;

use lexchain_contracts::error::{LexchainError, LexchainResult};

use crate::settings::AuditConfig;

/// Largest accepted clock skew or execution lag: 100 years.
pub const MAX_TOLERANCE_SECS: i64 = 100 * 366 * 24 * 60 * 60;

impl AuditConfig {
    /// Parse `s` as TOML and validate the result.
    ///
    /// Returns `LexchainError::ConfigError` if the TOML is malformed, does
    /// not match the `AuditConfig` schema, or holds out-of-range values.
    pub fn from_toml_str(s: &str) -> LexchainResult<Self> {
        let config: AuditConfig = toml::from_str(s).map_err(|e| LexchainError::ConfigError {
            reason: format!("failed to parse audit config TOML: {}", e),
        })?;
        config.validate()?;
        debug!(
            storage_timeout_ms = config.ledger.storage_timeout_ms,
            batch_size = config.replay.batch_size,
            min_signatures = config.replay.min_signatures,
            "audit config loaded"
        );
        Ok(config)
    }

    /// Read the file at `path` and parse it as TOML audit configuration.
    pub fn from_file(path: &Path) -> LexchainResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| LexchainError::ConfigError {
            reason: format!("failed to read config file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Reject values no component can operate with.
    pub fn validate(&self) -> LexchainResult<()> {
        if self.ledger.storage_timeout_ms == 0 {
            return Err(config_error("ledger.storage_timeout_ms must be greater than 0"));
        }
        if self.replay.batch_size == 0 {
            return Err(config_error("replay.batch_size must be at least 1"));
        }
        if self.replay.min_signatures == 0 {
            return Err(config_error("replay.min_signatures must be at least 1"));
        }
        if !(0..=MAX_TOLERANCE_SECS).contains(&self.replay.clock_skew_secs) {
            return Err(config_error(
                "replay.clock_skew_secs must be between 0 and 100 years",
            ));
        }
        if !(0..=MAX_TOLERANCE_SECS).contains(&self.replay.max_execution_lag_secs) {
            return Err(config_error(
                "replay.max_execution_lag_secs must be between 0 and 100 years",
            ));
        }
        Ok(())
    }
}

fn config_error(reason: &str) -> LexchainError {
    LexchainError::ConfigError {
        reason: reason.to_string(),
    }
}
