//! Error types shared by every lexchain crate.
//!
//! All fallible operations return `LexchainResult<T>`. Integrity problems
//! (chain breaks, hash mismatches) are NOT errors: they are reported as
//! findings in `IntegrityReport` and `DriftDetection` values. The variants
//! here cover conditions that stop an operation from producing a result.

use thiserror::Error;

/// The unified error type for the lexchain ledger and auditor.
#[derive(Debug, Error)]
pub enum LexchainError {
    /// The ledger storage backend rejected or failed a read or write.
    ///
    /// On append, the ledger tip is left untouched; the caller may retry.
    #[error("storage operation failed: {reason}")]
    StorageFailed { reason: String },

    /// A storage call did not complete within the configured bound.
    #[error("storage operation '{operation}' timed out after {timeout_ms} ms")]
    StorageTimeout { operation: String, timeout_ms: u64 },

    /// A payload could not be brought into canonical form for hashing.
    #[error("canonicalization failed: {reason}")]
    Canonicalization { reason: String },

    /// The injected signer could not produce a signature.
    #[error("signing failed: {reason}")]
    Signing { reason: String },

    /// The function/spec store could not be queried.
    #[error("function store error: {reason}")]
    SpecStore { reason: String },

    /// The decision counter could not be queried.
    #[error("decision counter error: {reason}")]
    DecisionCounter { reason: String },

    /// A persisted ledger record could not be decoded.
    #[error("ledger record is corrupt: {reason}")]
    LedgerCorrupt { reason: String },

    /// An internal lock was poisoned by a panicking thread.
    #[error("ledger state unavailable: {reason}")]
    LockPoisoned { reason: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },
}

/// Convenience alias used throughout the lexchain crates.
pub type LexchainResult<T> = Result<T, LexchainError>;
