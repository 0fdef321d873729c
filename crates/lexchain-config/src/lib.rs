//! # lexchain-config
//!
//! TOML-driven configuration for the lexchain ledger and auditor.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::path::Path;
//! use lexchain_config::AuditConfig;
//!
//! let config = AuditConfig::from_file(Path::new("lexchain.toml"))?;
//! // Pass `config.ledger` to the ledger and `config` to the replay engine.
//! ```
//!
//! Every field has a default; omitted sections fall back to them.

pub mod loader;
pub mod settings;

pub use loader::MAX_TOLERANCE_SECS;
pub use settings::{AuditConfig, CoverageSettings, LedgerSettings, ReplaySettings};

// ── Tests ─────────────────────────────────────────────────────────────────────
