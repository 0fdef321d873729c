//! # lexchain-core
//!
//! The audit side of lexchain.
//!
//! This crate provides:
//! - The collaborator traits (`LedgerStorage`, `LedgerReader`, `Signer`,
//!   `FunctionStore`, `DecisionCounter`, `LegalReferenceValidator`,
//!   `DriftDetector`)
//! - The `AuditReplayEngine` that replays ledger windows through the detectors
//! - The `ReportGenerator` that scores replay results
//!
//! ## Usage
//!
//! ```rust,ignore
//! use lexchain_core::{AuditReplayEngine, CancelToken};
//!
//! let engine = AuditReplayEngine::new(ledger, functions, detectors, counter, &config)?;
//! let result = engine.replay(from, to, None);
//! let report = engine.report(result.audit_id);
//! ```

pub mod replay;
pub mod report;
pub mod traits;

pub use replay::{AuditReplayEngine, CancelToken};
pub use report::{compliance_score, ReportGenerator};
