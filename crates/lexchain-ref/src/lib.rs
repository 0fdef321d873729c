//! # lexchain-ref
//!
//! Reference collaborators and a walkthrough for the lexchain ledger and
//! auditor.
//!
//! - [`collaborators`]: an in-memory function store, a fixed decision
//!   counter and a keyed-digest signer.
//! - [`scenarios::benefits_eligibility`]: a housing-benefit rule whose
//!   decisions are recorded, audited, then audited again after the rule is
//!   edited in place.
//!
//! All data is fictional. No external systems are contacted.

pub mod collaborators;
pub mod scenarios;

pub use collaborators::{FixedDecisionCounter, InMemoryFunctionStore, KeyedDigestSigner};

// ── Tests ─────────────────────────────────────────────────────────────────────
