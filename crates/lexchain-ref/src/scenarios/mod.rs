//! Reference walkthroughs.
//!
//! Each walkthrough wires the real ledger, replay engine and detectors to
//! the in-memory collaborators and fictional data.

pub mod benefits_eligibility;
