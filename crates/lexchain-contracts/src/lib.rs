//! # lexchain-contracts
//!
//! Shared types for the lexchain decision ledger and auditor.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate, only data definitions and error types.

pub mod drift;
pub mod entry;
pub mod error;
pub mod function;
pub mod replay;
pub mod report;
