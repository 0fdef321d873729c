//! # lexchain-ledger
//!
//! Immutable, append-only, SHA-256 hash-chained ledger of every decision a
//! rules-evaluation platform makes.
//!
//! ## Overview
//!
//! Every entry links to its predecessor through `previous_hash`, and its own
//! `hash` commits to the canonical (JCS) encoding of its payload plus that
//! link. Changing any stored payload breaks the hash of that entry, which
//! `verify_integrity` reports without stopping the walk.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use lexchain_ledger::{FileStorage, TraceLedger};
//!
//! let storage = Arc::new(FileStorage::open("/var/lib/lexchain")?);
//! let ledger = TraceLedger::open(storage, None)?;
//! let entry = ledger.append(payload)?;
//! assert!(ledger.verify_integrity()?.valid);
//! ```

pub mod chain;
pub mod ledger;
pub mod storage;

pub use chain::{content_digest, digest, verify_chain, CanonicalBytes};
pub use ledger::TraceLedger;
pub use storage::{FileStorage, MemoryStorage, TimedStorage};

// ── Tests ─────────────────────────────────────────────────────────────────────


#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use lexchain_contracts::entry::{EntryPayload, SecurityEvent};

    use super::TraceLedger;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// An unmodified ledger verifies for any number of entries.
        #[test]
        fn untouched_ledger_always_verifies(details in prop::collection::vec("[a-z ]{0,16}", 0..24)) {
            let ledger = TraceLedger::in_memory();
            for detail in &details {
                ledger.append(EntryPayload::SecurityEvent(SecurityEvent {
                    category: "login".to_string(),
                    detail: detail.clone(),
                    actor: None,
                })).unwrap();
            }
            let report = ledger.verify_integrity().unwrap();
            prop_assert!(report.valid);
            prop_assert!(report.errors.is_empty());
            prop_assert_eq!(report.checked_count, details.len());
        }
    }
}
