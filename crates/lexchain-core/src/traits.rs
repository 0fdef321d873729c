//! Collaborator traits for the lexchain ledger and auditor.
//!
//! These traits are the seams between the core and everything it consumes:
//!
//! - `LedgerStorage`           — durable entry persistence (owned by the ledger),
//!   committing through a `CommitGate`
//! - `LedgerReader`            — read side of the ledger used by the auditor
//! - `Signer`                  — injected signing capability over entry hashes
//! - `FunctionStore`           — current decision-function specifications
//! - `DecisionCounter`         — actual decision counts, for coverage
//! - `LegalReferenceValidator` — ELI/CELEX well-formedness and liveness
//! - `DriftDetector`           — one independent replay check
//!
//! The replay engine wires them together. Nothing in the engine writes to
//! the ledger.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use lexchain_contracts::{
    drift::{DriftDetection, DriftType, Severity},
    entry::{DecisionExecution, IntegrityReport, TraceEntry},
    error::{LexchainError, LexchainResult},
    function::{FunctionSpec, LegalReference},
};

/// Durable storage for ledger entries, one record per entry keyed by id.
///
/// Implementations must make `write_entry` durable before returning `Ok`,
/// and must perform the step that makes the record visible to `load_all`
/// inside `gate.commit`. Writing an id that already exists replaces the
/// record: the ledger only does this when retrying an append that
/// previously failed or timed out.
pub trait LedgerStorage: Send + Sync {
    fn write_entry(&self, entry: &TraceEntry, gate: &CommitGate) -> LexchainResult<()>;

    /// Load every persisted entry, in no particular order.
    fn load_all(&self) -> LexchainResult<Vec<TraceEntry>>;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum GateState {
    #[default]
    Open,
    Committed,
    Abandoned,
}

/// Shared between the caller of a storage write and the code performing it.
///
/// The backend runs its final durable step through `commit`; a caller that
/// stops waiting calls `abandon`. Exactly one side wins: either the record
/// commits and `abandon` returns `false`, or the write is abandoned and the
/// commit never runs. Clones share the same state.
#[derive(Debug, Default, Clone)]
pub struct CommitGate {
    state: Arc<Mutex<GateState>>,
}

impl CommitGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `apply` unless the write has been abandoned.
    ///
    /// Returns `StorageFailed` without calling `apply` when abandoned.
    pub fn commit(&self, apply: impl FnOnce() -> LexchainResult<()>) -> LexchainResult<()> {
        let mut state = self.lock();
        if *state == GateState::Abandoned {
            return Err(LexchainError::StorageFailed {
                reason: "write abandoned by its caller before commit".to_string(),
            });
        }
        apply()?;
        *state = GateState::Committed;
        Ok(())
    }

    /// Give up on the write. Returns `false` if it has already committed.
    ///
    /// Blocks while a commit is in progress.
    pub fn abandon(&self) -> bool {
        let mut state = self.lock();
        if *state == GateState::Committed {
            return false;
        }
        *state = GateState::Abandoned;
        true
    }

    pub fn is_abandoned(&self) -> bool {
        *self.lock() == GateState::Abandoned
    }

    // The state is a plain enum, so a poisoned guard still holds a valid value.
    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A decision entry in an audit window, paired with its ledger predecessor.
#[derive(Debug, Clone)]
pub struct WindowEntry {
    pub entry: TraceEntry,
    /// The entry appended immediately before, of any type; `None` for the
    /// first entry of the ledger.
    pub predecessor: Option<TraceEntry>,
}

/// The read-only view of a ledger the auditor depends on.
///
/// All methods return snapshots of durable entries in append order.
pub trait LedgerReader: Send + Sync {
    /// `decision_execution` entries with `from <= timestamp < to`, optionally
    /// restricted to one function, each with its predecessor. Taken from a
    /// single snapshot of the ledger.
    fn decisions_in_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        function_id: Option<&str>,
    ) -> LexchainResult<Vec<WindowEntry>>;

    /// Integrity walk over entries with `from <= timestamp < to`.
    fn verify_range(&self, from: DateTime<Utc>, to: DateTime<Utc>)
        -> LexchainResult<IntegrityReport>;
}

/// An injected signing capability.
///
/// lexchain never assumes anything about the signing scheme: the signer
/// receives the hex entry hash and returns an opaque signature string.
pub trait Signer: Send + Sync {
    fn sign(&self, hash: &str) -> LexchainResult<String>;

    fn verify(&self, hash: &str, signature: &str) -> bool;
}

/// The source of truth for decision-function specifications.
pub trait FunctionStore: Send + Sync {
    /// Return the current spec, `Ok(None)` when the version is unknown, or
    /// `Err` when the store itself cannot be reached.
    fn get_spec(&self, function_id: &str, version: &str) -> LexchainResult<Option<FunctionSpec>>;
}

/// Counts the decisions actually made, independently of the ledger.
pub trait DecisionCounter: Send + Sync {
    fn count_decisions(
        &self,
        function_id: Option<&str>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> LexchainResult<u64>;
}

/// Result of checking a legal reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceStatus {
    Valid,
    /// The URI does not follow the authority's grammar.
    Malformed(String),
    /// The URI is well-formed but no longer resolves (repealed, moved).
    Dead(String),
}

/// Checks that a legal reference is well-formed and live.
pub trait LegalReferenceValidator: Send + Sync {
    fn check(&self, reference: &LegalReference) -> ReferenceStatus;
}

/// Outcome of looking up the spec for an entry during replay.
#[derive(Debug, Clone)]
pub enum SpecLookup {
    Found(FunctionSpec),
    NotFound,
    /// The function store returned an error.
    Unavailable(String),
}

impl SpecLookup {
    pub fn spec(&self) -> Option<&FunctionSpec> {
        match self {
            SpecLookup::Found(spec) => Some(spec),
            _ => None,
        }
    }
}

/// Everything a detector may look at for one decision entry.
pub struct DetectionContext<'a> {
    pub entry: &'a TraceEntry,
    pub decision: &'a DecisionExecution,
    /// The ledger predecessor of `entry`, `None` for the first entry.
    pub predecessor: Option<&'a TraceEntry>,
    pub spec: &'a SpecLookup,
    /// The instant the replay evaluates "now" as.
    pub now: DateTime<Utc>,
}

impl DetectionContext<'_> {
    /// Start a finding attached to this context's entry and function.
    pub fn finding(
        &self,
        drift_type: DriftType,
        severity: Severity,
        description: impl Into<String>,
    ) -> DriftDetection {
        DriftDetection::new(
            self.entry.entry_id(),
            self.decision.function_id.clone(),
            self.decision.version.clone(),
            drift_type,
            severity,
            description,
            self.now,
        )
    }
}

/// A single, independent replay check.
///
/// Detectors are pure over their context: they perform no I/O of their own
/// beyond injected validators, and return at most one finding.
pub trait DriftDetector: Send + Sync {
    /// Short stable name used in logs.
    fn name(&self) -> &'static str;

    fn detect(&self, ctx: &DetectionContext<'_>) -> Option<DriftDetection>;
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            mpsc,
        },
        thread,
        time::Duration,
    };

    use super::*;

    #[test]
    fn test_gate_commit_then_abandon_reports_committed() {
        let gate = CommitGate::new();
        gate.commit(|| Ok(())).unwrap();
        assert!(!gate.abandon());
        assert!(!gate.is_abandoned());
    }

    #[test]
    fn test_abandoned_gate_skips_commit() {
        let gate = CommitGate::new();
        assert!(gate.abandon());

        let ran = AtomicBool::new(false);
        let result = gate.commit(|| {
            ran.store(true, Ordering::SeqCst);
            Ok(())
        });
        assert!(matches!(result, Err(LexchainError::StorageFailed { .. })));
        assert!(!ran.load(Ordering::SeqCst));
        assert!(gate.is_abandoned());
    }

    #[test]
    fn test_failed_commit_can_still_be_abandoned() {
        let gate = CommitGate::new();
        let result = gate.commit(|| {
            Err(LexchainError::StorageFailed {
                reason: "disk full".to_string(),
            })
        });
        assert!(result.is_err());
        assert!(gate.abandon());
    }

    #[test]
    fn test_abandon_waits_for_commit_in_progress() {
        let gate = CommitGate::new();
        let worker_gate = gate.clone();
        let (started, wait_started) = mpsc::channel();

        let worker = thread::spawn(move || {
            worker_gate.commit(|| {
                started.send(()).unwrap();
                thread::sleep(Duration::from_millis(50));
                Ok(())
            })
        });

        wait_started.recv().unwrap();
        assert!(!gate.abandon(), "commit in progress must win");
        worker.join().unwrap().unwrap();
    }
}
