//! Replay lifecycle and result types.
//!
//! A replay moves through `Pending → Running → {Completed | Failed}`. The
//! engine never retries internally; callers start a new replay (with a new
//! `AuditId`) to retry.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::drift::DriftDetection;

/// Unique identifier of one replay invocation and of the report built from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditId(pub uuid::Uuid);

impl AuditId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for AuditId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AuditId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "audit-{}", self.0)
    }
}

/// Where a replay is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ReplayStatus {
    /// Whether the lifecycle permits moving from `self` to `next`.
    ///
    /// Terminal states have no successors.
    pub fn can_transition_to(self, next: ReplayStatus) -> bool {
        matches!(
            (self, next),
            (ReplayStatus::Pending, ReplayStatus::Running)
                | (ReplayStatus::Pending, ReplayStatus::Failed)
                | (ReplayStatus::Running, ReplayStatus::Completed)
                | (ReplayStatus::Running, ReplayStatus::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ReplayStatus::Completed | ReplayStatus::Failed)
    }
}

/// How `coverage_percentage` was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageBasis {
    /// Divided by the actual decision count from a decision counter.
    Counted,
    /// No counter was available; coverage is assumed from presence of entries.
    Assumed,
}

/// The outcome of one replay over a time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayResult {
    pub audit_id: AuditId,
    pub status: ReplayStatus,
    /// Inclusive start of the audited window.
    pub window_from: DateTime<Utc>,
    /// Exclusive end of the audited window.
    pub window_to: DateTime<Utc>,
    /// Restricts the replay to one decision function, when set.
    pub function_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub total_entries_checked: usize,
    /// Entries with at least one high or critical finding.
    pub entries_with_drift: usize,
    pub drift_percentage: f64,
    /// False if any chain break lies inside the window.
    pub chain_ok: bool,
    /// Integrity errors found inside the window.
    pub chain_errors: Vec<String>,
    /// Entries whose spec carries fewer than two release signatures.
    pub unsigned_count: usize,
    pub coverage_percentage: f64,
    pub coverage_basis: CoverageBasis,
    /// All findings in ledger order.
    pub detections: Vec<DriftDetection>,
    /// Explanation for empty windows, failures and cancellation.
    pub message: Option<String>,
}

impl ReplayResult {
    /// A freshly created result with zero counts.
    pub fn pending(
        audit_id: AuditId,
        window_from: DateTime<Utc>,
        window_to: DateTime<Utc>,
        function_id: Option<String>,
    ) -> Self {
        Self {
            audit_id,
            status: ReplayStatus::Pending,
            window_from,
            window_to,
            function_id,
            started_at: Utc::now(),
            finished_at: None,
            total_entries_checked: 0,
            entries_with_drift: 0,
            drift_percentage: 0.0,
            chain_ok: true,
            chain_errors: Vec::new(),
            unsigned_count: 0,
            coverage_percentage: 0.0,
            coverage_basis: CoverageBasis::Assumed,
            detections: Vec::new(),
            message: None,
        }
    }
}
