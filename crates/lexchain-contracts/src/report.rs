//! Audit reports for human and public consumption.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    drift::{DriftType, Severity},
    replay::{AuditId, ReplayResult},
};

/// A scored summary of one replay.
///
/// Built once per replay by the report generator and cached by `audit_id`.
/// A report is never updated: a new replay produces a new report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub audit_id: AuditId,
    pub generated_at: DateTime<Utc>,
    /// 0 (non-compliant) to 100 (no findings).
    pub compliance_score: f64,
    /// Deterministic, ordered action items derived from the result.
    pub recommendations: Vec<String>,
    pub detections_by_type: BTreeMap<DriftType, usize>,
    pub detections_by_severity: BTreeMap<Severity, usize>,
    pub result: ReplayResult,
}
