//! Drift findings produced during audit replay.
//!
//! A `DriftDetection` describes one divergence between a historical ledger
//! entry and current source-of-truth state. Findings exist only in replay
//! results and reports; they are never written back into the ledger.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entry::EntryId;

/// The category of a drift finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftType {
    HashMismatch,
    ChainBreak,
    SignatureInvalid,
    LegalReferenceInvalid,
    LogicInvariantViolation,
    TimestampAnomaly,
}

impl DriftType {
    pub fn as_str(self) -> &'static str {
        match self {
            DriftType::HashMismatch => "hash_mismatch",
            DriftType::ChainBreak => "chain_break",
            DriftType::SignatureInvalid => "signature_invalid",
            DriftType::LegalReferenceInvalid => "legal_reference_invalid",
            DriftType::LogicInvariantViolation => "logic_invariant_violation",
            DriftType::TimestampAnomaly => "timestamp_anomaly",
        }
    }

    /// Findings of these types describe a spec version rather than a single
    /// entry, and are reported once per version within a replay.
    pub fn is_function_scoped(self) -> bool {
        matches!(
            self,
            DriftType::HashMismatch
                | DriftType::SignatureInvalid
                | DriftType::LegalReferenceInvalid
        )
    }
}

impl fmt::Display for DriftType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How serious a finding is. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// High and critical findings represent material risk and count an entry
    /// as drifted. Low and medium findings are recorded only.
    pub fn is_material(self) -> bool {
        self >= Severity::High
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One drift finding against one ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftDetection {
    /// The ledger entry the finding is attached to.
    pub trace_id: EntryId,
    pub function_id: String,
    pub version: String,
    pub drift_type: DriftType,
    pub severity: Severity,
    pub description: String,
    pub detected_at: DateTime<Utc>,
    #[serde(default)]
    pub expected_value: Option<String>,
    #[serde(default)]
    pub actual_value: Option<String>,
    #[serde(default)]
    pub remediation_suggestion: Option<String>,
}

impl DriftDetection {
    pub fn new(
        trace_id: EntryId,
        function_id: impl Into<String>,
        version: impl Into<String>,
        drift_type: DriftType,
        severity: Severity,
        description: impl Into<String>,
        detected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            trace_id,
            function_id: function_id.into(),
            version: version.into(),
            drift_type,
            severity,
            description: description.into(),
            detected_at,
            expected_value: None,
            actual_value: None,
            remediation_suggestion: None,
        }
    }

    /// Attach the expected (source-of-truth) and actual (recorded) values.
    pub fn with_values(mut self, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        self.expected_value = Some(expected.into());
        self.actual_value = Some(actual.into());
        self
    }

    pub fn with_remediation(mut self, suggestion: impl Into<String>) -> Self {
        self.remediation_suggestion = Some(suggestion.into());
        self
    }
}
