//! Compliance scoring and report rendering.
//!
//! Scoring deductions, applied to a starting score of 100:
//!
//! | Condition                    | Deduction                    |
//! |------------------------------|------------------------------|
//! | material drift               | `min(drift% × 10, 50)`       |
//! | chain broken in window       | `20`                         |
//! | unsigned specs               | `min(unsigned × 5, 30)`      |
//! | coverage below 95%           | `(95 − coverage%) × 2`       |
//!
//! The result is clamped to `[0, 100]`. A failed replay scores 0.

use std::{collections::BTreeMap, fmt::Write as _};

use chrono::Utc;

use lexchain_contracts::{
    drift::{DriftType, Severity},
    replay::{CoverageBasis, ReplayResult, ReplayStatus},
    report::AuditReport,
};

const MAX_DRIFT_DEDUCTION: f64 = 50.0;
const CHAIN_BREAK_DEDUCTION: f64 = 20.0;
const UNSIGNED_DEDUCTION_EACH: f64 = 5.0;
const MAX_UNSIGNED_DEDUCTION: f64 = 30.0;
const COVERAGE_TARGET: f64 = 95.0;

/// Builds `AuditReport`s from replay results.
///
/// Stateless: the same result always yields the same score and the same
/// recommendations.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportGenerator;

impl ReportGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn build_report(&self, result: &ReplayResult) -> AuditReport {
        let mut detections_by_type: BTreeMap<DriftType, usize> = BTreeMap::new();
        let mut detections_by_severity: BTreeMap<Severity, usize> = BTreeMap::new();
        for detection in &result.detections {
            *detections_by_type.entry(detection.drift_type).or_default() += 1;
            *detections_by_severity.entry(detection.severity).or_default() += 1;
        }

        AuditReport {
            audit_id: result.audit_id,
            generated_at: Utc::now(),
            compliance_score: compliance_score(result),
            recommendations: recommendations(result, &detections_by_type),
            detections_by_type,
            detections_by_severity,
            result: result.clone(),
        }
    }

    /// Plain-text rendering for human and public consumption.
    pub fn render_text(&self, report: &AuditReport) -> String {
        let r = &report.result;
        let mut out = String::new();

        let _ = writeln!(out, "Audit report {}", report.audit_id);
        let _ = writeln!(out, "Generated:       {}", report.generated_at.to_rfc3339());
        let _ = writeln!(
            out,
            "Window:          {} .. {}",
            r.window_from.to_rfc3339(),
            r.window_to.to_rfc3339()
        );
        if let Some(function_id) = &r.function_id {
            let _ = writeln!(out, "Function:        {function_id}");
        }
        let _ = writeln!(out, "Status:          {}", status_label(r.status));
        let _ = writeln!(out, "Compliance:      {:.1} / 100", report.compliance_score);
        let _ = writeln!(
            out,
            "Entries:         {} checked, {} with material drift ({:.2}%)",
            r.total_entries_checked, r.entries_with_drift, r.drift_percentage
        );
        let _ = writeln!(
            out,
            "Chain:           {}",
            if r.chain_ok { "intact" } else { "BROKEN" }
        );
        let _ = writeln!(out, "Unsigned:        {}", r.unsigned_count);
        let _ = writeln!(
            out,
            "Coverage:        {:.1}% ({})",
            r.coverage_percentage,
            match r.coverage_basis {
                CoverageBasis::Counted => "counted",
                CoverageBasis::Assumed => "assumed",
            }
        );
        if let Some(message) = &r.message {
            let _ = writeln!(out, "Note:            {message}");
        }

        if !report.detections_by_severity.is_empty() {
            let _ = writeln!(out, "\nFindings by severity:");
            for (severity, count) in report.detections_by_severity.iter().rev() {
                let _ = writeln!(out, "  {:<10} {}", severity.as_str(), count);
            }
            let _ = writeln!(out, "\nFindings:");
            for d in &r.detections {
                let _ = writeln!(
                    out,
                    "  [{}] {} {}@{} {}: {}",
                    d.severity, d.trace_id, d.function_id, d.version, d.drift_type, d.description
                );
            }
        }

        if !r.chain_errors.is_empty() {
            let _ = writeln!(out, "\nIntegrity errors:");
            for error in &r.chain_errors {
                let _ = writeln!(out, "  {error}");
            }
        }

        let _ = writeln!(out, "\nRecommendations:");
        for (i, line) in report.recommendations.iter().enumerate() {
            let _ = writeln!(out, "  {}. {}", i + 1, line);
        }
        out
    }
}

/// Compliance score for a replay result, in `[0, 100]`.
pub fn compliance_score(result: &ReplayResult) -> f64 {
    if result.status == ReplayStatus::Failed {
        return 0.0;
    }

    let mut score = 100.0;
    score -= (result.drift_percentage * 10.0).min(MAX_DRIFT_DEDUCTION);
    if !result.chain_ok {
        score -= CHAIN_BREAK_DEDUCTION;
    }
    score -= (result.unsigned_count as f64 * UNSIGNED_DEDUCTION_EACH).min(MAX_UNSIGNED_DEDUCTION);
    if result.coverage_percentage < COVERAGE_TARGET {
        score -= (COVERAGE_TARGET - result.coverage_percentage) * 2.0;
    }
    score.clamp(0.0, 100.0)
}

fn recommendations(result: &ReplayResult, by_type: &BTreeMap<DriftType, usize>) -> Vec<String> {
    if result.status == ReplayStatus::Failed {
        return vec![format!(
            "Replay did not complete ({}); resolve the cause and run a new audit.",
            result.message.as_deref().unwrap_or("no reason recorded")
        )];
    }

    let mut lines = Vec::new();

    if result.drift_percentage > 1.0 {
        lines.push(format!(
            "CRITICAL: {:.2}% of audited decisions show material drift; suspend the affected \
             functions and re-validate them against their current specifications.",
            result.drift_percentage
        ));
    } else if result.drift_percentage > 0.0 {
        lines.push(format!(
            "Review the {:.2}% of audited decisions with material drift before the next release.",
            result.drift_percentage
        ));
    }

    if !result.chain_ok {
        lines.push(format!(
            "Investigate possible ledger tampering: {} integrity error(s) inside the audited period.",
            result.chain_errors.len()
        ));
    }

    if result.unsigned_count > 0 {
        lines.push(format!(
            "Obtain owner and reviewer signatures for the specifications behind {} unsigned decision(s).",
            result.unsigned_count
        ));
    }

    if result.coverage_percentage < COVERAGE_TARGET {
        lines.push(format!(
            "Coverage is {:.1}%, below the {COVERAGE_TARGET}% target; reconcile the ledger against \
             the decision source to find unrecorded decisions.",
            result.coverage_percentage
        ));
    }

    if result.coverage_basis == CoverageBasis::Assumed {
        lines.push(
            "Coverage was assumed rather than counted; configure a decision counter for an \
             accurate figure."
                .to_string(),
        );
    }

    for (drift_type, count) in by_type {
        lines.push(format!("{count} {drift_type} finding(s): {}", remedy(*drift_type)));
    }

    if lines.is_empty() {
        lines.push("No action required: no findings in the audited period.".to_string());
    }
    lines
}

fn remedy(drift_type: DriftType) -> &'static str {
    match drift_type {
        DriftType::HashMismatch => {
            "confirm which specification version produced these decisions and re-register it"
        }
        DriftType::ChainBreak => "restore the affected records from a trusted backup",
        DriftType::SignatureInvalid => "collect the missing release signatures",
        DriftType::LegalReferenceInvalid => {
            "update the legal basis to a current, well-formed ELI or CELEX reference"
        }
        DriftType::LogicInvariantViolation => {
            "re-evaluate the affected decisions against the declared invariants"
        }
        DriftType::TimestampAnomaly => "check the clocks of the executing hosts",
    }
}

fn status_label(status: ReplayStatus) -> &'static str {
    match status {
        ReplayStatus::Pending => "pending",
        ReplayStatus::Running => "running",
        ReplayStatus::Completed => "completed",
        ReplayStatus::Failed => "failed",
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use lexchain_contracts::{
        drift::DriftDetection,
        entry::EntryId,
        replay::AuditId,
    };

    use super::*;

    fn completed() -> ReplayResult {
        let now = Utc::now();
        let mut result = ReplayResult::pending(AuditId::new(), now, now, None);
        result.status = ReplayStatus::Completed;
        result.total_entries_checked = 100;
        result.coverage_percentage = 100.0;
        result.coverage_basis = CoverageBasis::Counted;
        result
    }

    #[test]
    fn clean_result_scores_full_and_needs_no_action() {
        let report = ReportGenerator::new().build_report(&completed());
        assert_eq!(report.compliance_score, 100.0);
        assert_eq!(report.recommendations.len(), 1);
        assert!(report.recommendations[0].starts_with("No action required"));
    }

    #[test]
    fn deductions_add_up() {
        let mut result = completed();
        result.drift_percentage = 2.0;
        result.chain_ok = false;
        result.unsigned_count = 2;
        result.coverage_percentage = 90.0;
        // 100 - 20 - 20 - 10 - 10
        assert_eq!(compliance_score(&result), 40.0);
    }

    #[test]
    fn deductions_are_capped_and_score_floored() {
        let mut result = completed();
        result.drift_percentage = 100.0;
        result.unsigned_count = 100;
        assert_eq!(compliance_score(&result), 20.0);

        result.chain_ok = false;
        result.coverage_percentage = 0.0;
        assert_eq!(compliance_score(&result), 0.0);
    }

    #[test]
    fn failed_result_scores_zero() {
        let mut result = completed();
        result.status = ReplayStatus::Failed;
        result.message = Some("ledger offline".to_string());
        let report = ReportGenerator::new().build_report(&result);
        assert_eq!(report.compliance_score, 0.0);
        assert_eq!(report.recommendations.len(), 1);
        assert!(report.recommendations[0].contains("ledger offline"));
    }

    #[test]
    fn recommendations_follow_thresholds_in_fixed_order() {
        let mut result = completed();
        result.drift_percentage = 3.0;
        result.chain_ok = false;
        result.chain_errors = vec!["tr-000000000002: hash mismatch".to_string()];
        result.unsigned_count = 1;
        result.coverage_percentage = 80.0;
        result.coverage_basis = CoverageBasis::Assumed;
        result.detections = vec![
            DriftDetection::new(
                EntryId::new(2),
                "f",
                "v1",
                DriftType::TimestampAnomaly,
                Severity::Low,
                "late",
                Utc::now(),
            ),
            DriftDetection::new(
                EntryId::new(1),
                "f",
                "v1",
                DriftType::HashMismatch,
                Severity::Critical,
                "changed",
                Utc::now(),
            ),
        ];

        let generator = ReportGenerator::new();
        let report = generator.build_report(&result);
        let lines = &report.recommendations;

        assert!(lines[0].starts_with("CRITICAL"));
        assert!(lines[1].starts_with("Investigate possible ledger tampering"));
        assert!(lines[2].contains("1 unsigned"));
        assert!(lines[3].starts_with("Coverage is 80.0%"));
        assert!(lines[4].starts_with("Coverage was assumed"));
        assert!(lines[5].starts_with("1 hash_mismatch"));
        assert!(lines[6].starts_with("1 timestamp_anomaly"));
        assert_eq!(lines.len(), 7);

        assert_eq!(report.detections_by_type[&DriftType::HashMismatch], 1);
        assert_eq!(report.detections_by_severity[&Severity::Low], 1);

        let again = generator.build_report(&result);
        assert_eq!(again.recommendations, report.recommendations);
    }

    #[test]
    fn small_drift_gets_review_line() {
        let mut result = completed();
        result.drift_percentage = 0.5;
        let report = ReportGenerator::new().build_report(&result);
        assert!(report.recommendations[0].starts_with("Review the 0.50%"));
        assert!(!report.recommendations.iter().any(|l| l.starts_with("CRITICAL")));
    }

    #[test]
    fn render_text_contains_key_figures() {
        let mut result = completed();
        result.chain_ok = false;
        result.chain_errors = vec!["tr-000000000007: chain break".to_string()];
        let generator = ReportGenerator::new();
        let text = generator.render_text(&generator.build_report(&result));

        assert!(text.contains("Compliance:      80.0 / 100"));
        assert!(text.contains("Chain:           BROKEN"));
        assert!(text.contains("tr-000000000007: chain break"));
        assert!(text.contains("Recommendations:"));
    }
}
