//! The six standard drift detectors.
//!
//! | Detector              | Finding                      | Severity             |
//! |-----------------------|------------------------------|----------------------|
//! | `HashCheck`           | `hash_mismatch`              | critical / high      |
//! | `ChainCheck`          | `chain_break`                | critical             |
//! | `SignatureCheck`      | `signature_invalid`          | high                 |
//! | `LegalReferenceCheck` | `legal_reference_invalid`    | critical / high      |
//! | `InvariantCheck`      | `logic_invariant_violation`  | medium               |
//! | `TimestampCheck`      | `timestamp_anomaly`          | medium / low         |
//!
//! Only `HashCheck` reports on a missing or unreachable spec; the
//! spec-dependent checks stay silent in that case.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use lexchain_config::ReplaySettings;
use lexchain_contracts::{
    drift::{DriftDetection, DriftType, Severity},
    entry::GENESIS_HASH,
    function::SignerRole,
};
use lexchain_core::traits::{
    DetectionContext, DriftDetector, LegalReferenceValidator, ReferenceStatus, SpecLookup,
};
use lexchain_ledger::chain::recompute;

use crate::invariant::InvariantEvaluator;

/// Build the full detector set in its standard order.
pub fn standard_detectors(
    settings: &ReplaySettings,
    references: Arc<dyn LegalReferenceValidator>,
    invariants: InvariantEvaluator,
) -> Vec<Box<dyn DriftDetector>> {
    vec![
        Box::new(HashCheck),
        Box::new(ChainCheck),
        Box::new(SignatureCheck::new(settings.min_signatures)),
        Box::new(LegalReferenceCheck::new(references)),
        Box::new(InvariantCheck::new(invariants)),
        Box::new(TimestampCheck::new(settings)),
    ]
}

// ── HashCheck ─────────────────────────────────────────────────────────────────

/// Compares the spec hash recorded at execution time with the current one.
pub struct HashCheck;

impl DriftDetector for HashCheck {
    fn name(&self) -> &'static str {
        "hash"
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Option<DriftDetection> {
        let recorded = &ctx.decision.spec_hash;
        match ctx.spec {
            SpecLookup::Found(spec) if spec.hash == *recorded => None,
            SpecLookup::Found(spec) => Some(
                ctx.finding(
                    DriftType::HashMismatch,
                    Severity::Critical,
                    format!(
                        "{}@{} changed after this decision was made",
                        spec.function_id, spec.version
                    ),
                )
                .with_values(spec.hash.clone(), recorded.clone())
                .with_remediation(
                    "Re-register the version that produced these decisions or re-run them \
                     under the current specification.",
                ),
            ),
            SpecLookup::NotFound => Some(
                ctx.finding(
                    DriftType::HashMismatch,
                    Severity::Critical,
                    "function spec not found",
                )
                .with_values("<no spec>", recorded.clone())
                .with_remediation("Restore the specification to the function store."),
            ),
            SpecLookup::Unavailable(reason) => Some(ctx.finding(
                DriftType::HashMismatch,
                Severity::High,
                format!("function store unavailable: {reason}"),
            )),
        }
    }
}

// ── ChainCheck ────────────────────────────────────────────────────────────────

/// Re-checks the entry's link to its predecessor and its own hash.
pub struct ChainCheck;

impl DriftDetector for ChainCheck {
    fn name(&self) -> &'static str {
        "chain"
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Option<DriftDetection> {
        let entry = ctx.entry;
        let expected_prev = ctx.predecessor.map_or(GENESIS_HASH, |p| p.hash());

        if entry.previous_hash() != expected_prev {
            return Some(
                ctx.finding(
                    DriftType::ChainBreak,
                    Severity::Critical,
                    "entry does not link to its ledger predecessor",
                )
                .with_values(expected_prev, entry.previous_hash()),
            );
        }

        match recompute(entry) {
            Ok(hash) if hash == entry.hash() => None,
            Ok(hash) => Some(
                ctx.finding(
                    DriftType::ChainBreak,
                    Severity::Critical,
                    "stored hash does not match the recorded payload",
                )
                .with_values(hash, entry.hash()),
            ),
            Err(e) => Some(ctx.finding(
                DriftType::ChainBreak,
                Severity::Critical,
                format!("recorded payload cannot be re-hashed: {e}"),
            )),
        }
    }
}

// ── SignatureCheck ────────────────────────────────────────────────────────────

/// Requires enough release signatures, including an owner and a reviewer.
pub struct SignatureCheck {
    min_signatures: usize,
}

impl SignatureCheck {
    pub fn new(min_signatures: usize) -> Self {
        Self { min_signatures }
    }
}

impl DriftDetector for SignatureCheck {
    fn name(&self) -> &'static str {
        "signature"
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Option<DriftDetection> {
        let spec = ctx.spec.spec()?;

        let mut problems = Vec::new();
        if spec.signatures.len() < self.min_signatures {
            problems.push(format!(
                "{} of {} required signatures",
                spec.signatures.len(),
                self.min_signatures
            ));
        }
        if !spec.has_role(SignerRole::Owner) {
            problems.push("no owner signature".to_string());
        }
        if !spec.has_role(SignerRole::Reviewer) {
            problems.push("no reviewer signature".to_string());
        }
        if problems.is_empty() {
            return None;
        }

        Some(
            ctx.finding(
                DriftType::SignatureInvalid,
                Severity::High,
                format!("specification is not properly signed: {}", problems.join(", ")),
            )
            .with_remediation("Collect owner and reviewer signatures before the next release."),
        )
    }
}

// ── LegalReferenceCheck ───────────────────────────────────────────────────────

/// Requires a well-formed, live legal basis on the spec.
pub struct LegalReferenceCheck {
    validator: Arc<dyn LegalReferenceValidator>,
}

impl LegalReferenceCheck {
    pub fn new(validator: Arc<dyn LegalReferenceValidator>) -> Self {
        Self { validator }
    }
}

impl DriftDetector for LegalReferenceCheck {
    fn name(&self) -> &'static str {
        "legal_reference"
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Option<DriftDetection> {
        let spec = ctx.spec.spec()?;

        let Some(reference) = &spec.legal_reference else {
            return Some(ctx.finding(
                DriftType::LegalReferenceInvalid,
                Severity::Critical,
                "specification declares no legal basis",
            ));
        };

        match self.validator.check(reference) {
            ReferenceStatus::Valid => None,
            ReferenceStatus::Malformed(reason) => Some(
                ctx.finding(
                    DriftType::LegalReferenceInvalid,
                    Severity::High,
                    format!("malformed legal reference: {reason}"),
                )
                .with_remediation("Correct the reference to the authority's URI grammar."),
            ),
            ReferenceStatus::Dead(reason) => Some(
                ctx.finding(
                    DriftType::LegalReferenceInvalid,
                    Severity::High,
                    format!("legal reference no longer valid: {reason}"),
                )
                .with_remediation("Re-base the function on the provision now in force."),
            ),
        }
    }
}

// ── InvariantCheck ────────────────────────────────────────────────────────────

/// Checks the recorded result against the spec's declared invariants.
pub struct InvariantCheck {
    evaluator: InvariantEvaluator,
}

impl InvariantCheck {
    pub fn new(evaluator: InvariantEvaluator) -> Self {
        Self { evaluator }
    }
}

impl DriftDetector for InvariantCheck {
    fn name(&self) -> &'static str {
        "invariant"
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Option<DriftDetection> {
        let spec = ctx.spec.spec()?;
        let violations = self
            .evaluator
            .violations(&spec.invariants, &ctx.decision.result);
        if violations.is_empty() {
            return None;
        }
        Some(ctx.finding(
            DriftType::LogicInvariantViolation,
            Severity::Medium,
            violations.join("; "),
        ))
    }
}

// ── TimestampCheck ────────────────────────────────────────────────────────────

/// Flags implausible ledger and execution timestamps.
///
/// Checks run most severe first and the first anomaly found is reported.
///
/// A tolerance too large to represent, or one that pushes an instant past
/// the end of the calendar, never trips.
pub struct TimestampCheck {
    clock_skew: Option<Duration>,
    max_execution_lag: Option<Duration>,
    valid_from: Option<DateTime<Utc>>,
}

impl TimestampCheck {
    pub fn new(settings: &ReplaySettings) -> Self {
        Self {
            clock_skew: Duration::try_seconds(settings.clock_skew_secs),
            max_execution_lag: Duration::try_seconds(settings.max_execution_lag_secs),
            valid_from: settings.valid_from,
        }
    }

    /// Whether `t` lies beyond `base` plus the clock skew.
    fn past_skew(&self, t: DateTime<Utc>, base: DateTime<Utc>) -> bool {
        self.clock_skew
            .and_then(|skew| base.checked_add_signed(skew))
            .is_some_and(|limit| t > limit)
    }

    fn anomaly(&self, ctx: &DetectionContext<'_>) -> Option<(Severity, String)> {
        let recorded = ctx.entry.timestamp();

        if self.past_skew(recorded, ctx.now) {
            return Some((
                Severity::Medium,
                format!("ledger timestamp {recorded} is in the future"),
            ));
        }
        if let Some(valid_from) = self.valid_from {
            if recorded < valid_from {
                return Some((
                    Severity::Medium,
                    format!("ledger timestamp {recorded} predates the valid-from instant {valid_from}"),
                ));
            }
        }

        let executed = match ctx.decision.executed_at.as_deref() {
            None => None,
            Some(raw) => match DateTime::parse_from_rfc3339(raw) {
                Ok(t) => Some(t.with_timezone(&Utc)),
                Err(e) => {
                    return Some((
                        Severity::Medium,
                        format!("executed_at '{raw}' is not an RFC 3339 timestamp: {e}"),
                    ))
                }
            },
        };
        if let Some(executed) = executed {
            if self.past_skew(executed, recorded) {
                return Some((
                    Severity::Medium,
                    format!("executed_at {executed} is after the ledger timestamp {recorded}"),
                ));
            }
        }

        if let Some(predecessor) = ctx.predecessor {
            if recorded < predecessor.timestamp() {
                return Some((
                    Severity::Low,
                    format!(
                        "ledger timestamp {recorded} is earlier than predecessor {}",
                        predecessor.timestamp()
                    ),
                ));
            }
        }
        if let Some(executed) = executed {
            let lag = recorded.signed_duration_since(executed);
            if self.max_execution_lag.is_some_and(|max| lag > max) {
                return Some((
                    Severity::Low,
                    format!("decision recorded {}s after execution", lag.num_seconds()),
                ));
            }
        }
        None
    }
}

impl DriftDetector for TimestampCheck {
    fn name(&self) -> &'static str {
        "timestamp"
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Option<DriftDetection> {
        let (severity, description) = self.anomaly(ctx)?;
        debug!(entry_id = %ctx.entry.entry_id(), %description, "timestamp anomaly");
        Some(ctx.finding(DriftType::TimestampAnomaly, severity, description))
    }
}
