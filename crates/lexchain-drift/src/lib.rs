//! # lexchain-drift
//!
//! The drift detectors run by the audit replay engine.
//!
//! Each detector implements [`lexchain_core::traits::DriftDetector`] and
//! looks at one decision entry at a time:
//!
//! 1. **Hash**: recorded spec hash vs. the function store's current hash.
//! 2. **Chain**: predecessor linkage and hash recomputation.
//! 3. **Signature**: release signatures on the current spec.
//! 4. **Legal reference**: ELI/CELEX grammar and liveness of the legal basis.
//! 5. **Invariant**: declared logic invariants over the recorded result.
//! 6. **Timestamp**: clock plausibility of the ledger and execution times.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use lexchain_drift::{standard_detectors, GrammarReferenceValidator, InvariantEvaluator};
//!
//! let mut invariants = InvariantEvaluator::new();
//! invariants.register_rule("amount-non-negative", Box::new(|result| {
//!     match result.get("amount_cents").and_then(|v| v.as_i64()) {
//!         Some(n) if n < 0 => Some("negative payment amount".to_string()),
//!         _ => None,
//!     }
//! }));
//! let detectors = standard_detectors(
//!     &config.replay,
//!     Arc::new(GrammarReferenceValidator::new()),
//!     invariants,
//! );
//! ```

pub mod detectors;
pub mod invariant;
pub mod legal;

pub use detectors::{
    standard_detectors, ChainCheck, HashCheck, InvariantCheck, LegalReferenceCheck,
    SignatureCheck, TimestampCheck,
};
pub use invariant::{CustomInvariantFn, InvariantEvaluator};
pub use legal::GrammarReferenceValidator;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Duration, TimeZone, Utc};
    use serde_json::json;

    use lexchain_config::ReplaySettings;
    use lexchain_contracts::{
        drift::{DriftType, Severity},
        entry::{DecisionExecution, EntryId, EntryPayload, TraceEntry, GENESIS_HASH},
        function::{
            FunctionSpec, Invariant, InvariantRule, LegalAuthority, LegalReference, SignerRole,
            SpecSignature,
        },
    };
    use lexchain_core::traits::{DetectionContext, DriftDetector, SpecLookup};
    use lexchain_ledger::TraceLedger;

    use super::*;

    // ── Builder helpers ───────────────────────────────────────────────────────

    fn execution(spec_hash: &str, executed_at: Option<&str>) -> DecisionExecution {
        DecisionExecution {
            function_id: "housing-benefit".to_string(),
            version: "v3".to_string(),
            spec_hash: spec_hash.to_string(),
            input_digest: "11".repeat(32),
            duration_ms: 4,
            success: true,
            result: json!({ "outcome": "eligible", "amount_cents": 42000 }),
            executed_at: executed_at.map(str::to_string),
        }
    }

    fn entry_at(seq: u64, at: DateTime<Utc>, decision: DecisionExecution) -> TraceEntry {
        TraceEntry::from_parts(
            EntryId::new(seq),
            at,
            EntryPayload::DecisionExecution(decision),
            GENESIS_HASH.to_string(),
            "aa".repeat(32),
            None,
        )
    }

    fn signature(role: SignerRole) -> SpecSignature {
        SpecSignature {
            signer: format!("{role:?}@example.org").to_lowercase(),
            role,
            signature: "sig".to_string(),
        }
    }

    fn spec(hash: &str) -> FunctionSpec {
        FunctionSpec {
            function_id: "housing-benefit".to_string(),
            version: "v3".to_string(),
            hash: hash.to_string(),
            signatures: vec![signature(SignerRole::Owner), signature(SignerRole::Reviewer)],
            legal_reference: Some(LegalReference {
                authority: LegalAuthority::Eli,
                uri: "http://data.europa.eu/eli/reg/2016/679/oj".to_string(),
            }),
            invariants: vec![Invariant {
                invariant_id: "outcome-set".to_string(),
                description: "outcome is eligible or ineligible".to_string(),
                rule: InvariantRule::AllowedValues {
                    field_path: "outcome".to_string(),
                    allowed: vec![json!("eligible"), json!("ineligible")],
                },
            }],
        }
    }

    fn run(
        detector: &dyn DriftDetector,
        entry: &TraceEntry,
        predecessor: Option<&TraceEntry>,
        lookup: &SpecLookup,
        now: DateTime<Utc>,
    ) -> Option<lexchain_contracts::drift::DriftDetection> {
        let decision = entry.decision().unwrap();
        detector.detect(&DetectionContext {
            entry,
            decision,
            predecessor,
            spec: lookup,
            now,
        })
    }

    fn check(detector: &dyn DriftDetector, entry: &TraceEntry, lookup: &SpecLookup) -> Option<(DriftType, Severity)> {
        run(detector, entry, None, lookup, Utc::now()).map(|d| (d.drift_type, d.severity))
    }

    // ── HashCheck ─────────────────────────────────────────────────────────────

    #[test]
    fn test_hash_check() {
        let entry = entry_at(1, Utc::now(), execution("h1", None));

        assert!(check(&HashCheck, &entry, &SpecLookup::Found(spec("h1"))).is_none());

        let finding = run(&HashCheck, &entry, None, &SpecLookup::Found(spec("h2")), Utc::now()).unwrap();
        assert_eq!(finding.drift_type, DriftType::HashMismatch);
        assert_eq!(finding.severity, Severity::Critical);
        assert_eq!(finding.expected_value.as_deref(), Some("h2"));
        assert_eq!(finding.actual_value.as_deref(), Some("h1"));

        let missing = run(&HashCheck, &entry, None, &SpecLookup::NotFound, Utc::now()).unwrap();
        assert_eq!(missing.severity, Severity::Critical);
        assert_eq!(missing.description, "function spec not found");

        assert_eq!(
            check(&HashCheck, &entry, &SpecLookup::Unavailable("timeout".to_string())),
            Some((DriftType::HashMismatch, Severity::High))
        );
    }

    // ── ChainCheck ────────────────────────────────────────────────────────────

    #[test]
    fn test_chain_check_on_real_ledger() {
        let ledger = TraceLedger::in_memory();
        let first = ledger
            .append(EntryPayload::DecisionExecution(execution("h", None)))
            .unwrap();
        let second = ledger
            .append(EntryPayload::DecisionExecution(execution("h", None)))
            .unwrap();
        let lookup = SpecLookup::Found(spec("h"));

        assert!(run(&ChainCheck, &first, None, &lookup, Utc::now()).is_none());
        assert!(run(&ChainCheck, &second, Some(&first), &lookup, Utc::now()).is_none());

        // Wrong predecessor.
        let finding = run(&ChainCheck, &second, Some(&second), &lookup, Utc::now()).unwrap();
        assert_eq!(finding.drift_type, DriftType::ChainBreak);
        assert_eq!(finding.severity, Severity::Critical);

        // Payload edited after the fact.
        let mut value = serde_json::to_value(&second).unwrap();
        value["payload"]["data"]["result"]["outcome"] = json!("ineligible");
        let tampered: TraceEntry = serde_json::from_value(value).unwrap();
        let finding = run(&ChainCheck, &tampered, Some(&first), &lookup, Utc::now()).unwrap();
        assert!(finding.description.contains("stored hash"));
    }

    // ── SignatureCheck ────────────────────────────────────────────────────────

    #[test]
    fn test_signature_check() {
        let detector = SignatureCheck::new(2);
        let entry = entry_at(1, Utc::now(), execution("h", None));

        assert!(check(&detector, &entry, &SpecLookup::Found(spec("h"))).is_none());

        let mut one = spec("h");
        one.signatures.truncate(1);
        assert_eq!(
            check(&detector, &entry, &SpecLookup::Found(one)),
            Some((DriftType::SignatureInvalid, Severity::High))
        );

        let mut two_owners = spec("h");
        two_owners.signatures = vec![signature(SignerRole::Owner), signature(SignerRole::Owner)];
        let finding = run(&detector, &entry, None, &SpecLookup::Found(two_owners), Utc::now()).unwrap();
        assert!(finding.description.contains("no reviewer signature"));

        assert!(check(&detector, &entry, &SpecLookup::NotFound).is_none());
    }

    // ── LegalReferenceCheck ───────────────────────────────────────────────────

    #[test]
    fn test_legal_reference_check() {
        let validator = GrammarReferenceValidator::new()
            .with_repealed(["http://data.europa.eu/eli/dir/1995/46/oj"]);
        let detector = LegalReferenceCheck::new(Arc::new(validator));
        let entry = entry_at(1, Utc::now(), execution("h", None));

        assert!(check(&detector, &entry, &SpecLookup::Found(spec("h"))).is_none());

        let mut missing = spec("h");
        missing.legal_reference = None;
        assert_eq!(
            check(&detector, &entry, &SpecLookup::Found(missing)),
            Some((DriftType::LegalReferenceInvalid, Severity::Critical))
        );

        let mut malformed = spec("h");
        malformed.legal_reference = Some(LegalReference {
            authority: LegalAuthority::Celex,
            uri: "GDPR".to_string(),
        });
        assert_eq!(
            check(&detector, &entry, &SpecLookup::Found(malformed)),
            Some((DriftType::LegalReferenceInvalid, Severity::High))
        );

        let mut dead = spec("h");
        dead.legal_reference = Some(LegalReference {
            authority: LegalAuthority::Eli,
            uri: "http://data.europa.eu/eli/dir/1995/46/oj".to_string(),
        });
        let finding = run(&detector, &entry, None, &SpecLookup::Found(dead), Utc::now()).unwrap();
        assert_eq!(finding.severity, Severity::High);
        assert!(finding.description.contains("repealed"));

        assert!(check(&detector, &entry, &SpecLookup::NotFound).is_none());
    }

    // ── InvariantCheck ────────────────────────────────────────────────────────

    #[test]
    fn test_invariant_check() {
        let detector = InvariantCheck::new(InvariantEvaluator::new());
        let ok = entry_at(1, Utc::now(), execution("h", None));
        assert!(check(&detector, &ok, &SpecLookup::Found(spec("h"))).is_none());

        let mut bad_exec = execution("h", None);
        bad_exec.result = json!({ "outcome": "deferred" });
        let bad = entry_at(2, Utc::now(), bad_exec);
        let finding = run(&detector, &bad, None, &SpecLookup::Found(spec("h")), Utc::now()).unwrap();
        assert_eq!(finding.drift_type, DriftType::LogicInvariantViolation);
        assert_eq!(finding.severity, Severity::Medium);
        assert!(finding.description.starts_with("outcome-set:"));
    }

    // ── TimestampCheck ────────────────────────────────────────────────────────

    fn timestamp_check() -> TimestampCheck {
        TimestampCheck::new(&ReplaySettings {
            valid_from: Some(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()),
            ..ReplaySettings::default()
        })
    }

    fn timestamp_finding(
        at: DateTime<Utc>,
        executed_at: Option<&str>,
        predecessor_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<Severity> {
        let entry = entry_at(2, at, execution("h", executed_at));
        let predecessor = predecessor_at.map(|t| entry_at(1, t, execution("h", None)));
        run(
            &timestamp_check(),
            &entry,
            predecessor.as_ref(),
            &SpecLookup::Found(spec("h")),
            now,
        )
        .map(|d| {
            assert_eq!(d.drift_type, DriftType::TimestampAnomaly);
            d.severity
        })
    }

    #[test]
    fn test_timestamp_check() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let earlier = (now - Duration::minutes(2)).to_rfc3339();

        assert_eq!(timestamp_finding(now, Some(&earlier), Some(now - Duration::seconds(1)), now), None);

        // Within skew is tolerated; beyond it is not.
        assert_eq!(timestamp_finding(now + Duration::seconds(60), None, None, now), None);
        assert_eq!(
            timestamp_finding(now + Duration::hours(1), None, None, now),
            Some(Severity::Medium)
        );

        let ancient = Utc.with_ymd_and_hms(2019, 12, 31, 0, 0, 0).unwrap();
        assert_eq!(timestamp_finding(ancient, None, None, now), Some(Severity::Medium));

        assert_eq!(
            timestamp_finding(now, Some("yesterday"), None, now),
            Some(Severity::Medium)
        );

        let later = (now + Duration::hours(2)).to_rfc3339();
        assert_eq!(timestamp_finding(now, Some(&later), None, now), Some(Severity::Medium));

        assert_eq!(
            timestamp_finding(now, None, Some(now + Duration::seconds(5)), now),
            Some(Severity::Low)
        );

        let stale = (now - Duration::days(3)).to_rfc3339();
        assert_eq!(timestamp_finding(now, Some(&stale), None, now), Some(Severity::Low));
    }

    #[test]
    fn test_timestamp_check_with_unrepresentable_skew() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let later = (now + Duration::hours(2)).to_rfc3339();

        for secs in [100_000_000_000_000, i64::MAX] {
            let check = TimestampCheck::new(&ReplaySettings {
                clock_skew_secs: secs,
                max_execution_lag_secs: secs,
                ..ReplaySettings::default()
            });
            let entry = entry_at(2, now + Duration::days(30), execution("h", Some(&later)));
            let finding = run(&check, &entry, None, &SpecLookup::Found(spec("h")), now);
            assert!(finding.is_none(), "skew {secs}: {finding:?}");
        }
    }

    // ── standard_detectors ────────────────────────────────────────────────────

    #[test]
    fn test_standard_detectors_order() {
        let detectors = standard_detectors(
            &ReplaySettings::default(),
            Arc::new(GrammarReferenceValidator::new()),
            InvariantEvaluator::new(),
        );
        let names: Vec<&str> = detectors.iter().map(|d| d.name()).collect();
        assert_eq!(
            names,
            ["hash", "chain", "signature", "legal_reference", "invariant", "timestamp"]
        );
    }
}
