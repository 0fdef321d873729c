//! End-to-end tests: real ledger, real detectors, reference collaborators.

use std::{sync::Arc, thread};

use chrono::{Duration, Utc};

use lexchain_config::AuditConfig;
use lexchain_contracts::{
    drift::{DriftType, Severity},
    entry::{EntryPayload, TraceEntry},
    replay::{CoverageBasis, ReplayStatus},
};
use lexchain_core::{
    traits::{DecisionCounter, LedgerStorage},
    AuditReplayEngine,
};
use lexchain_drift::{standard_detectors, GrammarReferenceValidator};
use lexchain_ledger::{FileStorage, MemoryStorage, TraceLedger};
use lexchain_ref::{
    scenarios::benefits_eligibility::{
        applicants, housing_benefit_spec, invariants, record_decision, rule_body,
        run_scenario, run_scenario_with, FUNCTION_ID, VERSION,
    },
    FixedDecisionCounter, InMemoryFunctionStore, KeyedDigestSigner,
};

fn engine_for(
    ledger: Arc<TraceLedger>,
    store: Arc<InMemoryFunctionStore>,
    counter: Option<u64>,
) -> AuditReplayEngine {
    let config = AuditConfig::default();
    AuditReplayEngine::new(
        ledger,
        store,
        standard_detectors(
            &config.replay,
            Arc::new(GrammarReferenceValidator::new()),
            invariants(),
        ),
        counter.map(|n| Arc::new(FixedDecisionCounter::new(n)) as Arc<dyn DecisionCounter>),
        &config,
    )
    .unwrap()
}

#[test]
fn edited_rule_is_reported_once_as_critical_drift() {
    let outcome = run_scenario().unwrap();

    let baseline = &outcome.baseline;
    assert_eq!(baseline.result.status, ReplayStatus::Completed);
    assert_eq!(baseline.result.total_entries_checked, 3);
    assert_eq!(baseline.result.entries_with_drift, 0);
    assert!(baseline.result.detections.is_empty(), "{:?}", baseline.result.detections);
    assert_eq!(baseline.result.coverage_basis, CoverageBasis::Counted);
    assert_eq!(baseline.compliance_score, 100.0);

    let amended = &outcome.amended.result;
    assert_eq!(amended.status, ReplayStatus::Completed);
    assert_eq!(amended.total_entries_checked, 3);
    assert_eq!(amended.entries_with_drift, 1);
    assert!(amended.chain_ok);
    assert_eq!(amended.detections.len(), 1);
    assert_eq!(amended.detections[0].drift_type, DriftType::HashMismatch);
    assert_eq!(amended.detections[0].severity, Severity::Critical);
    assert!(outcome.amended.compliance_score < 100.0);
    assert!(outcome.amended.recommendations[0].starts_with("CRITICAL"));

    assert_eq!(
        outcome.engine.latest_report().unwrap().audit_id,
        outcome.amended.audit_id
    );
    assert!(outcome.ledger.verify_integrity().unwrap().valid);
}

#[test]
fn missing_spec_is_critical_drift_not_failure() {
    let outcome = run_scenario().unwrap();
    outcome.store.remove(FUNCTION_ID, VERSION).unwrap();

    let (from, to) = outcome.window;
    let result = outcome.engine.replay(from, to, None);
    assert_eq!(result.status, ReplayStatus::Completed);
    assert_eq!(result.entries_with_drift, 1);
    assert_eq!(result.unsigned_count, 3);
    assert_eq!(result.detections[0].description, "function spec not found");
    assert!(result.drift_percentage > 0.0);
}

#[test]
fn store_outage_is_high_severity() {
    let outcome = run_scenario().unwrap();
    outcome.store.set_unavailable(true);

    let (from, to) = outcome.window;
    let result = outcome.engine.replay(from, to, Some(FUNCTION_ID));
    assert_eq!(result.status, ReplayStatus::Completed);
    assert_eq!(result.detections.len(), 1);
    assert_eq!(result.detections[0].severity, Severity::High);
}

#[test]
fn empty_window_completes_with_zero_counts() {
    let outcome = run_scenario().unwrap();
    let long_ago = Utc::now() - Duration::days(365);
    let result = outcome
        .engine
        .replay(long_ago, long_ago + Duration::days(1), None);

    assert_eq!(result.status, ReplayStatus::Completed);
    assert_eq!(result.total_entries_checked, 0);
    assert_eq!(result.drift_percentage, 0.0);
    assert!(result.message.is_some());
}

#[test]
fn tampered_payload_breaks_chain_and_is_detected_in_replay() {
    let source = TraceLedger::in_memory();
    let store = Arc::new(InMemoryFunctionStore::new());
    let rule = rule_body(100_000);
    let spec = store.register_body(housing_benefit_spec(), &rule).unwrap();
    let from = Utc::now();
    for applicant in &applicants() {
        record_decision(&source, &spec, &rule, applicant).unwrap();
    }

    // Rewrite the second decision's outcome on disk, keeping its hashes.
    let mut entries = source.export().unwrap();
    let mut value = serde_json::to_value(&entries[1]).unwrap();
    value["payload"]["data"]["result"]["outcome"] = serde_json::json!("eligible");
    value["payload"]["data"]["result"]["amount_cents"] = serde_json::json!(32_000);
    entries[1] = serde_json::from_value::<TraceEntry>(value).unwrap();

    let ledger = Arc::new(
        TraceLedger::open(Arc::new(MemoryStorage::with_entries(entries)), None).unwrap(),
    );
    let engine = engine_for(ledger, store, Some(3));
    let result = engine.replay(from, Utc::now() + Duration::seconds(1), None);

    assert!(!result.chain_ok);
    assert_eq!(result.chain_errors.len(), 1);
    assert_eq!(result.entries_with_drift, 1);
    assert!(result
        .detections
        .iter()
        .any(|d| d.drift_type == DriftType::ChainBreak && d.severity == Severity::Critical));

    let report = engine.report(result.audit_id).unwrap();
    assert!(report
        .recommendations
        .iter()
        .any(|l| l.starts_with("Investigate possible ledger tampering")));
}

#[test]
fn assumed_coverage_without_counter() {
    let ledger = Arc::new(TraceLedger::in_memory());
    let store = Arc::new(InMemoryFunctionStore::new());
    let rule = rule_body(100_000);
    let spec = store.register_body(housing_benefit_spec(), &rule).unwrap();
    let from = Utc::now();
    record_decision(&ledger, &spec, &rule, &applicants()[0]).unwrap();

    let engine = engine_for(ledger, store, None);
    let result = engine.replay(from, Utc::now() + Duration::seconds(1), None);
    assert_eq!(result.coverage_basis, CoverageBasis::Assumed);
    assert_eq!(result.coverage_percentage, 100.0);

    let report = engine.report(result.audit_id).unwrap();
    assert!(report
        .recommendations
        .iter()
        .any(|l| l.starts_with("Coverage was assumed")));
}

#[test]
fn concurrent_decisions_then_replay() {
    const WORKERS: usize = 6;
    const PER_WORKER: usize = 10;

    let ledger = Arc::new(TraceLedger::in_memory());
    let store = Arc::new(InMemoryFunctionStore::new());
    let rule = rule_body(100_000);
    let spec = store.register_body(housing_benefit_spec(), &rule).unwrap();
    let from = Utc::now();

    let handles: Vec<_> = (0..WORKERS)
        .map(|_| {
            let ledger = Arc::clone(&ledger);
            let spec = spec.clone();
            let rule = rule.clone();
            thread::spawn(move || {
                for applicant in applicants().iter().cycle().take(PER_WORKER) {
                    record_decision(&ledger, &spec, &rule, applicant).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(ledger.len().unwrap(), WORKERS * PER_WORKER);
    assert!(ledger.verify_integrity().unwrap().valid);

    let engine = engine_for(ledger, store, Some((WORKERS * PER_WORKER) as u64));
    let result = engine.replay(from, Utc::now() + Duration::seconds(1), None);
    assert_eq!(result.total_entries_checked, WORKERS * PER_WORKER);
    assert_eq!(result.entries_with_drift, 0);
    assert!(result.chain_ok);
    assert_eq!(result.coverage_percentage, 100.0);
}

#[test]
fn concurrent_replays_are_independent() {
    let outcome = Arc::new(run_scenario().unwrap());
    let (from, to) = outcome.window;

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let outcome = Arc::clone(&outcome);
            thread::spawn(move || outcome.engine.replay(from, to, None))
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for result in &results {
        assert_eq!(result.entries_with_drift, 1);
        assert!(outcome.engine.report(result.audit_id).is_some());
    }
}

#[test]
fn signed_file_backed_scenario_survives_reload() {
    let dir = tempfile::tempdir().unwrap();
    let signer = Arc::new(KeyedDigestSigner::new("walkthrough-key"));
    let storage: Arc<dyn LedgerStorage> = Arc::new(FileStorage::open(dir.path()).unwrap());

    let outcome =
        run_scenario_with(storage, Some(signer.clone()), &AuditConfig::default()).unwrap();
    let tip = outcome.ledger.tip_hash().unwrap();
    assert!(outcome
        .ledger
        .export()
        .unwrap()
        .iter()
        .all(|e| e.signature().is_some()));

    let reopened = TraceLedger::open(
        Arc::new(FileStorage::open(dir.path()).unwrap()),
        Some(signer),
    )
    .unwrap();
    assert_eq!(reopened.len().unwrap(), 4);
    assert_eq!(reopened.tip_hash().unwrap(), tip);
    assert!(reopened.verify_integrity().unwrap().valid);

    let registrations = reopened
        .export()
        .unwrap()
        .into_iter()
        .filter(|e| matches!(e.payload(), EntryPayload::FunctionRegistration(_)))
        .count();
    assert_eq!(registrations, 1);
}
