//! Walkthrough: auditing a housing-benefit eligibility function.
//!
//! A municipality publishes an eligibility rule, signs it, and records every
//! decision the rule makes in the ledger. Later, the published rule is edited
//! in place (the income limit is lowered without a version bump). Replaying
//! the same decisions afterwards surfaces the change as critical drift.
//!
//! Steps for the demo run:
//!   1. Register the signed rule in the function store (hash = JCS digest)
//!   2. Append a registration entry and three decision entries
//!   3. Replay the window: no findings, score 100
//!   4. Edit the rule body in place, keeping the version
//!   5. Replay again: one critical hash mismatch, score below 100
//!   6. Verify ledger integrity end to end

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use lexchain_config::AuditConfig;
use lexchain_contracts::{
    entry::{DecisionExecution, EntryPayload, FunctionRegistration, TraceEntry},
    error::LexchainResult,
    function::{
        FunctionSpec, Invariant, InvariantRule, LegalAuthority, LegalReference, SignerRole,
        SpecSignature,
    },
    report::AuditReport,
};
use lexchain_core::{
    traits::{LedgerStorage, Signer},
    AuditReplayEngine, ReportGenerator,
};
use lexchain_drift::{standard_detectors, GrammarReferenceValidator, InvariantEvaluator};
use lexchain_ledger::{content_digest, MemoryStorage, TraceLedger};

use crate::collaborators::{FixedDecisionCounter, InMemoryFunctionStore};

pub const FUNCTION_ID: &str = "housing-benefit";
pub const VERSION: &str = "v1";

// ── Mock applicants ───────────────────────────────────────────────────────────

/// A fictional benefit applicant. Money is held in integer cents.
#[derive(Debug, Clone, Serialize)]
pub struct Applicant {
    pub applicant_id: &'static str,
    pub monthly_income_cents: i64,
    pub household_size: i64,
    pub resident: bool,
}

/// The three applicants decided in the walkthrough.
pub fn applicants() -> Vec<Applicant> {
    vec![
        Applicant {
            applicant_id: "app-0001",
            monthly_income_cents: 140_000,
            household_size: 2,
            resident: true,
        },
        Applicant {
            applicant_id: "app-0002",
            monthly_income_cents: 310_000,
            household_size: 1,
            resident: true,
        },
        Applicant {
            applicant_id: "app-0003",
            monthly_income_cents: 90_000,
            household_size: 3,
            resident: false,
        },
    ]
}

// ── The published rule ────────────────────────────────────────────────────────

/// The rule body whose digest is the spec hash.
pub fn rule_body(income_limit_cents_per_person: i64) -> Value {
    json!({
        "function_id": FUNCTION_ID,
        "version": VERSION,
        "income_limit_cents_per_person": income_limit_cents_per_person,
        "base_amount_cents": 32_000,
        "per_dependant_cents": 8_000,
        "residency_required": true,
    })
}

/// Apply the rule to one applicant.
pub fn evaluate(rule: &Value, applicant: &Applicant) -> Value {
    let limit = rule["income_limit_cents_per_person"].as_i64().unwrap_or(0);
    let base = rule["base_amount_cents"].as_i64().unwrap_or(0);
    let per_dependant = rule["per_dependant_cents"].as_i64().unwrap_or(0);
    let residency_required = rule["residency_required"].as_bool().unwrap_or(true);

    if residency_required && !applicant.resident {
        return json!({ "outcome": "ineligible", "amount_cents": 0, "reason": "not resident" });
    }
    if applicant.monthly_income_cents > limit * applicant.household_size {
        return json!({ "outcome": "ineligible", "amount_cents": 0, "reason": "income above limit" });
    }
    let amount = base + per_dependant * (applicant.household_size - 1);
    json!({ "outcome": "eligible", "amount_cents": amount, "reason": "within income limit" })
}

/// The spec for the rule, minus its hash.
pub fn housing_benefit_spec() -> FunctionSpec {
    FunctionSpec {
        function_id: FUNCTION_ID.to_string(),
        version: VERSION.to_string(),
        hash: String::new(),
        signatures: vec![
            SpecSignature {
                signer: "benefits-policy@city.example".to_string(),
                role: SignerRole::Owner,
                signature: "owner-release-2024-03".to_string(),
            },
            SpecSignature {
                signer: "legal-review@city.example".to_string(),
                role: SignerRole::Reviewer,
                signature: "review-release-2024-03".to_string(),
            },
        ],
        legal_reference: Some(LegalReference {
            authority: LegalAuthority::Eli,
            uri: "http://data.europa.eu/eli/reg/2016/679/oj".to_string(),
        }),
        invariants: vec![
            Invariant {
                invariant_id: "outcome-set".to_string(),
                description: "outcome is eligible or ineligible".to_string(),
                rule: InvariantRule::AllowedValues {
                    field_path: "outcome".to_string(),
                    allowed: vec![json!("eligible"), json!("ineligible")],
                },
            },
            Invariant {
                invariant_id: "has-reason".to_string(),
                description: "every decision states its reason".to_string(),
                rule: InvariantRule::RequiredField {
                    field_path: "reason".to_string(),
                },
            },
            Invariant {
                invariant_id: "amount-shape".to_string(),
                description: "amount is a non-negative integer".to_string(),
                rule: InvariantRule::JsonSchema {
                    schema: json!({
                        "type": "object",
                        "properties": { "amount_cents": { "type": "integer", "minimum": 0 } },
                        "required": ["amount_cents"]
                    }),
                },
            },
            Invariant {
                invariant_id: "no-payment-when-ineligible".to_string(),
                description: "ineligible decisions pay nothing".to_string(),
                rule: InvariantRule::Custom {
                    function_name: "no-payment-when-ineligible".to_string(),
                },
            },
        ],
    }
}

/// The invariant evaluator with this function's custom rules registered.
pub fn invariants() -> InvariantEvaluator {
    let mut evaluator = InvariantEvaluator::new();
    evaluator.register_rule(
        "no-payment-when-ineligible",
        Box::new(|result| {
            let ineligible = result.get("outcome").and_then(Value::as_str) == Some("ineligible");
            let amount = result.get("amount_cents").and_then(Value::as_i64).unwrap_or(0);
            (ineligible && amount != 0)
                .then(|| format!("ineligible decision pays {amount} cents"))
        }),
    );
    evaluator
}

/// Evaluate `applicant` under `rule` and append the decision to the ledger.
pub fn record_decision(
    ledger: &TraceLedger,
    spec: &FunctionSpec,
    rule: &Value,
    applicant: &Applicant,
) -> LexchainResult<TraceEntry> {
    let started = Utc::now();
    let result = evaluate(rule, applicant);
    let duration_ms = (Utc::now() - started).num_milliseconds().max(0) as u64;

    ledger.append(EntryPayload::DecisionExecution(DecisionExecution {
        function_id: spec.function_id.clone(),
        version: spec.version.clone(),
        spec_hash: spec.hash.clone(),
        input_digest: content_digest(applicant)?,
        duration_ms,
        success: true,
        result,
        executed_at: Some(started.to_rfc3339()),
    }))
}

// ── Scenario runner ───────────────────────────────────────────────────────────

/// Everything the walkthrough produced, for inspection after the run.
pub struct ScenarioOutcome {
    pub ledger: Arc<TraceLedger>,
    pub store: Arc<InMemoryFunctionStore>,
    pub engine: AuditReplayEngine,
    pub window: (DateTime<Utc>, DateTime<Utc>),
    /// Report from the replay before the rule was edited.
    pub baseline: AuditReport,
    /// Report from the replay after the rule was edited.
    pub amended: AuditReport,
}

/// Run the walkthrough over fresh in-memory storage.
pub fn run_scenario() -> LexchainResult<ScenarioOutcome> {
    run_scenario_with(Arc::new(MemoryStorage::new()), None, &AuditConfig::default())
}

/// Run the walkthrough over the given storage and signer.
pub fn run_scenario_with(
    storage: Arc<dyn LedgerStorage>,
    signer: Option<Arc<dyn Signer>>,
    config: &AuditConfig,
) -> LexchainResult<ScenarioOutcome> {
    println!("=== Walkthrough: housing-benefit eligibility audit ===");
    println!();

    // ── Step 1: publish the signed rule ───────────────────────────────────────
    let store = Arc::new(InMemoryFunctionStore::new());
    let rule = rule_body(100_000);
    let spec = store.register_body(housing_benefit_spec(), &rule)?;
    println!("  Published {}@{} with hash {}", spec.function_id, spec.version, spec.hash);

    // ── Step 2: record decisions ──────────────────────────────────────────────
    let ledger = Arc::new(TraceLedger::open_with_settings(storage, signer, &config.ledger)?);
    let from = Utc::now();

    ledger.append(EntryPayload::FunctionRegistration(FunctionRegistration {
        function_id: spec.function_id.clone(),
        version: spec.version.clone(),
        spec_hash: spec.hash.clone(),
        registered_by: "benefits-policy@city.example".to_string(),
    }))?;

    let people = applicants();
    for applicant in &people {
        let entry = record_decision(&ledger, &spec, &rule, applicant)?;
        let outcome = entry
            .decision()
            .and_then(|d| d.result.get("outcome"))
            .and_then(Value::as_str)
            .unwrap_or("?");
        println!("  Recorded {} for {:<9} -> {}", entry.entry_id(), applicant.applicant_id, outcome);
    }
    let to = Utc::now() + Duration::seconds(1);
    println!();

    // ── Step 3: baseline replay ───────────────────────────────────────────────
    let engine = AuditReplayEngine::new(
        ledger.clone(),
        store.clone(),
        standard_detectors(
            &config.replay,
            Arc::new(GrammarReferenceValidator::new()),
            invariants(),
        ),
        Some(Arc::new(FixedDecisionCounter::new(people.len() as u64))),
        config,
    )?;

    let baseline_result = engine.replay(from, to, Some(FUNCTION_ID));
    let baseline = engine
        .report(baseline_result.audit_id)
        .unwrap_or_else(|| ReportGenerator::new().build_report(&baseline_result));
    println!(
        "  Baseline replay:  {} checked, {} drifted, score {:.1}",
        baseline_result.total_entries_checked,
        baseline_result.entries_with_drift,
        baseline.compliance_score
    );

    // ── Step 4: the rule is edited in place ───────────────────────────────────
    let edited = rule_body(80_000);
    store.replace_hash(FUNCTION_ID, VERSION, content_digest(&edited)?)?;
    println!("  Rule edited in place: income limit lowered, version unchanged");

    // ── Step 5: replay again ──────────────────────────────────────────────────
    let amended_result = engine.replay(from, to, Some(FUNCTION_ID));
    let generator = ReportGenerator::new();
    let amended = engine
        .report(amended_result.audit_id)
        .unwrap_or_else(|| generator.build_report(&amended_result));
    println!(
        "  Amended replay:   {} checked, {} drifted, score {:.1}",
        amended_result.total_entries_checked,
        amended_result.entries_with_drift,
        amended.compliance_score
    );
    println!();
    for line in generator.render_text(&amended).lines() {
        println!("  | {line}");
    }
    println!();

    // ── Step 6: integrity ─────────────────────────────────────────────────────
    let integrity = ledger.verify_integrity()?;
    println!(
        "  Ledger integrity: {} ({} entries checked)",
        if integrity.valid { "VERIFIED" } else { "FAILED" },
        integrity.checked_count
    );
    println!();

    Ok(ScenarioOutcome {
        ledger,
        store,
        engine,
        window: (from, to),
        baseline,
        amended,
    })
}
