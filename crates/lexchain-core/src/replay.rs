//! The audit replay engine.
//!
//! A replay re-reads historical decision entries from the ledger and runs
//! every drift detector against current source-of-truth state:
//!
//!   Select window → Detect (in batches) → Verify chain → Count coverage → Report
//!
//! The engine never writes to the ledger. Its only shared mutable state is
//! the results and report caches keyed by `AuditId`, so replays over
//! different windows may run in parallel on one engine.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, RwLock,
    },
};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use lexchain_config::{AuditConfig, ReplaySettings};
use lexchain_contracts::{
    drift::{DriftDetection, DriftType},
    error::{LexchainError, LexchainResult},
    replay::{AuditId, CoverageBasis, ReplayResult, ReplayStatus},
    report::AuditReport,
};

use crate::{
    report::ReportGenerator,
    traits::{
        DecisionCounter, DetectionContext, DriftDetector, FunctionStore, LedgerReader, SpecLookup,
        WindowEntry,
    },
};

// ── Cancellation ──────────────────────────────────────────────────────────────

/// Cooperative cancellation flag for a running replay.
///
/// Clones share the same flag. The engine checks it between detector
/// batches; a cancelled replay ends `Failed` and the ledger is untouched.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ── Engine ────────────────────────────────────────────────────────────────────

/// How a run ended when no error occurred.
enum RunOutcome {
    Finished,
    Cancelled { checked: usize, total: usize },
}

/// Spec lookups memoized per (function, version) for one replay.
type SpecCache = HashMap<(String, String), SpecLookup>;

/// Replays ledger windows through the drift detectors and caches the results.
pub struct AuditReplayEngine {
    ledger: Arc<dyn LedgerReader>,
    functions: Arc<dyn FunctionStore>,
    detectors: Vec<Box<dyn DriftDetector>>,
    counter: Option<Arc<dyn DecisionCounter>>,
    settings: ReplaySettings,
    reports: ReportGenerator,
    results: RwLock<HashMap<AuditId, ReplayResult>>,
    report_cache: RwLock<HashMap<AuditId, AuditReport>>,
    latest: RwLock<Option<AuditId>>,
}

impl AuditReplayEngine {
    /// Create an engine over a ledger and its collaborators.
    ///
    /// # Errors
    ///
    /// `ConfigError` when `coverage.require_counter` is set and no decision
    /// counter is supplied.
    pub fn new(
        ledger: Arc<dyn LedgerReader>,
        functions: Arc<dyn FunctionStore>,
        detectors: Vec<Box<dyn DriftDetector>>,
        counter: Option<Arc<dyn DecisionCounter>>,
        config: &AuditConfig,
    ) -> LexchainResult<Self> {
        if counter.is_none() {
            if config.coverage.require_counter {
                return Err(LexchainError::ConfigError {
                    reason: "coverage.require_counter is set but no decision counter was supplied"
                        .to_string(),
                });
            }
            warn!("no decision counter configured; coverage will be assumed, not counted");
        }

        debug!(
            detectors = ?detectors.iter().map(|d| d.name()).collect::<Vec<_>>(),
            batch_size = config.replay.batch_size,
            "audit replay engine created"
        );

        Ok(Self {
            ledger,
            functions,
            detectors,
            counter,
            settings: config.replay.clone(),
            reports: ReportGenerator::new(),
            results: RwLock::new(HashMap::new()),
            report_cache: RwLock::new(HashMap::new()),
            latest: RwLock::new(None),
        })
    }

    /// Replay decisions with `from <= timestamp < to`, optionally for one
    /// function only.
    ///
    /// Never returns an error: any failure is reported as a `Failed` result
    /// carrying the error message.
    pub fn replay(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        function_id: Option<&str>,
    ) -> ReplayResult {
        self.replay_with_cancel(from, to, function_id, &CancelToken::new())
    }

    /// Like `replay`, but stops between batches once `cancel` is set.
    pub fn replay_with_cancel(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        function_id: Option<&str>,
        cancel: &CancelToken,
    ) -> ReplayResult {
        let audit_id = AuditId::new();
        let mut result = ReplayResult::pending(audit_id, from, to, function_id.map(str::to_string));
        self.publish(&result);

        info!(
            audit_id = %audit_id,
            from = %from,
            to = %to,
            function_id = function_id.unwrap_or("*"),
            "replay starting"
        );

        transition(&mut result, ReplayStatus::Running);
        self.publish(&result);

        match self.run(&mut result, cancel) {
            Ok(RunOutcome::Finished) => transition(&mut result, ReplayStatus::Completed),
            Ok(RunOutcome::Cancelled { checked, total }) => {
                warn!(audit_id = %audit_id, checked, total, "replay cancelled");
                result.message = Some(format!(
                    "replay cancelled after {checked} of {total} entries"
                ));
                transition(&mut result, ReplayStatus::Failed);
            }
            Err(e) => {
                warn!(audit_id = %audit_id, error = %e, "replay failed");
                result.message = Some(e.to_string());
                transition(&mut result, ReplayStatus::Failed);
            }
        }
        result.finished_at = Some(Utc::now());
        self.publish(&result);

        let report = self.reports.build_report(&result);
        info!(
            audit_id = %audit_id,
            status = ?result.status,
            checked = result.total_entries_checked,
            drifted = result.entries_with_drift,
            chain_ok = result.chain_ok,
            score = report.compliance_score,
            "replay finished"
        );
        self.store_report(report);

        result
    }

    /// The result for `audit_id`, including in-flight `Pending`/`Running` ones.
    pub fn result(&self, audit_id: AuditId) -> Option<ReplayResult> {
        self.results
            .read()
            .ok()
            .and_then(|cache| cache.get(&audit_id).cloned())
    }

    pub fn report(&self, audit_id: AuditId) -> Option<AuditReport> {
        self.report_cache
            .read()
            .ok()
            .and_then(|cache| cache.get(&audit_id).cloned())
    }

    /// The report of the most recently finished replay.
    pub fn latest_report(&self) -> Option<AuditReport> {
        let latest = self.latest.read().ok().and_then(|id| *id)?;
        self.report(latest)
    }

    // ── Replay steps ──────────────────────────────────────────────────────────

    fn run(&self, result: &mut ReplayResult, cancel: &CancelToken) -> LexchainResult<RunOutcome> {
        let (from, to) = (result.window_from, result.window_to);

        // ── Step 1: select the window ────────────────────────────────────────
        let entries = self
            .ledger
            .decisions_in_range(from, to, result.function_id.as_deref())?;

        if entries.is_empty() {
            result.message = Some(format!(
                "no decision executions recorded between {from} and {to}"
            ));
            let (coverage, basis) = self.coverage(result.function_id.as_deref(), from, to, 0)?;
            result.coverage_percentage = coverage;
            result.coverage_basis = basis;
            return Ok(RunOutcome::Finished);
        }

        // ── Step 2: run detectors in batches ─────────────────────────────────
        let now = Utc::now();
        let mut specs = SpecCache::new();
        let mut reported: HashSet<(String, String, DriftType)> = HashSet::new();
        let batch_size = self.settings.batch_size.max(1);

        for batch in entries.chunks(batch_size) {
            if cancel.is_cancelled() {
                return Ok(RunOutcome::Cancelled {
                    checked: result.total_entries_checked,
                    total: entries.len(),
                });
            }
            for window_entry in batch {
                self.check_entry(window_entry, now, &mut specs, &mut reported, result)?;
            }
        }

        if result.total_entries_checked > 0 {
            result.drift_percentage =
                result.entries_with_drift as f64 / result.total_entries_checked as f64 * 100.0;
        }

        // ── Step 3: chain integrity over the window ──────────────────────────
        let integrity = self.ledger.verify_range(from, to)?;
        if !integrity.valid {
            warn!(
                audit_id = %result.audit_id,
                errors = integrity.errors.len(),
                "chain integrity errors inside audited window"
            );
        }
        result.chain_ok = integrity.valid;
        result.chain_errors = integrity.errors;

        // ── Step 4: coverage ─────────────────────────────────────────────────
        let (coverage, basis) = self.coverage(
            result.function_id.as_deref(),
            from,
            to,
            result.total_entries_checked,
        )?;
        result.coverage_percentage = coverage;
        result.coverage_basis = basis;

        Ok(RunOutcome::Finished)
    }

    fn check_entry(
        &self,
        window_entry: &WindowEntry,
        now: DateTime<Utc>,
        specs: &mut SpecCache,
        reported: &mut HashSet<(String, String, DriftType)>,
        result: &mut ReplayResult,
    ) -> LexchainResult<()> {
        let entry = &window_entry.entry;
        let Some(decision) = entry.decision() else {
            return Ok(());
        };

        let key = (decision.function_id.clone(), decision.version.clone());
        if !specs.contains_key(&key) {
            let lookup = self.lookup_spec(&key.0, &key.1);
            specs.insert(key.clone(), lookup);
        }
        let Some(spec) = specs.get(&key) else {
            return Ok(());
        };

        let ctx = DetectionContext {
            entry,
            decision,
            predecessor: window_entry.predecessor.as_ref(),
            spec,
            now,
        };

        let mut findings: Vec<DriftDetection> = Vec::new();
        for detector in &self.detectors {
            let Some(finding) = detector.detect(&ctx) else {
                continue;
            };
            if finding.drift_type.is_function_scoped()
                && !reported.insert((key.0.clone(), key.1.clone(), finding.drift_type))
            {
                continue;
            }
            debug!(
                entry_id = %entry.entry_id(),
                detector = detector.name(),
                drift_type = %finding.drift_type,
                severity = %finding.severity,
                "drift detected"
            );
            findings.push(finding);
        }

        result.total_entries_checked += 1;
        if findings.iter().any(|f| f.severity.is_material()) {
            result.entries_with_drift += 1;
        }
        let signatures = spec.spec().map_or(0, |s| s.signatures.len());
        if signatures < self.settings.min_signatures {
            result.unsigned_count += 1;
        }
        result.detections.extend(findings);
        Ok(())
    }

    fn lookup_spec(&self, function_id: &str, version: &str) -> SpecLookup {
        match self.functions.get_spec(function_id, version) {
            Ok(Some(spec)) => SpecLookup::Found(spec),
            Ok(None) => {
                debug!(function_id, version, "function spec not found");
                SpecLookup::NotFound
            }
            Err(e) => {
                warn!(function_id, version, error = %e, "function store unavailable");
                SpecLookup::Unavailable(e.to_string())
            }
        }
    }

    /// Coverage of the window and how it was obtained.
    ///
    /// With a counter: `audited / expected`, capped at 100, and 100 when
    /// nothing was expected. Without one: 100 if anything was audited, else 0.
    fn coverage(
        &self,
        function_id: Option<&str>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        audited: usize,
    ) -> LexchainResult<(f64, CoverageBasis)> {
        let Some(counter) = &self.counter else {
            warn!(audited, "coverage assumed from entry presence; no decision counter");
            let assumed = if audited > 0 { 100.0 } else { 0.0 };
            return Ok((assumed, CoverageBasis::Assumed));
        };

        let expected = counter.count_decisions(function_id, from, to)?;
        let coverage = if expected == 0 {
            100.0
        } else {
            (audited as f64 / expected as f64 * 100.0).min(100.0)
        };
        debug!(audited, expected, coverage, "coverage counted");
        Ok((coverage, CoverageBasis::Counted))
    }

    // ── Caches ────────────────────────────────────────────────────────────────

    fn publish(&self, result: &ReplayResult) {
        match self.results.write() {
            Ok(mut cache) => {
                cache.insert(result.audit_id, result.clone());
            }
            Err(e) => warn!(audit_id = %result.audit_id, error = %e, "results cache unavailable"),
        }
    }

    fn store_report(&self, report: AuditReport) {
        let audit_id = report.audit_id;
        match self.report_cache.write() {
            Ok(mut cache) => {
                cache.insert(audit_id, report);
            }
            Err(e) => {
                warn!(audit_id = %audit_id, error = %e, "report cache unavailable");
                return;
            }
        }
        if let Ok(mut latest) = self.latest.write() {
            *latest = Some(audit_id);
        }
    }
}

fn transition(result: &mut ReplayResult, next: ReplayStatus) {
    debug_assert!(
        result.status.can_transition_to(next),
        "illegal replay transition {:?} -> {:?}",
        result.status,
        next
    );
    result.status = next;
}

// ── Tests ─────────────────────────────────────────────────────────────────────
