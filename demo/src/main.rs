//! lexchain — Demo CLI
//!
//! Runs the housing-benefit walkthrough, and verifies or replays a ledger
//! kept on disk.
//!
//! Usage:
//!   cargo run -p demo -- scenario
//!   cargo run -p demo -- scenario --dir /tmp/ledger --specs-out /tmp/specs.json
//!   cargo run -p demo -- verify --dir /tmp/ledger
//!   cargo run -p demo -- replay --dir /tmp/ledger --specs /tmp/specs.json --hours 24

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{DateTime, TimeDelta, Utc};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use lexchain_config::AuditConfig;
use lexchain_contracts::{
    error::{LexchainError, LexchainResult},
    function::FunctionSpec,
};
use lexchain_core::{
    traits::{LedgerStorage, Signer},
    AuditReplayEngine, ReportGenerator,
};
use lexchain_drift::{standard_detectors, GrammarReferenceValidator};
use lexchain_ledger::{FileStorage, MemoryStorage, TraceLedger};
use lexchain_ref::{
    scenarios::benefits_eligibility::{self, invariants},
    InMemoryFunctionStore, KeyedDigestSigner,
};

// ── CLI definition ────────────────────────────────────────────────────────────

/// Hash-chained decision ledger and audit replay.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "lexchain ledger and audit replay demo",
    long_about = "Records rule-engine decisions in a SHA-256 hash-chained ledger and\n\
                  replays them against current function specifications to detect drift."
)]
struct Cli {
    /// Audit configuration file (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Key for the demo entry signer. Entries are unsigned when omitted.
    #[arg(long, global = true)]
    sign_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the housing-benefit walkthrough.
    Scenario {
        /// Keep the ledger in this directory instead of in memory.
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Write the registered function specs to this JSON file.
        #[arg(long)]
        specs_out: Option<PathBuf>,
    },
    /// Verify the integrity of a ledger directory.
    Verify {
        #[arg(long)]
        dir: PathBuf,
    },
    /// Replay a ledger directory against function specs from a JSON file.
    Replay {
        #[arg(long)]
        dir: PathBuf,
        /// JSON array of function specs.
        #[arg(long)]
        specs: PathBuf,
        /// Only replay decisions of this function.
        #[arg(long)]
        function: Option<String>,
        /// Size of the window ending now, in hours.
        #[arg(long, default_value_t = 24)]
        hours: i64,
        /// Print the report as JSON instead of text.
        #[arg(long)]
        json: bool,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Initialize structured logging.  Set RUST_LOG=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    let result = load_config(cli.config.as_deref()).and_then(|config| {
        let signer = cli
            .sign_key
            .map(|key| Arc::new(KeyedDigestSigner::new(key)) as Arc<dyn Signer>);
        match cli.command {
            Command::Scenario { dir, specs_out } => {
                run_scenario(&config, signer, dir.as_deref(), specs_out.as_deref())
            }
            Command::Verify { dir } => run_verify(&config, signer, &dir),
            Command::Replay {
                dir,
                specs,
                function,
                hours,
                json,
            } => run_replay(&config, signer, &dir, &specs, function.as_deref(), hours, json),
        }
    });

    match result {
        Ok(()) => {}
        Err(e) => {
            eprintln!("Demo error: {}", e);
            std::process::exit(1);
        }
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

fn load_config(path: Option<&Path>) -> LexchainResult<AuditConfig> {
    match path {
        Some(path) => AuditConfig::from_file(path),
        None => Ok(AuditConfig::default()),
    }
}

fn run_scenario(
    config: &AuditConfig,
    signer: Option<Arc<dyn Signer>>,
    dir: Option<&Path>,
    specs_out: Option<&Path>,
) -> LexchainResult<()> {
    let storage: Arc<dyn LedgerStorage> = match dir {
        Some(dir) => Arc::new(FileStorage::open(dir)?),
        None => Arc::new(MemoryStorage::new()),
    };

    let outcome = benefits_eligibility::run_scenario_with(storage, signer, config)?;

    if let Some(path) = specs_out {
        let specs = outcome.store.all()?;
        let body = serde_json::to_vec_pretty(&specs).map_err(|e| LexchainError::ConfigError {
            reason: format!("cannot encode function specs: {e}"),
        })?;
        fs::write(path, body).map_err(|e| LexchainError::ConfigError {
            reason: format!("cannot write '{}': {e}", path.display()),
        })?;
        println!("Function specs written to {}", path.display());
    }

    println!("Walkthrough completed.");
    Ok(())
}

fn run_verify(
    config: &AuditConfig,
    signer: Option<Arc<dyn Signer>>,
    dir: &Path,
) -> LexchainResult<()> {
    let ledger = open_ledger(config, signer, dir)?;
    let report = ledger.verify_integrity()?;

    println!("Ledger:    {}", dir.display());
    println!("Entries:   {}", report.checked_count);
    println!("Tip:       {}", ledger.tip_hash()?);
    println!(
        "Integrity: {}",
        if report.valid { "VERIFIED" } else { "FAILED" }
    );
    for error in &report.errors {
        println!("  {error}");
    }

    if report.valid {
        Ok(())
    } else {
        Err(LexchainError::LedgerCorrupt {
            reason: format!("{} integrity error(s)", report.errors.len()),
        })
    }
}

fn run_replay(
    config: &AuditConfig,
    signer: Option<Arc<dyn Signer>>,
    dir: &Path,
    specs: &Path,
    function_id: Option<&str>,
    hours: i64,
    json: bool,
) -> LexchainResult<()> {
    let ledger = Arc::new(open_ledger(config, signer, dir)?);

    let store = Arc::new(InMemoryFunctionStore::new());
    for spec in read_specs(specs)? {
        store.register(spec)?;
    }

    let engine = AuditReplayEngine::new(
        ledger,
        store,
        standard_detectors(
            &config.replay,
            Arc::new(GrammarReferenceValidator::new()),
            invariants(),
        ),
        None,
        config,
    )?;

    let (from, to) = window_ending_now(hours)?;
    let result = engine.replay(from, to, function_id);

    let generator = ReportGenerator::new();
    let report = engine
        .report(result.audit_id)
        .unwrap_or_else(|| generator.build_report(&result));

    if json {
        let body = serde_json::to_string_pretty(&report).map_err(|e| LexchainError::ConfigError {
            reason: format!("cannot encode report: {e}"),
        })?;
        println!("{body}");
    } else {
        print!("{}", generator.render_text(&report));
    }
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn open_ledger(
    config: &AuditConfig,
    signer: Option<Arc<dyn Signer>>,
    dir: &Path,
) -> LexchainResult<TraceLedger> {
    if !dir.is_dir() {
        return Err(LexchainError::ConfigError {
            reason: format!("ledger directory '{}' does not exist", dir.display()),
        });
    }
    let storage = Arc::new(FileStorage::open(dir)?);
    let ledger = TraceLedger::open_with_settings(storage, signer, &config.ledger)?;
    info!(dir = %dir.display(), entries = ledger.len()?, "ledger opened");
    Ok(ledger)
}

/// The `[now - hours, now)` replay window.
fn window_ending_now(hours: i64) -> LexchainResult<(DateTime<Utc>, DateTime<Utc>)> {
    let to = Utc::now();
    let from = TimeDelta::try_hours(hours)
        .and_then(|span| to.checked_sub_signed(span))
        .ok_or_else(|| LexchainError::ConfigError {
            reason: format!("--hours {hours} reaches outside the supported calendar range"),
        })?;
    Ok((from, to))
}

fn read_specs(path: &Path) -> LexchainResult<Vec<FunctionSpec>> {
    let body = fs::read(path).map_err(|e| LexchainError::ConfigError {
        reason: format!("cannot read '{}': {e}", path.display()),
    })?;
    serde_json::from_slice(&body).map_err(|e| LexchainError::ConfigError {
        reason: format!("'{}' is not a JSON array of function specs: {e}", path.display()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_spans_requested_hours() {
        let (from, to) = window_ending_now(24).unwrap();
        assert_eq!((to - from).num_hours(), 24);
    }

    #[test]
    fn oversized_hours_is_config_error() {
        for hours in [i64::MAX, i64::MIN, 10_000_000_000] {
            assert!(
                matches!(window_ending_now(hours), Err(LexchainError::ConfigError { .. })),
                "hours = {hours}"
            );
        }
    }
}
