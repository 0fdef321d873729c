//! Reference implementations of the external collaborators.
//!
//! These stand in for a real function registry, decision counter and key
//! management service. They hold everything in memory and are meant for
//! demos and tests only.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        RwLock, RwLockWriteGuard,
    },
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use lexchain_contracts::{
    error::{LexchainError, LexchainResult},
    function::FunctionSpec,
};
use lexchain_core::traits::{DecisionCounter, FunctionStore, Signer};
use lexchain_ledger::content_digest;

// ── InMemoryFunctionStore ─────────────────────────────────────────────────────

/// A function registry keyed by (function id, version).
#[derive(Default)]
pub struct InMemoryFunctionStore {
    specs: RwLock<HashMap<(String, String), FunctionSpec>>,
    unavailable: AtomicBool,
}

impl InMemoryFunctionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a spec.
    pub fn register(&self, spec: FunctionSpec) -> LexchainResult<()> {
        info!(
            function_id = %spec.function_id,
            version = %spec.version,
            hash = %spec.hash,
            "function spec registered"
        );
        let key = (spec.function_id.clone(), spec.version.clone());
        self.write()?.insert(key, spec);
        Ok(())
    }

    /// Set `spec.hash` to the canonical digest of `body` and register it.
    ///
    /// Returns the registered spec.
    pub fn register_body(
        &self,
        mut spec: FunctionSpec,
        body: &impl Serialize,
    ) -> LexchainResult<FunctionSpec> {
        spec.hash = content_digest(body)?;
        self.register(spec.clone())?;
        Ok(spec)
    }

    /// Overwrite the hash of a registered version in place, as happens when a
    /// published rule is edited without a version bump.
    ///
    /// Returns `false` when the version is not registered.
    pub fn replace_hash(
        &self,
        function_id: &str,
        version: &str,
        hash: impl Into<String>,
    ) -> LexchainResult<bool> {
        let mut specs = self.write()?;
        match specs.get_mut(&(function_id.to_string(), version.to_string())) {
            Some(spec) => {
                spec.hash = hash.into();
                debug!(function_id, version, hash = %spec.hash, "function spec hash replaced");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn remove(&self, function_id: &str, version: &str) -> LexchainResult<Option<FunctionSpec>> {
        Ok(self
            .write()?
            .remove(&(function_id.to_string(), version.to_string())))
    }

    /// Make every lookup fail until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Every registered spec, ordered by (function id, version).
    pub fn all(&self) -> LexchainResult<Vec<FunctionSpec>> {
        let specs = self.specs.read().map_err(|e| poisoned(&e))?;
        let mut all: Vec<FunctionSpec> = specs.values().cloned().collect();
        all.sort_by(|a, b| {
            a.function_id
                .cmp(&b.function_id)
                .then_with(|| a.version.cmp(&b.version))
        });
        Ok(all)
    }

    fn write(&self) -> LexchainResult<RwLockWriteGuard<'_, HashMap<(String, String), FunctionSpec>>> {
        self.specs.write().map_err(|e| poisoned(&e))
    }
}

fn poisoned(e: &impl std::fmt::Display) -> LexchainError {
    LexchainError::SpecStore {
        reason: format!("function store lock poisoned: {e}"),
    }
}

impl FunctionStore for InMemoryFunctionStore {
    fn get_spec(&self, function_id: &str, version: &str) -> LexchainResult<Option<FunctionSpec>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LexchainError::SpecStore {
                reason: "function registry is unreachable".to_string(),
            });
        }
        let specs = self.specs.read().map_err(|e| poisoned(&e))?;
        Ok(specs
            .get(&(function_id.to_string(), version.to_string()))
            .cloned())
    }
}

// ── FixedDecisionCounter ──────────────────────────────────────────────────────

/// A decision counter that reports preset totals, regardless of window.
///
/// Per-function totals take precedence; otherwise the overall total is used.
#[derive(Debug, Default)]
pub struct FixedDecisionCounter {
    total: u64,
    per_function: HashMap<String, u64>,
}

impl FixedDecisionCounter {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            per_function: HashMap::new(),
        }
    }

    pub fn with_function(mut self, function_id: impl Into<String>, count: u64) -> Self {
        self.per_function.insert(function_id.into(), count);
        self
    }
}

impl DecisionCounter for FixedDecisionCounter {
    fn count_decisions(
        &self,
        function_id: Option<&str>,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> LexchainResult<u64> {
        Ok(function_id
            .and_then(|f| self.per_function.get(f).copied())
            .unwrap_or(self.total))
    }
}

// ── KeyedDigestSigner ─────────────────────────────────────────────────────────

/// Signs entry hashes with `SHA-256(key || hash)`.
///
/// Not a real signature scheme: anyone holding the key can forge. Use a
/// proper signer backed by a key management service in production.
pub struct KeyedDigestSigner {
    key: Vec<u8>,
}

impl KeyedDigestSigner {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }

    fn tag(&self, hash: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.key);
        hasher.update(hash.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl Signer for KeyedDigestSigner {
    fn sign(&self, hash: &str) -> LexchainResult<String> {
        if self.key.is_empty() {
            return Err(LexchainError::Signing {
                reason: "signing key is empty".to_string(),
            });
        }
        Ok(self.tag(hash))
    }

    fn verify(&self, hash: &str, signature: &str) -> bool {
        !self.key.is_empty() && self.tag(hash) == signature
    }
}
