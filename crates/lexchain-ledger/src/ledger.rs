//! The append-only trace ledger.
//!
//! `TraceLedger` owns the entry sequence and is its single writer. Appends
//! are serialized behind one `Mutex` that guards the chain tip; committed
//! entries sit behind an `RwLock` so readers take snapshots concurrently with
//! appends and never observe a partially written entry.
//!
//! The tip only advances after the storage backend reports a durable write.
//! A failed or timed-out append leaves the ledger exactly as it was.

use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use lexchain_config::LedgerSettings;
use lexchain_contracts::{
    entry::{EntryId, EntryPayload, EntryType, IntegrityReport, TraceEntry, GENESIS_HASH},
    error::{LexchainError, LexchainResult},
};
use lexchain_core::traits::{CommitGate, LedgerReader, LedgerStorage, Signer, WindowEntry};

use crate::{
    chain::{digest, verify_chain},
    storage::{MemoryStorage, TimedStorage},
};

// ── Internal mutable state ────────────────────────────────────────────────────

/// The chain tip, guarded by the append mutex.
struct Tip {
    /// Hash of the last durable entry, or `GENESIS_HASH` for an empty ledger.
    last_hash: String,

    /// The id the next append will receive.
    next_id: EntryId,

    /// Timestamp of the last durable entry. New timestamps never go below it.
    last_timestamp: Option<DateTime<Utc>>,
}

// ── Public ledger ─────────────────────────────────────────────────────────────

/// An append-only, SHA-256 hash-chained ledger of decision and platform events.
///
/// Multiple ledgers (e.g. one per tenant) are independent values; there is
/// no process-wide state.
pub struct TraceLedger {
    storage: Arc<dyn LedgerStorage>,
    signer: Option<Arc<dyn Signer>>,
    tip: Mutex<Tip>,
    pub(crate) entries: RwLock<Vec<TraceEntry>>,
}

impl TraceLedger {
    /// A ledger backed by fresh in-memory storage and no signer.
    pub fn in_memory() -> Self {
        Self::empty(Arc::new(MemoryStorage::new()), None)
    }

    /// Open a ledger over `storage`, loading every persisted entry.
    ///
    /// Entries are ordered by timestamp (then id) and the chain tip is
    /// re-derived from the last one. Chain breaks found while loading are
    /// logged as warnings and left in place; call `verify_integrity` for the
    /// full list.
    pub fn open(
        storage: Arc<dyn LedgerStorage>,
        signer: Option<Arc<dyn Signer>>,
    ) -> LexchainResult<Self> {
        let ledger = Self::empty(storage, signer);
        ledger.load_from_storage()?;
        Ok(ledger)
    }

    /// Like `open`, but every storage call is bounded by
    /// `settings.storage_timeout_ms`.
    pub fn open_with_settings(
        storage: Arc<dyn LedgerStorage>,
        signer: Option<Arc<dyn Signer>>,
        settings: &LedgerSettings,
    ) -> LexchainResult<Self> {
        let timed = TimedStorage::new(storage, settings.storage_timeout())?;
        Self::open(Arc::new(timed), signer)
    }

    fn empty(storage: Arc<dyn LedgerStorage>, signer: Option<Arc<dyn Signer>>) -> Self {
        Self {
            storage,
            signer,
            tip: Mutex::new(Tip {
                last_hash: GENESIS_HASH.to_string(),
                next_id: EntryId::FIRST,
                last_timestamp: None,
            }),
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Replace the in-memory state with what the storage backend holds.
    pub fn load_from_storage(&self) -> LexchainResult<usize> {
        let mut tip = self.lock_tip()?;

        let mut loaded = self.storage.load_all()?;
        loaded.sort_by(|a, b| {
            a.timestamp()
                .cmp(&b.timestamp())
                .then(a.entry_id().cmp(&b.entry_id()))
        });

        let report = verify_chain(&loaded, GENESIS_HASH, self.signer.as_deref());
        for error in &report.errors {
            warn!(error = %error, "chain break found while loading ledger");
        }

        tip.last_hash = loaded
            .last()
            .map(|e| e.hash().to_string())
            .unwrap_or_else(|| GENESIS_HASH.to_string());
        tip.next_id = loaded
            .iter()
            .map(TraceEntry::entry_id)
            .max()
            .map(EntryId::next)
            .unwrap_or(EntryId::FIRST);
        tip.last_timestamp = loaded.iter().map(TraceEntry::timestamp).max();

        let count = loaded.len();
        *self.write_entries()? = loaded;

        info!(
            entry_count = count,
            tip_hash = %tip.last_hash,
            breaks = report.errors.len(),
            "ledger loaded from storage"
        );
        Ok(count)
    }

    /// Append one entry to the chain.
    ///
    /// The entry type is the payload's tag and the timestamp is assigned
    /// here. The entry's hash commits to the payload and the current tip;
    /// if a signer is configured the signature is attached before the write.
    ///
    /// # Errors
    ///
    /// - `Canonicalization` if the payload holds non-integer numbers.
    /// - `Signing` if the signer fails.
    /// - `StorageFailed` / `StorageTimeout` if the durable write fails.
    ///
    /// In every error case the tip is unchanged and the caller may retry.
    pub fn append(&self, payload: EntryPayload) -> LexchainResult<TraceEntry> {
        let mut tip = self.lock_tip()?;

        let now = Utc::now();
        let timestamp = match tip.last_timestamp {
            Some(last) if last > now => last,
            _ => now,
        };

        let hash = digest(&payload, &tip.last_hash)?;
        let signature = match &self.signer {
            Some(signer) => Some(signer.sign(&hash)?),
            None => None,
        };

        let entry = TraceEntry::from_parts(
            tip.next_id,
            timestamp,
            payload,
            tip.last_hash.clone(),
            hash,
            signature,
        );

        if let Err(e) = self.storage.write_entry(&entry, &CommitGate::new()) {
            warn!(
                entry_id = %entry.entry_id(),
                error = %e,
                "durable write failed; ledger tip unchanged"
            );
            return Err(e);
        }

        self.write_entries()?.push(entry.clone());
        tip.last_hash = entry.hash().to_string();
        tip.next_id = entry.entry_id().next();
        tip.last_timestamp = Some(timestamp);

        info!(
            entry_id = %entry.entry_id(),
            entry_type = %entry.entry_type(),
            hash = %entry.hash(),
            "ledger entry appended"
        );
        Ok(entry)
    }

    /// Walk the whole ledger from genesis and report every integrity problem.
    pub fn verify_integrity(&self) -> LexchainResult<IntegrityReport> {
        let entries = self.read_entries()?;
        let report = verify_chain(&entries, GENESIS_HASH, self.signer.as_deref());
        debug!(
            checked = report.checked_count,
            errors = report.errors.len(),
            "ledger integrity verified"
        );
        Ok(report)
    }

    /// Integrity walk restricted to entries with `from <= timestamp < to`.
    ///
    /// The first entry in range is linked against its true predecessor, even
    /// when that predecessor lies before `from`.
    pub fn verify_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> LexchainResult<IntegrityReport> {
        let entries = self.read_entries()?;
        let Some(start) = entries.iter().position(|e| e.timestamp() >= from) else {
            return Ok(IntegrityReport::from_errors(Vec::new(), 0));
        };
        let len = entries[start..]
            .iter()
            .take_while(|e| e.timestamp() < to)
            .count();
        let anchor = if start == 0 {
            GENESIS_HASH
        } else {
            entries[start - 1].hash()
        };
        Ok(verify_chain(
            &entries[start..start + len],
            anchor,
            self.signer.as_deref(),
        ))
    }

    // ── Read-only projections ─────────────────────────────────────────────────

    pub fn entries_by_type(&self, entry_type: EntryType) -> LexchainResult<Vec<TraceEntry>> {
        self.select(|e| e.entry_type() == entry_type)
    }

    /// Decision executions and registrations that name `function_id`.
    pub fn entries_by_function(&self, function_id: &str) -> LexchainResult<Vec<TraceEntry>> {
        self.select(|e| e.payload().function_id() == Some(function_id))
    }

    /// Entries with `from <= timestamp < to`.
    pub fn entries_in_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> LexchainResult<Vec<TraceEntry>> {
        self.select(|e| e.timestamp() >= from && e.timestamp() < to)
    }

    /// The `n` most recent entries, oldest first.
    pub fn latest(&self, n: usize) -> LexchainResult<Vec<TraceEntry>> {
        let entries = self.read_entries()?;
        let skip = entries.len().saturating_sub(n);
        Ok(entries[skip..].to_vec())
    }

    pub fn get(&self, entry_id: EntryId) -> LexchainResult<Option<TraceEntry>> {
        let entries = self.read_entries()?;
        Ok(entries.iter().find(|e| e.entry_id() == entry_id).cloned())
    }

    /// A snapshot of every entry in append order.
    pub fn export(&self) -> LexchainResult<Vec<TraceEntry>> {
        Ok(self.read_entries()?.clone())
    }

    pub fn len(&self) -> LexchainResult<usize> {
        Ok(self.read_entries()?.len())
    }

    pub fn is_empty(&self) -> LexchainResult<bool> {
        Ok(self.read_entries()?.is_empty())
    }

    /// Hash of the last durable entry, or `GENESIS_HASH` when empty.
    pub fn tip_hash(&self) -> LexchainResult<String> {
        Ok(self.lock_tip()?.last_hash.clone())
    }

    // ── Internal helpers ──────────────────────────────────────────────────────

    fn select(&self, keep: impl Fn(&TraceEntry) -> bool) -> LexchainResult<Vec<TraceEntry>> {
        let entries = self.read_entries()?;
        Ok(entries.iter().filter(|e| keep(e)).cloned().collect())
    }

    fn lock_tip(&self) -> LexchainResult<MutexGuard<'_, Tip>> {
        self.tip.lock().map_err(|e| LexchainError::LockPoisoned {
            reason: format!("ledger append lock poisoned: {}", e),
        })
    }

    fn read_entries(&self) -> LexchainResult<RwLockReadGuard<'_, Vec<TraceEntry>>> {
        self.entries.read().map_err(|e| LexchainError::LockPoisoned {
            reason: format!("ledger entries lock poisoned: {}", e),
        })
    }

    fn write_entries(&self) -> LexchainResult<RwLockWriteGuard<'_, Vec<TraceEntry>>> {
        self.entries.write().map_err(|e| LexchainError::LockPoisoned {
            reason: format!("ledger entries lock poisoned: {}", e),
        })
    }
}

// ── LedgerReader impl ─────────────────────────────────────────────────────────

impl LedgerReader for TraceLedger {
    fn decisions_in_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        function_id: Option<&str>,
    ) -> LexchainResult<Vec<WindowEntry>> {
        let entries = self.read_entries()?;
        Ok(entries
            .iter()
            .enumerate()
            .filter(|(_, e)| {
                e.timestamp() >= from
                    && e.timestamp() < to
                    && e.decision()
                        .is_some_and(|d| function_id.map_or(true, |f| d.function_id == f))
            })
            .map(|(idx, e)| WindowEntry {
                entry: e.clone(),
                predecessor: idx.checked_sub(1).map(|p| entries[p].clone()),
            })
            .collect())
    }

    fn verify_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> LexchainResult<IntegrityReport> {
        TraceLedger::verify_range(self, from, to)
    }
}
