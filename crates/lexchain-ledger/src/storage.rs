//! Ledger storage backends.
//!
//! - `MemoryStorage`: entries in a `BTreeMap`, for tests and ephemeral ledgers.
//! - `FileStorage`: one JSON document per entry, `<dir>/<entry_id>.json`,
//!   written through a temporary file and an atomic rename.
//! - `TimedStorage`: wraps any backend and bounds every call with a timeout.

use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::{
        mpsc::{self, RecvTimeoutError},
        Arc, Mutex, MutexGuard,
    },
    thread,
    time::Duration,
};

use tracing::{debug, warn};

use lexchain_contracts::{
    entry::{EntryId, TraceEntry},
    error::{LexchainError, LexchainResult},
};
use lexchain_core::traits::{CommitGate, LedgerStorage};

// ── MemoryStorage ─────────────────────────────────────────────────────────────

/// In-memory storage keyed by entry id.
#[derive(Default)]
pub struct MemoryStorage {
    records: Mutex<BTreeMap<EntryId, TraceEntry>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-populated with `entries`, e.g. to simulate a reload.
    pub fn with_entries(entries: impl IntoIterator<Item = TraceEntry>) -> Self {
        let records = entries.into_iter().map(|e| (e.entry_id(), e)).collect();
        Self {
            records: Mutex::new(records),
        }
    }

    fn lock(&self) -> LexchainResult<MutexGuard<'_, BTreeMap<EntryId, TraceEntry>>> {
        self.records.lock().map_err(|e| LexchainError::StorageFailed {
            reason: format!("memory storage lock poisoned: {}", e),
        })
    }
}

impl LedgerStorage for MemoryStorage {
    fn write_entry(&self, entry: &TraceEntry, gate: &CommitGate) -> LexchainResult<()> {
        gate.commit(|| {
            self.lock()?.insert(entry.entry_id(), entry.clone());
            Ok(())
        })
    }

    fn load_all(&self) -> LexchainResult<Vec<TraceEntry>> {
        Ok(self.lock()?.values().cloned().collect())
    }
}

// ── FileStorage ───────────────────────────────────────────────────────────────

/// Durable storage with one pretty-printed JSON file per entry.
///
/// Each record holds every `TraceEntry` field, with `hash` and
/// `previous_hash` as hex strings and the timestamp in RFC 3339.
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Use `dir` as the ledger directory, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> LexchainResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| LexchainError::StorageFailed {
            reason: format!("cannot create ledger directory '{}': {}", dir.display(), e),
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `entry_id`.
    pub fn record_path(&self, entry_id: EntryId) -> PathBuf {
        self.dir.join(format!("{entry_id}.json"))
    }

    fn io_error(&self, action: &str, path: &Path, e: std::io::Error) -> LexchainError {
        LexchainError::StorageFailed {
            reason: format!("{} '{}': {}", action, path.display(), e),
        }
    }
}

impl LedgerStorage for FileStorage {
    fn write_entry(&self, entry: &TraceEntry, gate: &CommitGate) -> LexchainResult<()> {
        let path = self.record_path(entry.entry_id());
        let tmp = path.with_extension("json.tmp");

        let body = serde_json::to_vec_pretty(entry).map_err(|e| LexchainError::StorageFailed {
            reason: format!("cannot encode {}: {}", entry.entry_id(), e),
        })?;

        let mut file = fs::File::create(&tmp).map_err(|e| self.io_error("cannot create", &tmp, e))?;
        file.write_all(&body)
            .and_then(|()| file.sync_all())
            .map_err(|e| self.io_error("cannot write", &tmp, e))?;
        drop(file);

        // The rename is what makes the record visible to `load_all`.
        let committed = gate.commit(|| {
            fs::rename(&tmp, &path).map_err(|e| self.io_error("cannot commit", &path, e))
        });
        if let Err(e) = committed {
            if let Err(cleanup) = fs::remove_file(&tmp) {
                warn!(path = %tmp.display(), error = %cleanup, "cannot remove uncommitted record");
            }
            return Err(e);
        }

        debug!(path = %path.display(), "ledger record written");
        Ok(())
    }

    fn load_all(&self) -> LexchainResult<Vec<TraceEntry>> {
        let listing = fs::read_dir(&self.dir).map_err(|e| self.io_error("cannot list", &self.dir, e))?;

        let mut entries = Vec::new();
        for item in listing {
            let path = item
                .map_err(|e| self.io_error("cannot list", &self.dir, e))?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let body = fs::read(&path).map_err(|e| self.io_error("cannot read", &path, e))?;
            let entry: TraceEntry =
                serde_json::from_slice(&body).map_err(|e| LexchainError::LedgerCorrupt {
                    reason: format!("'{}' is not a valid ledger record: {}", path.display(), e),
                })?;
            entries.push(entry);
        }
        Ok(entries)
    }
}

// ── TimedStorage ──────────────────────────────────────────────────────────────

type Job = Box<dyn FnOnce() + Send>;

/// Bounds every call to an inner backend with a timeout.
///
/// Calls run on a dedicated worker thread, one at a time and in submission
/// order; the caller waits at most `timeout` for the reply. A write that
/// times out is abandoned through its `CommitGate`: the worker finishes the
/// job but the record is never committed. If the commit won the race
/// against the timeout, the write is reported as successful instead.
pub struct TimedStorage {
    inner: Arc<dyn LedgerStorage>,
    jobs: mpsc::Sender<Job>,
    timeout: Duration,
}

impl TimedStorage {
    pub fn new(inner: Arc<dyn LedgerStorage>, timeout: Duration) -> LexchainResult<Self> {
        let (jobs, queue) = mpsc::channel::<Job>();
        thread::Builder::new()
            .name("lexchain-storage".to_string())
            .spawn(move || {
                for job in queue {
                    job();
                }
            })
            .map_err(|e| LexchainError::StorageFailed {
                reason: format!("cannot start storage worker: {}", e),
            })?;
        Ok(Self {
            inner,
            jobs,
            timeout,
        })
    }

    fn call<T, F>(&self, operation: &str, f: F) -> LexchainResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn LedgerStorage) -> LexchainResult<T> + Send + 'static,
    {
        let (reply, response) = mpsc::sync_channel(1);
        let inner = Arc::clone(&self.inner);
        let job: Job = Box::new(move || {
            // The caller may have given up; a closed reply channel is fine.
            let _ = reply.send(f(inner.as_ref()));
        });

        self.jobs
            .send(job)
            .map_err(|_| LexchainError::StorageFailed {
                reason: "storage worker has stopped".to_string(),
            })?;

        match response.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(operation, timeout_ms, "storage call timed out");
                Err(LexchainError::StorageTimeout {
                    operation: operation.to_string(),
                    timeout_ms,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(LexchainError::StorageFailed {
                reason: format!("storage worker dropped '{operation}'"),
            }),
        }
    }
}

impl LedgerStorage for TimedStorage {
    fn write_entry(&self, entry: &TraceEntry, gate: &CommitGate) -> LexchainResult<()> {
        let entry_id = entry.entry_id();
        let entry = entry.clone();
        let job_gate = gate.clone();
        match self.call("write_entry", move |inner| inner.write_entry(&entry, &job_gate)) {
            Err(LexchainError::StorageTimeout {
                operation,
                timeout_ms,
            }) => {
                if gate.abandon() {
                    Err(LexchainError::StorageTimeout {
                        operation,
                        timeout_ms,
                    })
                } else {
                    debug!(entry_id = %entry_id, "write committed as the wait timed out");
                    Ok(())
                }
            }
            other => other,
        }
    }

    fn load_all(&self) -> LexchainResult<Vec<TraceEntry>> {
        self.call("load_all", |inner| inner.load_all())
    }
}
