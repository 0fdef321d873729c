//! Ledger entry types.
//!
//! `TraceEntry` is the atomic unit of the ledger: one immutable record per
//! decision or platform event. Its payload is a tagged union so that every
//! consumer pattern-matches on a known shape instead of probing keys.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The sentinel `previous_hash` of the first entry in every ledger.
///
/// 64 hex zeros: a value that is not the SHA-256 of any known input, so
/// genesis detection is unambiguous.
pub const GENESIS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Monotonically assigned identifier of a ledger entry.
///
/// Rendered as `tr-` followed by the zero-padded sequence number, which is
/// also the key under which the entry is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(u64);

impl EntryId {
    /// The id assigned to the first entry of an empty ledger.
    pub const FIRST: EntryId = EntryId(1);

    pub fn new(sequence: u64) -> Self {
        Self(sequence)
    }

    /// The raw sequence number.
    pub fn sequence(self) -> u64 {
        self.0
    }

    /// The id that follows this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tr-{:012}", self.0)
    }
}

/// The kind of event an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    DecisionExecution,
    FunctionRegistration,
    PolicyUpdate,
    SecurityEvent,
    SystemEvent,
}

impl EntryType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryType::DecisionExecution => "decision_execution",
            EntryType::FunctionRegistration => "function_registration",
            EntryType::PolicyUpdate => "policy_update",
            EntryType::SecurityEvent => "security_event",
            EntryType::SystemEvent => "system_event",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Payloads ─────────────────────────────────────────────────────────────────

/// One execution of a versioned decision function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionExecution {
    /// Stable id of the decision function (e.g. "benefit-eligibility").
    pub function_id: String,
    /// The function version that was executed (e.g. "v1").
    pub version: String,
    /// Digest of the function spec as it was at execution time.
    pub spec_hash: String,
    /// Digest of the decision input. The input itself is never stored.
    pub input_digest: String,
    /// Wall-clock execution duration in milliseconds.
    pub duration_ms: u64,
    /// Whether the function produced a result without error.
    pub success: bool,
    /// Summary of the decision output, checked against the spec invariants.
    pub result: serde_json::Value,
    /// The decision runtime's own clock reading (RFC 3339), if it reported one.
    #[serde(default)]
    pub executed_at: Option<String>,
}

/// A new decision function version was registered with the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionRegistration {
    pub function_id: String,
    pub version: String,
    pub spec_hash: String,
    pub registered_by: String,
}

/// A governance policy changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyUpdate {
    pub policy_id: String,
    pub summary: String,
    pub changed_by: String,
}

/// A security-relevant event (failed authentication, key rotation, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub category: String,
    pub detail: String,
    #[serde(default)]
    pub actor: Option<String>,
}

/// An operational event (startup, shutdown, maintenance).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemEvent {
    pub component: String,
    pub message: String,
}

/// The payload of a ledger entry; the variant determines the `EntryType`.
///
/// Serialized adjacently tagged:
/// `{"entry_type": "decision_execution", "data": { ... }}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entry_type", content = "data", rename_all = "snake_case")]
pub enum EntryPayload {
    DecisionExecution(DecisionExecution),
    FunctionRegistration(FunctionRegistration),
    PolicyUpdate(PolicyUpdate),
    SecurityEvent(SecurityEvent),
    SystemEvent(SystemEvent),
}

impl EntryPayload {
    pub fn entry_type(&self) -> EntryType {
        match self {
            EntryPayload::DecisionExecution(_) => EntryType::DecisionExecution,
            EntryPayload::FunctionRegistration(_) => EntryType::FunctionRegistration,
            EntryPayload::PolicyUpdate(_) => EntryType::PolicyUpdate,
            EntryPayload::SecurityEvent(_) => EntryType::SecurityEvent,
            EntryPayload::SystemEvent(_) => EntryType::SystemEvent,
        }
    }

    /// The function this payload refers to, for payload kinds that name one.
    pub fn function_id(&self) -> Option<&str> {
        match self {
            EntryPayload::DecisionExecution(d) => Some(&d.function_id),
            EntryPayload::FunctionRegistration(r) => Some(&r.function_id),
            _ => None,
        }
    }
}

// ── TraceEntry ───────────────────────────────────────────────────────────────

/// A single immutable ledger entry.
///
/// Fields are private and exposed through getters only: once constructed an
/// entry cannot be modified. `hash` commits to `(payload, previous_hash)`;
/// any later change to the payload is detected by recomputing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    entry_id: EntryId,
    timestamp: DateTime<Utc>,
    payload: EntryPayload,
    previous_hash: String,
    hash: String,
    #[serde(default)]
    signature: Option<String>,
}

impl TraceEntry {
    /// Assemble an entry from already-computed parts.
    ///
    /// Only the ledger calls this, after computing `hash` from `payload` and
    /// `previous_hash` and optionally signing it.
    pub fn from_parts(
        entry_id: EntryId,
        timestamp: DateTime<Utc>,
        payload: EntryPayload,
        previous_hash: String,
        hash: String,
        signature: Option<String>,
    ) -> Self {
        Self {
            entry_id,
            timestamp,
            payload,
            previous_hash,
            hash,
            signature,
        }
    }

    pub fn entry_id(&self) -> EntryId {
        self.entry_id
    }

    pub fn entry_type(&self) -> EntryType {
        self.payload.entry_type()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn payload(&self) -> &EntryPayload {
        &self.payload
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    /// The decision payload, if this is a `decision_execution` entry.
    pub fn decision(&self) -> Option<&DecisionExecution> {
        match &self.payload {
            EntryPayload::DecisionExecution(d) => Some(d),
            _ => None,
        }
    }

    pub fn is_genesis_linked(&self) -> bool {
        self.previous_hash == GENESIS_HASH
    }
}

/// Outcome of walking the ledger and re-checking every entry.
///
/// `valid` is true only when `errors` is empty. Each error names the
/// offending entry id. The walk never stops at the first problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub checked_count: usize,
}

impl IntegrityReport {
    pub fn from_errors(errors: Vec<String>, checked_count: usize) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            checked_count,
        }
    }
}
