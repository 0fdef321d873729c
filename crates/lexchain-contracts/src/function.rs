//! Decision-function specifications as served by the function store.
//!
//! A `FunctionSpec` is the current source of truth for one version of a
//! decision function. The auditor compares historical ledger entries against
//! it: the recorded spec hash, the release signatures, the legal basis, and
//! the invariants every decision output must satisfy.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The current specification of one decision-function version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub function_id: String,
    pub version: String,
    /// Canonical digest of the specification body, lowercase hex.
    pub hash: String,
    /// Release signatures collected for this version.
    #[serde(default)]
    pub signatures: Vec<SpecSignature>,
    /// The legal basis the function implements.
    #[serde(default)]
    pub legal_reference: Option<LegalReference>,
    /// Properties every recorded decision output must satisfy.
    #[serde(default)]
    pub invariants: Vec<Invariant>,
}

impl FunctionSpec {
    /// True if a signature with the given role is present.
    pub fn has_role(&self, role: SignerRole) -> bool {
        self.signatures.iter().any(|s| s.role == role)
    }
}

/// The role a release signer held when signing a spec version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignerRole {
    /// The function owner who authored the release.
    Owner,
    /// An independent reviewer.
    Reviewer,
    /// Any additional approver (legal, compliance).
    Approver,
}

/// A single release signature over a spec version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecSignature {
    pub signer: String,
    pub role: SignerRole,
    pub signature: String,
}

/// The naming authority whose URI grammar a legal reference follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegalAuthority {
    /// European Legislation Identifier (`https://<host>/eli/...`).
    Eli,
    /// EUR-Lex CELEX number, bare or as a `CELEX:` URI.
    Celex,
}

/// A pointer from a decision function to the legislation it implements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegalReference {
    pub authority: LegalAuthority,
    pub uri: String,
}

/// A declared property of a decision function's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invariant {
    /// Identifier referenced in findings.
    pub invariant_id: String,
    pub description: String,
    pub rule: InvariantRule,
}

/// The kinds of invariants the auditor can check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvariantRule {
    /// The field at `field_path` (dot notation) must be present and non-null.
    RequiredField { field_path: String },

    /// The field at `field_path` must equal one of `allowed`.
    AllowedValues {
        field_path: String,
        allowed: Vec<Value>,
    },

    /// The string field at `field_path` must not contain `pattern`.
    ForbiddenPattern { field_path: String, pattern: String },

    /// The whole result must validate against a JSON Schema document.
    JsonSchema { schema: Value },

    /// Delegate to a check registered by name with the invariant evaluator.
    Custom { function_name: String },
}
