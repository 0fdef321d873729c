//! Evaluation of declared logic invariants against recorded decision results.
//!
//! `InvariantEvaluator` checks one `Invariant` at a time against the
//! `result` value stored in a decision entry:
//!
//! - `RequiredField`: the dot-path resolves to a non-null value.
//! - `AllowedValues`: the resolved value is one of an exhaustive set.
//! - `ForbiddenPattern`: a string value does not contain the pattern.
//! - `JsonSchema`: the whole result validates against a JSON Schema document.
//! - `Custom`: a named function registered by the hosting application.
//!
//! Jurisdiction-specific logic stays out of this crate; hosts register what
//! they need through `register_rule`.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};

use lexchain_contracts::function::{Invariant, InvariantRule};

/// A caller-supplied invariant check.
///
/// Receives the full recorded result. Returns `Some(message)` when the
/// invariant is violated, `None` when it holds.
pub type CustomInvariantFn = Box<dyn Fn(&Value) -> Option<String> + Send + Sync>;

/// Evaluates spec invariants against recorded results.
pub struct InvariantEvaluator {
    custom_rules: HashMap<String, CustomInvariantFn>,
}

impl InvariantEvaluator {
    pub fn new() -> Self {
        Self {
            custom_rules: HashMap::new(),
        }
    }

    /// Register a custom check under `name`, replacing any previous one.
    ///
    /// The name must match the `function_name` of `InvariantRule::Custom`.
    pub fn register_rule(&mut self, name: impl Into<String>, f: CustomInvariantFn) {
        self.custom_rules.insert(name.into(), f);
    }

    /// Check every invariant and return one message per violation.
    pub fn violations(&self, invariants: &[Invariant], result: &Value) -> Vec<String> {
        invariants
            .iter()
            .filter_map(|inv| {
                self.evaluate(inv, result)
                    .map(|message| format!("{}: {}", inv.invariant_id, message))
            })
            .collect()
    }

    /// Check a single invariant. `None` means it holds.
    pub fn evaluate(&self, invariant: &Invariant, result: &Value) -> Option<String> {
        debug!(
            invariant_id = %invariant.invariant_id,
            description = %invariant.description,
            "evaluating invariant"
        );

        let violation = match &invariant.rule {
            InvariantRule::RequiredField { field_path } => resolve_path(result, field_path)
                .is_none()
                .then(|| format!("required field '{field_path}' is missing or null")),

            InvariantRule::AllowedValues { field_path, allowed } => {
                match resolve_path(result, field_path) {
                    None => Some(format!(
                        "field '{field_path}' is missing; cannot check allowed values"
                    )),
                    Some(actual) if allowed.contains(actual) => None,
                    Some(actual) => Some(format!(
                        "field '{field_path}' has value {actual} which is not in the allowed set"
                    )),
                }
            }

            // Only string values can carry a pattern; anything else passes.
            InvariantRule::ForbiddenPattern { field_path, pattern } => {
                resolve_path(result, field_path)
                    .and_then(Value::as_str)
                    .filter(|s| s.contains(pattern.as_str()))
                    .map(|_| format!("field '{field_path}' contains forbidden pattern '{pattern}'"))
            }

            InvariantRule::JsonSchema { schema } => match jsonschema::validator_for(schema) {
                Ok(validator) => {
                    let errors: Vec<String> = validator
                        .iter_errors(result)
                        .map(|e| format!("at '{}': {}", e.instance_path, e))
                        .collect();
                    (!errors.is_empty())
                        .then(|| format!("JSON Schema violation {}", errors.join("; ")))
                }
                Err(e) => Some(format!("invalid JSON Schema document: {e}")),
            },

            // An unregistered name is itself a violation.
            InvariantRule::Custom { function_name } => {
                match self.custom_rules.get(function_name.as_str()) {
                    Some(f) => f(result),
                    None => Some(format!(
                        "no custom rule registered for function name '{function_name}'"
                    )),
                }
            }
        };

        if let Some(message) = &violation {
            warn!(invariant_id = %invariant.invariant_id, %message, "invariant violated");
        }
        violation
    }
}

impl Default for InvariantEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve a dot-notation path (e.g. `"applicant.residency"`) against a JSON
/// value. `None` when any segment is missing or the value is JSON `null`.
pub fn resolve_path<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    let mut current = value;
    for segment in path.split('.') {
        match current.get(segment) {
            Some(v) if !v.is_null() => current = v,
            _ => return None,
        }
    }
    Some(current)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
