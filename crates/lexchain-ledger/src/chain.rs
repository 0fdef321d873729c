//! Hash-chain primitives: canonical encoding, digests, and chain walks.
//!
//! Digest input layout:
//!
//! ```text
//! SHA-256( JCS({"payload": <payload>, "previous_hash": "<64 hex>"}) )
//! ```
//!
//! JCS is the JSON Canonicalization Scheme (RFC 8785): UTF-8, object keys
//! sorted by code point, no insignificant whitespace. Numbers must be
//! integers; amounts travel as fixed-point strings and timestamps as
//! RFC 3339 strings, so the same logical payload always produces the same
//! bytes regardless of platform or in-memory field order.

use serde::Serialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use lexchain_contracts::{
    entry::{EntryPayload, IntegrityReport, TraceEntry},
    error::{LexchainError, LexchainResult},
};
use lexchain_core::traits::Signer;

/// Bytes produced exclusively by canonical encoding.
///
/// The inner buffer is private: the only way to obtain `CanonicalBytes` is
/// `CanonicalBytes::new`, so every digest goes through the same pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Canonicalize any serializable value.
    ///
    /// Returns `LexchainError::Canonicalization` if the value contains a
    /// non-integer number or cannot be serialized.
    pub fn new(value: &impl Serialize) -> LexchainResult<Self> {
        let value = serde_json::to_value(value).map_err(|e| LexchainError::Canonicalization {
            reason: format!("value is not representable as JSON: {e}"),
        })?;
        reject_floats(&value)?;
        let encoded = serde_jcs::to_string(&value).map_err(|e| LexchainError::Canonicalization {
            reason: format!("JCS serialization failed: {e}"),
        })?;
        Ok(Self(encoded.into_bytes()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

fn reject_floats(value: &Value) -> LexchainResult<()> {
    match value {
        Value::Number(n) if !n.is_i64() && !n.is_u64() => Err(LexchainError::Canonicalization {
            reason: format!("non-integer number {n} rejected; encode amounts as fixed-point strings"),
        }),
        Value::Array(items) => items.iter().try_for_each(reject_floats),
        Value::Object(map) => map.values().try_for_each(reject_floats),
        _ => Ok(()),
    }
}

/// SHA-256 of the canonical encoding of `value`, as lowercase hex.
///
/// Used for spec bodies and decision inputs.
pub fn content_digest(value: &impl Serialize) -> LexchainResult<String> {
    let bytes = CanonicalBytes::new(value)?;
    Ok(hex::encode(Sha256::digest(bytes.as_bytes())))
}

/// Compute the chain digest of an entry.
///
/// Commits to the payload (including its entry-type tag) and the hash of
/// the preceding entry. Returns a lowercase 64-character hex string.
pub fn digest(payload: &EntryPayload, previous_hash: &str) -> LexchainResult<String> {
    content_digest(&json!({
        "payload": payload,
        "previous_hash": previous_hash,
    }))
}

/// Recompute an entry's digest from its stored payload and previous hash.
pub fn recompute(entry: &TraceEntry) -> LexchainResult<String> {
    digest(entry.payload(), entry.previous_hash())
}

/// Walk `entries` in order and collect every integrity problem.
///
/// `expected_first_prev` is the hash the first entry must link to:
/// `GENESIS_HASH` for a full walk, or the true predecessor's hash when
/// verifying a sub-range. Three rules are checked per entry:
///
/// 1. **Linkage**: `previous_hash` equals the preceding entry's stored `hash`.
/// 2. **Hash correctness**: `hash` equals the digest recomputed from the
///    stored payload and `previous_hash`.
/// 3. **Signature**: when a signer is given, any signature present verifies.
///
/// The walk continues past every failure. Linkage is judged against the
/// *stored* hash of the predecessor, so a single corrupted payload yields
/// exactly one error at that entry.
pub fn verify_chain(
    entries: &[TraceEntry],
    expected_first_prev: &str,
    signer: Option<&dyn Signer>,
) -> IntegrityReport {
    let mut errors = Vec::new();
    let mut expected_prev = expected_first_prev.to_string();

    for entry in entries {
        let id = entry.entry_id();

        if entry.previous_hash() != expected_prev {
            errors.push(format!(
                "{id}: chain break, previous_hash {} does not match predecessor hash {}",
                entry.previous_hash(),
                expected_prev
            ));
        }

        match recompute(entry) {
            Ok(recomputed) if recomputed != entry.hash() => errors.push(format!(
                "{id}: hash mismatch, stored {} but payload digests to {}",
                entry.hash(),
                recomputed
            )),
            Ok(_) => {}
            Err(e) => errors.push(format!("{id}: payload cannot be re-hashed: {e}")),
        }

        if let (Some(signer), Some(signature)) = (signer, entry.signature()) {
            if !signer.verify(entry.hash(), signature) {
                errors.push(format!("{id}: signature does not verify against entry hash"));
            }
        }

        expected_prev = entry.hash().to_string();
    }

    IntegrityReport::from_errors(errors, entries.len())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use lexchain_contracts::entry::{
        EntryId, EntryPayload, SystemEvent, TraceEntry, GENESIS_HASH,
    };

    use super::*;

    fn system(message: &str) -> EntryPayload {
        EntryPayload::SystemEvent(SystemEvent {
            component: "scheduler".to_string(),
            message: message.to_string(),
        })
    }

    fn build_chain(messages: &[&str]) -> Vec<TraceEntry> {
        let mut prev = GENESIS_HASH.to_string();
        let mut out = Vec::new();
        for (i, m) in messages.iter().enumerate() {
            let payload = system(m);
            let hash = digest(&payload, &prev).unwrap();
            out.push(TraceEntry::from_parts(
                EntryId::new(i as u64 + 1),
                Utc::now(),
                payload,
                prev.clone(),
                hash.clone(),
                None,
            ));
            prev = hash;
        }
        out
    }

    #[test]
    fn canonical_bytes_sort_keys_and_drop_whitespace() {
        let cb = CanonicalBytes::new(&json!({ "b": 2, "a": { "d": 1, "c": "x" } })).unwrap();
        assert_eq!(cb.as_bytes(), br#"{"a":{"c":"x","d":1},"b":2}"#);
    }

    #[test]
    fn floats_are_rejected_at_any_depth() {
        let result = CanonicalBytes::new(&json!({ "amount": { "value": [1, 2.5] } }));
        match result {
            Err(LexchainError::Canonicalization { reason }) => {
                assert!(reason.contains("2.5"), "unexpected reason: {reason}");
            }
            other => panic!("expected Canonicalization error, got {:?}", other),
        }
    }

    #[test]
    fn digest_is_hex_and_depends_on_previous_hash() {
        let payload = system("boot");
        let a = digest(&payload, GENESIS_HASH).unwrap();
        let b = digest(&payload, &"1".repeat(64)).unwrap();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(a, b);
        assert_ne!(a, GENESIS_HASH);
    }

    #[test]
    fn digest_ignores_insertion_order() {
        let mut first = serde_json::Map::new();
        first.insert("zeta".to_string(), json!(1));
        first.insert("alpha".to_string(), json!({ "y": "2", "x": "1" }));

        let mut second = serde_json::Map::new();
        second.insert("alpha".to_string(), json!({ "x": "1", "y": "2" }));
        second.insert("zeta".to_string(), json!(1));

        assert_eq!(
            content_digest(&serde_json::Value::Object(first)).unwrap(),
            content_digest(&serde_json::Value::Object(second)).unwrap()
        );
    }

    #[test]
    fn verify_chain_accepts_untouched_chain() {
        let chain = build_chain(&["a", "b", "c"]);
        let report = verify_chain(&chain, GENESIS_HASH, None);
        assert!(report.valid, "errors: {:?}", report.errors);
        assert_eq!(report.checked_count, 3);
    }

    #[test]
    fn verify_chain_empty_is_valid() {
        let report = verify_chain(&[], GENESIS_HASH, None);
        assert!(report.valid);
        assert_eq!(report.checked_count, 0);
    }

    #[test]
    fn verify_chain_reports_wrong_anchor() {
        let chain = build_chain(&["a", "b"]);
        let report = verify_chain(&chain[1..], GENESIS_HASH, None);
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("tr-000000000002"));
        assert!(report.errors[0].contains("chain break"));

        let anchored = verify_chain(&chain[1..], chain[0].hash(), None);
        assert!(anchored.valid);
    }
}
