//! Integrity codec (C1)
//!
//! Canonical JSON serialization and SHA-256 checksums for AOF records and
//! snapshots. Canonicalization sorts object keys lexicographically so a
//! checksum computed by any implementation of this protocol, on any
//! platform, agrees on the same bytes.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Recursively sort object keys, preserving array order, and produce a
/// `Value` whose `serde_json::to_vec` output is deterministic.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = serde_json::Map::new();
            for (k, v) in entries {
                out.insert(k.clone(), canonicalize(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Canonical JSON bytes: sorted keys, no whitespace, deterministic across
/// platforms and serde_json versions.
pub fn canonical_bytes(value: &Value) -> Vec<u8> {
    serde_json::to_vec(&canonicalize(value)).expect("canonical JSON never fails to serialize")
}

/// Lowercase hex SHA-256 of the canonical JSON of `value`.
pub fn checksum(value: &Value) -> String {
    let bytes = canonical_bytes(value);
    let digest = Sha256::digest(&bytes);
    hex::encode(digest)
}

/// Constant-time-ish equality check for checksums (length-prefixed compare
/// is sufficient here; checksums are not secrets, only integrity tags).
pub fn checksum_matches(value: &Value, expected: &str) -> bool {
    checksum(value) == expected
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonicalization_sorts_keys() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(canonical_bytes(&a), canonical_bytes(&b));
    }

    #[test]
    fn canonicalization_is_recursive() {
        let a = json!({"outer": {"z": 1, "y": 2}});
        let b = json!({"outer": {"y": 2, "z": 1}});
        assert_eq!(checksum(&a), checksum(&b));
    }

    #[test]
    fn array_order_is_preserved() {
        let a = json!({"list": [1, 2, 3]});
        let b = json!({"list": [3, 2, 1]});
        assert_ne!(checksum(&a), checksum(&b));
    }

    #[test]
    fn checksum_detects_tampering() {
        let original = json!({"data": {"k": "v"}});
        let sum = checksum(&original);
        let tampered = json!({"data": {"k": "v2"}});
        assert!(!checksum_matches(&tampered, &sum));
    }
}
