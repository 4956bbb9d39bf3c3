//! Content hashing for catalog documents.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Compact JSON with object keys in sorted order.
///
/// Keys are re-sorted explicitly so the output does not depend on whether
/// `serde_json` was built with `preserve_order`.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, val)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(val, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// SHA-256 hex digest of the canonical serialisation of `value`.
#[must_use]
pub fn content_hash(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(value).as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_sorts_keys() {
        let value = json!({"b": 1, "a": {"d": [1, 2], "c": "x"}});
        assert_eq!(canonical_json(&value), r#"{"a":{"c":"x","d":[1,2]},"b":1}"#);
    }

    #[test]
    fn test_hash_ignores_formatting() {
        let compact: Value =
            serde_json::from_str(r#"{"sites":[{"name":"A","e_code":200}]}"#).expect("parse");
        let pretty: Value = serde_json::from_str(
            "{\n  \"sites\": [\n    { \"e_code\": 200, \"name\": \"A\" }\n  ]\n}\n",
        )
        .expect("parse");
        assert_eq!(content_hash(&compact), content_hash(&pretty));
    }

    #[test]
    fn test_hash_detects_changes() {
        let a = json!({"sites": [{"name": "A"}]});
        let b = json!({"sites": [{"name": "B"}]});
        assert_ne!(content_hash(&a), content_hash(&b));
        assert_eq!(content_hash(&a).len(), 64);
    }
}
