//! Deterministic JSON serialization and hashing

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Nesting deeper than this serializes as `null`
pub const MAX_STABLE_DEPTH: usize = 32;

/// Serializes `value` with object keys sorted at every level
///
/// Arrays keep their order. Values nested beyond [`MAX_STABLE_DEPTH`] are
/// written as `null`, so the output is always finite.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use sumi_reader::cache::stable_stringify;
///
/// let a = stable_stringify(&json!({"b": 1, "a": [2, 1]}));
/// let b = stable_stringify(&json!({"a": [2, 1], "b": 1}));
/// assert_eq!(a, b);
/// assert_eq!(a, r#"{"a":[2,1],"b":1}"#);
/// ```
pub fn stable_stringify(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, 0, &mut out);
    out
}

fn write_value(value: &Value, depth: usize, out: &mut String) {
    if depth > MAX_STABLE_DEPTH {
        out.push_str("null");
        return;
    }

    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                if let Some(child) = map.get(key) {
                    write_value(child, depth + 1, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, depth + 1, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Lowercase hex SHA-256 of `bytes`
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Hash of the stable serialization of `value`
pub fn stable_hash(value: &Value) -> String {
    sha256_hex(stable_stringify(value).as_bytes())
}
