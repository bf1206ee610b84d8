//! Cache key grammar and argument fingerprinting.

use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Length of the truncated hex digest in a cache key.
const FINGERPRINT_LEN: usize = 12;

/// Canonical serialization of a JSON value: object keys recursively
/// sorted, arrays in place, numbers in serde_json's stable formatting.
/// Two argument sets that differ only in key order fingerprint the same.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, k) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(k).unwrap_or_default());
                out.push(':');
                write_canonical(&map[*k], out);
            }
            out.push('}');
        }
        Value::Array(arr) => {
            out.push('[');
            for (i, item) in arr.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

/// Lowercase hex SHA-256 of the canonical serialization, truncated to 12
/// characters.
pub fn fingerprint(args: &Value) -> String {
    let canonical = canonical_json(args);
    let digest = Sha256::digest(canonical.as_bytes());
    hex::encode(digest)[..FINGERPRINT_LEN].to_string()
}

/// Full cache key: `<module>:<tenantUuid>:<tool>:<argFingerprint>`.
pub fn cache_key(module: &str, tenant: &Uuid, tool: &str, args: &Value) -> String {
    format!("{module}:{tenant}:{tool}:{}", fingerprint(args))
}

/// Key prefix owned by one module within one tenant.
pub fn module_prefix(module: &str, tenant: &Uuid) -> String {
    format!("{module}:{tenant}:")
}
