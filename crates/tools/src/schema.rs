//! Minimal JSON-schema argument validation.
//!
//! Covers what the tool catalog actually declares: top-level object shape,
//! `required` keys, and primitive `type` checks per property. Handlers do
//! their own typed deserialization after this gate passes.

use serde_json::Value;

use atrium_domain::{Error, Result};

/// Validate `args` against a tool's declared schema.
pub fn validate_args(schema: &Value, args: &Value) -> Result<()> {
    if !args.is_object() {
        return Err(Error::validation("arguments", "must be a JSON object"));
    }

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for key in required.iter().filter_map(|k| k.as_str()) {
            let present = args.get(key).map_or(false, |v| !v.is_null());
            if !present {
                return Err(Error::validation(key, "missing required argument"));
            }
        }
    }

    if let Some(props) = schema.get("properties").and_then(|p| p.as_object()) {
        for (key, prop_schema) in props {
            let Some(value) = args.get(key) else { continue };
            if value.is_null() {
                continue;
            }
            if let Some(expected) = prop_schema.get("type").and_then(|t| t.as_str()) {
                if !type_matches(expected, value) {
                    return Err(Error::validation(
                        key.as_str(),
                        format!("expected {expected}"),
                    ));
                }
            }
        }
    }

    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "limit": {"type": "integer"},
                "include_closed": {"type": "boolean"}
            },
            "required": ["query"]
        })
    }

    #[test]
    fn accepts_valid_args() {
        assert!(validate_args(&schema(), &json!({"query": "john", "limit": 5})).is_ok());
    }

    #[test]
    fn missing_required_is_rejected() {
        let err = validate_args(&schema(), &json!({"limit": 5})).unwrap_err();
        assert!(err.to_string().contains("query"));
    }

    #[test]
    fn null_required_counts_as_missing() {
        assert!(validate_args(&schema(), &json!({"query": null})).is_err());
    }

    #[test]
    fn wrong_type_is_rejected() {
        assert!(validate_args(&schema(), &json!({"query": 42})).is_err());
        assert!(validate_args(&schema(), &json!({"query": "x", "limit": "five"})).is_err());
    }

    #[test]
    fn extra_keys_pass_through() {
        assert!(validate_args(&schema(), &json!({"query": "x", "unknown": true})).is_ok());
    }

    #[test]
    fn non_object_args_are_rejected() {
        assert!(validate_args(&schema(), &json!([1, 2])).is_err());
        assert!(validate_args(&schema(), &json!("text")).is_err());
    }
}
