//! Canonical telemetry event shape and sanitization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::context::CorrelationCtx;

/// Hard caps applied to every event before it reaches the sink.
const MAX_STRING_CHARS: usize = 2000;
const MAX_ARRAY_ELEMS: usize = 50;
const MAX_OBJECT_KEYS: usize = 80;

/// The frozen set of canonical event types, plus the synthetic
/// `system_reset` the observer emits on buffer clears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RunStarted,
    RunFinished,
    AgentRegistered,
    AgentSpawned,
    AgentRetired,
    AgentStatus,
    TaskCreated,
    TaskEnqueued,
    TaskAssigned,
    TaskStarted,
    TaskBlocked,
    TaskCompleted,
    TaskFailed,
    Handoff,
    MessageSent,
    MessageReceived,
    ToolCallStarted,
    ToolCallFinished,
    ToolCallFailed,
    ArtifactCreated,
    ArtifactUpdated,
    SystemReset,
}

/// A single telemetry event as written to the sink and fanned out on the
/// bus. Type-specific payload fields live in `fields` and are flattened
/// into the JSON object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    #[serde(rename = "_telemetry")]
    pub telemetry: bool,
    pub ts: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub run_id: Uuid,
    pub trace_id: Uuid,
    pub span_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<Uuid>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl TelemetryEvent {
    pub fn new(event_type: EventType, ctx: &CorrelationCtx) -> Self {
        Self {
            telemetry: true,
            ts: Utc::now(),
            event_type,
            run_id: ctx.run_id,
            trace_id: ctx.trace_id,
            span_id: ctx.span_id,
            parent_span_id: ctx.parent_span_id,
            tenant_id: None,
            fields: Map::new(),
        }
    }

    pub fn tenant(mut self, tenant: Uuid) -> Self {
        self.tenant_id = Some(tenant);
        self
    }

    /// Attach a payload field. Null values are dropped (the wire format
    /// has no notion of an explicitly-absent field).
    pub fn field(mut self, key: &str, value: impl Serialize) -> Self {
        let v = serde_json::to_value(value).unwrap_or(Value::Null);
        if !v.is_null() {
            self.fields.insert(key.to_string(), v);
        }
        self
    }

    /// Enforce the size caps on every payload field.
    pub fn sanitize(mut self) -> Self {
        let mut fields = std::mem::take(&mut self.fields);
        if fields.len() > MAX_OBJECT_KEYS {
            let keep: Vec<String> = fields.keys().take(MAX_OBJECT_KEYS).cloned().collect();
            fields.retain(|k, _| keep.contains(k));
        }
        for (_, v) in fields.iter_mut() {
            sanitize_value(v, 0);
        }
        fields.retain(|_, v| !v.is_null());
        self.fields = fields;
        self
    }
}

fn sanitize_value(v: &mut Value, depth: usize) {
    // Guard against pathological nesting.
    if depth > 8 {
        *v = Value::Null;
        return;
    }
    match v {
        Value::String(s) => {
            if s.chars().count() > MAX_STRING_CHARS {
                *s = s.chars().take(MAX_STRING_CHARS).collect();
            }
        }
        Value::Array(arr) => {
            arr.truncate(MAX_ARRAY_ELEMS);
            for item in arr.iter_mut() {
                sanitize_value(item, depth + 1);
            }
        }
        Value::Object(map) => {
            if map.len() > MAX_OBJECT_KEYS {
                let keep: Vec<String> = map.keys().take(MAX_OBJECT_KEYS).cloned().collect();
                map.retain(|k, _| keep.contains(k));
            }
            for (_, item) in map.iter_mut() {
                sanitize_value(item, depth + 1);
            }
            map.retain(|_, item| !item.is_null());
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> CorrelationCtx {
        CorrelationCtx::root()
    }

    #[test]
    fn event_carries_marker_and_correlation() {
        let c = ctx();
        let ev = TelemetryEvent::new(EventType::RunStarted, &c);
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["_telemetry"], true);
        assert_eq!(json["type"], "run_started");
        assert_eq!(json["run_id"], c.run_id.to_string());
        assert_eq!(json["trace_id"], c.run_id.to_string());
    }

    #[test]
    fn null_fields_are_dropped() {
        let ev = TelemetryEvent::new(EventType::AgentStatus, &ctx())
            .field("status", "idle")
            .field("detail", Option::<String>::None);
        assert!(ev.fields.contains_key("status"));
        assert!(!ev.fields.contains_key("detail"));
    }

    #[test]
    fn sanitize_caps_long_strings() {
        let long = "x".repeat(5000);
        let ev = TelemetryEvent::new(EventType::ToolCallFinished, &ctx())
            .field("output_summary", long)
            .sanitize();
        let s = ev.fields["output_summary"].as_str().unwrap();
        assert_eq!(s.chars().count(), 2000);
    }

    #[test]
    fn sanitize_caps_arrays_and_nested_objects() {
        let big_array: Vec<u32> = (0..200).collect();
        let mut nested = serde_json::Map::new();
        for i in 0..100 {
            nested.insert(format!("k{i}"), serde_json::json!(i));
        }
        let ev = TelemetryEvent::new(EventType::TaskCompleted, &ctx())
            .field("items", big_array)
            .field("meta", Value::Object(nested))
            .sanitize();
        assert_eq!(ev.fields["items"].as_array().unwrap().len(), 50);
        assert_eq!(ev.fields["meta"].as_object().unwrap().len(), 80);
    }

    #[test]
    fn sanitize_caps_field_count() {
        let mut ev = TelemetryEvent::new(EventType::AgentStatus, &ctx());
        for i in 0..120 {
            ev = ev.field(&format!("f{i}"), i);
        }
        let ev = ev.sanitize();
        assert_eq!(ev.fields.len(), 80);
    }

    #[test]
    fn event_type_round_trips_snake_case() {
        let t: EventType = serde_json::from_str("\"tool_call_failed\"").unwrap();
        assert_eq!(t, EventType::ToolCallFailed);
        assert_eq!(
            serde_json::to_string(&EventType::SystemReset).unwrap(),
            "\"system_reset\""
        );
    }
}
