//! The CRM tool catalog.
//!
//! TTLs follow how fast each view goes stale: dashboards aggregate slowly
//! (300s), detail views drift little (180s), lists move with the team
//! (120s), searches faster (60s). Write tools declare the modules their
//! success dirties.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};

use atrium_domain::Result;

use crate::registry::{handler, HandlerCtx, SafetyClass, ToolRegistry, ToolSpec};
use crate::resource::{CrmResource, ResourceRequest};

/// Build the registry the executor and the LLM advertise from.
pub fn build_registry() -> ToolRegistry {
    let mut reg = ToolRegistry::new();

    // ── Leads ─────────────────────────────────────────────────────
    reg.register(ToolSpec {
        name: "list_leads",
        description: "List leads for the tenant, newest first.",
        module: "leads",
        args_schema: json!({
            "type": "object",
            "properties": {
                "limit": { "type": "integer", "description": "Max rows (default 25)" },
                "status": { "type": "string", "description": "Filter by lead status" }
            }
        }),
        safety: SafetyClass::ReadOnly {
            ttl: Some(Duration::from_secs(120)),
        },
        summarize: summarize_list,
        handler: handler(list_leads),
    });

    reg.register(ToolSpec {
        name: "search_leads",
        description: "Search leads by name, company, or email.",
        module: "leads",
        args_schema: json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search text" },
                "limit": { "type": "integer", "description": "Max rows (default 10)" }
            },
            "required": ["query"]
        }),
        safety: SafetyClass::ReadOnly {
            ttl: Some(Duration::from_secs(60)),
        },
        summarize: summarize_list,
        handler: handler(search_leads),
    });

    reg.register(ToolSpec {
        name: "get_lead",
        description: "Fetch one lead by id.",
        module: "leads",
        args_schema: json!({
            "type": "object",
            "properties": {
                "lead_id": { "type": "string", "description": "Lead id" }
            },
            "required": ["lead_id"]
        }),
        safety: SafetyClass::ReadOnly {
            ttl: Some(Duration::from_secs(180)),
        },
        summarize: summarize_record,
        handler: handler(get_lead),
    });

    reg.register(ToolSpec {
        name: "create_lead",
        description: "Create a new lead.",
        module: "leads",
        args_schema: json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Lead name" },
                "company": { "type": "string", "description": "Company name" },
                "email": { "type": "string", "description": "Contact email" },
                "phone": { "type": "string", "description": "Contact phone" }
            },
            "required": ["name"]
        }),
        safety: SafetyClass::Write {
            invalidates: vec!["leads"],
        },
        summarize: summarize_record,
        handler: handler(create_lead),
    });

    reg.register(ToolSpec {
        name: "update_lead",
        description: "Update fields on an existing lead.",
        module: "leads",
        args_schema: json!({
            "type": "object",
            "properties": {
                "lead_id": { "type": "string", "description": "Lead id" },
                "fields": { "type": "object", "description": "Fields to set" }
            },
            "required": ["lead_id", "fields"]
        }),
        safety: SafetyClass::Write {
            invalidates: vec!["leads"],
        },
        summarize: summarize_record,
        handler: handler(update_lead),
    });

    // ── Activities ────────────────────────────────────────────────
    reg.register(ToolSpec {
        name: "list_activities",
        description: "List recent activities (calls, meetings, notes) for the tenant.",
        module: "activities",
        args_schema: json!({
            "type": "object",
            "properties": {
                "limit": { "type": "integer", "description": "Max rows (default 25)" },
                "lead_id": { "type": "string", "description": "Filter by lead" }
            }
        }),
        safety: SafetyClass::ReadOnly {
            ttl: Some(Duration::from_secs(120)),
        },
        summarize: summarize_list,
        handler: handler(list_activities),
    });

    reg.register(ToolSpec {
        name: "create_activity",
        description: "Log an activity against a lead.",
        module: "activities",
        args_schema: json!({
            "type": "object",
            "properties": {
                "lead_id": { "type": "string", "description": "Lead id" },
                "kind": { "type": "string", "description": "call | meeting | note" },
                "summary": { "type": "string", "description": "What happened" }
            },
            "required": ["kind", "summary"]
        }),
        safety: SafetyClass::Write {
            invalidates: vec!["activities"],
        },
        summarize: summarize_record,
        handler: handler(create_activity),
    });

    // ── Goal actions ──────────────────────────────────────────────
    reg.register(ToolSpec {
        name: "schedule_call",
        description: "Schedule a call with a lead at a given date and time.",
        module: "activities",
        args_schema: json!({
            "type": "object",
            "properties": {
                "lead": { "type": "string", "description": "Lead name or id" },
                "date": { "type": "string", "description": "YYYY-MM-DD" },
                "time": { "type": "string", "description": "HH:MM, 24-hour" }
            },
            "required": ["lead", "date", "time"]
        }),
        safety: SafetyClass::Write {
            invalidates: vec!["activities"],
        },
        summarize: summarize_record,
        handler: handler(schedule_call),
    });

    reg.register(ToolSpec {
        name: "book_meeting",
        description: "Book a meeting with a lead at a given date and time.",
        module: "activities",
        args_schema: json!({
            "type": "object",
            "properties": {
                "lead": { "type": "string", "description": "Lead name or id" },
                "date": { "type": "string", "description": "YYYY-MM-DD" },
                "time": { "type": "string", "description": "HH:MM, 24-hour" }
            },
            "required": ["lead", "date", "time"]
        }),
        safety: SafetyClass::Write {
            invalidates: vec!["activities"],
        },
        summarize: summarize_record,
        handler: handler(book_meeting),
    });

    reg.register(ToolSpec {
        name: "send_email",
        description: "Send an email to a lead.",
        module: "activities",
        args_schema: json!({
            "type": "object",
            "properties": {
                "lead": { "type": "string", "description": "Lead name or id" },
                "subject": { "type": "string", "description": "Email subject" },
                "body": { "type": "string", "description": "Email body" }
            },
            "required": ["lead"]
        }),
        safety: SafetyClass::Write {
            invalidates: vec!["activities"],
        },
        summarize: summarize_record,
        handler: handler(send_email),
    });

    reg.register(ToolSpec {
        name: "create_reminder",
        description: "Create a reminder at a given date and time.",
        module: "activities",
        args_schema: json!({
            "type": "object",
            "properties": {
                "note": { "type": "string", "description": "What to be reminded of" },
                "date": { "type": "string", "description": "YYYY-MM-DD" },
                "time": { "type": "string", "description": "HH:MM, 24-hour" }
            },
            "required": ["date", "time"]
        }),
        safety: SafetyClass::Write {
            invalidates: vec!["activities"],
        },
        summarize: summarize_record,
        handler: handler(create_reminder),
    });

    // ── Dashboard ─────────────────────────────────────────────────
    reg.register(ToolSpec {
        name: "dashboard_summary",
        description: "Aggregated pipeline and activity numbers for the tenant.",
        module: "dashboard",
        args_schema: json!({
            "type": "object",
            "properties": {}
        }),
        safety: SafetyClass::ReadOnly {
            ttl: Some(Duration::from_secs(300)),
        },
        summarize: summarize_record,
        handler: handler(dashboard_summary),
    });

    reg
}

// ── Handlers ───────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ListArgs {
    #[serde(default)]
    limit: Option<u32>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    lead_id: Option<String>,
}

async fn list_leads(ctx: HandlerCtx) -> Result<Value> {
    let args: ListArgs = serde_json::from_value(ctx.args)?;
    let mut req =
        ResourceRequest::get("/api/leads").with_query("limit", args.limit.unwrap_or(25).to_string());
    if let Some(status) = args.status {
        req = req.with_query("status", status);
    }
    req.token = ctx.token;
    ctx.resource.request(req).await?.into_result()
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    limit: Option<u32>,
}

async fn search_leads(ctx: HandlerCtx) -> Result<Value> {
    let args: SearchArgs = serde_json::from_value(ctx.args)?;
    let mut req = ResourceRequest::get("/api/leads/search")
        .with_query("q", args.query)
        .with_query("limit", args.limit.unwrap_or(10).to_string());
    req.token = ctx.token;
    ctx.resource.request(req).await?.into_result()
}

#[derive(Deserialize)]
struct GetLeadArgs {
    lead_id: String,
}

async fn get_lead(ctx: HandlerCtx) -> Result<Value> {
    let args: GetLeadArgs = serde_json::from_value(ctx.args)?;
    let mut req = ResourceRequest::get(format!("/api/leads/{}", args.lead_id));
    req.token = ctx.token;
    ctx.resource.request(req).await?.into_result()
}

async fn create_lead(ctx: HandlerCtx) -> Result<Value> {
    let mut req = ResourceRequest::post("/api/leads", ctx.args);
    req.token = ctx.token;
    ctx.resource.request(req).await?.into_result()
}

#[derive(Deserialize)]
struct UpdateLeadArgs {
    lead_id: String,
    fields: Value,
}

async fn update_lead(ctx: HandlerCtx) -> Result<Value> {
    let args: UpdateLeadArgs = serde_json::from_value(ctx.args)?;
    let mut req = ResourceRequest::patch(format!("/api/leads/{}", args.lead_id), args.fields);
    req.token = ctx.token;
    ctx.resource.request(req).await?.into_result()
}

async fn list_activities(ctx: HandlerCtx) -> Result<Value> {
    let args: ListArgs = serde_json::from_value(ctx.args)?;
    let mut req = ResourceRequest::get("/api/activities")
        .with_query("limit", args.limit.unwrap_or(25).to_string());
    if let Some(lead_id) = args.lead_id {
        req = req.with_query("lead_id", lead_id);
    }
    req.token = ctx.token;
    ctx.resource.request(req).await?.into_result()
}

async fn create_activity(ctx: HandlerCtx) -> Result<Value> {
    let mut req = ResourceRequest::post("/api/activities", ctx.args);
    req.token = ctx.token;
    ctx.resource.request(req).await?.into_result()
}

async fn schedule_call(ctx: HandlerCtx) -> Result<Value> {
    let mut req = ResourceRequest::post("/api/activities/calls", ctx.args);
    req.token = ctx.token;
    ctx.resource.request(req).await?.into_result()
}

async fn book_meeting(ctx: HandlerCtx) -> Result<Value> {
    let mut req = ResourceRequest::post("/api/activities/meetings", ctx.args);
    req.token = ctx.token;
    ctx.resource.request(req).await?.into_result()
}

async fn send_email(ctx: HandlerCtx) -> Result<Value> {
    let mut req = ResourceRequest::post("/api/emails", ctx.args);
    req.token = ctx.token;
    ctx.resource.request(req).await?.into_result()
}

async fn create_reminder(ctx: HandlerCtx) -> Result<Value> {
    let mut req = ResourceRequest::post("/api/reminders", ctx.args);
    req.token = ctx.token;
    ctx.resource.request(req).await?.into_result()
}

async fn dashboard_summary(ctx: HandlerCtx) -> Result<Value> {
    let mut req = ResourceRequest::get("/api/dashboard/summary");
    req.token = ctx.token;
    ctx.resource.request(req).await?.into_result()
}

// ── Summaries ──────────────────────────────────────────────────────

fn summarize_list(result: &Value) -> String {
    // Resource list payloads carry their rows under the first array field.
    if let Some(obj) = result.as_object() {
        for (key, value) in obj {
            if let Some(arr) = value.as_array() {
                return format!("{} {key}", arr.len());
            }
        }
    }
    if let Some(arr) = result.as_array() {
        return format!("{} rows", arr.len());
    }
    preview(result)
}

fn summarize_record(result: &Value) -> String {
    preview(result)
}

fn preview(result: &Value) -> String {
    let s = result.to_string();
    if s.len() <= 200 {
        s
    } else {
        let mut end = 200;
        while !s.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{MemoryCrmResource, ResourceMethod, ResourceResponse};
    use std::sync::Arc;
    use uuid::Uuid;

    #[test]
    fn catalog_has_the_expected_surface() {
        let reg = build_registry();
        for name in [
            "list_leads",
            "search_leads",
            "get_lead",
            "create_lead",
            "update_lead",
            "list_activities",
            "create_activity",
            "schedule_call",
            "book_meeting",
            "send_email",
            "create_reminder",
            "dashboard_summary",
        ] {
            assert!(reg.get(name).is_some(), "missing {name}");
        }
        assert_eq!(reg.len(), 12);
    }

    #[test]
    fn read_only_ttls_fall_in_band() {
        let reg = build_registry();
        for name in ["list_leads", "search_leads", "get_lead", "list_activities", "dashboard_summary"] {
            match &reg.get(name).unwrap().safety {
                SafetyClass::ReadOnly { ttl: Some(ttl) } => {
                    assert!(
                        (10..=300).contains(&ttl.as_secs()),
                        "{name} ttl out of band"
                    );
                }
                _ => panic!("{name} should be read-only with explicit ttl"),
            }
        }
    }

    #[test]
    fn writes_invalidate_their_module() {
        let reg = build_registry();
        match &reg.get("create_lead").unwrap().safety {
            SafetyClass::Write { invalidates } => assert_eq!(invalidates, &vec!["leads"]),
            _ => panic!("create_lead should be a write"),
        }
    }

    #[tokio::test]
    async fn search_handler_threads_token_and_query() {
        let resource = Arc::new(MemoryCrmResource::new());
        resource.stub(
            ResourceMethod::Get,
            "/api/leads/search",
            ResourceResponse::ok(json!({"leads": [{"name": "John Smith"}]})),
        );

        let reg = build_registry();
        let spec = reg.get("search_leads").unwrap();
        let ctx = HandlerCtx {
            resource: resource.clone(),
            token: "internal-token".into(),
            tenant: Uuid::new_v4(),
            args: json!({"query": "john"}),
        };
        let result = (spec.handler)(ctx).await.unwrap();
        assert_eq!(result["leads"][0]["name"], "John Smith");

        let calls = resource.calls();
        assert_eq!(calls[0].token, "internal-token");
        assert!(calls[0].query.iter().any(|(k, v)| k == "q" && v == "john"));
    }

    #[test]
    fn list_summary_counts_rows() {
        assert_eq!(summarize_list(&json!({"leads": [1, 2, 3]})), "3 leads");
        assert_eq!(summarize_list(&json!([1, 2])), "2 rows");
        assert_eq!(summarize_list(&json!({"total": 9})), "{\"total\":9}");
    }
}
