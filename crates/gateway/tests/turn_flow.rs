//! End-to-end turn scenarios against in-memory collaborators.

use std::sync::Arc;
use std::time::Instant;

use chrono::Duration as ChronoDuration;

use atrium_artifacts::{ArtifactStore, MemBlobStore};
use atrium_auth::{TenantDirectory, TenantResolver, TokenMinter};
use atrium_cache::TtlCache;
use atrium_dialog::{ConversationStore, GoalStatus, GoalStore, GoalType};
use atrium_domain::cancel::CancelToken;
use atrium_domain::config::Config;
use atrium_domain::identity::{CallerIdentity, Role, TenantRecord};
use atrium_domain::tool::ToolCall;
use atrium_llm::{ChatCompletion, ScriptedChatClient};
use atrium_telemetry::{Emitter, Observer};
use atrium_tools::catalog::build_registry;
use atrium_tools::{MemoryCrmResource, ResourceMethod, ResourceResponse, ToolExecutor};

use atrium_gateway::runtime::turn_lock::TurnLockMap;
use atrium_gateway::runtime::{run_turn, TurnInput};
use atrium_gateway::state::AppState;

const SECRET: &str = "turn-flow-test-secret-turn-flow-test";
const TENANT: &str = "6a7bbf34-36b9-4b73-a0f4-6d5db1c33c96";

struct Fixture {
    state: AppState,
    resource: Arc<MemoryCrmResource>,
    llm: Arc<ScriptedChatClient>,
}

fn fixture(responses: Vec<ChatCompletion>) -> Fixture {
    fixture_with_emitter(responses, Emitter::disabled())
}

fn fixture_with_emitter(responses: Vec<ChatCompletion>, emitter: Emitter) -> Fixture {
    let config = Arc::new(Config::default());
    let resource = Arc::new(MemoryCrmResource::new());
    let cache = Arc::new(TtlCache::new());
    let artifacts = Arc::new(ArtifactStore::in_memory(Arc::new(MemBlobStore::new())));
    let llm = Arc::new(ScriptedChatClient::new(responses));

    let directory = Arc::new(TenantDirectory::new());
    directory.register(TenantRecord {
        uuid: TENANT.parse().unwrap(),
        slug: "acme".into(),
        name: "Acme Corp".into(),
    });

    let executor = Arc::new(ToolExecutor::new(
        build_registry(),
        resource.clone(),
        cache.clone(),
        Arc::new(TokenMinter::new(SECRET)),
        artifacts.clone(),
        emitter.clone(),
        &config,
    ));

    let state = AppState {
        config,
        resolver: Arc::new(TenantResolver::new(directory, uuid::Uuid::nil())),
        llm: llm.clone(),
        cache,
        artifacts,
        goals: Arc::new(GoalStore::new()),
        conversations: Arc::new(ConversationStore::new()),
        executor,
        turn_locks: Arc::new(TurnLockMap::new()),
        emitter,
        observer: Arc::new(Observer::new(100)),
        sidecar: None,
        started_at: Instant::now(),
    };

    Fixture {
        state,
        resource,
        llm,
    }
}

fn input(conversation: &str, text: &str) -> TurnInput {
    TurnInput {
        conversation_id: conversation.into(),
        tenant_id: "acme".into(),
        user_text: text.into(),
        caller: CallerIdentity::new("u1", "u1@acme.test", Role::Employee, uuid::Uuid::nil()),
        temperature: None,
    }
}

fn tool_call(id: &str, name: &str, args: serde_json::Value) -> ToolCall {
    ToolCall {
        call_id: id.into(),
        tool_name: name.into(),
        arguments: args,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario: schedule-call happy path
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn schedule_call_happy_path() {
    let f = fixture(vec![]);
    f.resource.stub(
        ResourceMethod::Get,
        "/api/leads/search",
        ResourceResponse::ok(serde_json::json!({"leads": [{"id": "l1", "name": "John Smith"}]})),
    );

    // Turn 1: goal created, pending confirmation.
    let outcome = run_turn(
        &f.state,
        input("c1", "Schedule a call with John Smith tomorrow at 2pm"),
        CancelToken::new(),
    )
    .await
    .unwrap();

    let goal = outcome.goal.expect("goal should be active");
    assert_eq!(goal.goal_type, GoalType::ScheduleCall);
    assert_eq!(goal.status, GoalStatus::PendingConfirmation);
    assert_eq!(goal.extracted.lead.as_deref(), Some("John Smith"));

    let tomorrow = chrono::Local::now().date_naive() + ChronoDuration::days(1);
    let dt = goal.extracted.date_time.expect("date_time slot filled");
    assert_eq!(dt.date, tomorrow);
    assert_eq!(dt.hhmm(), "14:00");

    assert!(outcome.reply.contains("I'll schedule a call with John Smith"));
    assert!(outcome.reply.contains("at 14:00"));
    assert!(outcome.reply.contains("Should I proceed?"));

    // Turn 2: confirmation executes the action exactly once and clears
    // the goal.
    let outcome = run_turn(&f.state, input("c1", "yes"), CancelToken::new())
        .await
        .unwrap();
    assert!(outcome.goal.is_none());
    assert!(f.state.goals.get_active_goal("c1").is_none());
    assert!(outcome.reply.contains("scheduled a call with John Smith"));
    assert_eq!(f.resource.calls_to("/api/activities/calls"), 1);

    // The LLM was never needed.
    assert!(f.llm.seen_requests().is_empty());
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario: reschedule path
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn reschedule_updates_time_and_reconfirms() {
    let f = fixture(vec![]);
    run_turn(
        &f.state,
        input("c1", "Schedule a call with John Smith tomorrow at 2pm"),
        CancelToken::new(),
    )
    .await
    .unwrap();

    let outcome = run_turn(
        &f.state,
        input("c1", "reschedule for tomorrow at 3pm"),
        CancelToken::new(),
    )
    .await
    .unwrap();

    let goal = outcome.goal.expect("goal survives reschedule");
    assert_eq!(goal.status, GoalStatus::PendingConfirmation);
    let dt = goal.extracted.date_time.unwrap();
    assert_eq!(dt.hhmm(), "15:00");
    assert_eq!(
        dt.date,
        chrono::Local::now().date_naive() + ChronoDuration::days(1)
    );
    assert!(outcome.reply.contains("15:00"));
}

#[tokio::test]
async fn reschedule_without_time_proposes_next_slot() {
    let f = fixture(vec![]);
    run_turn(
        &f.state,
        input("c1", "Schedule a call with John Smith tomorrow at 2pm"),
        CancelToken::new(),
    )
    .await
    .unwrap();

    let outcome = run_turn(
        &f.state,
        input("c1", "can we change the time"),
        CancelToken::new(),
    )
    .await
    .unwrap();

    let goal = outcome.goal.unwrap();
    assert_eq!(goal.extracted.date_time.unwrap().hhmm(), "15:00");
    assert!(outcome.reply.contains("15:00"));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario: cancellation and slot filling
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn cancel_clears_the_goal_without_executing() {
    let f = fixture(vec![]);
    run_turn(
        &f.state,
        input("c1", "Schedule a call with John Smith tomorrow at 2pm"),
        CancelToken::new(),
    )
    .await
    .unwrap();

    let outcome = run_turn(&f.state, input("c1", "no, cancel it"), CancelToken::new())
        .await
        .unwrap();
    assert!(outcome.goal.is_none());
    assert!(f.state.goals.get_active_goal("c1").is_none());
    assert_eq!(f.resource.calls_to("/api/activities/calls"), 0);
}

#[tokio::test]
async fn missing_slots_are_prompted_then_filled() {
    let f = fixture(vec![]);

    // No lead, no time.
    let outcome = run_turn(&f.state, input("c1", "set up a call"), CancelToken::new())
        .await
        .unwrap();
    let goal = outcome.goal.unwrap();
    assert_eq!(goal.status, GoalStatus::AwaitingInput);
    assert!(outcome.reply.to_lowercase().contains("who"));

    // Provide both in one reply.
    let outcome = run_turn(
        &f.state,
        input("c1", "with Maria Garcia tomorrow at 11am"),
        CancelToken::new(),
    )
    .await
    .unwrap();
    let goal = outcome.goal.unwrap();
    assert_eq!(goal.status, GoalStatus::PendingConfirmation);
    assert_eq!(goal.extracted.lead.as_deref(), Some("Maria Garcia"));
    assert_eq!(goal.extracted.date_time.unwrap().hhmm(), "11:00");
}

#[tokio::test]
async fn unclear_reply_reminds_about_the_goal() {
    let f = fixture(vec![]);
    run_turn(
        &f.state,
        input("c1", "Schedule a call with John Smith tomorrow at 2pm"),
        CancelToken::new(),
    )
    .await
    .unwrap();

    let outcome = run_turn(&f.state, input("c1", "hmm"), CancelToken::new())
        .await
        .unwrap();
    assert!(outcome.goal.is_some());
    assert!(outcome.reply.contains("middle of something"));
    assert!(f.llm.seen_requests().is_empty());
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario: stateless path, cache hit, write invalidation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn stateless_cache_miss_then_hit() {
    let f = fixture(vec![
        ChatCompletion::with_tool_calls(
            "",
            vec![tool_call("tc_1", "list_leads", serde_json::json!({"limit": 25}))],
        ),
        ChatCompletion::text("You have 2 leads."),
        ChatCompletion::with_tool_calls(
            "",
            vec![tool_call("tc_2", "list_leads", serde_json::json!({"limit": 25}))],
        ),
        ChatCompletion::text("Still 2 leads."),
    ]);
    f.resource.stub(
        ResourceMethod::Get,
        "/api/leads",
        ResourceResponse::ok(serde_json::json!({"leads": [{"name": "A"}, {"name": "B"}]})),
    );

    let first = run_turn(&f.state, input("c1", "how many leads do we have"), CancelToken::new())
        .await
        .unwrap();
    assert_eq!(first.reply, "You have 2 leads.");
    assert_eq!(first.tool_events.len(), 1);
    assert_eq!(first.tool_events[0].cache, "miss");

    let second = run_turn(&f.state, input("c1", "and now?"), CancelToken::new())
        .await
        .unwrap();
    assert_eq!(second.tool_events[0].cache, "hit");

    // One resource round trip across both turns.
    assert_eq!(f.resource.calls_to("/api/leads"), 1);
    let stats = f.state.cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
}

#[tokio::test]
async fn write_between_reads_forces_refetch() {
    let f = fixture(vec![
        ChatCompletion::with_tool_calls(
            "",
            vec![tool_call("tc_1", "list_leads", serde_json::json!({}))],
        ),
        ChatCompletion::text("2 leads."),
        ChatCompletion::with_tool_calls(
            "",
            vec![tool_call("tc_2", "create_lead", serde_json::json!({"name": "New Co"}))],
        ),
        ChatCompletion::text("Created."),
        ChatCompletion::with_tool_calls(
            "",
            vec![tool_call("tc_3", "list_leads", serde_json::json!({}))],
        ),
        ChatCompletion::text("3 leads."),
    ]);

    run_turn(&f.state, input("c1", "how many leads?"), CancelToken::new())
        .await
        .unwrap();
    run_turn(
        &f.state,
        input("c1", "add a lead called New Co please"),
        CancelToken::new(),
    )
    .await
    .unwrap();
    let third = run_turn(&f.state, input("c1", "how many now?"), CancelToken::new())
        .await
        .unwrap();

    // The write invalidated the leads module; the next read re-fetches.
    assert_eq!(third.tool_events[0].cache, "miss");
    let list_fetches = f
        .resource
        .calls()
        .iter()
        .filter(|c| c.path == "/api/leads" && c.method == ResourceMethod::Get)
        .count();
    assert_eq!(list_fetches, 2);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario: role propagation and destructive deny
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn internal_token_preserves_employee_role() {
    let f = fixture(vec![
        ChatCompletion::with_tool_calls(
            "",
            vec![tool_call("tc_1", "list_leads", serde_json::json!({}))],
        ),
        ChatCompletion::text("done"),
    ]);

    run_turn(&f.state, input("c1", "show my pipeline"), CancelToken::new())
        .await
        .unwrap();

    let calls = f.resource.calls();
    assert_eq!(calls.len(), 1);
    let resolved = TokenMinter::new(SECRET).resolve(&calls[0].token).unwrap();
    assert_eq!(resolved.role, Role::Employee);
    assert!(resolved.internal);
    assert_eq!(resolved.tenant_uuid, TENANT.parse::<uuid::Uuid>().unwrap());
}

#[tokio::test]
async fn destructive_tool_request_is_denied_not_executed() {
    let f = fixture(vec![
        ChatCompletion::with_tool_calls(
            "",
            vec![tool_call("tc_1", "delete_lead", serde_json::json!({"lead_id": "l1"}))],
        ),
        ChatCompletion::text("I can't do that here."),
    ]);

    let outcome = run_turn(
        &f.state,
        input("c1", "please remove that lead record"),
        CancelToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.tool_events.len(), 1);
    assert!(outcome.tool_events[0].is_error);
    assert_eq!(f.resource.call_count(), 0);
    // The turn still completes with an assistant reply.
    assert_eq!(outcome.reply, "I can't do that here.");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario: telemetry correlation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn run_events_share_one_trace() {
    let dir = tempfile::tempdir().unwrap();
    let sink = dir.path().join("events.ndjson");
    let (emitter, writer) = Emitter::to_sink(&sink);

    let f = fixture_with_emitter(
        vec![
            ChatCompletion::with_tool_calls(
                "",
                vec![tool_call("tc_1", "list_leads", serde_json::json!({}))],
            ),
            ChatCompletion::text("2 leads."),
        ],
        emitter,
    );

    run_turn(&f.state, input("c1", "how many leads?"), CancelToken::new())
        .await
        .unwrap();

    drop(f);
    writer.drain().await;

    let raw = std::fs::read_to_string(&sink).unwrap();
    let events: Vec<serde_json::Value> = raw
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();

    let types: Vec<&str> = events.iter().map(|e| e["type"].as_str().unwrap()).collect();
    assert_eq!(types.first(), Some(&"run_started"));
    assert_eq!(types.last(), Some(&"run_finished"));
    assert!(types.contains(&"tool_call_started"));
    assert!(types.contains(&"tool_call_finished"));

    let run_started = &events[0];
    let run_id = run_started["run_id"].as_str().unwrap();
    let root_span = run_started["span_id"].as_str().unwrap();

    for event in &events {
        assert_eq!(event["trace_id"].as_str().unwrap(), run_id, "trace == run");
        assert_eq!(event["_telemetry"], true);
    }

    let tool_started = events
        .iter()
        .find(|e| e["type"] == "tool_call_started")
        .unwrap();
    let tool_finished = events
        .iter()
        .find(|e| e["type"] == "tool_call_finished")
        .unwrap();
    assert_eq!(tool_started["parent_span_id"].as_str().unwrap(), root_span);
    assert_eq!(
        tool_started["span_id"].as_str().unwrap(),
        tool_finished["span_id"].as_str().unwrap()
    );

    let run_finished = events.last().unwrap();
    assert_eq!(run_finished["span_id"].as_str().unwrap(), root_span);
    assert_eq!(run_finished["status"], "success");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Boundary behaviors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn empty_user_text_gets_clarification_without_llm() {
    let f = fixture(vec![]);
    let outcome = run_turn(&f.state, input("c1", "   "), CancelToken::new())
        .await
        .unwrap();
    assert!(outcome.goal.is_none());
    assert!(outcome.reply.contains("didn't catch that"));
    assert!(f.llm.seen_requests().is_empty());
}

#[tokio::test]
async fn unknown_tenant_is_rejected_before_the_run() {
    let f = fixture(vec![]);
    let mut bad = input("c1", "hello");
    bad.tenant_id = "initech".into();
    let err = run_turn(&f.state, bad, CancelToken::new()).await.unwrap_err();
    assert!(matches!(err, atrium_domain::Error::TenantNotFound(_)));
}

#[tokio::test]
async fn expired_goal_degrades_to_stateless() {
    let f = fixture(vec![ChatCompletion::text("Happy to help.")]);
    run_turn(
        &f.state,
        input("c1", "Schedule a call with John Smith tomorrow at 2pm"),
        CancelToken::new(),
    )
    .await
    .unwrap();

    // Force expiry.
    let mut goal = f.state.goals.get_active_goal("c1").unwrap();
    goal.expires_at = chrono::Utc::now() - ChronoDuration::seconds(1);
    f.state.goals.set_active_goal(goal);

    // "yes" no longer confirms anything; the stateless path answers.
    let outcome = run_turn(&f.state, input("c1", "yes"), CancelToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.reply, "Happy to help.");
    assert_eq!(f.resource.calls_to("/api/activities/calls"), 0);
}

#[tokio::test]
async fn llm_outage_fails_the_run_with_goal_untouched() {
    // Scripted client with no responses: the first chat errors.
    let f = fixture(vec![]);
    let err = run_turn(&f.state, input("c1", "what changed today?"), CancelToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, atrium_domain::Error::LlmUnavailable(_)));
    assert!(f.state.goals.get_active_goal("c1").is_none());
}
