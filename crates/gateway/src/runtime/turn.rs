//! One conversation turn, end to end.
//!
//! Goal path first: an active goal consumes the utterance. Otherwise a
//! detected intent opens a goal. Everything else runs the stateless loop:
//! LLM call, tool dispatch, repeat until a terminal assistant message or
//! the per-turn tool budget runs out.

use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use atrium_dialog::{detect_intent, ConversationMessage};
use atrium_domain::cancel::CancelToken;
use atrium_domain::identity::CallerIdentity;
use atrium_domain::tool::{ChatContent, ChatMessage, ChatRole, ContentPart, ToolCall};
use atrium_domain::{Error, Result};
use atrium_llm::{ChatClient, ChatRequest};
use atrium_telemetry::CorrelationCtx;

use super::{goal_flow, truncate_str};
use crate::state::AppState;

/// Inlined tool results in the working window are capped to the tool
/// summary budget; the window policy re-checks at the adapter.
const INLINE_RESULT_CHARS: usize = 1200;

/// Input to a single turn.
#[derive(Debug, Clone)]
pub struct TurnInput {
    pub conversation_id: String,
    /// Tenant identifier as received: slug or UUID.
    pub tenant_id: String,
    pub user_text: String,
    pub caller: CallerIdentity,
    pub temperature: Option<f32>,
}

/// One tool invocation as seen by the caller of `/ai/chat`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolEvent {
    pub tool_name: String,
    pub cache: String,
    pub is_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_ref: Option<String>,
}

/// What one turn produced.
#[derive(Debug)]
pub struct TurnOutcome {
    pub run_id: Uuid,
    pub reply: String,
    pub goal: Option<atrium_dialog::Goal>,
    pub tool_events: Vec<ToolEvent>,
}

/// Run one turn. `run_started`/`run_finished` bracket everything,
/// including failures; goal state is left unmodified on a core-path
/// error.
pub async fn run_turn(
    state: &AppState,
    input: TurnInput,
    cancel: CancelToken,
) -> Result<TurnOutcome> {
    // Tenant resolution precedes the run: an unknown tenant is a caller
    // error, not a failed run.
    let tenant = state.resolver.resolve(&input.tenant_id)?;
    let mut caller = input.caller.clone();
    caller.tenant_uuid = tenant.uuid;

    let ctx = CorrelationCtx::root();
    cancel.bind_run(ctx.run_id);
    let started = Instant::now();
    state
        .emitter
        .run_started(&ctx, tenant.uuid, &input.conversation_id);

    let result = turn_inner(state, &input, &caller, &ctx, &cancel).await;

    let duration_ms = started.elapsed().as_millis() as u64;
    match &result {
        Ok(_) => {
            state
                .emitter
                .run_finished(&ctx, tenant.uuid, "success", duration_ms, None);
        }
        Err(e) => {
            let reason = if cancel.is_cancelled() {
                "cancelled"
            } else if matches!(e, Error::Timeout(_)) {
                "timeout"
            } else {
                "error"
            };
            state
                .emitter
                .run_finished(&ctx, tenant.uuid, "failure", duration_ms, Some(reason));
        }
    }

    result.map(|(reply, goal, tool_events)| TurnOutcome {
        run_id: ctx.run_id,
        reply,
        goal,
        tool_events,
    })
}

type InnerOutcome = (String, Option<atrium_dialog::Goal>, Vec<ToolEvent>);

async fn turn_inner(
    state: &AppState,
    input: &TurnInput,
    caller: &CallerIdentity,
    ctx: &CorrelationCtx,
    cancel: &CancelToken,
) -> Result<InnerOutcome> {
    let conversation_id = &input.conversation_id;
    let tenant = caller.tenant_uuid;

    state
        .conversations
        .append(conversation_id, ConversationMessage::user(&input.user_text));
    state
        .emitter
        .message_received(ctx, tenant, "user", &truncate_str(&input.user_text, 200));

    let now = chrono::Local::now().naive_local();

    // ── Goal path ─────────────────────────────────────────────────
    // A store outage reads as "no active goal": the turn degrades to the
    // stateless path instead of failing.
    if let Some(goal) = state.goals.get_active_goal(conversation_id) {
        let gt =
            goal_flow::advance_goal(state, goal, &input.user_text, caller, now, ctx, cancel)
                .await?;
        return finish_reply(state, conversation_id, ctx, tenant, gt.reply, gt.goal, Vec::new());
    }

    let intent = detect_intent(&input.user_text);
    if let Some(goal_type) = intent.goal_type.filter(|_| intent.detected) {
        let gt = goal_flow::start_goal(
            state,
            goal_type,
            conversation_id,
            &input.user_text,
            caller,
            now,
            ctx,
            cancel,
        )
        .await?;
        return finish_reply(state, conversation_id, ctx, tenant, gt.reply, gt.goal, Vec::new());
    }

    // ── Stateless path ────────────────────────────────────────────
    let (reply, tool_events) = stateless_loop(state, input, caller, ctx, cancel).await?;
    finish_reply(state, conversation_id, ctx, tenant, reply, None, tool_events)
}

fn finish_reply(
    state: &AppState,
    conversation_id: &str,
    ctx: &CorrelationCtx,
    tenant: Uuid,
    reply: String,
    goal: Option<atrium_dialog::Goal>,
    tool_events: Vec<ToolEvent>,
) -> Result<InnerOutcome> {
    state
        .conversations
        .append(conversation_id, ConversationMessage::assistant(&reply));
    state
        .emitter
        .message_sent(ctx, tenant, "assistant", &truncate_str(&reply, 200));
    Ok((reply, goal, tool_events))
}

/// The LLM/tool iteration for utterances that are neither goal starts nor
/// goal responses.
async fn stateless_loop(
    state: &AppState,
    input: &TurnInput,
    caller: &CallerIdentity,
    ctx: &CorrelationCtx,
    cancel: &CancelToken,
) -> Result<(String, Vec<ToolEvent>)> {
    // Nothing to work with: ask for clarification instead of burning an
    // LLM call.
    if input.user_text.trim().is_empty() {
        return Ok((
            "I didn't catch that. What would you like to do?".to_string(),
            Vec::new(),
        ));
    }

    let budget = state.config.turn.tool_call_budget;
    let mut tool_events: Vec<ToolEvent> = Vec::new();
    let mut calls_used = 0usize;

    let mut window = build_window(state, input);
    let tool_defs = state.executor.definitions();

    // One extra iteration lets the model phrase a final answer after the
    // budget is spent (it gets no tools on that pass).
    for _ in 0..=budget {
        let budget_left = budget.saturating_sub(calls_used);
        let req = ChatRequest {
            messages: window.clone(),
            tools: if budget_left > 0 {
                tool_defs.clone()
            } else {
                Vec::new()
            },
            temperature: input.temperature,
            model: None,
        };

        let completion = state.llm.chat(&req).await?;

        if completion.tool_calls.is_empty() {
            return Ok((completion.content, tool_events));
        }

        window.push(ChatMessage::assistant_with_tool_calls(
            &completion.content,
            &completion.tool_calls,
        ));

        for tc in completion.tool_calls {
            if calls_used >= budget {
                window.push(tool_result_message(
                    &tc.call_id,
                    "tool budget for this turn is exhausted; answer with what you have",
                    true,
                ));
                continue;
            }
            calls_used += 1;
            dispatch_tool(state, input, caller, ctx, cancel, &tc, &mut window, &mut tool_events)
                .await;
        }
    }

    // The model kept requesting tools past the budget.
    Ok((
        "I ran out of tool budget for this request - here's what I have so far. \
         Could you narrow the question?"
            .to_string(),
        tool_events,
    ))
}

/// Execute one model-requested tool call and append the (possibly
/// offloaded) result to the window. Tool failures become error results
/// for the model to react to; they never terminate the run.
#[allow(clippy::too_many_arguments)]
async fn dispatch_tool(
    state: &AppState,
    input: &TurnInput,
    caller: &CallerIdentity,
    ctx: &CorrelationCtx,
    cancel: &CancelToken,
    tc: &ToolCall,
    window: &mut Vec<ChatMessage>,
    tool_events: &mut Vec<ToolEvent>,
) {
    match state
        .executor
        .execute(&tc.tool_name, &tc.arguments, caller, ctx, cancel)
        .await
    {
        Ok(outcome) => {
            let inline = match &outcome.result_ref {
                Some(r) => format!("[result stored as artifact {r}] {}", outcome.summary),
                None => truncate_str(&compact_json(&outcome.value), INLINE_RESULT_CHARS),
            };
            window.push(tool_result_message(&tc.call_id, &inline, false));
            state.conversations.append(
                &input.conversation_id,
                ConversationMessage::tool(&outcome.summary, tc.clone(), outcome.result_ref.clone()),
            );
            tool_events.push(ToolEvent {
                tool_name: tc.tool_name.clone(),
                cache: outcome.cache.as_str().to_string(),
                is_error: false,
                result_ref: outcome.result_ref,
            });
        }
        Err(e) => {
            let message = format!("tool error: {}", e.user_message());
            window.push(tool_result_message(&tc.call_id, &message, true));
            state.conversations.append(
                &input.conversation_id,
                ConversationMessage::tool(&message, tc.clone(), None),
            );
            tool_events.push(ToolEvent {
                tool_name: tc.tool_name.clone(),
                cache: "bypass".to_string(),
                is_error: true,
                result_ref: None,
            });
        }
    }
}

/// Seed the working window: system prompt plus recent user/assistant
/// history. Tool plumbing from earlier turns stays out - its substance is
/// already folded into the assistant replies.
fn build_window(state: &AppState, input: &TurnInput) -> Vec<ChatMessage> {
    let mut window = vec![ChatMessage::system(system_prompt())];
    for msg in state.conversations.tail(&input.conversation_id, 8) {
        match msg.role {
            atrium_dialog::MessageRole::User => window.push(ChatMessage::user(&msg.content)),
            atrium_dialog::MessageRole::Assistant => {
                window.push(ChatMessage::assistant(&msg.content))
            }
            atrium_dialog::MessageRole::Tool => {}
        }
    }
    window
}

fn system_prompt() -> String {
    "You are Atrium, a CRM assistant. Answer questions about leads, \
     activities, and pipeline using the available tools. Tool results \
     marked as stored artifacts can be summarized from their summary \
     line. Be concise and factual."
        .to_string()
}

fn tool_result_message(call_id: &str, content: &str, is_error: bool) -> ChatMessage {
    ChatMessage {
        role: ChatRole::Tool,
        content: ChatContent::Parts(vec![ContentPart::ToolResult {
            tool_use_id: call_id.to_string(),
            content: content.to_string(),
            is_error,
        }]),
    }
}

fn compact_json(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}
