//! Goal lifecycle: creation from a detected intent, slot filling across
//! turns, confirmation, and execution of the goal's action tool.

use chrono::NaiveDateTime;
use serde_json::json;

use atrium_dialog::{
    classify_response, extract_date_time, extract_lead_name, Goal, GoalStatus, GoalType,
    ResponseType,
};
use atrium_domain::cancel::CancelToken;
use atrium_domain::identity::CallerIdentity;
use atrium_domain::Result;
use atrium_telemetry::CorrelationCtx;

use crate::state::AppState;

/// What a goal-path turn produced.
pub struct GoalTurn {
    pub reply: String,
    /// The goal still active after this turn, if any.
    pub goal: Option<Goal>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Goal creation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Start a new goal from a detected intent: extract slots, resolve the
/// lead against the CRM, persist, and build the first reply.
pub async fn start_goal(
    state: &AppState,
    goal_type: GoalType,
    conversation_id: &str,
    user_text: &str,
    caller: &CallerIdentity,
    now: NaiveDateTime,
    ctx: &CorrelationCtx,
    cancel: &CancelToken,
) -> Result<GoalTurn> {
    let ttl = chrono::Duration::seconds(state.config.goals.ttl_seconds as i64);
    let mut goal = Goal::new(
        goal_type,
        conversation_id,
        caller.tenant_uuid,
        user_text,
        ttl,
    );

    if let Some(name) = extract_lead_name(user_text) {
        goal.extracted.lead = Some(resolve_lead(state, caller, ctx, cancel, &name).await);
    }
    goal.extracted.date_time = extract_date_time(now, user_text);

    let reply = if goal.missing_slots().is_empty() {
        goal.status = GoalStatus::PendingConfirmation;
        goal.confirmation_message = build_confirmation(&goal);
        goal.confirmation_message.clone()
    } else {
        goal.status = GoalStatus::AwaitingInput;
        prompt_for_missing(&goal)
    };

    state.goals.set_active_goal(goal.clone());
    Ok(GoalTurn {
        reply,
        goal: Some(goal),
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Goal advancement
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Advance an active goal with the user's reply.
pub async fn advance_goal(
    state: &AppState,
    mut goal: Goal,
    user_text: &str,
    caller: &CallerIdentity,
    now: NaiveDateTime,
    ctx: &CorrelationCtx,
    cancel: &CancelToken,
) -> Result<GoalTurn> {
    match classify_response(user_text) {
        ResponseType::Confirm => confirm(state, goal, caller, ctx, cancel).await,
        ResponseType::Cancel => {
            state.goals.clear_active_goal(&goal.conversation_id);
            Ok(GoalTurn {
                reply: format!(
                    "Okay, I won't {}. Nothing was saved.",
                    goal.goal_type.describe()
                ),
                goal: None,
            })
        }
        ResponseType::Reschedule => {
            let reply = match extract_date_time(now, user_text) {
                Some(dt) => {
                    goal.extracted.date_time = Some(dt);
                    goal.status = GoalStatus::PendingConfirmation;
                    goal.confirmation_message = build_confirmation(&goal);
                    goal.confirmation_message.clone()
                }
                None => match goal.extracted.date_time {
                    // No new time given: propose the next slot.
                    Some(current) => {
                        let proposed = current.plus_hours(1);
                        goal.extracted.date_time = Some(proposed);
                        goal.status = GoalStatus::PendingConfirmation;
                        goal.confirmation_message = build_confirmation(&goal);
                        format!(
                            "How about {} at {} instead? Say 'yes' to confirm.",
                            proposed.date,
                            proposed.hhmm()
                        )
                    }
                    None => {
                        goal.status = GoalStatus::AwaitingInput;
                        "Sure - when should it be?".to_string()
                    }
                },
            };
            touch_and_store(state, &mut goal);
            Ok(GoalTurn {
                reply,
                goal: Some(goal),
            })
        }
        ResponseType::ProvideInfo => {
            if goal.extracted.lead.is_none() {
                if let Some(name) = extract_lead_name(user_text) {
                    goal.extracted.lead =
                        Some(resolve_lead(state, caller, ctx, cancel, &name).await);
                }
            }
            if goal.extracted.date_time.is_none() {
                goal.extracted.date_time = extract_date_time(now, user_text);
            }

            let reply = if goal.missing_slots().is_empty() {
                goal.status = GoalStatus::PendingConfirmation;
                goal.confirmation_message = build_confirmation(&goal);
                goal.confirmation_message.clone()
            } else {
                goal.status = GoalStatus::AwaitingInput;
                prompt_for_missing(&goal)
            };
            touch_and_store(state, &mut goal);
            Ok(GoalTurn {
                reply,
                goal: Some(goal),
            })
        }
        ResponseType::Unclear => {
            let reminder = if goal.confirmation_message.is_empty() {
                prompt_for_missing(&goal)
            } else {
                goal.confirmation_message.clone()
            };
            Ok(GoalTurn {
                reply: format!(
                    "We're in the middle of something: {reminder} \
                     You can also say 'cancel' to drop it."
                ),
                goal: Some(goal),
            })
        }
    }
}

async fn confirm(
    state: &AppState,
    mut goal: Goal,
    caller: &CallerIdentity,
    ctx: &CorrelationCtx,
    cancel: &CancelToken,
) -> Result<GoalTurn> {
    if !goal.missing_slots().is_empty() {
        let reply = prompt_for_missing(&goal);
        touch_and_store(state, &mut goal);
        return Ok(GoalTurn {
            reply,
            goal: Some(goal),
        });
    }

    let (tool, args) = action_call(&goal);
    match state.executor.execute(tool, &args, caller, ctx, cancel).await {
        Ok(_) => {
            state.goals.clear_active_goal(&goal.conversation_id);
            Ok(GoalTurn {
                reply: success_message(&goal),
                goal: None,
            })
        }
        Err(e) => {
            // The goal survives a failed action so the user can retry.
            tracing::warn!(error = %e, tool, "goal action failed");
            touch_and_store(state, &mut goal);
            Ok(GoalTurn {
                reply: format!(
                    "I couldn't {}: {}. Say 'yes' to try again or 'cancel' to drop it.",
                    goal.goal_type.describe(),
                    e.user_message()
                ),
                goal: Some(goal),
            })
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The executor tool and arguments implementing a confirmed goal.
fn action_call(goal: &Goal) -> (&'static str, serde_json::Value) {
    let lead = goal.extracted.lead.clone().unwrap_or_default();
    let (date, time) = match &goal.extracted.date_time {
        Some(dt) => (dt.date.to_string(), dt.hhmm()),
        None => (String::new(), String::new()),
    };
    match goal.goal_type {
        GoalType::ScheduleCall => (
            "schedule_call",
            json!({"lead": lead, "date": date, "time": time}),
        ),
        GoalType::BookMeeting => (
            "book_meeting",
            json!({"lead": lead, "date": date, "time": time}),
        ),
        GoalType::SendEmail => ("send_email", json!({"lead": lead})),
        GoalType::CreateReminder => (
            "create_reminder",
            json!({"note": goal.extracted.raw_text, "date": date, "time": time}),
        ),
    }
}

pub fn build_confirmation(goal: &Goal) -> String {
    let when = goal
        .extracted
        .date_time
        .map(|dt| format!(" on {} at {}", dt.date, dt.hhmm()))
        .unwrap_or_default();
    let who = goal
        .extracted
        .lead
        .as_deref()
        .map(|l| format!(" with {l}"))
        .unwrap_or_default();
    match goal.goal_type {
        GoalType::SendEmail => format!(
            "I'll send an email{who}. Should I proceed?"
        ),
        _ => format!(
            "I'll {}{who}{when}. Should I proceed?",
            goal.goal_type.describe()
        ),
    }
}

fn prompt_for_missing(goal: &Goal) -> String {
    let missing = goal.missing_slots();
    match (missing.contains(&"lead"), missing.contains(&"date_time")) {
        (true, true) => format!(
            "Who is the {} with, and when?",
            goal.goal_type.noun()
        ),
        (true, false) => format!("Who is the {} with?", goal.goal_type.noun()),
        (false, true) => "When should it be? For example: tomorrow at 2pm.".to_string(),
        (false, false) => build_confirmation(goal),
    }
}

fn success_message(goal: &Goal) -> String {
    let who = goal.extracted.lead.as_deref().unwrap_or("them");
    let when = goal
        .extracted
        .date_time
        .map(|dt| format!(" on {} at {}", dt.date, dt.hhmm()))
        .unwrap_or_default();
    match goal.goal_type {
        GoalType::ScheduleCall => format!("Done - I've scheduled a call with {who}{when}."),
        GoalType::BookMeeting => format!("Done - I've booked a meeting with {who}{when}."),
        GoalType::SendEmail => format!("Done - I've sent the email to {who}."),
        GoalType::CreateReminder => format!("Done - I've created a reminder{when}."),
    }
}

fn touch_and_store(state: &AppState, goal: &mut Goal) {
    goal.updated_at = chrono::Utc::now();
    state.goals.set_active_goal(goal.clone());
}

/// Resolve an extracted lead name against the CRM through the read-only
/// search tool. Falls back to the extracted text when the lookup fails
/// or finds nothing.
async fn resolve_lead(
    state: &AppState,
    caller: &CallerIdentity,
    ctx: &CorrelationCtx,
    cancel: &CancelToken,
    name: &str,
) -> String {
    let args = json!({"query": name, "limit": 1});
    match state
        .executor
        .execute("search_leads", &args, caller, ctx, cancel)
        .await
    {
        Ok(outcome) => outcome
            .value
            .get("leads")
            .and_then(|l| l.as_array())
            .and_then(|a| a.first())
            .and_then(|lead| lead.get("name"))
            .and_then(|n| n.as_str())
            .map(String::from)
            .unwrap_or_else(|| name.to_string()),
        Err(e) => {
            tracing::warn!(error = %e, name, "lead lookup failed; keeping extracted name");
            name.to_string()
        }
    }
}
