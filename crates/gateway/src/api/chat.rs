//! `POST /ai/chat` - run one conversation turn.

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use atrium_domain::cancel::CancelToken;
use atrium_domain::identity::{CallerIdentity, Role};
use atrium_domain::Error;

use crate::api::{ApiError, ApiResult};
use crate::runtime::{run_turn, TurnInput};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    /// Chat-completion style message list; the last user entry is this
    /// turn's utterance.
    pub messages: Vec<IncomingMessage>,
    pub conversation_id: String,
    /// Tenant slug or UUID.
    pub tenant_id: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Authenticated caller forwarded by the transport layer. Absent
    /// means an anonymous employee-scoped caller.
    #[serde(default)]
    pub user: Option<UserInfo>,
}

#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct UserInfo {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: Role,
}

pub async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> ApiResult<impl IntoResponse> {
    if body.conversation_id.trim().is_empty() {
        return Err(Error::validation("conversation_id", "must not be empty").into());
    }

    let user_text = body
        .messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.clone())
        .unwrap_or_default();

    let caller = match body.user {
        Some(u) => CallerIdentity {
            id: u.id,
            email: u.email,
            role: u.role,
            tenant_uuid: uuid::Uuid::nil(), // filled after tenant resolution
            internal: false,
        },
        None => CallerIdentity {
            id: "anonymous".into(),
            email: String::new(),
            role: Role::Employee,
            tenant_uuid: uuid::Uuid::nil(),
            internal: false,
        },
    };

    // One turn per conversation at a time.
    let _permit = state
        .turn_locks
        .try_acquire(&body.conversation_id)
        .map_err(|busy| ApiError(Error::Conflict(busy.to_string())))?;

    let input = TurnInput {
        conversation_id: body.conversation_id.clone(),
        tenant_id: body.tenant_id,
        user_text,
        caller,
        temperature: body.temperature,
    };

    let outcome = run_turn(&state, input, CancelToken::new()).await?;

    Ok(Json(serde_json::json!({
        "conversation_id": body.conversation_id,
        "run_id": outcome.run_id,
        "reply": outcome.reply,
        "goal": outcome.goal,
        "tool_events": outcome.tool_events,
    })))
}
