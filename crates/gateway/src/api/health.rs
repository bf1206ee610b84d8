//! `GET /health` - liveness plus component states.

use axum::extract::State;
use axum::response::{IntoResponse, Json};

use atrium_llm::ChatClient;

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let sidecar = state
        .sidecar
        .as_ref()
        .map(|s| serde_json::json!({ "state": s.health(), "published": s.published_count() }));

    Json(serde_json::json!({
        "status": "ok",
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "telemetry_enabled": state.emitter.enabled(),
        "bus": state.config.bus.kind,
        "cache": state.cache.stats(),
        "observer_events": state.observer.len(),
        "sidecar": sidecar,
        "llm_client": state.llm.client_id(),
        "active_conversations": state.turn_locks.conversation_count(),
    }))
}
