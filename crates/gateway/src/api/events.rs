//! Observer HTTP surface: buffer snapshot, live SSE stream, reset.

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json};
use futures_util::stream::Stream;
use serde_json::Value;

use crate::state::AppState;

/// `GET /events` - current buffer snapshot.
pub async fn snapshot(State(state): State<AppState>) -> impl IntoResponse {
    let events = state.observer.snapshot();
    Json(serde_json::json!({
        "count": events.len(),
        "events": events,
    }))
}

/// `POST /events` - manual injection. Keeps the surface usable when the
/// bus is down.
pub async fn inject(State(state): State<AppState>, Json(event): Json<Value>) -> impl IntoResponse {
    state.observer.ingest(event);
    Json(serde_json::json!({ "ok": true }))
}

/// `GET /clear` / `POST /clear` - reset the buffer; live streams get a
/// synthetic `system_reset`.
pub async fn clear(State(state): State<AppState>) -> impl IntoResponse {
    let reset = state.observer.clear();
    Json(reset)
}

/// `GET /sse` - warm-up replay of the recent tail, then live events.
pub async fn sse(State(state): State<AppState>) -> impl IntoResponse {
    let warmup = state.observer.warmup_tail();
    let rx = state.observer.subscribe();

    Sse::new(event_stream(warmup, rx)).keep_alive(KeepAlive::default())
}

fn event_stream(
    warmup: Vec<Value>,
    mut rx: tokio::sync::broadcast::Receiver<Value>,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    async_stream::stream! {
        for event in warmup {
            yield Ok(Event::default().data(event.to_string()));
        }
        loop {
            match rx.recv().await {
                Ok(event) => yield Ok(Event::default().data(event.to_string())),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "sse client lagged; continuing from tail");
                }
                // Observer gone: the server is shutting down.
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}
