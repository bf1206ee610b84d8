//! HTTP surface: route assembly and error mapping.

pub mod artifacts;
pub mod chat;
pub mod events;
pub mod health;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use atrium_domain::Error;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ai/chat", post(chat::chat))
        .route(
            "/storage/artifacts",
            post(artifacts::put).get(artifacts::list),
        )
        .route("/storage/artifacts/:id", get(artifacts::get_one))
        .route("/events", get(events::snapshot).post(events::inject))
        .route("/sse", get(events::sse))
        .route("/clear", get(events::clear).post(events::clear))
        .route("/health", get(health::health))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            artifacts::invalidate_on_write,
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Build a standardized JSON error response: `{ "error": "<message>" }`.
pub fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

/// Wrapper mapping the shared error taxonomy onto HTTP statuses. Message
/// bodies carry only the caller-safe rendering.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Validation { .. } => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::TenantNotFound(_) | Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Error::StorageUnavailable(_)
            | Error::CacheUnavailable(_)
            | Error::BusUnavailable(_)
            | Error::LlmUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Io(_) | Error::Json(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        api_error(status, self.0.user_message())
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
