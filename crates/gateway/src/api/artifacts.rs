//! `/storage/artifacts` - store, list, and retrieve artifacts.

use axum::extract::{Path, Query, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use atrium_artifacts::store::{ListArtifacts, PutArtifact};
use atrium_cache::WriteInvalidation;
use atrium_domain::Error;

use crate::api::ApiResult;
use crate::state::AppState;

/// Invalidation namespace for artifact writes. Not a CRM entity, so the
/// dashboard is untouched.
const ARTIFACTS_MODULE: &str = "artifacts";

#[derive(Debug, Deserialize)]
pub struct PutBody {
    /// Tenant slug or UUID.
    pub tenant_id: String,
    pub kind: String,
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub entity_id: Option<String>,
    pub payload: Value,
}

/// Marks the tenant a successful write touched, for the invalidation
/// middleware.
#[derive(Clone, Copy)]
pub struct WrittenTenant(pub Uuid);

pub async fn put(
    State(state): State<AppState>,
    Json(body): Json<PutBody>,
) -> ApiResult<Response> {
    if body.kind.trim().is_empty() {
        return Err(Error::validation("kind", "must not be empty").into());
    }
    let tenant = state.resolver.resolve(&body.tenant_id)?;

    let artifact = state
        .artifacts
        .put(PutArtifact {
            tenant_id: tenant.uuid,
            kind: body.kind,
            entity_type: body.entity_type,
            entity_id: body.entity_id,
            payload: body.payload,
        })
        .await?;

    let mut response = Json(serde_json::json!({
        "id": artifact.id,
        "r2_key": artifact.r2_key,
        "size_bytes": artifact.size_bytes,
        "sha256": artifact.sha256,
    }))
    .into_response();
    response.extensions_mut().insert(WrittenTenant(tenant.uuid));
    Ok(response)
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub tenant_id: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    let tenant = state.resolver.resolve(&query.tenant_id)?;
    let artifacts = state.artifacts.list(&ListArtifacts {
        tenant_id: tenant.uuid,
        kind: query.kind,
        entity_id: query.entity_id,
        limit: query.limit,
    });
    let count = artifacts.len();
    Ok(Json(serde_json::json!({
        "artifacts": artifacts,
        "count": count,
    })))
}

#[derive(Debug, Deserialize)]
pub struct GetQuery {
    pub tenant_id: String,
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<GetQuery>,
) -> ApiResult<impl IntoResponse> {
    let tenant = state.resolver.resolve(&query.tenant_id)?;
    let (artifact, payload) = state.artifacts.get(id, tenant.uuid).await?;
    Ok(Json(serde_json::json!({
        "artifact": artifact,
        "payload": payload,
    })))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Write-invalidation middleware
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Invalidate the tenant's module cache after a successful write
/// response. Tenant precedence: the handler-recorded tenant first, then
/// the `tenant_id` query parameter. `next` always runs; invalidation
/// only ever happens after the response is materialized.
pub async fn invalidate_on_write(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let is_write = request.method() == axum::http::Method::POST
        && request.uri().path() == "/storage/artifacts";
    let query_tenant = request
        .uri()
        .query()
        .and_then(|q| query_param(q, "tenant_id"))
        .and_then(|raw| state.resolver.resolve(&raw).ok())
        .map(|t| t.uuid);

    let response = next.run(request).await;

    if is_write {
        let tenant = response
            .extensions()
            .get::<WrittenTenant>()
            .map(|w| w.0)
            .or(query_tenant);
        WriteInvalidation::apply(
            &state.cache,
            response.status().as_u16(),
            tenant,
            ARTIFACTS_MODULE,
        );
    }
    response
}

fn query_param(query: &str, name: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == name).then(|| v.to_string())
    })
}
