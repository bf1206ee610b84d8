//! Tool execution: validation, deny-list, token mint, cache-around,
//! invalidation, artifact offload, and telemetry spans.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use uuid::Uuid;

use atrium_artifacts::store::{ArtifactStore, PutArtifact};
use atrium_auth::TokenMinter;
use atrium_cache::{cache_key, canonical_json, is_crm_entity, TtlCache};
use atrium_domain::cancel::CancelToken;
use atrium_domain::config::Config;
use atrium_domain::identity::CallerIdentity;
use atrium_domain::{Error, Result};
use atrium_telemetry::{CorrelationCtx, Emitter};

use crate::registry::{HandlerCtx, SafetyClass, ToolRegistry};
use crate::resource::CrmResource;
use crate::schema::validate_args;

/// How the cache participated in one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDisposition {
    Hit,
    Miss,
    /// Write tools never consult the cache.
    Bypass,
}

impl CacheDisposition {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheDisposition::Hit => "hit",
            CacheDisposition::Miss => "miss",
            CacheDisposition::Bypass => "bypass",
        }
    }
}

/// Result of one tool execution.
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    /// The tool result - or, when offloaded, a compact reference object.
    pub value: Value,
    /// One-line human summary for the conversation and telemetry.
    pub summary: String,
    pub cache: CacheDisposition,
    /// Artifact id when the payload was offloaded.
    pub result_ref: Option<String>,
    pub tool_call_id: String,
    pub duration_ms: u64,
}

pub struct ToolExecutor {
    registry: ToolRegistry,
    resource: Arc<dyn CrmResource>,
    cache: Arc<TtlCache>,
    minter: Arc<TokenMinter>,
    artifacts: Arc<ArtifactStore>,
    emitter: Emitter,
    default_ttl: Duration,
    tool_timeout: Duration,
    inline_max_bytes: usize,
}

impl ToolExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: ToolRegistry,
        resource: Arc<dyn CrmResource>,
        cache: Arc<TtlCache>,
        minter: Arc<TokenMinter>,
        artifacts: Arc<ArtifactStore>,
        emitter: Emitter,
        config: &Config,
    ) -> Self {
        Self {
            registry,
            resource,
            cache,
            minter,
            artifacts,
            emitter,
            default_ttl: Duration::from_secs(config.tools.default_ttl_seconds),
            tool_timeout: Duration::from_secs(config.tools.timeout_seconds),
            inline_max_bytes: config.artifacts.inline_max_bytes,
        }
    }

    /// Tool definitions to advertise to the LLM.
    pub fn definitions(&self) -> Vec<atrium_domain::tool::ToolDefinition> {
        self.registry.definitions()
    }

    pub fn cache_stats(&self) -> atrium_cache::CacheStats {
        self.cache.stats()
    }

    /// Execute one tool call on behalf of `caller` under the parent
    /// correlation context.
    pub async fn execute(
        &self,
        tool_name: &str,
        args: &Value,
        caller: &CallerIdentity,
        parent: &CorrelationCtx,
        cancel: &CancelToken,
    ) -> Result<ExecOutcome> {
        let span = parent.child();
        let tool_call_id = format!("tc_{}", Uuid::new_v4().simple());
        let tenant = caller.tenant_uuid;

        // Destructive names are refused before anything else happens -
        // no validation, no token, no resource contact.
        if ToolRegistry::is_destructive(tool_name) {
            let err = Error::Forbidden(format!(
                "tool '{tool_name}' is destructive and not callable from the assistant"
            ));
            self.emit_failed(&span, tenant, tool_name, &tool_call_id, &err);
            return Err(err);
        }

        let spec = match self.registry.get(tool_name) {
            Some(s) => s,
            None => {
                let err = Error::NotFound(format!("tool '{tool_name}'"));
                self.emit_failed(&span, tenant, tool_name, &tool_call_id, &err);
                return Err(err);
            }
        };

        if let Err(err) = validate_args(&spec.args_schema, args) {
            self.emit_failed(&span, tenant, tool_name, &tool_call_id, &err);
            return Err(err);
        }

        // Internal token carries the caller's true role downstream.
        let token = match self.minter.mint(caller) {
            Ok(t) => t,
            Err(err) => {
                self.emit_failed(&span, tenant, tool_name, &tool_call_id, &err);
                return Err(err);
            }
        };

        let args_summary = truncate(&canonical_json(args), 200);
        self.emitter
            .tool_call_started(&span, tenant, tool_name, &tool_call_id, &args_summary);
        let started = Instant::now();

        // Read path: consult the cache first.
        let (key, ttl) = match &spec.safety {
            SafetyClass::ReadOnly { ttl } => (
                Some(cache_key(spec.module, &tenant, tool_name, args)),
                ttl.unwrap_or(self.default_ttl),
            ),
            SafetyClass::Write { .. } => (None, Duration::ZERO),
        };

        if let Some(key) = &key {
            if let Some(cached) = self.cache.get(key) {
                let summary = (spec.summarize)(&cached);
                let duration_ms = started.elapsed().as_millis() as u64;
                let result_ref = cached
                    .get("result_ref")
                    .and_then(|v| v.as_str())
                    .map(String::from);
                self.emitter.tool_call_finished(
                    &span,
                    tenant,
                    tool_name,
                    &tool_call_id,
                    "success",
                    duration_ms,
                    "hit",
                    Some(&summary),
                    result_ref.as_deref(),
                );
                return Ok(ExecOutcome {
                    value: cached,
                    summary,
                    cache: CacheDisposition::Hit,
                    result_ref,
                    tool_call_id,
                    duration_ms,
                });
            }
        }

        // Invoke the resource with timeout and cancellation.
        let fut = (spec.handler)(HandlerCtx {
            resource: self.resource.clone(),
            token,
            tenant,
            args: args.clone(),
        });
        let invoked = tokio::select! {
            r = tokio::time::timeout(self.tool_timeout, fut) => match r {
                Ok(inner) => inner,
                Err(_) => Err(Error::Timeout(format!("tool '{tool_name}'"))),
            },
            _ = wait_cancelled(cancel) => Err(Error::Timeout(
                cancel.describe(&format!("tool '{tool_name}'")),
            )),
        };

        let result = match invoked {
            Ok(v) => v,
            Err(err) => {
                self.emit_failed(&span, tenant, tool_name, &tool_call_id, &err);
                return Err(err);
            }
        };

        // Writes invalidate their modules; dashboard once if any module
        // is a CRM entity.
        if let SafetyClass::Write { invalidates } = &spec.safety {
            for module in invalidates {
                self.cache.invalidate_tenant(&tenant, module);
            }
            if invalidates.iter().any(|m| is_crm_entity(m)) {
                self.cache.invalidate_dashboard(&tenant);
            }
        }

        let summary = (spec.summarize)(&result);

        // Oversized results are offloaded and replaced with a reference.
        let (value, result_ref) = self.maybe_offload(&span, tenant, tool_name, result, &summary).await;

        // An abandoned (cancelled) turn must not poison the cache; we only
        // reach here on success, so the write is safe.
        if let Some(key) = &key {
            self.cache.set(key, value.clone(), ttl);
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        let cache = if key.is_some() {
            CacheDisposition::Miss
        } else {
            CacheDisposition::Bypass
        };
        self.emitter.tool_call_finished(
            &span,
            tenant,
            tool_name,
            &tool_call_id,
            "success",
            duration_ms,
            cache.as_str(),
            Some(&summary),
            result_ref.as_deref(),
        );

        Ok(ExecOutcome {
            value,
            summary,
            cache,
            result_ref,
            tool_call_id,
            duration_ms,
        })
    }

    /// Replace an oversized payload with an artifact reference. Storage
    /// trouble falls back to inlining - losing the offload is cheaper
    /// than losing the result.
    async fn maybe_offload(
        &self,
        span: &CorrelationCtx,
        tenant: Uuid,
        tool_name: &str,
        result: Value,
        summary: &str,
    ) -> (Value, Option<String>) {
        let size = serde_json::to_vec(&result).map(|b| b.len()).unwrap_or(0);
        if size <= self.inline_max_bytes {
            return (result, None);
        }

        match self
            .artifacts
            .put(PutArtifact {
                tenant_id: tenant,
                kind: "tool_result".into(),
                entity_type: Some(tool_name.to_string()),
                entity_id: None,
                payload: result.clone(),
            })
            .await
        {
            Ok(artifact) => {
                self.emitter.artifact_created(
                    span,
                    tenant,
                    &artifact.id.to_string(),
                    &artifact.kind,
                    artifact.size_bytes,
                    &artifact.sha256,
                );
                let id = artifact.id.to_string();
                let replacement = json!({
                    "result_ref": id,
                    "summary": summary,
                    "size_bytes": artifact.size_bytes,
                });
                (replacement, Some(id))
            }
            Err(e) => {
                tracing::warn!(error = %e, tool_name, "artifact offload failed; inlining result");
                (result, None)
            }
        }
    }

    fn emit_failed(
        &self,
        span: &CorrelationCtx,
        tenant: Uuid,
        tool_name: &str,
        tool_call_id: &str,
        err: &Error,
    ) {
        self.emitter.tool_call_failed(
            span,
            tenant,
            tool_name,
            tool_call_id,
            error_code(err),
            err.is_retryable(),
        );
    }
}

async fn wait_cancelled(cancel: &CancelToken) {
    while !cancel.is_cancelled() {
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

fn error_code(err: &Error) -> &'static str {
    match err {
        Error::Validation { .. } => "VALIDATION",
        Error::Forbidden(_) => "FORBIDDEN",
        Error::NotFound(_) | Error::TenantNotFound(_) => "NOT_FOUND",
        Error::Unauthorized(_) => "UNAUTHORIZED",
        Error::Timeout(_) => "TIMEOUT",
        Error::Conflict(_) => "CONFLICT",
        Error::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
        Error::CacheUnavailable(_) => "CACHE_UNAVAILABLE",
        Error::BusUnavailable(_) => "BUS_UNAVAILABLE",
        Error::LlmUnavailable(_) => "LLM_UNAVAILABLE",
        Error::Io(_) | Error::Json(_) | Error::Internal(_) => "INTERNAL",
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
