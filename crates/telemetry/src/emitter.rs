//! Event emission into the append-only NDJSON sink.
//!
//! Emission is a bounded-channel `try_send`; a dedicated writer task owns
//! the sink file and appends one line per event. The request path never
//! waits on sink IO, and a full channel drops the event (counted, logged
//! at debug) rather than applying back-pressure.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::context::CorrelationCtx;
use crate::event::{EventType, TelemetryEvent};

/// Queue depth between emitters and the writer task.
const QUEUE_CAP: usize = 1024;

/// Handle to the writer task; awaiting it guarantees every queued event
/// reached the sink (used by graceful shutdown and tests).
pub struct WriterHandle {
    handle: tokio::task::JoinHandle<()>,
}

impl WriterHandle {
    pub async fn drain(self) {
        let _ = self.handle.await;
    }
}

/// Best-effort telemetry emitter. Cheap to clone; cloning shares the
/// underlying channel.
#[derive(Clone)]
pub struct Emitter {
    tx: Option<mpsc::Sender<TelemetryEvent>>,
    dropped: Arc<AtomicU64>,
}

impl Emitter {
    /// An emitter whose every emit is a no-op (telemetry disabled).
    pub fn disabled() -> Self {
        Self {
            tx: None,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emitter writing to the NDJSON sink at `path`. Spawns the writer
    /// task; the returned handle outlives every emitter clone and should
    /// be drained on shutdown.
    pub fn to_sink(path: &Path) -> (Self, WriterHandle) {
        let (tx, rx) = mpsc::channel(QUEUE_CAP);
        let handle = tokio::spawn(writer_task(path.to_path_buf(), rx));
        (
            Self {
                tx: Some(tx),
                dropped: Arc::new(AtomicU64::new(0)),
            },
            WriterHandle { handle },
        )
    }

    pub fn enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Number of events dropped because the writer queue was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Queue one event for the sink. Never blocks, never errors.
    pub fn emit(&self, event: TelemetryEvent) {
        let Some(tx) = &self.tx else { return };
        let event = event.sanitize();
        if tx.try_send(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("telemetry queue full; event dropped");
        }
    }

    // ── Typed emitters (one per canonical event type) ──────────────

    pub fn run_started(&self, ctx: &CorrelationCtx, tenant: Uuid, conversation_id: &str) {
        self.emit(
            TelemetryEvent::new(EventType::RunStarted, ctx)
                .tenant(tenant)
                .field("conversation_id", conversation_id),
        );
    }

    pub fn run_finished(
        &self,
        ctx: &CorrelationCtx,
        tenant: Uuid,
        status: &str,
        duration_ms: u64,
        error: Option<&str>,
    ) {
        self.emit(
            TelemetryEvent::new(EventType::RunFinished, ctx)
                .tenant(tenant)
                .field("status", status)
                .field("duration_ms", duration_ms)
                .field("error", error),
        );
    }

    pub fn agent_registered(&self, ctx: &CorrelationCtx, agent_id: &str, name: &str) {
        self.emit(
            TelemetryEvent::new(EventType::AgentRegistered, ctx)
                .field("agent_id", agent_id)
                .field("name", name),
        );
    }

    pub fn agent_spawned(&self, ctx: &CorrelationCtx, agent_id: &str, parent_agent_id: &str) {
        self.emit(
            TelemetryEvent::new(EventType::AgentSpawned, ctx)
                .field("agent_id", agent_id)
                .field("parent_agent_id", parent_agent_id),
        );
    }

    pub fn agent_retired(&self, ctx: &CorrelationCtx, agent_id: &str, reason: &str) {
        self.emit(
            TelemetryEvent::new(EventType::AgentRetired, ctx)
                .field("agent_id", agent_id)
                .field("reason", reason),
        );
    }

    pub fn agent_status(&self, ctx: &CorrelationCtx, agent_id: &str, status: &str) {
        self.emit(
            TelemetryEvent::new(EventType::AgentStatus, ctx)
                .field("agent_id", agent_id)
                .field("status", status),
        );
    }

    pub fn task_created(&self, ctx: &CorrelationCtx, task_id: &str, title: &str) {
        self.emit(
            TelemetryEvent::new(EventType::TaskCreated, ctx)
                .field("task_id", task_id)
                .field("title", title),
        );
    }

    pub fn task_enqueued(&self, ctx: &CorrelationCtx, task_id: &str, queue: &str) {
        self.emit(
            TelemetryEvent::new(EventType::TaskEnqueued, ctx)
                .field("task_id", task_id)
                .field("queue", queue),
        );
    }

    pub fn task_assigned(&self, ctx: &CorrelationCtx, task_id: &str, agent_id: &str) {
        self.emit(
            TelemetryEvent::new(EventType::TaskAssigned, ctx)
                .field("task_id", task_id)
                .field("agent_id", agent_id),
        );
    }

    pub fn task_started(&self, ctx: &CorrelationCtx, task_id: &str) {
        self.emit(TelemetryEvent::new(EventType::TaskStarted, ctx).field("task_id", task_id));
    }

    pub fn task_blocked(&self, ctx: &CorrelationCtx, task_id: &str, reason: &str) {
        self.emit(
            TelemetryEvent::new(EventType::TaskBlocked, ctx)
                .field("task_id", task_id)
                .field("reason", reason),
        );
    }

    pub fn task_completed(&self, ctx: &CorrelationCtx, task_id: &str, duration_ms: u64) {
        self.emit(
            TelemetryEvent::new(EventType::TaskCompleted, ctx)
                .field("task_id", task_id)
                .field("duration_ms", duration_ms),
        );
    }

    pub fn task_failed(&self, ctx: &CorrelationCtx, task_id: &str, error: &str) {
        self.emit(
            TelemetryEvent::new(EventType::TaskFailed, ctx)
                .field("task_id", task_id)
                .field("error", error),
        );
    }

    pub fn handoff(&self, ctx: &CorrelationCtx, from_agent: &str, to_agent: &str, reason: &str) {
        self.emit(
            TelemetryEvent::new(EventType::Handoff, ctx)
                .field("from_agent", from_agent)
                .field("to_agent", to_agent)
                .field("reason", reason),
        );
    }

    pub fn message_sent(&self, ctx: &CorrelationCtx, tenant: Uuid, role: &str, preview: &str) {
        self.emit(
            TelemetryEvent::new(EventType::MessageSent, ctx)
                .tenant(tenant)
                .field("role", role)
                .field("content_preview", preview),
        );
    }

    pub fn message_received(&self, ctx: &CorrelationCtx, tenant: Uuid, role: &str, preview: &str) {
        self.emit(
            TelemetryEvent::new(EventType::MessageReceived, ctx)
                .tenant(tenant)
                .field("role", role)
                .field("content_preview", preview),
        );
    }

    pub fn tool_call_started(
        &self,
        ctx: &CorrelationCtx,
        tenant: Uuid,
        tool_name: &str,
        tool_call_id: &str,
        args_summary: &str,
    ) {
        self.emit(
            TelemetryEvent::new(EventType::ToolCallStarted, ctx)
                .tenant(tenant)
                .field("tool_name", tool_name)
                .field("tool_call_id", tool_call_id)
                .field("args_summary", args_summary),
        );
    }

    #[allow(clippy::too_many_arguments)]
    pub fn tool_call_finished(
        &self,
        ctx: &CorrelationCtx,
        tenant: Uuid,
        tool_name: &str,
        tool_call_id: &str,
        status: &str,
        duration_ms: u64,
        cache: &str,
        output_summary: Option<&str>,
        result_ref: Option<&str>,
    ) {
        self.emit(
            TelemetryEvent::new(EventType::ToolCallFinished, ctx)
                .tenant(tenant)
                .field("tool_name", tool_name)
                .field("tool_call_id", tool_call_id)
                .field("status", status)
                .field("duration_ms", duration_ms)
                .field("cache", cache)
                .field("output_summary", output_summary)
                .field("result_ref", result_ref),
        );
    }

    pub fn tool_call_failed(
        &self,
        ctx: &CorrelationCtx,
        tenant: Uuid,
        tool_name: &str,
        tool_call_id: &str,
        error_code: &str,
        retryable: bool,
    ) {
        self.emit(
            TelemetryEvent::new(EventType::ToolCallFailed, ctx)
                .tenant(tenant)
                .field("tool_name", tool_name)
                .field("tool_call_id", tool_call_id)
                .field("error_code", error_code)
                .field("retryable", retryable),
        );
    }

    pub fn artifact_created(
        &self,
        ctx: &CorrelationCtx,
        tenant: Uuid,
        artifact_id: &str,
        kind: &str,
        size_bytes: u64,
        sha256: &str,
    ) {
        self.emit(
            TelemetryEvent::new(EventType::ArtifactCreated, ctx)
                .tenant(tenant)
                .field("artifact_id", artifact_id)
                .field("kind", kind)
                .field("size_bytes", size_bytes)
                .field("sha256", sha256),
        );
    }

    pub fn artifact_updated(
        &self,
        ctx: &CorrelationCtx,
        tenant: Uuid,
        artifact_id: &str,
        kind: &str,
    ) {
        self.emit(
            TelemetryEvent::new(EventType::ArtifactUpdated, ctx)
                .tenant(tenant)
                .field("artifact_id", artifact_id)
                .field("kind", kind),
        );
    }
}

/// Owns the sink file; drains the queue until every sender is gone.
async fn writer_task(path: PathBuf, mut rx: mpsc::Receiver<TelemetryEvent>) {
    if let Some(parent) = path.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            tracing::warn!(error = %e, path = %parent.display(), "telemetry sink dir create failed");
        }
    }

    let mut file = match tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await
    {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(error = %e, path = %path.display(), "telemetry sink open failed; events discarded");
            // Keep draining so emitters never block on a dead channel.
            while rx.recv().await.is_some() {}
            return;
        }
    };

    while let Some(event) = rx.recv().await {
        let mut line = match serde_json::to_string(&event) {
            Ok(l) => l,
            Err(e) => {
                tracing::warn!(error = %e, "telemetry event serialization failed");
                continue;
            }
        };
        line.push('\n');
        // One write per event keeps concurrent appenders line-atomic.
        if let Err(e) = file.write_all(line.as_bytes()).await {
            tracing::warn!(error = %e, "telemetry sink write failed");
        }
    }
    let _ = file.flush().await;
}
