use std::sync::Arc;
use std::time::Instant;

use atrium_artifacts::store::ArtifactStore;
use atrium_auth::TenantResolver;
use atrium_cache::TtlCache;
use atrium_dialog::{ConversationStore, GoalStore};
use atrium_domain::config::Config;
use atrium_llm::ChatClient;
use atrium_telemetry::{Emitter, Observer, TailSidecar};
use atrium_tools::ToolExecutor;

use crate::runtime::turn_lock::TurnLockMap;

/// Shared application state passed to all API handlers.
///
/// Fields are grouped by concern:
/// - **Core services** - config, tenant resolution, LLM client
/// - **Stores** - cache, artifacts, goals, conversations
/// - **Execution** - tool executor, per-conversation turn locks
/// - **Telemetry** - emitter, observer, sidecar health
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────
    pub config: Arc<Config>,
    pub resolver: Arc<TenantResolver>,
    pub llm: Arc<dyn ChatClient>,

    // ── Stores ────────────────────────────────────────────────────
    pub cache: Arc<TtlCache>,
    pub artifacts: Arc<ArtifactStore>,
    pub goals: Arc<GoalStore>,
    pub conversations: Arc<ConversationStore>,

    // ── Execution ─────────────────────────────────────────────────
    pub executor: Arc<ToolExecutor>,
    pub turn_locks: Arc<TurnLockMap>,

    // ── Telemetry ─────────────────────────────────────────────────
    pub emitter: Emitter,
    pub observer: Arc<Observer>,
    /// `None` when telemetry is disabled (no sink to tail).
    pub sidecar: Option<Arc<TailSidecar>>,

    pub started_at: Instant,
}
