//! Process wiring: construct every shared resource at boot, inject them
//! into the request pipeline, and tear down cleanly on shutdown.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;

use atrium_artifacts::{ArtifactStore, FsBlobStore};
use atrium_auth::{TenantDirectory, TenantResolver, TokenMinter};
use atrium_cache::TtlCache;
use atrium_dialog::{ConversationStore, GoalStore};
use atrium_domain::cancel::CancelToken;
use atrium_domain::config::{Config, ConfigSeverity};
use atrium_domain::identity::TenantRecord;
use atrium_llm::OpenAiCompatClient;
use atrium_telemetry::bus::{bus_for_config, MemoryBus, TelemetryBus};
use atrium_telemetry::emitter::WriterHandle;
use atrium_telemetry::{Emitter, Observer, TailSidecar};
use atrium_tools::catalog::build_registry;
use atrium_tools::{HttpCrmResource, ToolExecutor};

use crate::runtime::turn_lock::TurnLockMap;
use crate::state::AppState;

/// Background machinery owned by the boot path, not the request path.
pub struct BootHandles {
    pub shutdown: CancelToken,
    pub writer: Option<WriterHandle>,
}

/// Construct the full application state. Must run inside the tokio
/// runtime (spawns the telemetry writer and bus consumers).
pub fn build_state(config: Arc<Config>) -> anyhow::Result<(AppState, BootHandles)> {
    let shutdown = CancelToken::new();

    // ── Telemetry ─────────────────────────────────────────────────
    let (emitter, writer) = if config.telemetry.enabled {
        let (e, w) = Emitter::to_sink(&config.telemetry.log_path);
        (e, Some(w))
    } else {
        (Emitter::disabled(), None)
    };

    let bus: Arc<dyn TelemetryBus> = match bus_for_config(&config.bus) {
        Ok(bus) => Arc::new(bus),
        Err(e) => {
            // The HTTP surface stays available on a dead bus; only the
            // fan-out degrades.
            tracing::warn!(error = %e, "bus unavailable; observer serves in-memory events only");
            Arc::new(MemoryBus::default())
        }
    };

    let observer = Arc::new(Observer::new(config.observer.max_events));
    tokio::spawn(observer.clone().consume_bus(bus.clone(), shutdown.clone()));

    let sidecar = if config.telemetry.enabled {
        let sidecar = Arc::new(TailSidecar::new(config.telemetry.log_path.clone(), bus));
        let task_sidecar = sidecar.clone();
        let task_cancel = shutdown.clone();
        tokio::spawn(async move { task_sidecar.run(task_cancel).await });
        Some(sidecar)
    } else {
        None
    };

    // ── Tenancy & auth ────────────────────────────────────────────
    let directory = Arc::new(load_tenant_directory());
    let system_uuid = config
        .tenancy
        .system_uuid
        .parse()
        .unwrap_or_else(|_| uuid::Uuid::nil());
    let resolver = Arc::new(TenantResolver::new(directory, system_uuid));
    let minter = Arc::new(TokenMinter::new(&config.auth.internal_jwt_secret));

    // ── Stores ────────────────────────────────────────────────────
    let cache = Arc::new(TtlCache::new());
    let blob = Arc::new(FsBlobStore::new(config.artifacts.root.join("blobs")));
    let artifacts = Arc::new(
        ArtifactStore::new(blob, &config.artifacts.root).context("opening artifact store")?,
    );

    // ── Execution ─────────────────────────────────────────────────
    let resource = Arc::new(
        HttpCrmResource::new(
            &config.crm.base_url,
            Duration::from_secs(config.tools.timeout_seconds),
        )
        .context("building CRM resource client")?,
    );
    let executor = Arc::new(ToolExecutor::new(
        build_registry(),
        resource,
        cache.clone(),
        minter,
        artifacts.clone(),
        emitter.clone(),
        &config,
    ));

    let llm = Arc::new(OpenAiCompatClient::from_config(&config.llm).context("building LLM client")?);

    let state = AppState {
        config,
        resolver,
        llm,
        cache,
        artifacts,
        goals: Arc::new(GoalStore::new()),
        conversations: Arc::new(ConversationStore::new()),
        executor,
        turn_locks: Arc::new(TurnLockMap::new()),
        emitter,
        observer,
        sidecar,
        started_at: Instant::now(),
    };

    Ok((state, BootHandles { shutdown, writer }))
}

/// Start the gateway server with the given configuration.
pub async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("atrium starting");

    // ── Config validation ─────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    let bind_addr = config.server.bind_addr.clone();
    let (state, handles) = build_state(config)?;
    let app = crate::api::router(state.clone());

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // ── Teardown ──────────────────────────────────────────────────
    tracing::info!("shutting down");
    handles.shutdown.cancel();
    state.artifacts.flush();
    drop(state);
    if let Some(writer) = handles.writer {
        // Every emitter clone is gone; drain what is queued.
        let _ = tokio::time::timeout(Duration::from_secs(3), writer.drain()).await;
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
    }
}

/// Tenant snapshot loaded at boot. Absence is a warning, not a failure -
/// tenants can also be registered by an operator process.
fn load_tenant_directory() -> TenantDirectory {
    let path = std::env::var("TENANT_DIRECTORY_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./data/tenants.json"));
    if !path.exists() {
        tracing::warn!(path = %path.display(), "tenant directory file missing; starting empty");
        return TenantDirectory::new();
    }
    match std::fs::read_to_string(&path)
        .map_err(anyhow::Error::from)
        .and_then(|raw| serde_json::from_str::<Vec<TenantRecord>>(&raw).map_err(Into::into))
    {
        Ok(records) => {
            tracing::info!(tenants = records.len(), path = %path.display(), "tenant directory loaded");
            TenantDirectory::from_records(records)
        }
        Err(e) => {
            tracing::error!(error = %e, path = %path.display(), "tenant directory unreadable; starting empty");
            TenantDirectory::new()
        }
    }
}
