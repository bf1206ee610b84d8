//! Tail sidecar: follows the NDJSON sink and republishes events on the bus.
//!
//! Runs as its own task with an independent lifecycle. Delivery to the bus
//! is at-least-once - a restart re-reads the sink from the beginning and
//! consumers dedupe on event identity `(run_id, span_id, type, ts)`.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::io::AsyncReadExt;

use atrium_domain::cancel::CancelToken;

use crate::bus::TelemetryBus;

/// How often the follow loop polls for new bytes at EOF.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Existence polls before the sidecar reports the sink as unavailable.
/// It keeps waiting afterwards; the report is a log signal, not a stop.
const WAIT_ATTEMPTS: u32 = 25;
const WAIT_INTERVAL: Duration = Duration::from_millis(400);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SidecarHealth {
    Starting,
    WaitingForFile,
    Tailing,
    Error,
}

pub struct TailSidecar {
    sink_path: PathBuf,
    bus: Arc<dyn TelemetryBus>,
    health: Arc<RwLock<SidecarHealth>>,
    published: Arc<AtomicU64>,
}

impl TailSidecar {
    pub fn new(sink_path: PathBuf, bus: Arc<dyn TelemetryBus>) -> Self {
        Self {
            sink_path,
            bus,
            health: Arc::new(RwLock::new(SidecarHealth::Starting)),
            published: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn health(&self) -> SidecarHealth {
        *self.health.read()
    }

    /// Healthy once past startup, even while still waiting for the sink.
    pub fn is_healthy(&self) -> bool {
        self.health() != SidecarHealth::Starting
    }

    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Follow the sink until cancelled. Never returns an error: the
    /// sidecar degrades to waiting/retrying on every failure.
    pub async fn run(&self, cancel: CancelToken) {
        self.wait_for_sink(&cancel).await;
        if cancel.is_cancelled() {
            return;
        }

        loop {
            match self.follow(&cancel).await {
                Ok(()) => return, // cancelled
                Err(e) => {
                    *self.health.write() = SidecarHealth::Error;
                    tracing::warn!(error = %e, "sink tail failed; reopening");
                    tokio::time::sleep(POLL_INTERVAL).await;
                    if cancel.is_cancelled() {
                        return;
                    }
                    self.wait_for_sink(&cancel).await;
                }
            }
        }
    }

    async fn wait_for_sink(&self, cancel: &CancelToken) {
        *self.health.write() = SidecarHealth::WaitingForFile;
        let mut attempts = 0u32;
        while !self.sink_path.exists() {
            if cancel.is_cancelled() {
                return;
            }
            attempts += 1;
            if attempts == WAIT_ATTEMPTS {
                tracing::warn!(
                    path = %self.sink_path.display(),
                    "telemetry sink unavailable; continuing to wait"
                );
            }
            tokio::time::sleep(WAIT_INTERVAL).await;
        }
    }

    async fn follow(&self, cancel: &CancelToken) -> std::io::Result<()> {
        let mut file = tokio::fs::File::open(&self.sink_path).await?;
        *self.health.write() = SidecarHealth::Tailing;

        let mut pending: Vec<u8> = Vec::new();
        let mut buf = [0u8; 8192];

        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }
            let n = file.read(&mut buf).await?;
            if n == 0 {
                tokio::time::sleep(POLL_INTERVAL).await;
                continue;
            }
            pending.extend_from_slice(&buf[..n]);

            // Only complete lines are published; a partial tail stays
            // buffered until its newline arrives.
            while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                self.handle_line(&line[..line.len() - 1]);
            }
        }
    }

    fn handle_line(&self, line: &[u8]) {
        if line.is_empty() {
            return;
        }
        let event: serde_json::Value = match serde_json::from_slice(line) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unparseable sink line");
                return;
            }
        };
        // Only lines carrying the telemetry marker belong on the topic.
        if event.get("_telemetry").and_then(|v| v.as_bool()) != Some(true) {
            return;
        }

        let partition_key = event
            .get("tenant_id")
            .and_then(|v| v.as_str())
            .or_else(|| event.get("run_id").and_then(|v| v.as_str()))
            .unwrap_or("unkeyed")
            .to_string();

        if let Err(e) = self.bus.publish(&partition_key, event) {
            tracing::warn!(error = %e, "bus publish failed; event lost for this pass");
            return;
        }
        self.published.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MemoryBus;
    use std::io::Write;

    fn write_line(path: &std::path::Path, json: &serde_json::Value) {
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        writeln!(f, "{json}").unwrap();
    }

    #[tokio::test]
    async fn tails_existing_and_new_lines() {
        let dir = tempfile::tempdir().unwrap();
        let sink = dir.path().join("events.ndjson");
        write_line(
            &sink,
            &serde_json::json!({"_telemetry": true, "type": "run_started", "run_id": "r1", "tenant_id": "t1"}),
        );

        let bus: Arc<dyn TelemetryBus> = Arc::new(MemoryBus::default());
        let mut rx = bus.subscribe();
        let sidecar = Arc::new(TailSidecar::new(sink.clone(), bus));
        let cancel = CancelToken::new();
        let task = {
            let sidecar = sidecar.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { sidecar.run(cancel).await })
        };

        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out")
            .unwrap();
        assert_eq!(first.partition_key, "t1");
        assert_eq!(sidecar.health(), SidecarHealth::Tailing);

        // Appended after the tail started.
        write_line(
            &sink,
            &serde_json::json!({"_telemetry": true, "type": "run_finished", "run_id": "r1"}),
        );
        let second = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out")
            .unwrap();
        // No tenant on this one: partitioned by run id.
        assert_eq!(second.partition_key, "r1");

        cancel.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(2), task).await;
    }

    #[tokio::test]
    async fn non_telemetry_lines_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let sink = dir.path().join("events.ndjson");
        write_line(&sink, &serde_json::json!({"level": "info", "msg": "app log"}));
        write_line(
            &sink,
            &serde_json::json!({"_telemetry": true, "type": "handoff", "run_id": "r9"}),
        );

        let bus: Arc<dyn TelemetryBus> = Arc::new(MemoryBus::default());
        let mut rx = bus.subscribe();
        let sidecar = TailSidecar::new(sink, bus);
        let cancel = CancelToken::new();
        let c2 = cancel.clone();
        let handle = tokio::spawn(async move { sidecar.run(c2).await });

        let msg = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out")
            .unwrap();
        assert_eq!(msg.event["type"], "handoff");

        cancel.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
    }

    #[tokio::test]
    async fn waits_for_file_health_state() {
        let dir = tempfile::tempdir().unwrap();
        let sink = dir.path().join("not-yet.ndjson");
        let bus: Arc<dyn TelemetryBus> = Arc::new(MemoryBus::default());
        let sidecar = Arc::new(TailSidecar::new(sink.clone(), bus));
        assert_eq!(sidecar.health(), SidecarHealth::Starting);

        let cancel = CancelToken::new();
        let task = {
            let sidecar = sidecar.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { sidecar.run(cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(sidecar.health(), SidecarHealth::WaitingForFile);
        assert!(sidecar.is_healthy());

        cancel.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(2), task).await;
    }
}
