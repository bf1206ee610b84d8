//! Message bus seam between the tail sidecar and the observer.
//!
//! The sidecar publishes raw event JSON with a partition key; the observer
//! subscribes. External transports (Kafka, RabbitMQ - selected by
//! `BUS_TYPE`) plug in behind [`TelemetryBus`]; the in-process
//! [`MemoryBus`] is the transport compiled into this crate and the one
//! every test uses.

use atrium_domain::{Error, Result};
use serde_json::Value;
use tokio::sync::broadcast;

/// One message on the telemetry topic.
#[derive(Debug, Clone)]
pub struct BusMessage {
    /// Partitioning identity: `tenant_id` when present, else `run_id`.
    pub partition_key: String,
    pub event: Value,
}

pub trait TelemetryBus: Send + Sync {
    /// Publish one event. At-least-once: callers may retry, consumers
    /// dedupe on `(run_id, span_id, type, ts)`.
    fn publish(&self, partition_key: &str, event: Value) -> Result<()>;

    /// Open a new subscription positioned at the current tail.
    fn subscribe(&self) -> broadcast::Receiver<BusMessage>;
}

/// In-process bus over a tokio broadcast channel.
pub struct MemoryBus {
    tx: broadcast::Sender<BusMessage>,
}

impl MemoryBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(16));
        Self { tx }
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl TelemetryBus for MemoryBus {
    fn publish(&self, partition_key: &str, event: Value) -> Result<()> {
        // A send error only means there are no subscribers yet; that is
        // not a delivery failure for a broadcast topic.
        let _ = self.tx.send(BusMessage {
            partition_key: partition_key.to_string(),
            event,
        });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.tx.subscribe()
    }
}

/// Construct the bus for the configured transport. Kafka/Rabbit select an
/// external deployment bridged outside this process; in-process fan-out
/// always goes through the memory bus.
pub fn bus_for_config(cfg: &atrium_domain::config::BusConfig) -> Result<MemoryBus> {
    use atrium_domain::config::BusKind;
    match cfg.kind {
        BusKind::Memory => Ok(MemoryBus::default()),
        BusKind::Kafka | BusKind::Rabbit => {
            if cfg.brokers.is_empty() {
                tracing::warn!(
                    kind = ?cfg.kind,
                    "external bus selected without brokers; using in-process bus"
                );
                Ok(MemoryBus::default())
            } else {
                Err(Error::BusUnavailable(format!(
                    "external bus transport {:?} is not bridged in this binary",
                    cfg.kind
                )))
            }
        }
    }
}
