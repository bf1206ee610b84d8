//! Telemetry observer: bounded in-memory buffer + live fan-out.
//!
//! Consumes the bus into a ring buffer (oldest evicted) and rebroadcasts
//! every event to live SSE subscribers. The HTTP surface stays available
//! even when the bus is down - manual injection and snapshots work on the
//! in-memory state alone.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;

use atrium_domain::cancel::CancelToken;

use crate::bus::TelemetryBus;

/// Events replayed to a fresh SSE subscriber before live streaming.
pub const WARMUP_TAIL: usize = 500;

pub struct Observer {
    buf: Mutex<VecDeque<Value>>,
    capacity: usize,
    live: broadcast::Sender<Value>,
}

impl Observer {
    pub fn new(capacity: usize) -> Self {
        let (live, _) = broadcast::channel(1024);
        Self {
            buf: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity: capacity.max(1),
            live,
        }
    }

    /// Append one event, evicting the oldest when full, and fan out to
    /// live subscribers.
    pub fn ingest(&self, event: Value) {
        {
            let mut buf = self.buf.lock();
            if buf.len() == self.capacity {
                buf.pop_front();
            }
            buf.push_back(event.clone());
        }
        let _ = self.live.send(event);
    }

    /// Full buffer contents, oldest first.
    pub fn snapshot(&self) -> Vec<Value> {
        self.buf.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.buf.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.lock().is_empty()
    }

    /// Most recent tail of the buffer for SSE warm-up, oldest first.
    pub fn warmup_tail(&self) -> Vec<Value> {
        let buf = self.buf.lock();
        let skip = buf.len().saturating_sub(WARMUP_TAIL);
        buf.iter().skip(skip).cloned().collect()
    }

    /// Subscribe to the live feed (positioned at now; use
    /// [`Observer::warmup_tail`] for history).
    pub fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.live.subscribe()
    }

    /// Clear the buffer and notify all live streams with a synthetic
    /// `system_reset` event. Returns the event so HTTP callers can echo it.
    pub fn clear(&self) -> Value {
        self.buf.lock().clear();
        let reset = serde_json::json!({
            "type": "system_reset",
            "ts": Utc::now(),
        });
        let _ = self.live.send(reset.clone());
        reset
    }

    /// Drain the bus into this observer until cancelled. Survives bus
    /// subscription loss by resubscribing; lagging only costs the missed
    /// events (arrival order per consumer is preserved).
    pub async fn consume_bus(self: Arc<Self>, bus: Arc<dyn TelemetryBus>, cancel: CancelToken) {
        let mut rx = bus.subscribe();
        loop {
            if cancel.is_cancelled() {
                return;
            }
            match rx.recv().await {
                Ok(msg) => self.ingest(msg.event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(missed = n, "observer lagged behind the bus");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    if cancel.is_cancelled() {
                        return;
                    }
                    rx = bus.subscribe();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MemoryBus;

    fn ev(i: u32) -> Value {
        serde_json::json!({"type": "agent_status", "seq": i})
    }

    #[test]
    fn ring_evicts_oldest() {
        let obs = Observer::new(3);
        for i in 0..5 {
            obs.ingest(ev(i));
        }
        let snap = obs.snapshot();
        assert_eq!(snap.len(), 3);
        assert_eq!(snap[0]["seq"], 2);
        assert_eq!(snap[2]["seq"], 4);
    }

    #[test]
    fn warmup_tail_is_bounded() {
        let obs = Observer::new(2000);
        for i in 0..800 {
            obs.ingest(ev(i));
        }
        let tail = obs.warmup_tail();
        assert_eq!(tail.len(), WARMUP_TAIL);
        assert_eq!(tail[0]["seq"], 300);
        assert_eq!(tail[WARMUP_TAIL - 1]["seq"], 799);
    }

    #[test]
    fn clear_resets_buffer_and_broadcasts() {
        let obs = Observer::new(10);
        obs.ingest(ev(1));
        let mut rx = obs.subscribe();
        let reset = obs.clear();
        assert_eq!(reset["type"], "system_reset");
        assert!(obs.is_empty());
        let live = rx.try_recv().unwrap();
        assert_eq!(live["type"], "system_reset");
    }

    #[tokio::test]
    async fn consume_bus_fills_buffer() {
        let obs = Arc::new(Observer::new(10));
        let bus: Arc<dyn TelemetryBus> = Arc::new(MemoryBus::default());
        let cancel = CancelToken::new();
        let task = tokio::spawn(obs.clone().consume_bus(bus.clone(), cancel.clone()));

        // Give the consumer a beat to subscribe.
        tokio::time::sleep(Duration::from_millis(50)).await;
        bus.publish("t1", ev(7)).unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while obs.is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("event never arrived");

        assert_eq!(obs.snapshot()[0]["seq"], 7);
        cancel.cancel();
        bus.publish("t1", ev(8)).unwrap(); // wake the loop so it can observe the cancel
        let _ = tokio::time::timeout(Duration::from_secs(2), task).await;
    }
}
