//! Best-effort telemetry fabric.
//!
//! The core emits typed events carrying run/trace/span correlation ids to
//! an append-only NDJSON sink ([`emitter`]). A tail sidecar follows the
//! sink and republishes each event onto a bus topic ([`sidecar`], [`bus`]);
//! an observer consumes the bus into a bounded ring buffer for snapshot
//! and live-stream consumers ([`observer`]).
//!
//! Nothing in this crate ever blocks or fails the request path: emission
//! is a bounded-channel send, and every IO error is swallowed after a log
//! line.

pub mod bus;
pub mod context;
pub mod emitter;
pub mod event;
pub mod observer;
pub mod sidecar;

pub use bus::{BusMessage, MemoryBus, TelemetryBus};
pub use context::CorrelationCtx;
pub use emitter::Emitter;
pub use event::{EventType, TelemetryEvent};
pub use observer::Observer;
pub use sidecar::{SidecarHealth, TailSidecar};
