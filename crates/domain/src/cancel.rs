//! Cooperative cancellation for in-flight runs.
//!
//! The router creates one token per turn and hands clones to every
//! sub-operation it starts (tool executions, the LLM call, background
//! loops). Once the run context opens, the token is bound to its run id,
//! so any site that winds down can say which run was cut short.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use uuid::Uuid;

#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    run_id: OnceLock<Uuid>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tie this token to the run it guards. The first binding wins and
    /// is visible through every clone.
    pub fn bind_run(&self, run_id: Uuid) {
        let _ = self.inner.run_id.set(run_id);
    }

    /// The bound run, once the router has opened one.
    pub fn run_id(&self) -> Option<Uuid> {
        self.inner.run_id.get().copied()
    }

    /// Ask the bound run and all its sub-operations to stop at their
    /// next checkpoint. Results of operations abandoned this way must
    /// not be cached or persisted.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Render what was cancelled for error messages and telemetry,
    /// naming the run when one is bound.
    pub fn describe(&self, what: &str) -> String {
        match self.run_id() {
            Some(run) => format!("{what} cancelled (run {run})"),
            None => format!("{what} cancelled"),
        }
    }
}
