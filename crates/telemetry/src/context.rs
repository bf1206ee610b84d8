//! Correlation identifiers threaded through every call path.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A run/trace/span triple identifying one unit of work.
///
/// A root context opens a run; each sub-operation (tool call, LLM call)
/// gets a child span that inherits `run_id` and `trace_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationCtx {
    pub run_id: Uuid,
    pub trace_id: Uuid,
    pub span_id: Uuid,
    pub parent_span_id: Option<Uuid>,
}

pub fn new_run_id() -> Uuid {
    Uuid::new_v4()
}

pub fn new_trace_id() -> Uuid {
    Uuid::new_v4()
}

pub fn new_span_id() -> Uuid {
    Uuid::new_v4()
}

impl CorrelationCtx {
    /// Open a root context: `trace_id` defaults to the run id and there is
    /// no parent span.
    pub fn root() -> Self {
        let run_id = new_run_id();
        Self {
            run_id,
            trace_id: run_id,
            span_id: new_span_id(),
            parent_span_id: None,
        }
    }

    /// Derive a child span: same run and trace, fresh span id, parented to
    /// this context's span.
    pub fn child(&self) -> Self {
        Self {
            run_id: self.run_id,
            trace_id: self.trace_id,
            span_id: new_span_id(),
            parent_span_id: Some(self.span_id),
        }
    }
}
