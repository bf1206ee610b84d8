//! Tool declarations and the name-keyed registry.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use uuid::Uuid;

use atrium_domain::tool::ToolDefinition;
use atrium_domain::Result;

use crate::resource::CrmResource;

/// Tool-name substrings that are rejected outright in assistant contexts,
/// regardless of schema validation or caller role.
const DESTRUCTIVE_MARKERS: [&str; 5] = ["delete", "drop", "truncate", "wipe", "purge"];

/// Read/write classification driving the cache-around behavior.
#[derive(Debug, Clone)]
pub enum SafetyClass {
    /// Results cache under the tool's TTL (`None` = configured default).
    ReadOnly { ttl: Option<Duration> },
    /// Success invalidates the named modules for the tenant.
    Write { invalidates: Vec<&'static str> },
}

/// Everything a handler receives for one invocation.
pub struct HandlerCtx {
    pub resource: Arc<dyn CrmResource>,
    /// Internal token carrying the caller's effective role.
    pub token: String,
    pub tenant: Uuid,
    pub args: Value,
}

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;
pub type ToolHandler = Arc<dyn Fn(HandlerCtx) -> HandlerFuture + Send + Sync>;

/// Renders a one-line human summary of a tool result for telemetry and
/// the conversation window.
pub type Summarizer = fn(&Value) -> String;

pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    /// Cache/invalidation namespace this tool operates in.
    pub module: &'static str,
    pub args_schema: Value,
    pub safety: SafetyClass,
    pub summarize: Summarizer,
    pub handler: ToolHandler,
}

impl ToolSpec {
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.to_string(),
            description: self.description.to_string(),
            parameters: self.args_schema.clone(),
        }
    }
}

/// Wrap an async fn into the uniform handler shape.
pub fn handler<F, Fut>(f: F) -> ToolHandler
where
    F: Fn(HandlerCtx) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<&'static str, ToolSpec>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: ToolSpec) {
        if self.tools.insert(spec.name, spec).is_some() {
            tracing::warn!("duplicate tool registration replaced the earlier entry");
        }
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions advertised to the LLM, in stable name order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> =
            self.tools.values().map(ToolSpec::definition).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Deny-list check on the tool name itself.
    pub fn is_destructive(name: &str) -> bool {
        let lower = name.to_lowercase();
        DESTRUCTIVE_MARKERS.iter().any(|m| lower.contains(m))
    }
}
