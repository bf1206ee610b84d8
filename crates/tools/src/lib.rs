//! Tool registry and executor.
//!
//! Tools are the only way the assistant touches tenant data. Each entry
//! carries a safety class (read-only tools cache, write tools invalidate),
//! a JSON argument schema, and a uniform async handler against the CRM
//! resource seam. The executor wraps every invocation with schema
//! validation, a destructive deny-list, internal-token minting, telemetry
//! spans, the cache-around pattern, and artifact offload for oversized
//! results.

pub mod catalog;
pub mod executor;
pub mod registry;
pub mod resource;
pub mod schema;

pub use executor::{CacheDisposition, ExecOutcome, ToolExecutor};
pub use registry::{SafetyClass, ToolRegistry, ToolSpec};
pub use resource::{
    CrmResource, HttpCrmResource, MemoryCrmResource, ResourceMethod, ResourceRequest,
    ResourceResponse,
};
