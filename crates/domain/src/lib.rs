//! Shared domain types for the Atrium orchestration core.
//!
//! Everything here is dependency-light: the error taxonomy, the env-driven
//! configuration, caller identity, and the provider-agnostic chat/tool
//! message types used between the router, the tool executor, and the LLM
//! adapter.

pub mod cancel;
pub mod config;
pub mod error;
pub mod identity;
pub mod tool;

pub use error::{Error, Result};
