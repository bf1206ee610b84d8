//! Tenant resolution and internal token minting.
//!
//! The resolver maps slugs/UUIDs to canonical tenant records; the minter
//! issues short-lived signed tokens that carry the caller's effective role
//! so resource-layer visibility scoping survives backend-initiated work.

pub mod tenant;
pub mod token;

pub use tenant::{TenantDirectory, TenantResolver};
pub use token::TokenMinter;
