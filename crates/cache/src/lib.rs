//! Tenant-scoped TTL cache with namespace invalidation.
//!
//! The cache is advisory: any failure is treated as a miss and correctness
//! never depends on it. Keys follow the grammar
//! `<module>:<tenantUuid>:<tool>:<argFingerprint>` so invalidation can
//! prefix-match a whole module for one tenant without touching others.

pub mod invalidation;
pub mod key;
pub mod store;

pub use invalidation::{is_crm_entity, WriteInvalidation, CRM_ENTITY_MODULES};
pub use key::{cache_key, canonical_json, fingerprint};
pub use store::{CacheStats, TtlCache};
