//! The in-process TTL store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::key::module_prefix;

/// Derived-aggregate namespace invalidated alongside CRM entity writes.
pub const DASHBOARD_MODULE: &str = "dashboard";

struct Entry {
    value: Value,
    expires_at: Instant,
}

/// Hit/miss/invalidation counters, exposed on the health surface.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
}

/// Shared TTL cache. All methods are infallible by contract: the cache is
/// advisory and a failure of any kind behaves as a miss.
#[derive(Default)]
pub struct TtlCache {
    entries: RwLock<HashMap<String, Entry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl TtlCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a key. Expired entries count as misses and are removed.
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            if let Some(entry) = entries.get(key) {
                if entry.expires_at > now {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.value.clone());
                }
            } else {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        }
        // Entry exists but expired: evict under the write lock.
        self.entries.write().remove(key);
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store a value. Best effort: a zero TTL stores nothing.
    pub fn set(&self, key: &str, value: Value, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        self.entries.write().insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Drop every entry whose key prefix is `<module>:<tenant>:`.
    /// Returns the number of entries removed.
    pub fn invalidate_tenant(&self, tenant: &Uuid, module: &str) -> usize {
        let prefix = module_prefix(module, tenant);
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(&prefix));
        let removed = before - entries.len();
        if removed > 0 {
            self.invalidations.fetch_add(removed as u64, Ordering::Relaxed);
        }
        tracing::debug!(tenant = %tenant, module, removed, "cache invalidated");
        removed
    }

    /// Drop the tenant's derived-aggregate entries.
    pub fn invalidate_dashboard(&self, tenant: &Uuid) -> usize {
        self.invalidate_tenant(tenant, DASHBOARD_MODULE)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::cache_key;
    use serde_json::json;

    #[test]
    fn get_set_round_trip_within_ttl() {
        let cache = TtlCache::new();
        cache.set("k1", json!({"n": 1}), Duration::from_secs(60));
        assert_eq!(cache.get("k1"), Some(json!({"n": 1})));
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let cache = TtlCache::new();
        cache.set("k1", json!(1), Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get("k1"), None);
        assert_eq!(cache.stats().misses, 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn zero_ttl_stores_nothing() {
        let cache = TtlCache::new();
        cache.set("k1", json!(1), Duration::ZERO);
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_tenant_is_prefix_scoped() {
        let cache = TtlCache::new();
        let t1 = Uuid::new_v4();
        let t2 = Uuid::new_v4();
        let ttl = Duration::from_secs(60);
        cache.set(&cache_key("leads", &t1, "list_leads", &json!({})), json!(1), ttl);
        cache.set(&cache_key("leads", &t1, "search_leads", &json!({"q": "a"})), json!(2), ttl);
        cache.set(&cache_key("accounts", &t1, "list_accounts", &json!({})), json!(3), ttl);
        cache.set(&cache_key("leads", &t2, "list_leads", &json!({})), json!(4), ttl);

        let removed = cache.invalidate_tenant(&t1, "leads");
        assert_eq!(removed, 2);
        // Other module and other tenant untouched.
        assert!(cache.get(&cache_key("accounts", &t1, "list_accounts", &json!({}))).is_some());
        assert!(cache.get(&cache_key("leads", &t2, "list_leads", &json!({}))).is_some());
        assert_eq!(cache.stats().invalidations, 2);
    }

    #[test]
    fn tenant_isolation_on_identical_args() {
        let cache = TtlCache::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let args = json!({"q": "john"});
        cache.set(
            &cache_key("leads", &b, "search_leads", &args),
            json!("tenant-b-data"),
            Duration::from_secs(60),
        );
        assert_eq!(cache.get(&cache_key("leads", &a, "search_leads", &args)), None);
    }

    #[test]
    fn dashboard_invalidation_only_hits_dashboard() {
        let cache = TtlCache::new();
        let t = Uuid::new_v4();
        let ttl = Duration::from_secs(60);
        cache.set(&cache_key("dashboard", &t, "dashboard_summary", &json!({})), json!(1), ttl);
        cache.set(&cache_key("leads", &t, "list_leads", &json!({})), json!(2), ttl);
        assert_eq!(cache.invalidate_dashboard(&t), 1);
        assert!(cache.get(&cache_key("leads", &t, "list_leads", &json!({}))).is_some());
    }
}
