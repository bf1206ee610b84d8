//! Write-invalidation contract shared by the HTTP middleware and the
//! tool executor.
//!
//! On a successful write (status < 400) with a resolvable tenant, the
//! write's module is invalidated exactly once; dashboard aggregates are
//! additionally invalidated when the module is a CRM entity. Error
//! responses never invalidate.

use uuid::Uuid;

use crate::store::TtlCache;

/// The CRM entity set whose writes also dirty dashboard aggregates.
pub const CRM_ENTITY_MODULES: [&str; 7] = [
    "leads",
    "accounts",
    "contacts",
    "opportunities",
    "activities",
    "notes",
    "bizdev",
];

pub fn is_crm_entity(module: &str) -> bool {
    CRM_ENTITY_MODULES.contains(&module)
}

/// Outcome of one invalidation decision, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteInvalidation {
    pub module_invalidated: bool,
    pub dashboard_invalidated: bool,
}

impl WriteInvalidation {
    const SKIPPED: Self = Self {
        module_invalidated: false,
        dashboard_invalidated: false,
    };

    /// Apply the contract for one completed write response.
    pub fn apply(
        cache: &TtlCache,
        status: u16,
        tenant: Option<Uuid>,
        module: &str,
    ) -> Self {
        if status >= 400 {
            return Self::SKIPPED;
        }
        let Some(tenant) = tenant else {
            tracing::debug!(module, "write without resolvable tenant; skipping invalidation");
            return Self::SKIPPED;
        };

        cache.invalidate_tenant(&tenant, module);
        let dashboard = is_crm_entity(module);
        if dashboard {
            cache.invalidate_dashboard(&tenant);
        }
        Self {
            module_invalidated: true,
            dashboard_invalidated: dashboard,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::cache_key;
    use serde_json::json;
    use std::time::Duration;

    fn seeded(tenant: &Uuid) -> TtlCache {
        let cache = TtlCache::new();
        let ttl = Duration::from_secs(120);
        cache.set(&cache_key("leads", tenant, "list_leads", &json!({})), json!(1), ttl);
        cache.set(
            &cache_key("dashboard", tenant, "dashboard_summary", &json!({})),
            json!(2),
            ttl,
        );
        cache
    }

    #[test]
    fn successful_crm_write_invalidates_module_and_dashboard() {
        let tenant = Uuid::new_v4();
        let cache = seeded(&tenant);
        let outcome = WriteInvalidation::apply(&cache, 201, Some(tenant), "leads");
        assert!(outcome.module_invalidated);
        assert!(outcome.dashboard_invalidated);
        assert!(cache.is_empty());
    }

    #[test]
    fn non_crm_module_skips_dashboard() {
        let tenant = Uuid::new_v4();
        let cache = seeded(&tenant);
        let outcome = WriteInvalidation::apply(&cache, 200, Some(tenant), "settings");
        assert!(outcome.module_invalidated);
        assert!(!outcome.dashboard_invalidated);
        // Dashboard entry survives.
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn error_response_never_invalidates() {
        let tenant = Uuid::new_v4();
        let cache = seeded(&tenant);
        for status in [400u16, 404, 409, 500] {
            let outcome = WriteInvalidation::apply(&cache, status, Some(tenant), "leads");
            assert_eq!(outcome, WriteInvalidation::SKIPPED);
        }
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn missing_tenant_skips_invalidation() {
        let tenant = Uuid::new_v4();
        let cache = seeded(&tenant);
        let outcome = WriteInvalidation::apply(&cache, 200, None, "leads");
        assert_eq!(outcome, WriteInvalidation::SKIPPED);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn crm_entity_set_is_exact() {
        for m in CRM_ENTITY_MODULES {
            assert!(is_crm_entity(m));
        }
        assert!(!is_crm_entity("dashboard"));
        assert!(!is_crm_entity("settings"));
        assert!(!is_crm_entity("lead"));
    }
}
