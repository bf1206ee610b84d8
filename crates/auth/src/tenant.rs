//! Tenant resolver: slug or UUID in, canonical record out.
//!
//! Pure lookup against an in-memory directory snapshot. Callers must use
//! the resolved UUID for every downstream key; the slug exists only for
//! human-facing input.

use std::collections::HashMap;

use parking_lot::RwLock;
use uuid::Uuid;

use atrium_domain::identity::{ResolvedTenant, TenantRecord, TenantSource};
use atrium_domain::{Error, Result};

/// Directory of known tenants, indexed both ways.
#[derive(Default)]
pub struct TenantDirectory {
    by_uuid: RwLock<HashMap<Uuid, TenantRecord>>,
    by_slug: RwLock<HashMap<String, Uuid>>,
}

impl TenantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the directory from a record snapshot (boot-time load).
    pub fn from_records(records: Vec<TenantRecord>) -> Self {
        let dir = Self::new();
        for rec in records {
            dir.register(rec);
        }
        dir
    }

    pub fn register(&self, record: TenantRecord) {
        self.by_slug
            .write()
            .insert(record.slug.to_ascii_lowercase(), record.uuid);
        self.by_uuid.write().insert(record.uuid, record);
    }

    pub fn get_by_uuid(&self, uuid: &Uuid) -> Option<TenantRecord> {
        self.by_uuid.read().get(uuid).cloned()
    }

    pub fn get_by_slug(&self, slug: &str) -> Option<TenantRecord> {
        let uuid = *self.by_slug.read().get(&slug.to_ascii_lowercase())?;
        self.get_by_uuid(&uuid)
    }

    pub fn len(&self) -> usize {
        self.by_uuid.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_uuid.read().is_empty()
    }
}

/// Resolves incoming tenant identifiers (UUID, slug, or the literal
/// `"system"`) to canonical records.
pub struct TenantResolver {
    directory: std::sync::Arc<TenantDirectory>,
    system_uuid: Uuid,
}

impl TenantResolver {
    pub fn new(directory: std::sync::Arc<TenantDirectory>, system_uuid: Uuid) -> Self {
        Self {
            directory,
            system_uuid,
        }
    }

    /// Resolve an identifier. Errors with `TenantNotFound` when neither
    /// UUID nor slug form matches. Side-effect free.
    pub fn resolve(&self, identifier: &str) -> Result<ResolvedTenant> {
        let identifier = identifier.trim();

        if identifier.eq_ignore_ascii_case("system") {
            return Ok(ResolvedTenant {
                uuid: self.system_uuid,
                slug: "system".into(),
                name: "System".into(),
                found: true,
                source: TenantSource::System,
            });
        }

        if let Ok(uuid) = Uuid::parse_str(identifier) {
            if let Some(rec) = self.directory.get_by_uuid(&uuid) {
                return Ok(ResolvedTenant {
                    uuid: rec.uuid,
                    slug: rec.slug,
                    name: rec.name,
                    found: true,
                    source: TenantSource::Uuid,
                });
            }
            return Err(Error::TenantNotFound(identifier.to_string()));
        }

        if let Some(rec) = self.directory.get_by_slug(identifier) {
            return Ok(ResolvedTenant {
                uuid: rec.uuid,
                slug: rec.slug,
                name: rec.name,
                found: true,
                source: TenantSource::Slug,
            });
        }

        Err(Error::TenantNotFound(identifier.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn resolver() -> TenantResolver {
        let dir = Arc::new(TenantDirectory::new());
        dir.register(TenantRecord {
            uuid: Uuid::parse_str("6a7bbf34-36b9-4b73-a0f4-6d5db1c33c96").unwrap(),
            slug: "acme".into(),
            name: "Acme Corp".into(),
        });
        dir.register(TenantRecord {
            uuid: Uuid::parse_str("b2f5c8a0-1111-4a2b-9c3d-000000000002").unwrap(),
            slug: "globex".into(),
            name: "Globex".into(),
        });
        TenantResolver::new(dir, Uuid::nil())
    }

    #[test]
    fn resolves_by_uuid() {
        let r = resolver();
        let t = r.resolve("6a7bbf34-36b9-4b73-a0f4-6d5db1c33c96").unwrap();
        assert!(t.found);
        assert_eq!(t.slug, "acme");
        assert_eq!(t.source, TenantSource::Uuid);
    }

    #[test]
    fn resolves_by_slug_case_insensitive() {
        let r = resolver();
        let t = r.resolve("ACME").unwrap();
        assert_eq!(t.name, "Acme Corp");
        assert_eq!(t.source, TenantSource::Slug);
    }

    #[test]
    fn system_literal_maps_to_configured_uuid() {
        let r = resolver();
        let t = r.resolve("system").unwrap();
        assert_eq!(t.uuid, Uuid::nil());
        assert_eq!(t.source, TenantSource::System);
    }

    #[test]
    fn unknown_identifier_is_not_found() {
        let r = resolver();
        assert!(matches!(
            r.resolve("initech"),
            Err(Error::TenantNotFound(_))
        ));
        // Well-formed UUID that is not registered.
        assert!(matches!(
            r.resolve("11111111-2222-3333-4444-555555555555"),
            Err(Error::TenantNotFound(_))
        ));
    }

    #[test]
    fn slug_round_trip_is_stable() {
        let r = resolver();
        let first = r.resolve("globex").unwrap();
        let second = r.resolve(&first.slug).unwrap();
        assert_eq!(first.uuid, second.uuid);
    }
}
