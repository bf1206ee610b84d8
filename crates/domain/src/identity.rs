//! Caller identity and tenancy primitives.
//!
//! Every persisted and cached entity is qualified by the tenant UUID; the
//! slug exists only for human-facing lookup. `Role` gates resource-layer
//! visibility scoping downstream and always defaults to the least
//! privileged value when absent.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Effective role of the caller within a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Secure fallback: sees only records visibility rules grant.
    #[default]
    Employee,
    Admin,
    Superadmin,
}

impl Role {
    /// Admin and superadmin bypass resource-level visibility scoping.
    pub fn bypasses_visibility_scoping(self) -> bool {
        matches!(self, Role::Admin | Role::Superadmin)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Employee => "employee",
            Role::Admin => "admin",
            Role::Superadmin => "superadmin",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "employee" => Ok(Role::Employee),
            "admin" => Ok(Role::Admin),
            "superadmin" => Ok(Role::Superadmin),
            _ => Err(()),
        }
    }
}

/// The authenticated caller of a turn or tool execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub role: Role,
    pub tenant_uuid: Uuid,
    /// True for identities resolved from internal (backend-minted) tokens.
    #[serde(default)]
    pub internal: bool,
}

impl CallerIdentity {
    pub fn new(id: impl Into<String>, email: impl Into<String>, role: Role, tenant: Uuid) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            role,
            tenant_uuid: tenant,
            internal: false,
        }
    }
}

/// A canonical tenant record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRecord {
    pub uuid: Uuid,
    pub slug: String,
    pub name: String,
}

/// Where a tenant lookup was satisfied from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantSource {
    Uuid,
    Slug,
    System,
}

/// Result of resolving a tenant identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedTenant {
    pub uuid: Uuid,
    pub slug: String,
    pub name: String,
    pub found: bool,
    pub source: TenantSource,
}
