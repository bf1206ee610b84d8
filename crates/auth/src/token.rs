//! Internal token minter.
//!
//! Backend-initiated work on behalf of a user carries a short-lived HS256
//! token with the caller's real role, so the resource layer keeps applying
//! the right visibility scope. A token missing its role claim resolves to
//! `employee` - never to anything more privileged.

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use atrium_domain::identity::{CallerIdentity, Role};
use atrium_domain::{Error, Result};

/// Token lifetime. Fixed: internal tokens are minted per tool call and
/// never refreshed.
const TOKEN_TTL_SECS: i64 = 300;

#[derive(Debug, Serialize, Deserialize)]
struct InternalClaims {
    sub: String,
    tenant_id: Uuid,
    /// Absent on malformed tokens; deserialization falls back to employee.
    #[serde(default)]
    user_role: Option<Role>,
    #[serde(default)]
    email: String,
    internal: bool,
    exp: i64,
    iat: i64,
}

pub struct TokenMinter {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenMinter {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Mint an internal token for `caller`. The role claim is carried
    /// verbatim.
    pub fn mint(&self, caller: &CallerIdentity) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = InternalClaims {
            sub: caller.id.clone(),
            tenant_id: caller.tenant_uuid,
            user_role: Some(caller.role),
            email: caller.email.clone(),
            internal: true,
            exp: now + TOKEN_TTL_SECS,
            iat: now,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| Error::Internal(format!("token encode: {e}")))
    }

    /// Verify and resolve a token back to a caller identity.
    pub fn resolve(&self, token: &str) -> Result<CallerIdentity> {
        let data = decode::<InternalClaims>(token, &self.decoding, &Validation::default())
            .map_err(|e| Error::Unauthorized(format!("invalid internal token: {e}")))?;
        let claims = data.claims;
        if !claims.internal {
            return Err(Error::Unauthorized("token is not internal".into()));
        }
        Ok(CallerIdentity {
            id: claims.sub,
            email: claims.email,
            // Missing role must degrade to the least privileged value.
            role: claims.user_role.unwrap_or(Role::Employee),
            tenant_uuid: claims.tenant_id,
            internal: true,
        })
    }
}
