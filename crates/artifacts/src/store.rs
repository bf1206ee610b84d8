//! Artifact metadata store.
//!
//! Rows are kept in memory and persisted to `artifacts.json` under the
//! configured root; they are the record of which blob keys exist. Refs
//! are immutable once written; retrieval is gated by tenant equality and
//! verified against the recorded digest.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use atrium_domain::{Error, Result};

use crate::blob::BlobStore;

/// Hard cap on list page size.
const MAX_LIST_LIMIT: usize = 100;

/// Immutable metadata for one stored artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub kind: String,
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub entity_id: Option<String>,
    pub r2_key: String,
    pub sha256: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

/// Input to [`ArtifactStore::put`].
#[derive(Debug, Clone, Deserialize)]
pub struct PutArtifact {
    pub tenant_id: Uuid,
    pub kind: String,
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub entity_id: Option<String>,
    pub payload: Value,
}

/// Filters for [`ArtifactStore::list`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListArtifacts {
    pub tenant_id: Uuid,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

pub struct ArtifactStore {
    blob: Arc<dyn BlobStore>,
    rows: RwLock<HashMap<Uuid, ArtifactRef>>,
    meta_path: Option<PathBuf>,
}

impl ArtifactStore {
    /// Store with metadata persisted under `root/artifacts.json`.
    pub fn new(blob: Arc<dyn BlobStore>, root: &std::path::Path) -> Result<Self> {
        std::fs::create_dir_all(root).map_err(Error::Io)?;
        let meta_path = root.join("artifacts.json");
        let rows: HashMap<Uuid, ArtifactRef> = if meta_path.exists() {
            let raw = std::fs::read_to_string(&meta_path).map_err(Error::Io)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };
        tracing::info!(rows = rows.len(), path = %meta_path.display(), "artifact store loaded");
        Ok(Self {
            blob,
            rows: RwLock::new(rows),
            meta_path: Some(meta_path),
        })
    }

    /// Ephemeral store (tests): metadata lives only in memory.
    pub fn in_memory(blob: Arc<dyn BlobStore>) -> Self {
        Self {
            blob,
            rows: RwLock::new(HashMap::new()),
            meta_path: None,
        }
    }

    /// Serialize, hash, upload, and record a payload. Re-putting an
    /// identical payload under the same tenant+kind returns the existing
    /// ref - the key is content-addressed, so the upload is idempotent.
    pub async fn put(&self, input: PutArtifact) -> Result<ArtifactRef> {
        let bytes = serde_json::to_vec(&input.payload)?;
        let sha256 = hex::encode(Sha256::digest(&bytes));
        let r2_key = format!("{}/{}/{}", input.tenant_id, input.kind, sha256);

        if let Some(existing) = self.find_by_key(&r2_key) {
            return Ok(existing);
        }

        self.blob.put_bytes(&r2_key, &bytes).await?;

        let artifact = ArtifactRef {
            id: Uuid::new_v4(),
            tenant_id: input.tenant_id,
            kind: input.kind,
            entity_type: input.entity_type,
            entity_id: input.entity_id,
            r2_key,
            sha256,
            size_bytes: bytes.len() as u64,
            created_at: Utc::now(),
        };
        self.rows.write().insert(artifact.id, artifact.clone());
        self.flush();
        Ok(artifact)
    }

    /// Fetch a ref and its payload. Cross-tenant ids are indistinguishable
    /// from missing ones.
    pub async fn get(&self, id: Uuid, tenant_id: Uuid) -> Result<(ArtifactRef, Value)> {
        let artifact = {
            let rows = self.rows.read();
            rows.get(&id).cloned()
        };
        let artifact = match artifact {
            Some(a) if a.tenant_id == tenant_id => a,
            _ => return Err(Error::NotFound(format!("artifact {id}"))),
        };

        let bytes = self.blob.get_bytes(&artifact.r2_key).await?;
        let actual = hex::encode(Sha256::digest(&bytes));
        if actual != artifact.sha256 {
            return Err(Error::Internal(format!(
                "artifact {id} digest mismatch on retrieve"
            )));
        }
        let payload: Value = serde_json::from_slice(&bytes)?;
        Ok((artifact, payload))
    }

    /// Tenant-scoped listing, newest first.
    pub fn list(&self, filter: &ListArtifacts) -> Vec<ArtifactRef> {
        let limit = filter.limit.unwrap_or(MAX_LIST_LIMIT).min(MAX_LIST_LIMIT);
        let rows = self.rows.read();
        let mut matches: Vec<ArtifactRef> = rows
            .values()
            .filter(|a| a.tenant_id == filter.tenant_id)
            .filter(|a| filter.kind.as_deref().map_or(true, |k| a.kind == k))
            .filter(|a| {
                filter
                    .entity_id
                    .as_deref()
                    .map_or(true, |e| a.entity_id.as_deref() == Some(e))
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matches.truncate(limit);
        matches
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    fn find_by_key(&self, r2_key: &str) -> Option<ArtifactRef> {
        self.rows
            .read()
            .values()
            .find(|a| a.r2_key == r2_key)
            .cloned()
    }

    /// Persist metadata rows. Best effort: the in-memory view is the
    /// source of truth for this process.
    pub fn flush(&self) {
        let Some(path) = &self.meta_path else { return };
        let rows = self.rows.read();
        match serde_json::to_string_pretty(&*rows) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    tracing::warn!(error = %e, "artifact metadata flush failed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "artifact metadata serialization failed"),
        }
    }
}
