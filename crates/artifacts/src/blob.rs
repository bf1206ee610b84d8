//! Key-addressed byte store seam.
//!
//! The physical store (an R2/S3-style service with presigned access) is an
//! external collaborator; this trait is its in-core contract. `FsBlobStore`
//! backs development and single-node deployments, `MemBlobStore` backs
//! tests.

use std::collections::HashMap;
use std::path::PathBuf;

use parking_lot::RwLock;

use atrium_domain::{Error, Result};

#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    async fn put_bytes(&self, key: &str, bytes: &[u8]) -> Result<()>;
    async fn get_bytes(&self, key: &str) -> Result<Vec<u8>>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Filesystem-backed blob store rooted at a configured directory.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        // Keys are slash-separated segments minted by the artifact store;
        // reject anything that could escape the root.
        if key.is_empty() || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
            return Err(Error::validation("key", "malformed blob key"));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait::async_trait]
impl BlobStore for FsBlobStore {
    async fn put_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| Error::StorageUnavailable(e.to_string()))
    }

    async fn get_bytes(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("blob {key}")))
            }
            Err(e) => Err(Error::StorageUnavailable(e.to_string())),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::StorageUnavailable(e.to_string())),
        }
    }
}

/// In-memory blob store for tests.
#[derive(Default)]
pub struct MemBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

#[async_trait::async_trait]
impl BlobStore for MemBlobStore {
    async fn put_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.blobs.write().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get_bytes(&self, key: &str) -> Result<Vec<u8>> {
        self.blobs
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("blob {key}")))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.blobs.write().remove(key);
        Ok(())
    }
}
