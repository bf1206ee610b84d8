//! Out-of-band storage for large tool results.
//!
//! Payloads are serialized, hashed, and written to a key-addressed blob
//! store under a tenant-prefixed key; a metadata row records the ref.
//! Conversations then carry the artifact id instead of the payload, and
//! later turns re-fetch on demand.

pub mod blob;
pub mod store;

pub use blob::{BlobStore, FsBlobStore, MemBlobStore};
pub use store::{ArtifactRef, ArtifactStore};
