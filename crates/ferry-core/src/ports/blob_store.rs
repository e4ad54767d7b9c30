//! BlobStore port - Blob ストレージ（S3 / S3 互換 / InMemory）
//!
//! Implementations must provide atomic per-key writes and translate backend
//! failures into `FerryError::Storage { backend: BlobStore, .. }`.

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::FerryError;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under a key that does not exist yet and return the
    /// public URL.
    ///
    /// An existing object is never replaced: the write fails with a storage
    /// error for which [`FerryError::is_key_conflict`] holds.
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<String, FerryError>;

    /// Delete `key`. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), FerryError>;

    /// Cheap reachability probe for health checks.
    async fn ping(&self) -> bool;
}
