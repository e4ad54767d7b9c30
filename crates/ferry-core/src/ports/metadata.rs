//! MetadataRepository port - 保存済みオブジェクトのメタデータ
//!
//! The repository is the durable record of what the blob store holds. Writes
//! are single-row and atomic; listing is newest first.

use async_trait::async_trait;

use crate::domain::{FerryError, RecordId, RecordPage, StoredObjectRecord};

#[async_trait]
pub trait MetadataRepository: Send + Sync {
    /// Persist `record` and return its id.
    async fn save(&self, record: StoredObjectRecord) -> Result<RecordId, FerryError>;

    /// Page `page` (1-based) of `limit` records, sorted by `created_at` descending.
    async fn list(&self, page: u32, limit: u32) -> Result<RecordPage, FerryError>;

    /// Cheap reachability probe for health checks.
    async fn ping(&self) -> bool;
}
