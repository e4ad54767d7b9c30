//! InMemoryMetadataRepository - 開発用・テスト用のメタデータ正本

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::domain::{FerryError, RecordId, RecordPage, StoredObjectRecord};
use crate::ports::MetadataRepository;

#[derive(Debug, Default)]
pub struct InMemoryMetadataRepository {
    records: Mutex<Vec<StoredObjectRecord>>,
}

impl InMemoryMetadataRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> MutexGuard<'_, Vec<StoredObjectRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MetadataRepository for InMemoryMetadataRepository {
    async fn save(&self, record: StoredObjectRecord) -> Result<RecordId, FerryError> {
        let id = record.id;
        let mut records = self.records();
        if records.iter().any(|r| r.id == id) {
            return Err(FerryError::metadata(format!("duplicate record id {id}"))
                .with_code("UNIQUE"));
        }
        records.push(record);
        Ok(id)
    }

    async fn list(&self, page: u32, limit: u32) -> Result<RecordPage, FerryError> {
        let mut records = self.records().clone();
        let total = records.len() as u64;
        // newest first; later inserts win ties
        records.reverse();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let offset = (page.max(1) as usize - 1).saturating_mul(limit as usize);
        let records = records
            .into_iter()
            .skip(offset)
            .take(limit as usize)
            .collect();
        Ok(RecordPage { records, total })
    }

    async fn ping(&self) -> bool {
        true
    }
}
