//! InMemoryBlobStore - 開発用・テスト用の Blob ストア
//!
//! HashMap<key, blob> を Mutex で守るだけの実装。URL は `base_url/key`。

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::{FerryError, KEY_EXISTS};
use crate::ports::BlobStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub bytes: Bytes,
    pub content_type: String,
}

#[derive(Debug)]
pub struct InMemoryBlobStore {
    base_url: String,
    blobs: Mutex<HashMap<String, StoredBlob>>,
}

impl InMemoryBlobStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            blobs: Mutex::new(HashMap::new()),
        }
    }

    fn blobs(&self) -> MutexGuard<'_, HashMap<String, StoredBlob>> {
        self.blobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &str) -> Option<StoredBlob> {
        self.blobs().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.blobs().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.blobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new("memory://blobs")
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<String, FerryError> {
        match self.blobs().entry(key.to_string()) {
            Entry::Occupied(_) => {
                return Err(FerryError::blob(format!("object {key} already exists"))
                    .with_code(KEY_EXISTS));
            }
            Entry::Vacant(slot) => {
                slot.insert(StoredBlob {
                    bytes,
                    content_type: content_type.to_string(),
                });
            }
        }
        Ok(format!("{}/{key}", self.base_url))
    }

    async fn delete(&self, key: &str) -> Result<(), FerryError> {
        self.blobs().remove(key);
        Ok(())
    }

    async fn ping(&self) -> bool {
        true
    }
}
