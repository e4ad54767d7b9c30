//! Stored object record: server-side metadata for one ingested blob.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::RecordId;
use super::state::RecordStatus;

/// Prefix under which every ingested blob is stored.
pub const KEY_PREFIX: &str = "uploads/";

/// Metadata row written after the blob write succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredObjectRecord {
    pub id: RecordId,
    pub key: String,
    pub original_name: String,
    pub size: u64,
    pub mime_type: String,
    pub url: String,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
}

/// Build the blob key `uploads/<stamp>-<name>` from a millisecond stamp.
///
/// Path separators in the client-supplied name are replaced so the key
/// cannot escape the prefix. Uniqueness is the caller's job: the ingestion
/// service never hands out the same stamp twice.
pub fn object_key(stamp_millis: i64, original_name: &str) -> String {
    let name: String = original_name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    format!("{KEY_PREFIX}{stamp_millis}-{name}")
}

/// A page of records plus the total row count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPage {
    pub records: Vec<StoredObjectRecord>,
    pub total: u64,
}

impl RecordPage {
    /// Number of pages of `limit` rows needed for `total`.
    pub fn page_count(&self, limit: u32) -> u64 {
        if limit == 0 {
            return 0;
        }
        self.total.div_ceil(u64::from(limit))
    }
}
