//! Ingestion service: validate, store the blob, then record its metadata.
//!
//! A metadata row exists only for blobs that were written. If the row cannot
//! be written the blob is deleted again before the error is returned.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::domain::{
    FerryError, RecordId, RecordPage, RecordStatus, StoredObjectRecord, ValidationError,
    object_key,
};
use crate::ports::{BlobStore, Clock, IdGenerator, MetadataRepository, SystemClock, UlidGenerator};
use crate::validation::UploadLimits;

pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Name used when the client sent an empty file name.
const FALLBACK_NAME: &str = "upload";

/// Keys tried per upload when another writer already owns the key.
const MAX_KEY_ATTEMPTS: u32 = 5;

/// Stages of one inbound transfer, logged as it moves through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    Received,
    Validating,
    Rejected,
    Storing,
    RecordingMetadata,
    Completed,
    Failed,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IngestStage::Received => "received",
            IngestStage::Validating => "validating",
            IngestStage::Rejected => "rejected",
            IngestStage::Storing => "storing",
            IngestStage::RecordingMetadata => "recording_metadata",
            IngestStage::Completed => "completed",
            IngestStage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One file as received by the HTTP layer.
#[derive(Debug, Clone)]
pub struct InboundUpload {
    pub original_name: String,
    pub content_type: String,

    /// Size announced by the client, if any. Must match `bytes.len()`.
    pub declared_size: Option<u64>,
    pub bytes: Bytes,
}

impl InboundUpload {
    pub fn new(
        original_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            original_name: original_name.into(),
            content_type: content_type.into(),
            declared_size: None,
            bytes: bytes.into(),
        }
    }

    pub fn with_declared_size(mut self, size: u64) -> Self {
        self.declared_size = Some(size);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReceipt {
    pub key: String,
    pub url: String,
    pub record_id: RecordId,
}

/// Reachability of the two collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub blob_store: bool,
    pub metadata_store: bool,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.blob_store && self.metadata_store
    }
}

#[derive(Clone)]
pub struct IngestionService {
    blobs: Arc<dyn BlobStore>,
    metadata: Arc<dyn MetadataRepository>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    limits: UploadLimits,

    /// Last millisecond stamp used in a key. Shared by clones.
    last_stamp: Arc<AtomicI64>,
}

impl IngestionService {
    pub fn new(blobs: Arc<dyn BlobStore>, metadata: Arc<dyn MetadataRepository>) -> Self {
        Self {
            blobs,
            metadata,
            clock: Arc::new(SystemClock),
            ids: Arc::new(UlidGenerator::new(SystemClock)),
            limits: UploadLimits::default(),
            last_stamp: Arc::new(AtomicI64::new(i64::MIN)),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_limits(mut self, limits: UploadLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> &UploadLimits {
        &self.limits
    }

    /// Run one upload through validation, storage and metadata recording.
    pub async fn ingest(&self, upload: InboundUpload) -> Result<IngestReceipt, FerryError> {
        let size = upload.bytes.len() as u64;
        let name = if upload.original_name.trim().is_empty() {
            FALLBACK_NAME
        } else {
            upload.original_name.as_str()
        };
        debug!(stage = %IngestStage::Received, name, size, content_type = %upload.content_type);

        debug!(stage = %IngestStage::Validating, name);
        if let Err(e) = self.validate(&upload, size) {
            warn!(stage = %IngestStage::Rejected, name, size, error = %e, "upload rejected");
            return Err(e.into());
        }

        let now = self.clock.now();
        let (key, url) = self.store_blob(&upload, name, now.timestamp_millis()).await?;

        debug!(stage = %IngestStage::RecordingMetadata, key = %key);
        let record = StoredObjectRecord {
            id: self.ids.generate_record_id(),
            key: key.clone(),
            original_name: name.to_string(),
            size,
            mime_type: upload.content_type.clone(),
            url: url.clone(),
            status: RecordStatus::Completed,
            created_at: now,
        };
        let record_id = match self.metadata.save(record).await {
            Ok(id) => id,
            Err(e) => {
                error!(stage = %IngestStage::Failed, key = %key, size, error = %e, "metadata write failed, removing blob");
                if let Err(cleanup) = self.blobs.delete(&key).await {
                    error!(key = %key, error = %cleanup, "orphaned blob: compensation delete failed");
                }
                return Err(e);
            }
        };

        info!(stage = %IngestStage::Completed, key = %key, size, record = %record_id, "upload stored");
        Ok(IngestReceipt {
            key,
            url,
            record_id,
        })
    }

    /// Write the blob under a fresh key.
    ///
    /// Stamps are strictly increasing within the process, so two uploads of the
    /// same name in one millisecond still get distinct keys. A key taken by
    /// another writer moves on to the next stamp; nothing existing is replaced.
    async fn store_blob(
        &self,
        upload: &InboundUpload,
        name: &str,
        now_millis: i64,
    ) -> Result<(String, String), FerryError> {
        let size = upload.bytes.len();
        let mut attempts = 0;
        loop {
            attempts += 1;
            let key = object_key(self.next_stamp(now_millis), name);
            debug!(stage = %IngestStage::Storing, key = %key, attempts);
            match self
                .blobs
                .put(&key, upload.bytes.clone(), &upload.content_type)
                .await
            {
                Ok(url) => return Ok((key, url)),
                Err(e) if e.is_key_conflict() && attempts < MAX_KEY_ATTEMPTS => {
                    warn!(key = %key, "object key already taken, moving to the next stamp");
                }
                Err(e) => {
                    error!(stage = %IngestStage::Failed, key = %key, size, error = %e, "blob write failed");
                    return Err(e);
                }
            }
        }
    }

    /// `max(now, last + 1)`, recorded as the new last stamp.
    fn next_stamp(&self, now_millis: i64) -> i64 {
        let bump = |last: i64| now_millis.max(last.saturating_add(1));
        match self
            .last_stamp
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| Some(bump(last)))
        {
            Ok(last) | Err(last) => bump(last),
        }
    }

    fn validate(&self, upload: &InboundUpload, size: u64) -> Result<(), ValidationError> {
        if let Some(declared) = upload.declared_size
            && declared != size
        {
            return Err(ValidationError::SizeMismatch {
                declared,
                received: size,
            });
        }
        self.limits.check(size, &upload.content_type)
    }

    /// Page through stored records, newest first.
    ///
    /// `page` is 1-based; `limit` is clamped to `1..=MAX_PAGE_LIMIT`.
    pub async fn list(&self, page: u32, limit: u32) -> Result<RecordPage, FerryError> {
        let page = page.max(1);
        let limit = limit.clamp(1, MAX_PAGE_LIMIT);
        self.metadata.list(page, limit).await
    }

    pub async fn health(&self) -> HealthReport {
        let (blob_store, metadata_store) = tokio::join!(self.blobs.ping(), self.metadata.ping());
        HealthReport {
            blob_store,
            metadata_store,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{InMemoryBlobStore, InMemoryMetadataRepository, SqliteMetadataRepository};
    use crate::ports::FixedClock;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;

    struct Fixture {
        blobs: Arc<InMemoryBlobStore>,
        metadata: Arc<InMemoryMetadataRepository>,
        service: IngestionService,
    }

    fn fixture() -> Fixture {
        let blobs = Arc::new(InMemoryBlobStore::new("https://bucket.test"));
        let metadata = Arc::new(InMemoryMetadataRepository::new());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap(),
        ));
        let service = IngestionService::new(blobs.clone(), metadata.clone()).with_clock(clock);
        Fixture {
            blobs,
            metadata,
            service,
        }
    }

    #[tokio::test]
    async fn stores_blob_then_metadata() {
        let f = fixture();
        let receipt = f
            .service
            .ingest(InboundUpload::new("report.pdf", "application/pdf", &b"%PDF-1.7"[..]))
            .await
            .unwrap();

        let millis = Utc
            .with_ymd_and_hms(2024, 5, 1, 9, 30, 0)
            .unwrap()
            .timestamp_millis();
        assert_eq!(receipt.key, format!("uploads/{millis}-report.pdf"));
        assert_eq!(receipt.url, format!("https://bucket.test/{}", receipt.key));
        assert_eq!(f.blobs.get(&receipt.key).unwrap().content_type, "application/pdf");

        let page = f.service.list(1, 10).await.unwrap();
        assert_eq!(page.total, 1);
        let record = &page.records[0];
        assert_eq!(record.id, receipt.record_id);
        assert_eq!(record.status, RecordStatus::Completed);
        assert_eq!(record.size, 8);
        assert_eq!(record.original_name, "report.pdf");
    }

    #[tokio::test]
    async fn same_name_in_one_millisecond_keeps_both_blobs() {
        let f = fixture();
        let first = f
            .service
            .ingest(InboundUpload::new("a.png", "image/png", &b"first"[..]))
            .await
            .unwrap();
        let second = f
            .service
            .ingest(InboundUpload::new("a.png", "image/png", &b"second"[..]))
            .await
            .unwrap();

        assert_ne!(first.key, second.key);
        assert_eq!(f.blobs.get(&first.key).unwrap().bytes, Bytes::from_static(b"first"));
        assert_eq!(f.blobs.get(&second.key).unwrap().bytes, Bytes::from_static(b"second"));

        let page = f.service.list(1, 10).await.unwrap();
        assert_eq!(page.total, 2);
        for record in &page.records {
            assert!(f.blobs.get(&record.key).is_some(), "{} has no blob", record.key);
        }
    }

    #[tokio::test]
    async fn same_name_uploads_fit_the_sqlite_unique_key() {
        let blobs = Arc::new(InMemoryBlobStore::default());
        let metadata = Arc::new(SqliteMetadataRepository::open_in_memory().unwrap());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap(),
        ));
        let service = IngestionService::new(blobs.clone(), metadata).with_clock(clock);

        for body in [&b"one"[..], &b"two"[..], &b"three"[..]] {
            service
                .ingest(InboundUpload::new("a.png", "image/png", body))
                .await
                .unwrap();
        }

        let page = service.list(1, 10).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(blobs.len(), 3);
        for record in &page.records {
            assert!(blobs.get(&record.key).is_some());
        }
    }

    #[tokio::test]
    async fn key_owned_by_another_writer_is_left_alone() {
        let f = fixture();
        let millis = Utc
            .with_ymd_and_hms(2024, 5, 1, 9, 30, 0)
            .unwrap()
            .timestamp_millis();
        let foreign = format!("uploads/{millis}-a.png");
        f.blobs
            .put(&foreign, Bytes::from_static(b"theirs"), "image/png")
            .await
            .unwrap();

        let receipt = f
            .service
            .ingest(InboundUpload::new("a.png", "image/png", &b"ours"[..]))
            .await
            .unwrap();

        assert_eq!(receipt.key, format!("uploads/{}-a.png", millis + 1));
        assert_eq!(f.blobs.get(&foreign).unwrap().bytes, Bytes::from_static(b"theirs"));
        assert_eq!(f.blobs.get(&receipt.key).unwrap().bytes, Bytes::from_static(b"ours"));
    }

    #[test]
    fn stamps_never_repeat_or_go_backwards() {
        let f = fixture();
        assert_eq!(f.service.next_stamp(1_000), 1_000);
        assert_eq!(f.service.next_stamp(1_000), 1_001);
        assert_eq!(f.service.next_stamp(900), 1_002);
        assert_eq!(f.service.next_stamp(5_000), 5_000);
        assert_eq!(f.service.clone().next_stamp(5_000), 5_001);
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected_before_storage() {
        let f = fixture();
        let bytes = vec![0u8; 15 * 1024 * 1024];
        let err = f
            .service
            .ingest(InboundUpload::new("big.png", "image/png", bytes))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FerryError::Validation(ValidationError::TooLarge { .. })
        ));
        assert_eq!(err.to_string(), "File size too large");
        assert!(f.blobs.is_empty());
        assert!(f.metadata.is_empty());
    }

    #[tokio::test]
    async fn disallowed_type_is_rejected() {
        let f = fixture();
        let err = f
            .service
            .ingest(InboundUpload::new("x.html", "text/html", &b"<p>"[..]))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid file type. Only images, PDFs, and documents are allowed."
        );
        assert!(f.blobs.is_empty());
    }

    #[tokio::test]
    async fn declared_size_must_match_payload() {
        let f = fixture();
        let upload = InboundUpload::new("a.txt", "text/plain", &b"abc"[..]).with_declared_size(10);
        let err = f.service.ingest(upload).await.unwrap_err();
        assert!(matches!(
            err,
            FerryError::Validation(ValidationError::SizeMismatch {
                declared: 10,
                received: 3
            })
        ));
    }

    #[tokio::test]
    async fn separators_in_name_stay_under_prefix() {
        let f = fixture();
        let receipt = f
            .service
            .ingest(InboundUpload::new("../../etc/passwd", "text/plain", &b"x"[..]))
            .await
            .unwrap();
        assert!(receipt.key.starts_with("uploads/"));
        assert!(receipt.key.ends_with("-.._.._etc_passwd"));
    }

    struct FailingBlobs;

    #[async_trait]
    impl BlobStore for FailingBlobs {
        async fn put(&self, _: &str, _: Bytes, _: &str) -> Result<String, FerryError> {
            Err(FerryError::blob("connection refused").with_code("ServiceUnavailable"))
        }
        async fn delete(&self, _: &str) -> Result<(), FerryError> {
            Ok(())
        }
        async fn ping(&self) -> bool {
            false
        }
    }

    struct FailingMetadata;

    #[async_trait]
    impl MetadataRepository for FailingMetadata {
        async fn save(&self, _: StoredObjectRecord) -> Result<RecordId, FerryError> {
            Err(FerryError::metadata("database is locked").with_code("SQLITE_BUSY"))
        }
        async fn list(&self, _: u32, _: u32) -> Result<RecordPage, FerryError> {
            Err(FerryError::metadata("database is locked"))
        }
        async fn ping(&self) -> bool {
            false
        }
    }

    /// Blob store whose deletes fail, to observe the orphan path.
    #[derive(Default)]
    struct StickyBlobs {
        keys: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl BlobStore for StickyBlobs {
        async fn put(&self, key: &str, _: Bytes, _: &str) -> Result<String, FerryError> {
            self.keys.lock().unwrap().push(key.to_string());
            Ok(format!("sticky://{key}"))
        }
        async fn delete(&self, _: &str) -> Result<(), FerryError> {
            Err(FerryError::blob("access denied").with_code("AccessDenied"))
        }
        async fn ping(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn blob_failure_writes_no_metadata() {
        let metadata = Arc::new(InMemoryMetadataRepository::new());
        let service = IngestionService::new(Arc::new(FailingBlobs), metadata.clone());

        let err = service
            .ingest(InboundUpload::new("a.txt", "text/plain", &b"abc"[..]))
            .await
            .unwrap_err();

        assert!(matches!(err, FerryError::Storage { .. }));
        assert!(metadata.is_empty());
    }

    #[tokio::test]
    async fn metadata_failure_removes_the_blob() {
        let blobs = Arc::new(InMemoryBlobStore::default());
        let service = IngestionService::new(blobs.clone(), Arc::new(FailingMetadata));

        let err = service
            .ingest(InboundUpload::new("a.txt", "text/plain", &b"abc"[..]))
            .await
            .unwrap_err();

        match err {
            FerryError::Storage { code, .. } => assert_eq!(code.as_deref(), Some("SQLITE_BUSY")),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(blobs.is_empty(), "blob must be compensated");
    }

    #[tokio::test]
    async fn failed_compensation_still_surfaces_metadata_error() {
        let blobs = Arc::new(StickyBlobs::default());
        let service = IngestionService::new(blobs.clone(), Arc::new(FailingMetadata));

        let err = service
            .ingest(InboundUpload::new("a.txt", "text/plain", &b"abc"[..]))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("database is locked"));
        assert_eq!(blobs.keys.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_clamps_page_and_limit() {
        let f = fixture();
        for i in 0..25 {
            f.service
                .ingest(InboundUpload::new(format!("{i}.txt"), "text/plain", &b"x"[..]))
                .await
                .unwrap();
        }

        let page = f.service.list(2, 10).await.unwrap();
        assert_eq!(page.records.len(), 10);
        assert_eq!(page.page_count(10), 3);

        assert_eq!(f.service.list(0, 10).await.unwrap().records.len(), 10);
        assert_eq!(f.service.list(1, 0).await.unwrap().records.len(), 1);
        assert_eq!(f.service.list(1, 1000).await.unwrap().records.len(), 25);
    }

    #[tokio::test]
    async fn health_reports_each_collaborator() {
        let healthy = fixture().service.health().await;
        assert!(healthy.is_healthy());

        let degraded = IngestionService::new(
            Arc::new(InMemoryBlobStore::default()),
            Arc::new(FailingMetadata),
        )
        .health()
        .await;
        assert_eq!(
            degraded,
            HealthReport {
                blob_store: true,
                metadata_store: false
            }
        );
        assert!(!degraded.is_healthy());
    }
}
