//! Server-side ingestion: validation, blob storage, metadata and rate limiting.

pub mod rate_limit;
pub mod service;

pub use rate_limit::{FixedWindowRateLimiter, RateLimitStatus};
pub use service::{
    DEFAULT_PAGE_LIMIT, HealthReport, IngestReceipt, IngestStage, IngestionService, InboundUpload,
    MAX_PAGE_LIMIT,
};
