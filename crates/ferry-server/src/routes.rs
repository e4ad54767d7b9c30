//! HTTP surface: upload, listing, health, and the per-client rate limit.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{ConnectInfo, DefaultBodyLimit, Multipart, Query, Request, State};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use ferry_core::domain::{FerryError, RecordId, StoredObjectRecord, ValidationError};
use ferry_core::ingestion::{
    DEFAULT_PAGE_LIMIT, FixedWindowRateLimiter, HealthReport, InboundUpload, IngestionService,
    MAX_PAGE_LIMIT,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::Environment;
use crate::error::ApiError;

/// Request body cap. Above the 10 MiB file limit so oversized files still
/// reach validation and get a descriptive 400.
pub const BODY_LIMIT: usize = 20 * 1024 * 1024;

const FILE_FIELD: &str = "file";

#[derive(Clone)]
pub struct AppState {
    pub ingestion: IngestionService,
    pub limiter: Arc<FixedWindowRateLimiter>,
    pub environment: Environment,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        ingestion: IngestionService,
        limiter: Arc<FixedWindowRateLimiter>,
        environment: Environment,
    ) -> Self {
        Self {
            ingestion,
            limiter,
            environment,
            started_at: Instant::now(),
        }
    }

    fn api_error(&self, err: FerryError) -> ApiError {
        let api = ApiError::from(err);
        if self.environment.is_production() {
            api.redacted()
        } else {
            api
        }
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/upload", post(upload))
        .route("/api/files", get(list_files))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    Router::new()
        .merge(api)
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .with_state(state)
}

/// Client address from the connection; requests without one share a bucket.
fn client_ip(request: &Request) -> IpAddr {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let client = client_ip(&request);
    match state.limiter.check(client) {
        Ok(status) => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert(
                HeaderName::from_static("ratelimit-limit"),
                HeaderValue::from(status.limit),
            );
            headers.insert(
                HeaderName::from_static("ratelimit-remaining"),
                HeaderValue::from(status.remaining),
            );
            headers.insert(
                HeaderName::from_static("ratelimit-reset"),
                HeaderValue::from(status.reset_after.as_secs()),
            );
            response
        }
        Err(err) => {
            warn!(client = %client, path = %request.uri().path(), "rate limit exceeded");
            state.api_error(err).into_response()
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    success: bool,
    key: String,
    url: String,
    file_id: RecordId,
}

async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut inbound = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let original_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field.bytes().await?;
        inbound = Some(InboundUpload::new(original_name, content_type, bytes));
        break;
    }

    let inbound = inbound
        .ok_or_else(|| state.api_error(ValidationError::EmptySelection.into()))?;
    let receipt = state
        .ingestion
        .ingest(inbound)
        .await
        .map_err(|e| state.api_error(e))?;

    Ok(Json(UploadResponse {
        success: true,
        key: receipt.key,
        url: receipt.url,
        file_id: receipt.record_id,
    }))
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    page: Option<u32>,
    limit: Option<u32>,
}

#[derive(Debug, Serialize)]
struct Pagination {
    total: u64,
    page: u32,
    limit: u32,
    pages: u64,
}

#[derive(Debug, Serialize)]
struct ListResponse {
    files: Vec<StoredObjectRecord>,
    pagination: Pagination,
}

async fn list_files(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>, ApiError> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_LIMIT)
        .clamp(1, MAX_PAGE_LIMIT);

    let result = state
        .ingestion
        .list(page, limit)
        .await
        .map_err(|e| state.api_error(e))?;
    let pages = result.page_count(limit);

    Ok(Json(ListResponse {
        files: result.records,
        pagination: Pagination {
            total: result.total,
            page,
            limit,
            pages,
        },
    }))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
    services: HealthReport,
    uptime: f64,
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let report = state.ingestion.health().await;
    let (status, label) = if report.is_healthy() {
        (StatusCode::OK, "healthy")
    } else {
        warn!(?report, "health check degraded");
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };
    (
        status,
        Json(HealthResponse {
            status: label,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            services: report,
            uptime: state.started_at.elapsed().as_secs_f64(),
        }),
    )
}
