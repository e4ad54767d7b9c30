//! HttpTransport - multipart POST to the ingestion server
//!
//! The payload is streamed in fixed chunks so progress can be reported as the
//! body is handed to the connection. Outcomes are classified from the status
//! code; see [`classify_status`].

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, StatusCode};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::{FerryError, Outcome, UploadFile};
use crate::ports::{ProgressReporter, Transport};

pub const UPLOAD_PATH: &str = "/api/upload";
pub const CHUNK_SIZE: usize = 64 * 1024;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HttpTransport {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    /// `base_url` is the server root, e.g. `http://localhost:3001`.
    pub fn new(base_url: &str) -> Result<Self, FerryError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| FerryError::Configuration(format!("http client: {e}")))?;
        Ok(Self::with_client(http, base_url))
    }

    pub fn with_client(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            endpoint: format!("{}{UPLOAD_PATH}", base_url.trim_end_matches('/')),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn upload(&self, file: &UploadFile, progress: &ProgressReporter) -> Outcome {
        let bytes = match file.read().await {
            Ok(bytes) => bytes,
            Err(e) => return Outcome::permanent(format!("cannot read {}: {e}", file.name)),
        };
        let total = bytes.len() as u64;

        let part = Part::stream_with_length(
            Body::wrap_stream(progress_stream(bytes, progress.clone())),
            total,
        )
        .file_name(file.name.clone());
        let part = match part.mime_str(&file.content_type) {
            Ok(part) => part,
            Err(e) => return Outcome::permanent(format!("invalid content type: {e}")),
        };
        let form = Form::new().part("file", part);

        let response = match self.http.post(&self.endpoint).multipart(form).send().await {
            Ok(response) => response,
            Err(e) => return Outcome::retryable(format!("network error: {e}")),
        };
        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => return Outcome::retryable(format!("response interrupted: {e}")),
        };
        debug!(name = %file.name, %status, "upload response");

        if status.is_success() {
            parse_success(&body)
        } else {
            classify_status(status, retry_after, error_message(status, &body))
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        file: &UploadFile,
        progress: ProgressReporter,
        cancel: CancellationToken,
    ) -> Outcome {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Outcome::Cancelled,
            outcome = self.upload(file, &progress) => outcome,
        }
    }
}

/// Split `bytes` into chunks, reporting cumulative progress as each is taken.
fn progress_stream(
    bytes: Bytes,
    progress: ProgressReporter,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
    let total = bytes.len() as u64;
    let chunks: Vec<Bytes> = (0..bytes.len())
        .step_by(CHUNK_SIZE)
        .map(|start| bytes.slice(start..(start + CHUNK_SIZE).min(bytes.len())))
        .collect();

    let mut sent = 0u64;
    futures_util::stream::iter(chunks).map(move |chunk| {
        sent += chunk.len() as u64;
        progress.report(sent, total);
        Ok(chunk)
    })
}

/// Status classification for a non-2xx response.
///
/// - 429: retryable, honouring `Retry-After`
/// - 5xx: retryable
/// - any other status: permanent
pub fn classify_status(
    status: StatusCode,
    retry_after: Option<Duration>,
    message: String,
) -> Outcome {
    let reason = format!("{}: {message}", status.as_u16());
    if status == StatusCode::TOO_MANY_REQUESTS {
        let outcome = Outcome::retryable(reason);
        return match retry_after {
            Some(delay) => outcome.with_retry_after(delay),
            None => outcome,
        };
    }
    if status.is_server_error() {
        return Outcome::retryable(reason);
    }
    Outcome::permanent(reason)
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    success: bool,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    details: Option<String>,
}

fn parse_success(body: &[u8]) -> Outcome {
    match serde_json::from_slice::<UploadResponse>(body) {
        Ok(UploadResponse {
            success: true,
            url: Some(url),
        }) => Outcome::success(url),
        Ok(_) => Outcome::permanent("malformed success response: missing url"),
        Err(e) => Outcome::permanent(format!("malformed success response: {e}")),
    }
}

fn error_message(status: StatusCode, body: &[u8]) -> String {
    match serde_json::from_slice::<ErrorResponse>(body) {
        Ok(ErrorResponse {
            error,
            details: Some(details),
        }) => format!("{error} ({details})"),
        Ok(ErrorResponse { error, .. }) => error,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("unexpected status")
            .to_string(),
    }
}
