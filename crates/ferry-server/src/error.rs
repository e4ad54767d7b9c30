//! HTTP error responses: `{error, details}` with a status derived from the error kind.

use std::time::Duration;

use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use ferry_core::domain::{ErrorKind, FerryError, ValidationError};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: String,
    details: Option<String>,
    retry_after: Option<Duration>,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            details: None,
            retry_after: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Drop internal details (production responses).
    pub fn redacted(mut self) -> Self {
        self.details = None;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<FerryError> for ApiError {
    fn from(err: FerryError) -> Self {
        match err.kind() {
            ErrorKind::Validation => {
                let api = ApiError::new(StatusCode::BAD_REQUEST, err.to_string());
                match validation_details(&err) {
                    Some(details) => api.with_details(details),
                    None => api,
                }
            }
            _ => match err {
                FerryError::RateLimited { retry_after } => ApiError {
                    retry_after: Some(retry_after),
                    ..ApiError::new(
                        StatusCode::TOO_MANY_REQUESTS,
                        "Too many requests, please try again later.",
                    )
                },
                FerryError::Transport { .. } => {
                    ApiError::new(StatusCode::BAD_GATEWAY, "Upstream transfer failed")
                        .with_details(err.to_string())
                }
                FerryError::Storage { .. } => {
                    ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Failed to upload file")
                        .with_details(err.to_string())
                }
                other => ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
                    .with_details(other.to_string()),
            },
        }
    }
}

fn validation_details(err: &FerryError) -> Option<String> {
    match err {
        FerryError::Validation(ValidationError::TooLarge { size, limit }) => Some(format!(
            "received {size} bytes, the limit is {limit} bytes"
        )),
        FerryError::Validation(ValidationError::DisallowedType { content_type }) => {
            Some(format!("received content type {content_type:?}"))
        }
        _ => None,
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return ApiError::new(StatusCode::BAD_REQUEST, "File size too large")
                .with_details(err.body_text());
        }
        ApiError::new(StatusCode::BAD_REQUEST, "Invalid multipart body").with_details(err.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.error,
            details: self.details,
        };
        let mut response = (self.status, Json(body)).into_response();
        if let Some(delay) = self.retry_after {
            // round up so clients never retry early
            let secs = delay.as_secs() + u64::from(delay.subsec_nanos() > 0);
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
