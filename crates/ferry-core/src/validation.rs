//! Upload validation shared by the client scheduler and the ingestion service.

use serde::{Deserialize, Serialize};

use crate::domain::ValidationError;

/// Maximum accepted payload: 10 MiB.
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// MIME types accepted for upload.
pub const ALLOWED_CONTENT_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "text/plain",
];

/// Size limit and content-type allow-list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadLimits {
    #[serde(default = "default_max_size")]
    pub max_size: u64,

    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<String>,
}

fn default_max_size() -> u64 {
    MAX_FILE_SIZE
}

fn default_allowed_types() -> Vec<String> {
    ALLOWED_CONTENT_TYPES.iter().map(|s| s.to_string()).collect()
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            allowed_types: default_allowed_types(),
        }
    }
}

impl UploadLimits {
    /// Check a declared size and content type. Size is checked first.
    pub fn check(&self, size: u64, content_type: &str) -> Result<(), ValidationError> {
        if size > self.max_size {
            return Err(ValidationError::TooLarge {
                size,
                limit: self.max_size,
            });
        }
        let essence = essence(content_type);
        if !self.allowed_types.iter().any(|t| t.eq_ignore_ascii_case(essence)) {
            return Err(ValidationError::DisallowedType {
                content_type: content_type.to_string(),
            });
        }
        Ok(())
    }
}

/// `text/plain; charset=utf-8` -> `text/plain`
fn essence(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or_default().trim()
}
