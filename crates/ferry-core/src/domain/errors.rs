//! Errors - エラー型と分類
//!
//! Every backend failure is translated into [`FerryError`] at the port
//! boundary; SDK and driver errors never escape an adapter.

use std::time::Duration;

use thiserror::Error;

use super::ids::TaskId;
use super::state::TaskState;

/// ErrorKind は運用上の分類
///
/// - Validation: 入力不正（リトライ無意味、即座に呼び出し元へ）
/// - Transient: 一時的なエラー（リトライ推奨）
/// - Permanent: 恒久的なエラー（手動リトライのみ）
/// - Storage: Blob / metadata backend の障害
/// - Configuration: 起動時の設定不足（致命的）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Transient,
    Permanent,
    Storage,
    Configuration,
}

/// Reason an upload was rejected before anything was written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("File size too large")]
    TooLarge { size: u64, limit: u64 },

    #[error("Invalid file type. Only images, PDFs, and documents are allowed.")]
    DisallowedType { content_type: String },

    #[error("No file uploaded")]
    EmptySelection,

    #[error("Declared size {declared} does not match received size {received}")]
    SizeMismatch { declared: u64, received: u64 },
}

/// Error code of a blob write refused because the key already exists
/// (S3 `If-None-Match: *` answers 412 with this code).
pub const KEY_EXISTS: &str = "PreconditionFailed";

/// S3 code for two conditional writes racing on the same key.
pub const KEY_WRITE_RACE: &str = "ConditionalRequestConflict";

/// Which external collaborator a storage error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    BlobStore,
    MetadataStore,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::BlobStore => f.write_str("blob store"),
            Backend::MetadataStore => f.write_str("metadata store"),
        }
    }
}

#[derive(Debug, Error)]
pub enum FerryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("too many requests, retry after {}s", .retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("transfer failed: {reason}")]
    Transport { reason: String, retryable: bool },

    #[error("{backend} error{}: {message}", .code.as_deref().map(|c| format!(" ({c})")).unwrap_or_default())]
    Storage {
        backend: Backend,
        code: Option<String>,
        message: String,
    },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("task {task_id} is {state:?}, expected {expected}")]
    InvalidState {
        task_id: TaskId,
        state: TaskState,
        expected: &'static str,
    },
}

impl FerryError {
    pub fn blob(message: impl Into<String>) -> Self {
        Self::Storage {
            backend: Backend::BlobStore,
            code: None,
            message: message.into(),
        }
    }

    pub fn metadata(message: impl Into<String>) -> Self {
        Self::Storage {
            backend: Backend::MetadataStore,
            code: None,
            message: message.into(),
        }
    }

    /// Attach a backend error code (S3 error code, SQLite result code, ...).
    pub fn with_code(self, new_code: impl Into<String>) -> Self {
        match self {
            Self::Storage {
                backend, message, ..
            } => Self::Storage {
                backend,
                code: Some(new_code.into()),
                message,
            },
            other => other,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FerryError::Validation(_) => ErrorKind::Validation,
            FerryError::RateLimited { .. } => ErrorKind::Transient,
            FerryError::Transport { retryable: true, .. } => ErrorKind::Transient,
            FerryError::Transport { retryable: false, .. } => ErrorKind::Permanent,
            FerryError::Storage { .. } => ErrorKind::Storage,
            FerryError::Configuration(_) => ErrorKind::Configuration,
            FerryError::TaskNotFound(_) | FerryError::InvalidState { .. } => ErrorKind::Permanent,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// A conditional blob write found the key already taken.
    pub fn is_key_conflict(&self) -> bool {
        matches!(
            self,
            FerryError::Storage {
                backend: Backend::BlobStore,
                code: Some(code),
                ..
            } if code == KEY_EXISTS || code == KEY_WRITE_RACE
        )
    }
}
