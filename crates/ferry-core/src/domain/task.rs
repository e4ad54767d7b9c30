//! Transfer task: the payload identity plus its mutable status record.
//!
//! The scheduler owns a table `TaskId -> TaskRecord`; queue structures hold
//! `TaskId` only. All state transitions go through the methods below so the
//! progress/state and error/state invariants hold after every step.

use std::path::PathBuf;
use std::time::Instant;

use bytes::Bytes;
use serde::Serialize;

use super::errors::FerryError;
use super::ids::TaskId;
use super::state::TaskState;

/// Where the bytes of an upload come from.
#[derive(Debug, Clone)]
pub enum FileSource {
    /// Payload already in memory.
    Bytes(Bytes),

    /// Payload read from disk when the transfer starts.
    Path(PathBuf),
}

/// Immutable identity of one file selected for upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub size: u64,
    pub content_type: String,
    pub source: FileSource,
}

impl UploadFile {
    pub fn from_bytes(
        name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        let bytes = bytes.into();
        Self {
            name: name.into(),
            size: bytes.len() as u64,
            content_type: content_type.into(),
            source: FileSource::Bytes(bytes),
        }
    }

    pub fn from_path(
        name: impl Into<String>,
        content_type: impl Into<String>,
        size: u64,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            size,
            content_type: content_type.into(),
            source: FileSource::Path(path.into()),
        }
    }

    /// Materialize the payload.
    pub async fn read(&self) -> std::io::Result<Bytes> {
        match &self.source {
            FileSource::Bytes(b) => Ok(b.clone()),
            FileSource::Path(p) => tokio::fs::read(p).await.map(Bytes::from),
        }
    }
}

/// Status record for a task in the scheduler table.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub file: UploadFile,
    pub state: TaskState,

    /// Integer percent, 0..=100. 100 only when `Completed`.
    pub progress: u8,

    /// Set iff `state == Failed`.
    pub last_error: Option<String>,

    /// Whether the last failure may be retried automatically.
    pub retryable: bool,

    /// Number of dispatches so far (including the current one if InFlight).
    pub attempt: u32,

    /// Location reported by the server once `Completed`.
    pub url: Option<String>,

    /// Earliest admission time after a backoff (None = immediately).
    pub next_run_at: Option<Instant>,

    pub created_at: Instant,
    pub updated_at: Instant,
}

impl TaskRecord {
    pub fn new(task_id: TaskId, file: UploadFile) -> Self {
        let now = Instant::now();
        Self {
            task_id,
            file,
            state: TaskState::Pending,
            progress: 0,
            last_error: None,
            retryable: false,
            attempt: 0,
            url: None,
            next_run_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark as in flight (increment attempt).
    pub fn start_attempt(&mut self) {
        self.state = TaskState::InFlight;
        self.attempt += 1;
        self.progress = 0;
        self.next_run_at = None;
        self.updated_at = Instant::now();
    }

    /// Raise progress while in flight. Returns the new value if it changed.
    ///
    /// Capped at 99: only `mark_completed` may show 100.
    pub fn advance_progress(&mut self, percent: u8) -> Option<u8> {
        if self.state != TaskState::InFlight {
            return None;
        }
        let percent = percent.min(99);
        if percent <= self.progress {
            return None;
        }
        self.progress = percent;
        self.updated_at = Instant::now();
        Some(percent)
    }

    pub fn mark_completed(&mut self, url: String) {
        self.state = TaskState::Completed;
        self.progress = 100;
        self.url = Some(url);
        self.last_error = None;
        self.updated_at = Instant::now();
    }

    pub fn mark_failed(&mut self, error: String, retryable: bool) {
        self.state = TaskState::Failed;
        self.last_error = Some(error);
        self.retryable = retryable;
        if self.progress >= 100 {
            self.progress = 0;
        }
        self.updated_at = Instant::now();
    }

    /// Back to Pending for an automatic retry; `attempt` is kept.
    pub fn requeue(&mut self, next_run_at: Option<Instant>) {
        self.state = TaskState::Pending;
        self.progress = 0;
        self.last_error = None;
        self.next_run_at = next_run_at;
        self.updated_at = Instant::now();
    }

    /// Back to Pending on explicit user request; attempt tracking restarts.
    pub fn reset_for_manual_retry(&mut self) {
        self.requeue(None);
        self.attempt = 0;
        self.retryable = false;
    }

    pub fn snapshot(&self, max_attempts: u32) -> TaskSnapshot {
        TaskSnapshot {
            task_id: self.task_id,
            name: self.file.name.clone(),
            size: self.file.size,
            content_type: self.file.content_type.clone(),
            state: self.state,
            progress: self.progress,
            attempt: self.attempt,
            retries_left: max_attempts.saturating_sub(self.attempt),
            last_error: self.last_error.clone(),
            retryable: self.retryable,
            url: self.url.clone(),
        }
    }
}

/// Read-only view for presentation layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSnapshot {
    pub task_id: TaskId,
    pub name: String,
    pub size: u64,
    pub content_type: String,
    pub state: TaskState,
    pub progress: u8,
    pub attempt: u32,
    pub retries_left: u32,
    pub last_error: Option<String>,

    /// Whether the last failure was transient (attempts ran out).
    pub retryable: bool,
    pub url: Option<String>,
}

impl TaskSnapshot {
    /// The terminal transfer error of a `Failed` task.
    pub fn failure(&self) -> Option<FerryError> {
        if self.state != TaskState::Failed {
            return None;
        }
        Some(FerryError::Transport {
            reason: self.last_error.clone().unwrap_or_default(),
            retryable: self.retryable,
        })
    }
}
