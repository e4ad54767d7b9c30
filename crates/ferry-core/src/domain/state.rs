//! State - 転送タスクと保存レコードの状態

use serde::{Deserialize, Serialize};

/// Client-side state of a transfer task.
///
/// State transitions:
/// - Pending -> InFlight -> Completed
/// - Pending -> InFlight -> Pending (retryable failure, attempts left)
/// - Pending -> InFlight -> Failed (non-retryable, or attempts exhausted)
/// - Failed -> Pending (explicit user retry only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting in the queue for a free slot.
    Pending,

    /// Dispatched to the transport.
    InFlight,

    /// Stored remotely.
    Completed,

    /// Gave up; carries `last_error`.
    Failed,
}

impl TaskState {
    /// Is this a terminal state (no automatic transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }

    /// Can a user action put this task back into the queue?
    pub fn is_enqueueable(self) -> bool {
        matches!(self, TaskState::Pending | TaskState::Failed)
    }
}

/// Status column of a stored object record.
///
/// The ingestion path only ever writes `Completed`; the other values are kept
/// so records written by other producers still decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Pending,
    Uploading,
    Completed,
    Failed,
}

impl RecordStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Pending => "pending",
            RecordStatus::Uploading => "uploading",
            RecordStatus::Completed => "completed",
            RecordStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RecordStatus::Pending),
            "uploading" => Some(RecordStatus::Uploading),
            "completed" => Some(RecordStatus::Completed),
            "failed" => Some(RecordStatus::Failed),
            _ => None,
        }
    }
}
