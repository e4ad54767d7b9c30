//! Events - スケジューラが発行するイベント
//!
//! Presentation layers subscribe through `UploadScheduler::take_events` and
//! render from these; they never drive scheduling decisions.

use std::time::Duration;

use super::ids::TaskId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// Task appended to the queue.
    Queued { task_id: TaskId },

    /// Task admitted and handed to the transport.
    Started { task_id: TaskId, attempt: u32 },

    /// Progress moved forward (non-decreasing per task).
    Progress { task_id: TaskId, percent: u8 },

    /// Task stored remotely.
    Completed { task_id: TaskId, url: String },

    /// Retryable failure; the task went back to the queue tail.
    RetryScheduled {
        task_id: TaskId,
        attempt: u32,
        delay: Duration,
        reason: String,
    },

    /// Task gave up. `retries_left` is 0 when attempts were exhausted.
    Failed {
        task_id: TaskId,
        reason: String,
        retries_left: u32,
    },

    /// Task dropped by the user.
    Removed { task_id: TaskId },
}

impl SchedulerEvent {
    pub fn task_id(&self) -> TaskId {
        match self {
            SchedulerEvent::Queued { task_id }
            | SchedulerEvent::Started { task_id, .. }
            | SchedulerEvent::Progress { task_id, .. }
            | SchedulerEvent::Completed { task_id, .. }
            | SchedulerEvent::RetryScheduled { task_id, .. }
            | SchedulerEvent::Failed { task_id, .. }
            | SchedulerEvent::Removed { task_id } => *task_id,
        }
    }
}
