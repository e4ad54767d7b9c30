use serde::{Deserialize, Serialize};

use crate::domain::TaskState;

/// Per-state task totals for status lines and dashboards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub pending: usize,
    pub in_flight: usize,
    pub completed: usize,
    pub failed: usize,
}

impl TaskCounts {
    pub fn record(&mut self, state: TaskState) {
        match state {
            TaskState::Pending => self.pending += 1,
            TaskState::InFlight => self.in_flight += 1,
            TaskState::Completed => self.completed += 1,
            TaskState::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.pending + self.in_flight + self.completed + self.failed
    }
}

impl FromIterator<TaskState> for TaskCounts {
    fn from_iter<I: IntoIterator<Item = TaskState>>(iter: I) -> Self {
        let mut counts = TaskCounts::default();
        for state in iter {
            counts.record(state);
        }
        counts
    }
}
