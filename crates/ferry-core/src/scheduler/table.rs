//! Synchronous scheduler table: task records, FIFO queue and dispatch slots.
//!
//! Every method here runs to completion under the scheduler mutex. Nothing
//! awaits; spawning transfers and publishing events happen after the lock is
//! released, from the `Admitted` values and event buffers returned here.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use super::retry::{RetryDecision, RetryPolicy};
use crate::domain::{
    AttemptId, FerryError, Outcome, SchedulerEvent, TaskId, TaskRecord, TaskState, UploadFile,
};
use crate::observability::TaskCounts;
use crate::ports::IdGenerator;

/// One occupied concurrency slot.
#[derive(Debug)]
struct Dispatch {
    attempt_id: AttemptId,
    cancel: CancellationToken,
}

/// A task that just took a slot and must be handed to the transport.
#[derive(Debug)]
pub(crate) struct Admitted {
    pub task_id: TaskId,
    pub attempt_id: AttemptId,
    pub attempt: u32,
    pub file: UploadFile,
    pub cancel: CancellationToken,
}

/// Result of one admission pass.
#[derive(Debug, Default)]
pub(crate) struct Admission {
    pub started: Vec<Admitted>,

    /// Set when a slot is free but every queued entry is still backing off.
    pub wake_at: Option<Instant>,
}

pub(crate) struct SchedulerTable {
    /// Single source of truth for task state.
    records: HashMap<TaskId, TaskRecord>,

    /// Insertion order, for listings.
    order: Vec<TaskId>,

    /// Pending tasks awaiting admission (TaskIds only).
    queue: VecDeque<TaskId>,

    /// In-flight tasks. `dispatched.len()` is the in-flight count.
    dispatched: HashMap<TaskId, Dispatch>,

    max_concurrency: usize,
    policy: RetryPolicy,
}

impl SchedulerTable {
    pub fn new(max_concurrency: usize, policy: RetryPolicy) -> Self {
        Self {
            records: HashMap::new(),
            order: Vec::new(),
            queue: VecDeque::new(),
            dispatched: HashMap::new(),
            max_concurrency,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn in_flight(&self) -> usize {
        self.dispatched.len()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.dispatched.is_empty()
    }

    pub fn get(&self, task_id: TaskId) -> Option<&TaskRecord> {
        self.records.get(&task_id)
    }

    /// Records in insertion order.
    pub fn records(&self) -> impl Iterator<Item = &TaskRecord> {
        self.order.iter().filter_map(|id| self.records.get(id))
    }

    pub fn counts(&self) -> TaskCounts {
        self.records.values().map(|r| r.state).collect()
    }

    /// Register a new `Pending` task at the queue tail.
    pub fn insert(&mut self, record: TaskRecord, events: &mut Vec<SchedulerEvent>) {
        let task_id = record.task_id;
        self.records.insert(task_id, record);
        self.order.push(task_id);
        self.queue.push_back(task_id);
        events.push(SchedulerEvent::Queued { task_id });
    }

    /// Append eligible tasks to the queue in the given order.
    ///
    /// Unknown ids fail the whole call before anything changes.
    pub fn enqueue(
        &mut self,
        task_ids: &[TaskId],
        events: &mut Vec<SchedulerEvent>,
    ) -> Result<(), FerryError> {
        if let Some(missing) = task_ids.iter().find(|id| !self.records.contains_key(id)) {
            return Err(FerryError::TaskNotFound(*missing));
        }

        for &task_id in task_ids {
            let Some(record) = self.records.get_mut(&task_id) else {
                continue;
            };
            match record.state {
                TaskState::Pending if !self.queue.contains(&task_id) => {}
                TaskState::Failed => record.reset_for_manual_retry(),
                // already queued, in flight or completed
                _ => continue,
            }
            self.queue.push_back(task_id);
            events.push(SchedulerEvent::Queued { task_id });
        }
        Ok(())
    }

    /// Fill free slots from the queue.
    ///
    /// Pops the earliest entry whose backoff has elapsed, so delayed retries
    /// never block tasks behind them.
    pub fn admit(
        &mut self,
        ids: &dyn IdGenerator,
        now: Instant,
        events: &mut Vec<SchedulerEvent>,
    ) -> Admission {
        let mut admission = Admission::default();

        while self.dispatched.len() < self.max_concurrency {
            let eligible = self.queue.iter().position(|id| {
                self.records
                    .get(id)
                    .is_none_or(|r| r.next_run_at.is_none_or(|t| t <= now))
            });
            let Some(task_id) = eligible.and_then(|pos| self.queue.remove(pos)) else {
                break;
            };
            if let Some(admitted) = self.dispatch(task_id, ids, events) {
                admission.started.push(admitted);
            }
        }

        if self.dispatched.len() < self.max_concurrency {
            admission.wake_at = self
                .queue
                .iter()
                .filter_map(|id| self.records.get(id).and_then(|r| r.next_run_at))
                .min();
        }
        admission
    }

    /// Move a `Pending` task into a slot. The caller checked capacity.
    fn dispatch(
        &mut self,
        task_id: TaskId,
        ids: &dyn IdGenerator,
        events: &mut Vec<SchedulerEvent>,
    ) -> Option<Admitted> {
        let record = self.records.get_mut(&task_id)?;
        if record.state != TaskState::Pending || self.dispatched.contains_key(&task_id) {
            return None;
        }
        record.start_attempt();

        let attempt_id = ids.generate_attempt_id();
        let cancel = CancellationToken::new();
        self.dispatched.insert(
            task_id,
            Dispatch {
                attempt_id,
                cancel: cancel.clone(),
            },
        );
        events.push(SchedulerEvent::Started {
            task_id,
            attempt: record.attempt,
        });
        Some(Admitted {
            task_id,
            attempt_id,
            attempt: record.attempt,
            file: record.file.clone(),
            cancel,
        })
    }

    fn is_current(&self, task_id: TaskId, attempt_id: AttemptId) -> bool {
        self.dispatched
            .get(&task_id)
            .is_some_and(|d| d.attempt_id == attempt_id)
    }

    /// Forward transport progress. Stale attempts and removed tasks are ignored.
    pub fn progress(
        &mut self,
        task_id: TaskId,
        attempt_id: AttemptId,
        percent: u8,
    ) -> Option<SchedulerEvent> {
        if !self.is_current(task_id, attempt_id) {
            return None;
        }
        let percent = self.records.get_mut(&task_id)?.advance_progress(percent)?;
        Some(SchedulerEvent::Progress { task_id, percent })
    }

    /// Apply the outcome of one dispatch and free its slot.
    ///
    /// Returns false if `(task_id, attempt_id)` does not own a slot, in which
    /// case nothing changes.
    pub fn complete(
        &mut self,
        task_id: TaskId,
        attempt_id: AttemptId,
        outcome: Outcome,
        now: Instant,
        events: &mut Vec<SchedulerEvent>,
    ) -> bool {
        if !self.is_current(task_id, attempt_id) {
            return false;
        }
        self.dispatched.remove(&task_id);

        // removed while in flight: the slot is free, nothing else to do
        let Some(record) = self.records.get_mut(&task_id) else {
            return true;
        };

        if let Outcome::Success { url } = outcome {
            record.mark_completed(url.clone());
            events.push(SchedulerEvent::Completed { task_id, url });
            return true;
        }

        match self.policy.decide(record, &outcome) {
            RetryDecision::Retry { delay, reason } => {
                let next_run_at = (!delay.is_zero()).then(|| now + delay);
                record.requeue(next_run_at);
                self.queue.push_back(task_id);
                events.push(SchedulerEvent::RetryScheduled {
                    task_id,
                    attempt: record.attempt,
                    delay,
                    reason,
                });
            }
            RetryDecision::GiveUp { reason, retryable } => {
                record.mark_failed(reason.clone(), retryable);
                let retries_left = if retryable {
                    self.policy.max_attempts.saturating_sub(record.attempt)
                } else {
                    0
                };
                events.push(SchedulerEvent::Failed {
                    task_id,
                    reason,
                    retries_left,
                });
            }
        }
        true
    }

    /// Drop a task. If it is in flight, returns the token to cancel; the slot
    /// stays occupied until that dispatch reports back.
    pub fn remove(
        &mut self,
        task_id: TaskId,
        events: &mut Vec<SchedulerEvent>,
    ) -> Result<Option<CancellationToken>, FerryError> {
        if self.records.remove(&task_id).is_none() {
            return Err(FerryError::TaskNotFound(task_id));
        }
        self.order.retain(|id| *id != task_id);
        self.queue.retain(|id| *id != task_id);
        events.push(SchedulerEvent::Removed { task_id });
        Ok(self.dispatched.get(&task_id).map(|d| d.cancel.clone()))
    }

    /// Manual retry of a `Failed` task: dispatch now if a slot is free,
    /// otherwise append to the queue.
    pub fn retry_now(
        &mut self,
        task_id: TaskId,
        ids: &dyn IdGenerator,
        events: &mut Vec<SchedulerEvent>,
    ) -> Result<Option<Admitted>, FerryError> {
        let record = self
            .records
            .get_mut(&task_id)
            .ok_or(FerryError::TaskNotFound(task_id))?;
        if record.state != TaskState::Failed {
            return Err(FerryError::InvalidState {
                task_id,
                state: record.state,
                expected: "failed",
            });
        }
        record.reset_for_manual_retry();

        if self.dispatched.len() < self.max_concurrency {
            return Ok(self.dispatch(task_id, ids, events));
        }
        self.queue.push_back(task_id);
        events.push(SchedulerEvent::Queued { task_id });
        Ok(None)
    }

    /// Drop `Completed` records. Returns how many were removed.
    pub fn clear_completed(&mut self) -> usize {
        let before = self.records.len();
        self.records.retain(|_, r| r.state != TaskState::Completed);
        let records = &self.records;
        self.order.retain(|id| records.contains_key(id));
        before - self.records.len()
    }

    /// Check the queue/slot invariants. Test helper.
    #[cfg(test)]
    pub fn assert_consistent(&self) {
        assert!(self.dispatched.len() <= self.max_concurrency);
        for (id, record) in &self.records {
            let queued = self.queue.iter().filter(|q| *q == id).count();
            let in_slot = self.dispatched.contains_key(id);
            match record.state {
                TaskState::Pending => assert!(queued == 1 && !in_slot, "{id} pending"),
                TaskState::InFlight => assert!(queued == 0 && in_slot, "{id} in flight"),
                TaskState::Completed | TaskState::Failed => {
                    assert_eq!(queued, 0, "{id} terminal but queued")
                }
            }
            assert_eq!(record.progress == 100, record.state == TaskState::Completed);
            assert_eq!(record.last_error.is_some(), record.state == TaskState::Failed);
        }
    }
}
