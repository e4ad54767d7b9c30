//! UploadScheduler: the async shell around [`SchedulerTable`].
//!
//! Decisions are made synchronously under one mutex; transfers run as spawned
//! tokio tasks and report back through `on_progress` / `on_outcome`.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Instant;

use futures_util::FutureExt;
use tokio::sync::{Notify, mpsc};
use tracing::{debug, error, info, trace, warn};

use super::config::SchedulerConfig;
use super::table::{Admitted, SchedulerTable};
use crate::domain::{
    AttemptId, FerryError, Outcome, SchedulerEvent, TaskId, TaskRecord, TaskSnapshot, UploadFile,
    ValidationError,
};
use crate::observability::TaskCounts;
use crate::ports::{IdGenerator, ProgressReporter, SystemClock, Transport, UlidGenerator};
use crate::validation::UploadLimits;

/// Client-side upload queue with bounded concurrency and automatic retry.
///
/// Cheap to clone; clones share the same queue. Methods that may start
/// transfers (`add`, `enqueue`, `admit_next`, `retry_now`) must be called from
/// within a Tokio runtime.
#[derive(Clone)]
pub struct UploadScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    table: Mutex<SchedulerTable>,
    transport: Arc<dyn Transport>,
    ids: Arc<dyn IdGenerator>,
    limits: UploadLimits,
    /// Set by the first `take_events`; until then events are only logged.
    events_tx: OnceLock<mpsc::UnboundedSender<SchedulerEvent>>,
    idle: Notify,
}

/// Everything produced by one locked transaction, applied after unlocking.
#[derive(Default)]
struct Step {
    events: Vec<SchedulerEvent>,
    started: Vec<Admitted>,
    wake_at: Option<Instant>,
    idle: bool,
}

impl UploadScheduler {
    pub fn new(transport: Arc<dyn Transport>, config: SchedulerConfig) -> Result<Self, FerryError> {
        Self::with_id_generator(transport, config, Arc::new(UlidGenerator::new(SystemClock)))
    }

    pub fn with_id_generator(
        transport: Arc<dyn Transport>,
        config: SchedulerConfig,
        ids: Arc<dyn IdGenerator>,
    ) -> Result<Self, FerryError> {
        config.validate()?;
        let table = SchedulerTable::new(config.max_concurrency, config.retry_policy());
        Ok(Self {
            inner: Arc::new(Inner {
                table: Mutex::new(table),
                transport,
                ids,
                limits: config.limits,
                events_tx: OnceLock::new(),
                idle: Notify::new(),
            }),
        })
    }

    /// Validate and queue a selection of files, then admit.
    ///
    /// One invalid file rejects the whole selection; nothing is queued.
    pub fn add(&self, files: Vec<UploadFile>) -> Result<Vec<TaskId>, FerryError> {
        if files.is_empty() {
            return Err(ValidationError::EmptySelection.into());
        }
        for file in &files {
            self.inner
                .limits
                .check(file.size, &file.content_type)
                .inspect_err(|e| warn!(name = %file.name, size = file.size, error = %e, "file rejected"))?;
        }

        let mut step = Step::default();
        let task_ids = {
            let mut table = self.inner.lock();
            let task_ids: Vec<TaskId> = files
                .into_iter()
                .map(|file| {
                    let task_id = self.inner.ids.generate_task_id();
                    table.insert(TaskRecord::new(task_id, file), &mut step.events);
                    task_id
                })
                .collect();
            self.inner.admit_locked(&mut table, &mut step);
            task_ids
        };
        self.inner.finish(step);
        Ok(task_ids)
    }

    /// Re-queue `Pending` (not already queued) or `Failed` tasks in order.
    pub fn enqueue(&self, task_ids: &[TaskId]) -> Result<(), FerryError> {
        let mut step = Step::default();
        {
            let mut table = self.inner.lock();
            table.enqueue(task_ids, &mut step.events)?;
            self.inner.admit_locked(&mut table, &mut step);
        }
        self.inner.finish(step);
        Ok(())
    }

    /// Fill free slots from the queue.
    pub fn admit_next(&self) {
        self.inner.admit_next();
    }

    /// Drop a task; an in-flight transfer is cancelled.
    pub fn remove(&self, task_id: TaskId) -> Result<(), FerryError> {
        let mut step = Step::default();
        let cancel = {
            let mut table = self.inner.lock();
            let cancel = table.remove(task_id, &mut step.events)?;
            step.idle = table.is_idle();
            cancel
        };
        if let Some(token) = cancel {
            debug!(task = %task_id, "cancelling in-flight transfer");
            token.cancel();
        }
        self.inner.finish(step);
        Ok(())
    }

    /// Manually retry a `Failed` task with a fresh attempt budget.
    pub fn retry_now(&self, task_id: TaskId) -> Result<(), FerryError> {
        let mut step = Step::default();
        {
            let mut table = self.inner.lock();
            let admitted = table.retry_now(task_id, self.inner.ids.as_ref(), &mut step.events)?;
            step.started.extend(admitted);
        }
        self.inner.finish(step);
        Ok(())
    }

    pub fn snapshot(&self, task_id: TaskId) -> Option<TaskSnapshot> {
        let table = self.inner.lock();
        let max_attempts = table.policy().max_attempts;
        table.get(task_id).map(|r| r.snapshot(max_attempts))
    }

    /// All tasks in the order they were added.
    pub fn tasks(&self) -> Vec<TaskSnapshot> {
        let table = self.inner.lock();
        let max_attempts = table.policy().max_attempts;
        table.records().map(|r| r.snapshot(max_attempts)).collect()
    }

    pub fn counts(&self) -> TaskCounts {
        self.inner.lock().counts()
    }

    pub fn in_flight(&self) -> usize {
        self.inner.lock().in_flight()
    }

    /// Subscribe to scheduler events. Returns `None` after the first call.
    ///
    /// Events published before subscribing are not buffered. Dropping the
    /// receiver stops delivery for good.
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<SchedulerEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.events_tx.set(tx).ok()?;
        Some(rx)
    }

    /// Resolve once nothing is queued or in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let idle = self.inner.lock().is_idle();
            if idle {
                return;
            }
            notified.await;
        }
    }

    /// Drop completed tasks from the table. Returns how many were dropped.
    pub fn clear_finished(&self) -> usize {
        self.inner.lock().clear_completed()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, SchedulerTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn admit_locked(&self, table: &mut SchedulerTable, step: &mut Step) {
        let admission = table.admit(self.ids.as_ref(), now(), &mut step.events);
        step.started.extend(admission.started);
        step.wake_at = admission.wake_at;
        step.idle = table.is_idle();
    }

    fn admit_next(self: &Arc<Self>) {
        let mut step = Step::default();
        {
            let mut table = self.lock();
            self.admit_locked(&mut table, &mut step);
        }
        self.finish(step);
    }

    /// Apply a step outside the lock: publish events, start transfers, arm
    /// the backoff timer and wake idle waiters.
    fn finish(self: &Arc<Self>, step: Step) {
        self.publish(step.events);
        for admitted in step.started {
            self.spawn_transfer(admitted);
        }
        if let Some(at) = step.wake_at {
            self.arm_timer(at);
        }
        if step.idle {
            self.idle.notify_waiters();
        }
    }

    fn publish(&self, events: Vec<SchedulerEvent>) {
        for event in events {
            log_event(&event);
            if let Some(tx) = self.events_tx.get() {
                // receiver may have been dropped by the presentation layer
                let _ = tx.send(event);
            }
        }
    }

    fn spawn_transfer(self: &Arc<Self>, admitted: Admitted) {
        let Admitted {
            task_id,
            attempt_id,
            attempt,
            file,
            cancel,
        } = admitted;
        info!(task = %task_id, attempt, name = %file.name, size = file.size, "transfer started");

        let weak = Arc::downgrade(self);
        let progress = ProgressReporter::new(move |percent| {
            if let Some(inner) = weak.upgrade() {
                inner.on_progress(task_id, attempt_id, percent);
            }
        });

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let send = inner.transport.send(&file, progress, cancel);
            let outcome = match AssertUnwindSafe(send).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(_) => {
                    error!(task = %task_id, attempt, "transport panicked");
                    Outcome::retryable("transport panicked")
                }
            };
            inner.on_outcome(task_id, attempt_id, outcome);
        });
    }

    fn arm_timer(self: &Arc<Self>, at: Instant) {
        trace!(?at, "arming backoff timer");
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await;
            if let Some(inner) = weak.upgrade() {
                inner.admit_next();
            }
        });
    }

    fn on_progress(&self, task_id: TaskId, attempt_id: AttemptId, percent: u8) {
        let event = self.lock().progress(task_id, attempt_id, percent);
        if let Some(event) = event {
            self.publish(vec![event]);
        }
    }

    fn on_outcome(self: &Arc<Self>, task_id: TaskId, attempt_id: AttemptId, outcome: Outcome) {
        let mut step = Step::default();
        {
            let mut table = self.lock();
            if !table.complete(task_id, attempt_id, outcome, now(), &mut step.events) {
                debug!(task = %task_id, attempt_id = %attempt_id, "stale outcome ignored");
            }
            self.admit_locked(&mut table, &mut step);
        }
        self.finish(step);
    }
}

/// Scheduler time. Follows the Tokio clock so paused-time tests see backoff
/// elapse.
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

fn log_event(event: &SchedulerEvent) {
    match event {
        SchedulerEvent::Queued { task_id } => debug!(task = %task_id, "queued"),
        SchedulerEvent::Started { .. } => {}
        SchedulerEvent::Progress { task_id, percent } => {
            trace!(task = %task_id, percent, "progress")
        }
        SchedulerEvent::Completed { task_id, url } => {
            info!(task = %task_id, url = %url, "transfer completed")
        }
        SchedulerEvent::RetryScheduled {
            task_id,
            attempt,
            delay,
            reason,
        } => warn!(task = %task_id, attempt, ?delay, reason = %reason, "retry scheduled"),
        SchedulerEvent::Failed {
            task_id,
            reason,
            retries_left,
        } => error!(task = %task_id, retries_left, reason = %reason, "transfer failed"),
        SchedulerEvent::Removed { task_id } => info!(task = %task_id, "removed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskState;
    use crate::scheduler::Backoff;
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    /// Transport with per-file scripted outcomes; defaults to success.
    struct ScriptedTransport {
        scripts: Mutex<HashMap<String, VecDeque<Outcome>>>,
        calls: Mutex<Vec<String>>,
        current: AtomicUsize,
        peak: AtomicUsize,
        delay: Duration,
        ignore_cancel: bool,
    }

    impl ScriptedTransport {
        fn new() -> Self {
            Self {
                scripts: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
                current: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                delay: Duration::from_millis(10),
                ignore_cancel: false,
            }
        }

        fn script(self, name: &str, outcomes: impl IntoIterator<Item = Outcome>) -> Self {
            self.scripts
                .lock()
                .unwrap()
                .insert(name.to_string(), outcomes.into_iter().collect());
            self
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn ignoring_cancel(mut self) -> Self {
            self.ignore_cancel = true;
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(
            &self,
            file: &UploadFile,
            progress: ProgressReporter,
            cancel: CancellationToken,
        ) -> Outcome {
            self.calls.lock().unwrap().push(file.name.clone());
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            progress.report(file.size / 2, file.size);
            let cancelled = if self.ignore_cancel {
                tokio::time::sleep(self.delay).await;
                false
            } else {
                tokio::select! {
                    _ = tokio::time::sleep(self.delay) => false,
                    _ = cancel.cancelled() => true,
                }
            };
            self.current.fetch_sub(1, Ordering::SeqCst);
            if cancelled {
                return Outcome::Cancelled;
            }

            progress.report(file.size, file.size);
            self.scripts
                .lock()
                .unwrap()
                .get_mut(&file.name)
                .and_then(|q| q.pop_front())
                .unwrap_or_else(|| Outcome::success(format!("https://store.test/{}", file.name)))
        }
    }

    fn file(name: &str) -> UploadFile {
        UploadFile::from_bytes(name, "text/plain", vec![7u8; 1000])
    }

    fn scheduler(transport: &Arc<ScriptedTransport>, config: SchedulerConfig) -> UploadScheduler {
        UploadScheduler::new(transport.clone(), config).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn five_tasks_two_slots_third_fails_once() {
        let transport = Arc::new(
            ScriptedTransport::new().script("f3.txt", [Outcome::retryable("503 Service Unavailable")]),
        );
        let s = scheduler(&transport, SchedulerConfig::default());

        let ids = s
            .add((1..=5).map(|i| file(&format!("f{i}.txt"))).collect())
            .unwrap();
        s.wait_idle().await;

        for (i, id) in ids.iter().enumerate() {
            let snap = s.snapshot(*id).unwrap();
            assert_eq!(snap.state, TaskState::Completed, "{}", snap.name);
            assert_eq!(snap.progress, 100);
            assert_eq!(snap.attempt, if i == 2 { 2 } else { 1 }, "{}", snap.name);
        }
        assert_eq!(transport.peak(), 2);
        assert_eq!(
            transport.calls(),
            vec!["f1.txt", "f2.txt", "f3.txt", "f4.txt", "f5.txt", "f3.txt"]
        );
        assert_eq!(s.counts().completed, 5);
        assert_eq!(s.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_bound_holds_for_large_batches() {
        let transport = Arc::new(ScriptedTransport::new());
        let s = scheduler(&transport, SchedulerConfig::default().with_max_concurrency(3));

        s.add((0..20).map(|i| file(&format!("{i}.txt"))).collect())
            .unwrap();
        assert_eq!(s.in_flight(), 3);
        s.wait_idle().await;

        assert_eq!(transport.peak(), 3);
        assert_eq!(transport.calls().len(), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_failures_stop_at_max_attempts() {
        let transport = Arc::new(
            ScriptedTransport::new().script("a.txt", (0..5).map(|_| Outcome::retryable("reset"))),
        );
        let s = scheduler(&transport, SchedulerConfig::default());

        let id = s.add(vec![file("a.txt")]).unwrap()[0];
        s.wait_idle().await;

        let snap = s.snapshot(id).unwrap();
        assert_eq!(snap.state, TaskState::Failed);
        assert_eq!(snap.attempt, 3);
        assert_eq!(snap.retries_left, 0);
        assert_eq!(snap.progress, 0);
        assert!(snap.last_error.unwrap().contains("reset"));
        assert_eq!(transport.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_is_not_retried_until_retry_now() {
        let transport = Arc::new(
            ScriptedTransport::new().script("a.txt", [Outcome::permanent("415 Unsupported Media Type")]),
        );
        let s = scheduler(&transport, SchedulerConfig::default());

        let id = s.add(vec![file("a.txt")]).unwrap()[0];
        s.wait_idle().await;
        let snap = s.snapshot(id).unwrap();
        assert_eq!(snap.state, TaskState::Failed);
        assert_eq!(snap.attempt, 1);
        assert_eq!(transport.calls().len(), 1);

        s.retry_now(id).unwrap();
        assert_eq!(s.in_flight(), 1, "free slot means immediate dispatch");
        s.wait_idle().await;

        let snap = s.snapshot(id).unwrap();
        assert_eq!(snap.state, TaskState::Completed);
        assert_eq!(snap.attempt, 1, "manual retry restarts the attempt count");
        assert!(snap.last_error.is_none());
    }

    #[tokio::test]
    async fn retry_now_rejects_non_failed_tasks() {
        let transport = Arc::new(ScriptedTransport::new().with_delay(Duration::from_secs(3600)));
        let s = scheduler(&transport, SchedulerConfig::default());
        let id = s.add(vec![file("a.txt")]).unwrap()[0];

        let err = s.retry_now(id).unwrap_err();
        assert!(matches!(
            err,
            FerryError::InvalidState {
                state: TaskState::InFlight,
                ..
            }
        ));
        s.remove(id).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn removing_a_queued_task_means_it_is_never_sent() {
        let transport = Arc::new(ScriptedTransport::new());
        let s = scheduler(&transport, SchedulerConfig::default().with_max_concurrency(1));

        let ids = s.add(vec![file("a.txt"), file("b.txt"), file("c.txt")]).unwrap();
        s.remove(ids[1]).unwrap();
        s.wait_idle().await;

        assert_eq!(transport.calls(), vec!["a.txt", "c.txt"]);
        assert!(s.snapshot(ids[1]).is_none());
        assert_eq!(s.tasks().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn removing_an_in_flight_task_cancels_and_frees_the_slot() {
        let transport = Arc::new(ScriptedTransport::new().with_delay(Duration::from_secs(60)));
        let s = scheduler(&transport, SchedulerConfig::default().with_max_concurrency(1));

        let ids = s.add(vec![file("a.txt"), file("b.txt")]).unwrap();
        s.remove(ids[0]).unwrap();
        assert_eq!(s.in_flight(), 1, "slot is held until the transfer returns");
        s.wait_idle().await;

        assert!(s.snapshot(ids[0]).is_none());
        assert_eq!(s.snapshot(ids[1]).unwrap().state, TaskState::Completed);
        assert_eq!(transport.calls(), vec!["a.txt", "b.txt"]);
    }

    #[tokio::test(start_paused = true)]
    async fn late_outcome_of_removed_task_is_ignored() {
        let transport = Arc::new(ScriptedTransport::new().ignoring_cancel());
        let s = scheduler(&transport, SchedulerConfig::default().with_max_concurrency(1));

        let ids = s.add(vec![file("a.txt"), file("b.txt")]).unwrap();
        s.remove(ids[0]).unwrap();
        s.wait_idle().await;

        let counts = s.counts();
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.total(), 1);
        assert_eq!(transport.calls(), vec!["a.txt", "b.txt"]);
    }

    #[tokio::test]
    async fn invalid_file_rejects_the_whole_selection() {
        let transport = Arc::new(ScriptedTransport::new());
        let s = scheduler(&transport, SchedulerConfig::default());

        let big = UploadFile::from_path("big.pdf", "application/pdf", 15 * 1024 * 1024, "/nonexistent");
        let err = s.add(vec![file("ok.txt"), big]).unwrap_err();
        assert!(matches!(
            err,
            FerryError::Validation(ValidationError::TooLarge { .. })
        ));

        let exe = UploadFile::from_bytes("run.exe", "application/x-msdownload", &b"MZ"[..]);
        assert!(matches!(
            s.add(vec![exe]).unwrap_err(),
            FerryError::Validation(ValidationError::DisallowedType { .. })
        ));

        assert!(matches!(
            s.add(Vec::new()).unwrap_err(),
            FerryError::Validation(ValidationError::EmptySelection)
        ));
        assert!(s.tasks().is_empty());
        assert!(transport.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn progress_is_monotonic_and_reaches_100_only_on_completion() {
        let transport = Arc::new(ScriptedTransport::new());
        let s = scheduler(&transport, SchedulerConfig::default());
        let mut events = s.take_events().unwrap();
        assert!(s.take_events().is_none());

        let id = s.add(vec![file("a.txt")]).unwrap()[0];
        s.wait_idle().await;

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        let percents: Vec<u8> = seen
            .iter()
            .filter_map(|e| match e {
                SchedulerEvent::Progress { percent, .. } => Some(*percent),
                _ => None,
            })
            .collect();
        assert_eq!(percents, vec![50, 99]);
        assert!(matches!(seen.first(), Some(SchedulerEvent::Queued { .. })));
        assert!(matches!(seen.get(1), Some(SchedulerEvent::Started { attempt: 1, .. })));
        assert!(matches!(seen.last(), Some(SchedulerEvent::Completed { .. })));
        assert_eq!(s.snapshot(id).unwrap().progress, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn events_are_dropped_until_someone_subscribes() {
        let transport = Arc::new(ScriptedTransport::new());
        let s = scheduler(&transport, SchedulerConfig::default());

        let before = s.add(vec![file("a.txt"), file("b.txt")]).unwrap();
        s.wait_idle().await;
        assert!(s.inner.events_tx.get().is_none());

        let mut events = s.take_events().unwrap();
        let after = s.add(vec![file("c.txt")]).unwrap()[0];
        s.wait_idle().await;

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(!seen.is_empty());
        assert!(seen.iter().all(|e| e.task_id() == after));
        assert!(seen.iter().all(|e| !before.contains(&e.task_id())));
        assert!(matches!(seen.first(), Some(SchedulerEvent::Queued { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_delays_readmission() {
        let transport = Arc::new(ScriptedTransport::new().script("a.txt", [Outcome::retryable("503")]));
        let config = SchedulerConfig::default().with_backoff(Backoff::Exponential {
            base_ms: 1_000,
            multiplier: 2.0,
            max_ms: 10_000,
        });
        let s = scheduler(&transport, config);
        let started = tokio::time::Instant::now();

        let id = s.add(vec![file("a.txt")]).unwrap()[0];
        s.wait_idle().await;

        assert!(started.elapsed() >= Duration::from_millis(1_020));
        let snap = s.snapshot(id).unwrap();
        assert_eq!(snap.state, TaskState::Completed);
        assert_eq!(snap.attempt, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn enqueue_revives_failed_tasks() {
        let transport = Arc::new(ScriptedTransport::new().script("a.txt", [Outcome::permanent("400")]));
        let s = scheduler(&transport, SchedulerConfig::default());
        let id = s.add(vec![file("a.txt")]).unwrap()[0];
        s.wait_idle().await;
        assert_eq!(s.snapshot(id).unwrap().state, TaskState::Failed);

        s.enqueue(&[id]).unwrap();
        s.wait_idle().await;
        assert_eq!(s.snapshot(id).unwrap().state, TaskState::Completed);

        assert_eq!(s.clear_finished(), 1);
        assert!(s.tasks().is_empty());
    }

    struct PanicOnce {
        panicked: AtomicBool,
    }

    #[async_trait]
    impl Transport for PanicOnce {
        async fn send(
            &self,
            file: &UploadFile,
            _progress: ProgressReporter,
            _cancel: CancellationToken,
        ) -> Outcome {
            if !self.panicked.swap(true, Ordering::SeqCst) {
                panic!("transport bug");
            }
            Outcome::success(format!("https://store.test/{}", file.name))
        }
    }

    #[tokio::test]
    async fn panicking_transport_counts_as_retryable_failure() {
        let transport = Arc::new(PanicOnce {
            panicked: AtomicBool::new(false),
        });
        let s = UploadScheduler::new(transport, SchedulerConfig::default()).unwrap();

        let id = s.add(vec![file("a.txt")]).unwrap()[0];
        s.wait_idle().await;

        let snap = s.snapshot(id).unwrap();
        assert_eq!(snap.state, TaskState::Completed);
        assert_eq!(snap.attempt, 2);
    }
}
