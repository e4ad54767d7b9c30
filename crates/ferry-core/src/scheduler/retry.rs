//! Retry policy: decides whether a failed task re-enters the queue, and when.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::domain::{Outcome, TaskRecord};

/// Default number of automatic attempts per task.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Delay inserted before a retried task becomes admissible again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    /// Requeue immediately.
    #[default]
    None,

    /// delay = base * multiplier^(attempt - 1), capped at `max_ms`.
    Exponential {
        base_ms: u64,
        multiplier: f64,
        max_ms: u64,
    },
}

impl Backoff {
    /// Delay before the next try, given the number of attempts already made.
    ///
    /// Example with base=500ms, multiplier=2.0:
    /// - attempt 1 (first failure): 500ms
    /// - attempt 2: 1s
    /// - attempt 3: 2s
    pub fn delay(&self, attempts: u32) -> Duration {
        match self {
            Backoff::None => Duration::ZERO,
            Backoff::Exponential {
                base_ms,
                multiplier,
                max_ms,
            } => {
                let exp = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
                let ms = (*base_ms as f64) * multiplier.powi(exp);
                let capped = if ms.is_finite() {
                    ms.min(*max_ms as f64)
                } else {
                    *max_ms as f64
                };
                Duration::from_millis(capped.max(0.0) as u64)
            }
        }
    }
}

/// What to do with a task after a failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Requeue at the tail after `delay`.
    Retry { delay: Duration, reason: String },

    /// Terminal failure.
    GiveUp { reason: String, retryable: bool },
}

/// Attempt-capped retry with pluggable backoff.
///
/// Counting rule: `attempt` is incremented when a task is dispatched and the
/// cap is checked here, after the failure, so a task gets at most
/// `max_attempts` automatic tries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(default)]
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Backoff::None,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Pure decision: no side effects on `task`.
    pub fn decide(&self, task: &TaskRecord, outcome: &Outcome) -> RetryDecision {
        let (reason, retryable, retry_after) = match outcome {
            Outcome::Failure {
                reason,
                retryable,
                retry_after,
            } => (reason.clone(), *retryable, *retry_after),
            Outcome::Cancelled => ("transfer cancelled".to_string(), false, None),
            Outcome::Success { .. } => {
                return RetryDecision::GiveUp {
                    reason: "success is not retried".to_string(),
                    retryable: false,
                };
            }
        };

        if !retryable {
            return RetryDecision::GiveUp { reason, retryable };
        }
        if task.attempt >= self.max_attempts {
            return RetryDecision::GiveUp {
                reason: format!(
                    "{reason} (gave up after {}/{} attempts)",
                    task.attempt, self.max_attempts
                ),
                retryable,
            };
        }

        let delay = self
            .backoff
            .delay(task.attempt)
            .max(retry_after.unwrap_or(Duration::ZERO));
        RetryDecision::Retry { delay, reason }
    }

    /// Apply the decision: on retry the task goes back to `Pending` with
    /// progress cleared and returns true; otherwise the task is left for the
    /// caller to mark failed.
    ///
    /// `now` is the caller's clock; a backoff makes the task admissible at
    /// `now + delay`.
    pub fn should_retry(&self, task: &mut TaskRecord, outcome: &Outcome, now: Instant) -> bool {
        match self.decide(task, outcome) {
            RetryDecision::Retry { delay, .. } => {
                let next_run_at = (!delay.is_zero()).then(|| now + delay);
                task.requeue(next_run_at);
                true
            }
            RetryDecision::GiveUp { .. } => false,
        }
    }
}
