//! Client-side scheduler configuration.

use serde::{Deserialize, Serialize};

use super::retry::{Backoff, DEFAULT_MAX_ATTEMPTS, RetryPolicy};
use crate::domain::FerryError;
use crate::validation::UploadLimits;

pub const DEFAULT_MAX_CONCURRENCY: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Upper bound on simultaneous transfers.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Automatic attempts per task before it is terminally failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default)]
    pub backoff: Backoff,

    #[serde(default)]
    pub limits: UploadLimits,
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Backoff::None,
            limits: UploadLimits::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n;
        self
    }

    pub fn with_max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Fail fast on settings that would stall the queue.
    pub fn validate(&self) -> Result<(), FerryError> {
        if self.max_concurrency == 0 {
            return Err(FerryError::Configuration(
                "max_concurrency must be at least 1".into(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(FerryError::Configuration(
                "max_attempts must be at least 1".into(),
            ));
        }
        if let Backoff::Exponential { multiplier, .. } = self.backoff
            && !(multiplier.is_finite() && multiplier >= 1.0)
        {
            return Err(FerryError::Configuration(format!(
                "backoff multiplier must be >= 1.0, got {multiplier}"
            )));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.backoff.clone())
    }
}
