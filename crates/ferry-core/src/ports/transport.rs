//! Transport port - 1 回の転送（HTTP リクエスト相当）
//!
//! A transport streams one payload to the remote endpoint, reports byte-level
//! progress through a [`ProgressReporter`], and returns an [`Outcome`]. It must
//! not touch scheduler state.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::{Outcome, UploadFile};

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `file`. Return `Outcome::Cancelled` promptly once `cancel` fires.
    async fn send(
        &self,
        file: &UploadFile,
        progress: ProgressReporter,
        cancel: CancellationToken,
    ) -> Outcome;
}

/// Sink for progress of one attempt.
///
/// Converts acknowledged byte counts into an integer percent, truncated so a
/// transfer never shows 100 before the server confirms completion.
#[derive(Clone)]
pub struct ProgressReporter {
    sink: Arc<dyn Fn(u8) + Send + Sync>,
}

impl ProgressReporter {
    pub fn new(sink: impl Fn(u8) + Send + Sync + 'static) -> Self {
        Self {
            sink: Arc::new(sink),
        }
    }

    /// Reporter that drops every update.
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    /// Report `sent` of `total` bytes acknowledged.
    pub fn report(&self, sent: u64, total: u64) {
        (self.sink)(percent(sent, total));
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter").finish_non_exhaustive()
    }
}

/// Truncated integer percent. An empty payload counts as 0 until completion.
pub fn percent(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (u128::from(sent.min(total)) * 100) / u128::from(total);
    pct as u8
}
