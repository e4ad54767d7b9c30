//! Outcome model: the terminal result of one transport attempt.
//!
//! The transport never touches scheduler state; it only returns one of these
//! and the scheduler (with the retry policy) decides what happens next.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Result of a single `Transport::send`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// The server stored the payload and returned its location.
    Success { url: String },

    /// The attempt failed; `retryable` says whether an automatic retry makes sense.
    Failure {
        reason: String,
        retryable: bool,

        /// Server-provided hint (e.g. `Retry-After` on 429).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retry_after: Option<Duration>,
    },

    /// The transfer was aborted through its cancellation token.
    Cancelled,
}

impl Outcome {
    pub fn success(url: impl Into<String>) -> Self {
        Self::Success { url: url.into() }
    }

    /// Transient failure: network error, 5xx, 429.
    pub fn retryable(reason: impl Into<String>) -> Self {
        Self::Failure {
            reason: reason.into(),
            retryable: true,
            retry_after: None,
        }
    }

    /// Permanent failure: rejected request, other 4xx.
    pub fn permanent(reason: impl Into<String>) -> Self {
        Self::Failure {
            reason: reason.into(),
            retryable: false,
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        if let Self::Failure { retry_after, .. } = &mut self {
            *retry_after = Some(delay);
        }
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Failure { retryable: true, .. })
    }
}
