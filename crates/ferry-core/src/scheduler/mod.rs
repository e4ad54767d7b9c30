//! Client-side upload scheduling.
//!
//! - `table`: synchronous queue / slot bookkeeping (one mutex, no awaits)
//! - `upload`: `UploadScheduler`, which spawns transfers and routes outcomes
//! - `retry`: attempt cap and backoff
//! - `config`: serde-loadable settings

pub mod config;
pub mod retry;
mod table;
mod upload;

pub use config::{DEFAULT_MAX_CONCURRENCY, SchedulerConfig};
pub use retry::{Backoff, DEFAULT_MAX_ATTEMPTS, RetryDecision, RetryPolicy};
pub use upload::UploadScheduler;
