//! Fixed-window request limiter keyed by client address.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::domain::FerryError;

pub const DEFAULT_MAX_REQUESTS: u32 = 100;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Remaining budget after an accepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub limit: u32,
    pub remaining: u32,
    pub reset_after: Duration,
}

#[derive(Debug)]
pub struct FixedWindowRateLimiter {
    max_requests: u32,
    window: Duration,
    clients: Mutex<HashMap<IpAddr, Window>>,
}

impl Default for FixedWindowRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW)
    }
}

impl FixedWindowRateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn check(&self, client: IpAddr) -> Result<RateLimitStatus, FerryError> {
        self.check_at(client, Instant::now())
    }

    /// Count one request from `client` at `now`.
    pub fn check_at(&self, client: IpAddr, now: Instant) -> Result<RateLimitStatus, FerryError> {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        let window = clients.entry(client).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.saturating_duration_since(window.started) >= self.window {
            *window = Window {
                started: now,
                count: 0,
            };
        }

        let reset_after = self
            .window
            .saturating_sub(now.saturating_duration_since(window.started));
        if window.count >= self.max_requests {
            return Err(FerryError::RateLimited {
                retry_after: reset_after,
            });
        }
        window.count += 1;
        Ok(RateLimitStatus {
            limit: self.max_requests,
            remaining: self.max_requests - window.count,
            reset_after,
        })
    }

    /// Drop windows that have expired. Returns how many were dropped.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        let before = clients.len();
        clients.retain(|_, w| now.saturating_duration_since(w.started) < self.window);
        before - clients.len()
    }

    pub fn tracked_clients(&self) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}
