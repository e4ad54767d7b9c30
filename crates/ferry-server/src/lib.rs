//! ferry-server
//!
//! Ingestion endpoint: `POST /api/upload`, `GET /api/files`, `GET /health`.

pub mod config;
pub mod error;
pub mod routes;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ferry_core::ingestion::FixedWindowRateLimiter;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::debug;

pub use config::{ConfigError, Environment, ServerConfig};
pub use routes::{AppState, router};

/// Serve `state` on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

/// Periodically drop expired rate-limit windows so idle clients do not
/// accumulate.
pub fn spawn_limiter_purge(limiter: Arc<FixedWindowRateLimiter>) -> JoinHandle<()> {
    let period = limiter.window().max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let purged = limiter.purge_expired(Instant::now());
            if purged > 0 {
                debug!(purged, "expired rate-limit windows dropped");
            }
        }
    })
}
