use std::sync::Arc;

use anyhow::Context;
use ferry_core::impls::{S3BlobStore, SqliteMetadataRepository};
use ferry_core::ingestion::{FixedWindowRateLimiter, IngestionService};
use ferry_server::{AppState, ServerConfig, serve, spawn_limiter_purge};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env().context("invalid server configuration")?;
    info!(
        port = config.port,
        environment = ?config.environment,
        bucket = %config.s3.bucket,
        database = %config.database_url,
        "starting ferry-server"
    );

    let blobs = S3BlobStore::connect(config.s3.clone())
        .await
        .context("connecting to blob storage")?;
    let metadata = SqliteMetadataRepository::open(&config.database_url)
        .with_context(|| format!("opening metadata database {}", config.database_url))?;
    let ingestion = IngestionService::new(Arc::new(blobs), Arc::new(metadata));

    let health = ingestion.health().await;
    if !health.is_healthy() {
        warn!(?health, "starting with unreachable backends");
    }

    let limiter = Arc::new(FixedWindowRateLimiter::new(
        config.rate_limit_max,
        config.rate_limit_window,
    ));
    let purge = spawn_limiter_purge(limiter.clone());
    let state = AppState::new(ingestion, limiter, config.environment);

    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("binding port {}", config.port))?;
    info!(addr = %listener.local_addr()?, "listening");

    serve(listener, state, shutdown_signal()).await?;
    purge.abort();
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
