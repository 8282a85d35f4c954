//! cachewarden server entry point.
//!
//! Boots the caching worker (install, then activate) and serves it as an
//! MCP server on stdio transport. Logging goes to stderr to avoid
//! interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use cachewarden_client::{FetchClient, FetchConfig, ServiceWorker, WorkerConfig, WorkerEvent};
use cachewarden_core::{AppConfig, CacheDb};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tokio::sync::broadcast::{Receiver, error::RecvError};
use tracing_subscriber::EnvFilter;

mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(generation = %config.cache_name, origin = %config.origin, "starting cachewarden on stdio transport");

    let db = CacheDb::open(&config.db_path).await?;
    let network = Arc::new(FetchClient::new(FetchConfig::from(&config))?);
    let worker = Arc::new(ServiceWorker::new(WorkerConfig::from_app_config(&config)?, db, network)?);

    tokio::spawn(log_events(worker.subscribe()));

    let installed = worker.install().await?;
    if !installed.succeeded() {
        tracing::warn!(failed = installed.failed.len(), "some critical resources were not cached");
    }
    worker.activate().await?;

    let handler = handler::CachewardenServer::new(Arc::clone(&worker));
    let server = serve_server(handler, stdio()).await?;

    server.waiting().await?;

    Ok(())
}

async fn log_events(mut events: Receiver<WorkerEvent>) {
    loop {
        match events.recv().await {
            Ok(WorkerEvent::CacheUpdated { url }) => tracing::info!(url = %url, "cache updated"),
            Ok(WorkerEvent::UpdateAvailable { previous }) => {
                tracing::info!(?previous, "new version available, old caches will be removed")
            }
            Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "worker events dropped"),
            Err(RecvError::Closed) => break,
        }
    }
}
