//! Shared helpers for tool tests.

use cachewarden_client::{FetchClient, FetchConfig, ServiceWorker, WorkerConfig};
use cachewarden_core::{AppConfig, CacheDb};
use rmcp::model::CallToolResult;
use std::sync::Arc;
use wiremock::MockServer;

/// Installed and activated worker whose origin is the mock server.
///
/// No critical assets are configured, so install makes no requests.
pub(crate) async fn activated_worker(server: &MockServer) -> ServiceWorker {
    let app = AppConfig { origin: server.uri(), precache_urls: Vec::new(), ..Default::default() };
    let config = WorkerConfig::from_app_config(&app).unwrap();
    let db = CacheDb::open_in_memory().await.unwrap();
    let network = Arc::new(FetchClient::new(FetchConfig::from(&app)).unwrap());

    let worker = ServiceWorker::new(config, db, network).unwrap();
    worker.install().await.unwrap();
    worker.activate().await.unwrap();
    worker
}

/// Text of the first content block of a tool result.
pub(crate) fn text_of(result: &CallToolResult) -> String {
    result
        .content
        .first()
        .and_then(|c| c.as_text())
        .map(|t| t.text.clone())
        .expect("Expected text content")
}
