//! cache_status tool implementation.

use cachewarden_client::ServiceWorker;
use cachewarden_core::Error;
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the cache_status tool (none).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CacheStatusParams {}

/// Output from the cache_status tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheStatusOutput {
    /// parsed, installing, installed, activating or activated.
    pub state: String,
    pub skip_waiting: bool,
    pub clients_claimed: bool,
    pub current_generation: String,
    /// Every generation in the store, oldest first.
    pub generations: Vec<String>,
    /// Entries in the current generation.
    pub entry_count: u64,
    /// URLs stored in the current generation, sorted.
    pub urls: Vec<String>,
}

/// Implementation of the cache_status tool.
pub async fn status_impl(worker: &ServiceWorker, _params: CacheStatusParams) -> Result<CallToolResult, McpError> {
    let lifecycle = worker.lifecycle().await;
    let generation = worker.current_generation();

    let output = CacheStatusOutput {
        state: lifecycle.state.to_string(),
        skip_waiting: lifecycle.skip_waiting,
        clients_claimed: lifecycle.clients_claimed,
        current_generation: generation.name().to_string(),
        generations: worker.cache().generation_names().await?,
        entry_count: generation.entry_count().await?,
        urls: generation.urls().await?,
    };
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::Internal(format!("Failed to serialize status: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
