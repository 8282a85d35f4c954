//! cache_get tool implementation.
//!
//! Reads a stored response from the current generation without touching
//! the network.

use std::collections::BTreeMap;

use cachewarden_client::ServiceWorker;
use cachewarden_core::Error;
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    /// Absolute URL, or a path resolved against the configured origin.
    pub url: String,

    /// Request method of the stored entry (default: GET).
    #[serde(default = "default_method")]
    pub method: String,
}

fn default_method() -> String {
    "GET".into()
}

/// Output from the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetOutput {
    pub generation: String,
    pub method: String,
    pub url: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    /// Body decoded as UTF-8 (lossy).
    pub body: String,
    /// RFC 3339 timestamp of the write.
    pub stored_at: String,
}

/// Implementation of the cache_get tool.
pub async fn get_impl(worker: &ServiceWorker, params: CacheGetParams) -> Result<CallToolResult, McpError> {
    let url = worker.resolve(&params.url)?;
    let method = params.method.trim().to_ascii_uppercase();
    let generation = worker.current_generation();

    let entry = generation
        .lookup(&method, url.as_str())
        .await?
        .ok_or_else(|| Error::CacheMiss(format!("{method} {url}")))?;

    let output = CacheGetOutput {
        generation: generation.name().to_string(),
        method: entry.method,
        url: entry.url,
        status: entry.status,
        headers: entry.headers.into_iter().collect(),
        body: String::from_utf8_lossy(&entry.body).into_owned(),
        stored_at: entry.stored_at,
    };
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::Internal(format!("Failed to serialize entry: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
