//! sw_fetch tool implementation.
//!
//! Routes a request through the caching worker exactly as a page request
//! would be, and reports where the response came from.

use std::collections::BTreeMap;

use cachewarden_client::{Request, ServiceWorker};
use cachewarden_core::Error;
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Input parameters for the sw_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwFetchParams {
    /// Absolute URL, or a path resolved against the configured origin.
    pub url: String,

    /// HTTP method (default: GET). Only GET requests are cached.
    #[serde(default = "default_method")]
    pub method: String,

    /// Optional request headers.
    #[serde(default)]
    pub headers: Option<BTreeMap<String, String>>,

    /// Optional request body.
    #[serde(default)]
    pub body: Option<String>,
}

fn default_method() -> String {
    "GET".into()
}

/// Output structure for the sw_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwFetchOutput {
    /// Normalized request URL.
    pub url: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    /// Body decoded as UTF-8 (lossy).
    pub body: String,
    /// cache, network, passthrough or fallback.
    pub source: String,
    /// Request class, absent for pass-through requests.
    pub class: Option<String>,
    /// Strategy applied, absent for pass-through requests.
    pub strategy: Option<String>,
    /// Fetch time in milliseconds; 0 for cached responses.
    pub fetch_ms: u64,
}

/// Implementation of the sw_fetch tool.
pub async fn fetch_impl(worker: &ServiceWorker, params: SwFetchParams) -> Result<CallToolResult, McpError> {
    if params.url.trim().is_empty() {
        return Err(Error::InvalidInput("url cannot be empty".into()).into());
    }

    let method = Method::from_bytes(params.method.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| Error::InvalidInput(format!("invalid method: {}", params.method)))?;
    let url = worker.resolve(&params.url)?;
    let headers = build_headers(params.headers.unwrap_or_default())?;

    let mut request = Request::new(method, url)?.with_headers(headers);
    if let Some(body) = params.body {
        request = request.with_body(body);
    }

    let outcome = worker.handle_fetch(request.clone()).await?;
    let response = outcome.response;

    let output = SwFetchOutput {
        url: request.url.to_string(),
        status: response.status.as_u16(),
        headers: response
            .headers
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.to_string(), v.to_string())))
            .collect(),
        body: String::from_utf8_lossy(&response.body).into_owned(),
        source: to_label(&outcome.source),
        class: outcome.class.as_ref().map(to_label),
        strategy: outcome.strategy.map(|s| s.to_string()),
        fetch_ms: response.fetch_ms,
    };

    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::Internal(format!("Failed to serialize response: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}

fn build_headers(raw: BTreeMap<String, String>) -> Result<HeaderMap, Error> {
    let mut headers = HeaderMap::with_capacity(raw.len());
    for (name, value) in raw {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| Error::InvalidInput(format!("header {name}: {e}")))?;
        let header_value =
            HeaderValue::from_str(&value).map_err(|e| Error::InvalidInput(format!("header {name} value: {e}")))?;
        headers.append(header_name, header_value);
    }
    Ok(headers)
}

/// Serialized form of a unit enum variant.
fn to_label<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        _ => String::new(),
    }
}
