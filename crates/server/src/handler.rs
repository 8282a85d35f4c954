//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use std::sync::Arc;

use crate::tools::{
    CacheGetParams, CacheStatusParams, PostMessageParams, SwFetchParams, cache, fetch::fetch_impl,
    message::message_impl,
};
use cachewarden_client::ServiceWorker;

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

/// The main MCP server handler for cachewarden.
#[derive(Clone)]
pub struct CachewardenServer {
    worker: Arc<ServiceWorker>,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl CachewardenServer {
    /// Create a new server handler around an activated worker.
    pub fn new(worker: Arc<ServiceWorker>) -> Self {
        Self { worker, tool_router: Self::tool_router() }
    }

    /// Route a request through the caching worker.
    #[tool(
        description = "Fetch a URL through the caching worker. GET requests for http(s) URLs are served cache-first (static assets), network-first (API) or stale-while-revalidate (pages); anything else passes through. Returns status, headers, body and where the response came from."
    )]
    async fn sw_fetch(&self, params: Parameters<SwFetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.worker, params.0).await
    }

    /// Post a control message to the worker.
    #[tool(
        description = "Post a control message to the worker. Supported types: PRELOAD_RESOURCES {urls} caches the URLs in the background; PERFORMANCE_MEASURE {data: {name, duration}} records a timing. Returns an acknowledgement immediately."
    )]
    async fn post_message(&self, params: Parameters<PostMessageParams>) -> Result<CallToolResult, McpError> {
        message_impl(Arc::clone(&self.worker), params.0).await
    }

    /// Read a stored response from the current generation.
    #[tool(description = "Get a cached response from the current cache generation by URL and method. No network access.")]
    async fn cache_get(&self, params: Parameters<CacheGetParams>) -> Result<CallToolResult, McpError> {
        cache::get_impl(&self.worker, params.0).await
    }

    /// Report lifecycle and storage state.
    #[tool(description = "Report the worker lifecycle state, the current cache generation, all stored generations and the current entry count.")]
    async fn cache_status(&self, params: Parameters<CacheStatusParams>) -> Result<CallToolResult, McpError> {
        cache::status_impl(&self.worker, params.0).await
    }
}

impl ServerHandler for CachewardenServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "cachewarden".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
