//! post_message tool implementation.
//!
//! Hands a control message to the worker. Handling runs in the background;
//! the tool only acknowledges receipt.

use std::sync::Arc;

use cachewarden_client::{ControlMessage, ServiceWorker};
use cachewarden_core::Error;
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Input parameters for the post_message tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PostMessageParams {
    /// Control message, e.g. `{"type": "PRELOAD_RESOURCES", "urls": ["/a.css"]}`
    /// or `{"type": "PERFORMANCE_MEASURE", "data": {"name": "LCP", "duration": 850}}`.
    pub message: serde_json::Value,
}

/// Output from the post_message tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PostMessageOutput {
    /// False when the message was not recognized and will be ignored.
    pub accepted: bool,
    /// Message type as parsed.
    pub kind: String,
}

/// Implementation of the post_message tool.
pub async fn message_impl(worker: Arc<ServiceWorker>, params: PostMessageParams) -> Result<CallToolResult, McpError> {
    let message = ControlMessage::from_value(params.message);
    let kind = message.kind();
    let accepted = message != ControlMessage::Unknown;

    if accepted {
        tokio::spawn(async move {
            let outcome = worker.handle_message(message).await;
            tracing::debug!(kind, ?outcome, "control message handled");
        });
    } else {
        tracing::debug!("control message not recognized");
    }

    let output = PostMessageOutput { accepted, kind: kind.to_string() };
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::Internal(format!("Failed to serialize acknowledgement: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
