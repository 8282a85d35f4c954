//! Out-of-band control messages from the hosting page.

use serde::{Deserialize, Serialize};

use super::{FailedUrl, ServiceWorker};

/// A message posted to the worker.
///
/// Tagged by `type`; unrecognized types deserialize to `Unknown`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    PreloadResources {
        urls: Vec<String>,
    },
    PerformanceMeasure {
        data: PerformanceMeasure,
    },
    #[serde(other)]
    Unknown,
}

impl ControlMessage {
    /// Parse a raw message. Anything malformed is treated as unknown.
    pub fn from_value(value: serde_json::Value) -> Self {
        serde_json::from_value(value).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "ignoring malformed control message");
            ControlMessage::Unknown
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ControlMessage::PreloadResources { .. } => "PRELOAD_RESOURCES",
            ControlMessage::PerformanceMeasure { .. } => "PERFORMANCE_MEASURE",
            ControlMessage::Unknown => "UNKNOWN",
        }
    }
}

/// A named duration reported by the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMeasure {
    pub name: String,
    /// Milliseconds
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreloadReport {
    pub stored: Vec<String>,
    pub failed: Vec<FailedUrl>,
}

/// What handling a message did. The page never sees this; it exists for
/// in-process callers and tests.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageOutcome {
    Preloaded(PreloadReport),
    Measured(PerformanceMeasure),
    Ignored,
}

impl ServiceWorker {
    /// Handle a control message. Never fails: per-URL problems are logged
    /// and reported in the outcome.
    pub async fn handle_message(&self, message: ControlMessage) -> MessageOutcome {
        match message {
            ControlMessage::PreloadResources { urls } => MessageOutcome::Preloaded(self.preload(&urls).await),
            ControlMessage::PerformanceMeasure { data } => {
                tracing::info!(name = %data.name, duration_ms = data.duration, "performance measure");
                MessageOutcome::Measured(data)
            }
            ControlMessage::Unknown => MessageOutcome::Ignored,
        }
    }

    /// Fetch and store every URL concurrently in the current generation.
    async fn preload(&self, urls: &[String]) -> PreloadReport {
        let generation = match self.db.open_generation(&self.config.cache_name).await {
            Ok(generation) => generation,
            Err(e) => {
                tracing::error!(error = %e, "cannot open current generation for preload");
                let reason = e.to_string();
                let failed = urls
                    .iter()
                    .map(|url| FailedUrl { url: url.clone(), reason: reason.clone() })
                    .collect();
                return PreloadReport { stored: Vec::new(), failed };
            }
        };

        let (stored, failed) = self.fetch_and_store_all(&generation, urls).await;
        tracing::info!(stored = stored.len(), failed = failed.len(), "preloaded resources");
        PreloadReport { stored, failed }
    }
}
