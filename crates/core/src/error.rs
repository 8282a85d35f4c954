//! Unified error types for cachewarden.
//!
//! Every variant carries a stable code prefix in its display form so log
//! lines and tool errors can be matched without parsing free text.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error types for the caching layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., unknown HTTP method).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// No cache entry found for the given request.
    #[error("CACHE_MISS: {0}")]
    CacheMiss(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// Write targeted a generation that has been deleted or never opened.
    #[error("CACHE_ERROR: unknown generation: {0}")]
    UnknownGeneration(String),

    /// Transport-level failure (DNS, connect, reset, TLS).
    #[error("NETWORK_ERROR: {0}")]
    Network(String),

    /// Fetch timeout.
    #[error("FETCH_TIMEOUT: {0}")]
    FetchTimeout(String),

    /// Response body over the size the cache will store.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// Lifecycle transition requested from the wrong state.
    #[error("LIFECYCLE_ERROR: cannot {action} while {state}")]
    Lifecycle { action: String, state: String },

    /// Defect inside the caching layer (panicked task, broken invariant).
    #[error("INTERNAL_ERROR: {0}")]
    Internal(String),
}

impl Error {
    /// True for failures that originate from the network rather than from
    /// the caching layer itself.
    ///
    /// Strategies absorb or propagate these deliberately; anything else
    /// reaching the dispatcher is treated as a defect.
    pub fn is_network_failure(&self) -> bool {
        matches!(self, Error::Network(_) | Error::FetchTimeout(_))
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let code = match &err {
            Error::InvalidInput(_) | Error::InvalidUrl(_) => -32602,
            Error::CacheMiss(_) => -32001,
            Error::Database(_) | Error::MigrationFailed(_) | Error::UnknownGeneration(_) => -32002,
            Error::Network(_) => -32003,
            Error::FetchTimeout(_) => -32004,
            Error::FetchTooLarge(_) => -32005,
            Error::Lifecycle { .. } => -32006,
            Error::Internal(_) => -32603,
        };

        McpError { code: ErrorCode(code), message: err.to_string().into(), data: None }
    }
}
