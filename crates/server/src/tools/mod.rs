//! MCP tool implementations.
//!
//! This module contains all tools exposed by the cachewarden server.

pub mod cache;
pub mod fetch;
pub mod message;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CacheGetParams, CacheStatusParams};
pub use fetch::SwFetchParams;
pub use message::PostMessageParams;
