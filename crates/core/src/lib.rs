//! Core types and shared functionality for cachewarden.
//!
//! This crate provides:
//! - Versioned cache storage (generations of request/response entries) on SQLite
//! - Unified error types
//! - Layered configuration

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheDb, CachedResponse, Generation};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
