//! SQLite-backed cache storage organised into named generations.
//!
//! A generation is one deployment's set of cached responses. Entries are
//! keyed by a hash of the request method and normalized URL, overwritten on
//! every store, and only ever removed together with their generation.
//!
//! - Automatic schema migrations
//! - WAL mode for concurrent access
//! - Cascading generation eviction

pub mod connection;
pub mod entries;
pub mod generations;
pub mod hash;
pub mod migrations;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::CachedResponse;
pub use generations::Generation;
