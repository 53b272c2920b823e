//! Tile Cache - A persistent, size-bounded blob cache
//!
//! Stores opaque byte payloads under string keys in a single SQLite file and
//! keeps the record count bounded by evicting the oldest entries first.

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheItem, CacheStats, SqliteCache};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
