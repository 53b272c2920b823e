//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::path::PathBuf;

use crate::cache::{CACHE_DIR_NAME, DEFAULT_DB_NAME, DEFAULT_MAX_CACHE_SIZE, PRUNE_BATCH_SIZE};

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of records kept after a prune
    pub max_cache_size: u32,
    /// File name of the backing database
    pub db_name: String,
    /// Writable persistent storage area; the database lives in `<data_dir>/cache/`
    pub data_dir: PathBuf,
    /// Number of non-replacing inserts between prunes (0 disables automatic pruning)
    pub prune_batch_size: u32,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `TILE_CACHE_MAX_SIZE` - Maximum cached records (default: 3000)
    /// - `TILE_CACHE_DB_NAME` - Database file name (default: cache.db)
    /// - `TILE_CACHE_DATA_DIR` - Persistent storage area (default: current directory)
    /// - `TILE_CACHE_PRUNE_BATCH` - Inserts between prunes (default: 20)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_cache_size: env::var("TILE_CACHE_MAX_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_cache_size),
            db_name: env::var("TILE_CACHE_DB_NAME")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.db_name),
            data_dir: env::var_os("TILE_CACHE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            prune_batch_size: env::var("TILE_CACHE_PRUNE_BATCH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.prune_batch_size),
        }
    }

    // == Builders ==
    /// Sets the number of records kept after a prune.
    pub fn with_max_cache_size(mut self, max_cache_size: u32) -> Self {
        self.max_cache_size = max_cache_size;
        self
    }

    /// Sets the database file name.
    pub fn with_db_name(mut self, db_name: impl Into<String>) -> Self {
        self.db_name = db_name.into();
        self
    }

    /// Sets the persistent storage area holding the cache directory.
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    /// Sets the number of new records between prunes; 0 disables automatic pruning.
    pub fn with_prune_batch_size(mut self, prune_batch_size: u32) -> Self {
        self.prune_batch_size = prune_batch_size;
        self
    }

    // == Paths ==
    /// Directory holding the database file.
    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join(CACHE_DIR_NAME)
    }

    /// Full path of the database file.
    pub fn db_path(&self) -> PathBuf {
        self.cache_dir().join(&self.db_name)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
            db_name: DEFAULT_DB_NAME.to_string(),
            data_dir: PathBuf::from("."),
            prune_batch_size: PRUNE_BATCH_SIZE,
        }
    }
}
