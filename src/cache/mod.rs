//! Cache Module
//!
//! Persistent blob caching on SQLite with FIFO eviction.
//!
//! Keys live in an index table (name -> id); payloads live in a record table
//! keyed by that id. Deleting an index row cascades to its record.

mod eviction;
mod index;
mod item;
mod locks;
mod records;
mod schema;
mod stats;
mod store;


// Re-export public types
pub use eviction::prune;
pub use index::KeyIndex;
pub use item::{epoch_to_datetime, CacheItem, Clock, SystemClock};
pub use records::{Record, RecordStore};
pub use schema::bootstrap;
pub use stats::CacheStats;
pub use store::SqliteCache;

// == Public Constants ==
/// Default maximum number of records kept after a prune
pub const DEFAULT_MAX_CACHE_SIZE: u32 = 3000;

/// Number of non-replacing inserts between prunes
pub const PRUNE_BATCH_SIZE: u32 = 20;

/// Default database file name
pub const DEFAULT_DB_NAME: &str = "cache.db";

/// Directory created under the data directory to hold the database
pub const CACHE_DIR_NAME: &str = "cache";
