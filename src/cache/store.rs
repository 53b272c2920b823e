//! Cache Store Module
//!
//! Public facade over the key index, record store and eviction policy.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use rusqlite::Connection;
use tracing::{debug, error, info, trace, warn};

use crate::cache::locks::KeyLocks;
use crate::cache::{
    epoch_to_datetime, eviction, schema, CacheItem, CacheStats, Clock, KeyIndex, Record,
    RecordStore, SystemClock,
};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

/// Attempts made to delete the database file before the final, fallible one.
const DELETE_ATTEMPTS: u32 = 5;
const DELETE_RETRY_DELAY: Duration = Duration::from_millis(100);

// == Sqlite Cache ==
/// Persistent, size-bounded blob cache backed by one SQLite file.
///
/// All methods take `&self`; share the cache between threads with `Arc`.
/// Writers of the same key are serialized from id resolution through the
/// record write, writers of different keys are not.
pub struct SqliteCache {
    /// Configuration the cache was opened with
    config: CacheConfig,
    /// Location of the database file
    path: PathBuf,
    /// Open handle, `None` once cleared or closed
    conn: Mutex<Option<Connection>>,
    /// Per-key writer serialization
    key_locks: KeyLocks,
    /// Non-replacing inserts since the last prune
    prune_counter: AtomicU32,
    /// Lookup and eviction counters
    stats: Mutex<CacheStats>,
    /// Timestamp source for new records
    clock: Box<dyn Clock>,
    /// Route executed SQL to `tracing::trace!`
    sql_trace: AtomicBool,
}

impl SqliteCache {
    // == Constructors ==
    /// Opens (or creates) the cache described by `config`.
    ///
    /// Fails if the cache directory cannot be created or the database cannot
    /// be opened and bootstrapped.
    pub fn open(config: CacheConfig) -> Result<Self> {
        Self::with_clock(config, SystemClock)
    }

    /// Opens the cache using `clock` to timestamp new records.
    pub fn with_clock(config: CacheConfig, clock: impl Clock + 'static) -> Result<Self> {
        let path = config.db_path();
        let conn = schema::open_or_create(&path)?;
        info!(
            path = %path.display(),
            max_cache_size = config.max_cache_size,
            prune_batch_size = config.prune_batch_size,
            "cache initialized"
        );

        Ok(Self {
            config,
            path,
            conn: Mutex::new(Some(conn)),
            key_locks: KeyLocks::new(),
            prune_counter: AtomicU32::new(0),
            stats: Mutex::new(CacheStats::new()),
            clock: Box::new(clock),
            sql_trace: AtomicBool::new(false),
        })
    }

    // == Accessors ==
    /// Number of records the cache is pruned down to.
    pub fn max_cache_size(&self) -> u32 {
        self.config.max_cache_size
    }

    /// Number of new records between automatic prunes (0 when disabled).
    pub fn prune_batch_size(&self) -> u32 {
        self.config.prune_batch_size
    }

    /// Location of the backing database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// False after `clear` or `close`, until `reinit`.
    pub fn is_initialized(&self) -> bool {
        self.lock_conn().is_some()
    }

    // == Add ==
    /// Stores `item` under `key`.
    ///
    /// An existing entry is kept unless `replace_if_exists` is set. If the key
    /// cannot be resolved to a record id the add is logged and dropped; a
    /// failed record write is returned as an error.
    ///
    /// Every `prune_batch_size` new records trigger a prune.
    pub fn add(&self, key: &str, item: CacheItem, replace_if_exists: bool) -> Result<()> {
        if !replace_if_exists && self.with_conn(|conn| Self::has_record(conn, key))? {
            debug!(key, "key already cached, skipping add");
            return Ok(());
        }

        let key_guard = self.key_locks.lock(key);

        let resolved = self.with_conn(|conn| {
            let index = KeyIndex::new(conn);
            match index.resolve(key)? {
                Some(id) => Ok((id, RecordStore::new(conn).contains(id)?)),
                None => Ok((index.create_if_absent(key)?, false)),
            }
        });
        let (record_id, replacing) = match resolved {
            Ok(resolved) => resolved,
            Err(CacheError::NotInitialized) => return Err(CacheError::NotInitialized),
            Err(e) => {
                error!(key, error = %e, "could not resolve record id, dropping add");
                return Ok(());
            }
        };

        // Another writer stored the key between the fast path and the lock.
        if replacing && !replace_if_exists {
            debug!(key, "key cached concurrently, skipping add");
            return Ok(());
        }

        let record = Record {
            record_id,
            timestamp: self.clock.now_secs(),
            data: item.data,
            last_modified: item.last_modified.map(|t| t.timestamp()),
        };
        self.with_conn(|conn| RecordStore::new(conn).write(&record))
            .inspect_err(|e| error!(key, record_id, error = %e, "failed to write record"))?;
        drop(key_guard);

        if !replacing {
            self.count_insert();
        }
        Ok(())
    }

    // == Get ==
    /// Returns the item stored under `key`.
    ///
    /// Read failures are logged and reported as a miss.
    pub fn get_item(&self, key: &str) -> Option<CacheItem> {
        let found = self.with_conn(|conn| match KeyIndex::new(conn).resolve(key)? {
            Some(id) => RecordStore::new(conn).read(id),
            None => Ok(None),
        });

        let record = match found {
            Ok(record) => record,
            Err(CacheError::NotInitialized) => None,
            Err(e) => {
                error!(key, error = %e, "failed to read record");
                None
            }
        };

        let mut stats = self.lock_stats();
        match record {
            Some(record) => {
                stats.record_hit();
                Some(CacheItem {
                    data: record.data,
                    added_at: record.timestamp,
                    last_modified: record.last_modified.and_then(epoch_to_datetime),
                })
            }
            None => {
                stats.record_miss();
                None
            }
        }
    }

    // == Delete ==
    /// Removes `key` and its record. Absent keys are a no-op.
    pub fn delete(&self, key: &str) -> Result<()> {
        let _key_guard = self.key_locks.lock(key);
        match self.with_conn(|conn| KeyIndex::new(conn).delete(key)) {
            Ok(removed) => {
                debug!(key, removed, "delete");
                Ok(())
            }
            Err(CacheError::NotInitialized) => Ok(()),
            Err(e) => Err(e),
        }
    }

    // == Exists ==
    /// Returns true if `key` has an index entry.
    pub fn record_exist_by_key(&self, key: &str) -> Result<bool> {
        match self.with_conn(|conn| KeyIndex::new(conn).exists(key)) {
            Err(CacheError::NotInitialized) => Ok(false),
            other => other,
        }
    }

    // == Count ==
    /// Number of stored records.
    pub fn record_count(&self) -> Result<u64> {
        match self.with_conn(|conn| RecordStore::new(conn).count()) {
            Err(CacheError::NotInitialized) => Ok(0),
            other => other,
        }
    }

    // == Prune ==
    /// Evicts the oldest records down to `max_cache_size`.
    ///
    /// Returns the number of records removed.
    pub fn prune(&self) -> Result<usize> {
        let removed = self.with_conn(|conn| eviction::prune(conn, self.config.max_cache_size))?;
        self.lock_stats().record_evictions(removed as u64);
        Ok(removed)
    }

    // == Stats ==
    /// Returns lookup and eviction counters plus the current record count.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.lock_stats().clone();
        match self.record_count() {
            Ok(count) => stats.set_total_records(count),
            Err(e) => warn!(error = %e, "could not count records for stats"),
        }
        stats
    }

    // == Clear ==
    /// Closes the database and deletes its file, leaving the cache
    /// uninitialized until `reinit`.
    pub fn clear(&self) -> Result<()> {
        let mut conn = self.lock_conn();
        self.clear_locked(&mut conn)
    }

    // == ReInit ==
    /// Destroys the database and recreates an empty one in its place.
    pub fn reinit(&self) -> Result<()> {
        let mut conn = self.lock_conn();
        self.clear_locked(&mut conn)?;

        let mut fresh = schema::open_or_create(&self.path)?;
        if self.sql_trace.load(Ordering::Relaxed) {
            fresh.trace(Some(trace_sql));
        }
        *conn = Some(fresh);
        info!(path = %self.path.display(), "cache re-initialized");
        Ok(())
    }

    // == Close ==
    /// Compacts and closes the database. Later calls are no-ops.
    ///
    /// Also run on drop, where errors are only logged.
    pub fn close(&self) -> Result<()> {
        let Some(conn) = self.lock_conn().take() else {
            return Ok(());
        };

        let vacuumed = conn.execute_batch("VACUUM;");
        if let Err(e) = &vacuumed {
            warn!(error = %e, "failed to compact cache database");
        }
        release(conn)?;
        info!(path = %self.path.display(), "cache closed");
        Ok(vacuumed?)
    }

    // == SQL Trace ==
    /// Logs every executed statement at trace level (target `tile_cache::sql`).
    pub fn enable_sql_trace(&self) {
        self.sql_trace.store(true, Ordering::Relaxed);
        if let Some(conn) = self.lock_conn().as_mut() {
            conn.trace(Some(trace_sql));
        }
    }

    // == Internals ==
    fn lock_conn(&self) -> MutexGuard<'_, Option<Connection>> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_stats(&self) -> MutexGuard<'_, CacheStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` against the open connection, holding it for the call.
    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self.lock_conn();
        let conn = guard.as_ref().ok_or(CacheError::NotInitialized)?;
        f(conn)
    }

    fn has_record(conn: &Connection, key: &str) -> Result<bool> {
        match KeyIndex::new(conn).resolve(key)? {
            Some(id) => RecordStore::new(conn).contains(id),
            None => Ok(false),
        }
    }

    /// Counts a new record and prunes at each batch boundary.
    fn count_insert(&self) {
        let batch = self.config.prune_batch_size;
        if batch == 0 {
            return;
        }

        let previous = match self.prune_counter.fetch_update(
            Ordering::AcqRel,
            Ordering::Acquire,
            |n| Some(if n + 1 >= batch { 0 } else { n + 1 }),
        ) {
            Ok(n) | Err(n) => n,
        };

        if previous + 1 >= batch {
            if let Err(e) = self.prune() {
                error!(error = %e, "error pruning cache");
            }
        }
    }

    fn clear_locked(&self, conn: &mut Option<Connection>) -> Result<()> {
        if let Some(open) = conn.take() {
            if let Err(e) = release(open) {
                warn!(error = %e, "error closing cache database");
            }
        }

        info!(path = %self.path.display(), "deleting cache database");
        remove_file_with_retry(&self.path)?;
        self.prune_counter.store(0, Ordering::Release);
        Ok(())
    }
}

impl fmt::Debug for SqliteCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteCache")
            .field("path", &self.path)
            .field("max_cache_size", &self.config.max_cache_size)
            .field("prune_batch_size", &self.config.prune_batch_size)
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

impl Drop for SqliteCache {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!(error = %e, "failed to close cache database");
        }
    }
}

// == Helpers ==
fn release(conn: Connection) -> Result<()> {
    // On failure the handle comes back; dropping it closes lazily.
    conn.close().map_err(|(_, e)| CacheError::Database(e))
}

/// SQLite may hold the file briefly after close, so retry before giving up.
fn remove_file_with_retry(path: &Path) -> Result<()> {
    for attempt in 1..=DELETE_ATTEMPTS {
        match fs::remove_file(path) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                warn!(attempt, path = %path.display(), error = %e, "could not delete cache database, retrying");
                thread::sleep(DELETE_RETRY_DELAY);
            }
        }
    }

    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

fn trace_sql(sql: &str) {
    trace!(target: "tile_cache::sql", "{}", sql);
}
