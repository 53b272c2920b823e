//! Key Index Module
//!
//! Maps cache keys to stable surrogate record ids.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::error::{CacheError, Result};

// == Key Index ==
/// View over the index table of an open connection.
#[derive(Debug, Clone, Copy)]
pub struct KeyIndex<'c> {
    conn: &'c Connection,
}

impl<'c> KeyIndex<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    // == Resolve ==
    /// Returns the id assigned to `name`, if any.
    pub fn resolve(&self, name: &str) -> Result<Option<i64>> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM cache_index WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    // == Exists ==
    /// Returns true if `name` has an index entry.
    pub fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.resolve(name)?.is_some())
    }

    // == Create If Absent ==
    /// Returns the id for `name`, inserting a new index entry when missing.
    ///
    /// The re-check and insert run inside one transaction; the caller must
    /// hold the connection exclusively for the duration of the call.
    pub fn create_if_absent(&self, name: &str) -> Result<i64> {
        let tx = self.conn.unchecked_transaction()?;

        if let Some(id) = self.resolve(name)? {
            return Ok(id);
        }

        let affected = tx.execute("INSERT INTO cache_index (name) VALUES (?1)", params![name])?;
        CacheError::expect_rows("insert index entry", 1, affected)?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        debug!(key = name, id, "created index entry");
        Ok(id)
    }

    // == Delete ==
    /// Removes the index entry for `name`; its record goes with it.
    ///
    /// Returns true if an entry was removed.
    pub fn delete(&self, name: &str) -> Result<bool> {
        match self.resolve(name)? {
            Some(id) => self.delete_id(id),
            None => Ok(false),
        }
    }

    // == Delete By Id ==
    /// Removes the index entry with the given id.
    pub fn delete_id(&self, id: i64) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM cache_index WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }
}
