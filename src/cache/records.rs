//! Record Store Module
//!
//! Stores payloads and timestamps keyed by index id.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{CacheError, Result};

// == Record ==
/// A row of the record table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Id of the owning index entry
    pub record_id: i64,
    /// Write time (Unix seconds); eviction order
    pub timestamp: i64,
    /// Stored payload
    pub data: Vec<u8>,
    /// External modification time (Unix seconds)
    pub last_modified: Option<i64>,
}

// == Record Store ==
/// View over the record table of an open connection.
#[derive(Debug, Clone, Copy)]
pub struct RecordStore<'c> {
    conn: &'c Connection,
}

impl<'c> RecordStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    // == Write ==
    /// Inserts or replaces the record for `record.record_id`.
    ///
    /// Fails with `UnexpectedRowCount` unless exactly one row was written.
    pub fn write(&self, record: &Record) -> Result<()> {
        let affected = self.conn.execute(
            "INSERT OR REPLACE INTO cache_records (record_id, timestamp, data, last_modified)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                record.record_id,
                record.timestamp,
                record.data,
                record.last_modified
            ],
        )?;
        CacheError::expect_rows("write record", 1, affected)
    }

    // == Read ==
    /// Fetches the record for `record_id`, `None` if there is none.
    pub fn read(&self, record_id: i64) -> Result<Option<Record>> {
        let record = self
            .conn
            .query_row(
                "SELECT record_id, timestamp, data, last_modified
                 FROM cache_records WHERE record_id = ?1",
                params![record_id],
                |row| {
                    Ok(Record {
                        record_id: row.get(0)?,
                        timestamp: row.get(1)?,
                        data: row.get(2)?,
                        last_modified: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    // == Contains ==
    /// Returns true if a record exists for `record_id`.
    pub fn contains(&self, record_id: i64) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM cache_records WHERE record_id = ?1",
                params![record_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    // == Count ==
    /// Returns the total number of stored records.
    pub fn count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(record_id) FROM cache_records", [], |row| {
                row.get(0)
            })?;
        Ok(count.max(0) as u64)
    }
}
