//! Eviction Module
//!
//! FIFO pruning of the oldest records.

use rusqlite::{params, Connection};
use tracing::info;

use crate::cache::RecordStore;
use crate::error::Result;

// == Prune ==
/// Deletes the oldest records until at most `max_records` remain.
///
/// Oldest means smallest `timestamp`, then smallest `record_id`. The owning
/// index entries are removed as well so evicted keys stop resolving.
///
/// Returns the number of records removed.
pub fn prune(conn: &Connection, max_records: u32) -> Result<usize> {
    let count = RecordStore::new(conn).count()?;
    let max_records = u64::from(max_records);
    if count <= max_records {
        return Ok(0);
    }
    let to_delete = count - max_records;

    let tx = conn.unchecked_transaction()?;
    let removed = tx.execute(
        "DELETE FROM cache_index WHERE id IN (
             SELECT record_id FROM cache_records
             ORDER BY timestamp ASC, record_id ASC
             LIMIT ?1
         )",
        params![to_delete as i64],
    )?;
    tx.commit()?;

    info!(count, removed, max_records, "pruned cache");
    Ok(removed)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::schema::bootstrap;
    use crate::cache::{KeyIndex, Record};

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        bootstrap(&conn).unwrap();
        conn
    }

    fn insert(conn: &Connection, key: &str, timestamp: i64) {
        let id = KeyIndex::new(conn).create_if_absent(key).unwrap();
        RecordStore::new(conn)
            .write(&Record {
                record_id: id,
                timestamp,
                data: key.as_bytes().to_vec(),
                last_modified: None,
            })
            .unwrap();
    }

    #[test]
    fn test_prune_under_limit_is_noop() {
        let conn = setup();
        insert(&conn, "a", 1);
        insert(&conn, "b", 2);

        assert_eq!(prune(&conn, 5).unwrap(), 0);
        assert_eq!(RecordStore::new(&conn).count().unwrap(), 2);
    }

    #[test]
    fn test_prune_at_limit_is_noop() {
        let conn = setup();
        insert(&conn, "a", 1);
        insert(&conn, "b", 2);

        assert_eq!(prune(&conn, 2).unwrap(), 0);
    }

    #[test]
    fn test_prune_removes_oldest_first() {
        let conn = setup();
        // Insert out of timestamp order to prove ordering is by timestamp
        insert(&conn, "c", 30);
        insert(&conn, "a", 10);
        insert(&conn, "d", 40);
        insert(&conn, "b", 20);

        assert_eq!(prune(&conn, 2).unwrap(), 2);

        let index = KeyIndex::new(&conn);
        assert!(!index.exists("a").unwrap());
        assert!(!index.exists("b").unwrap());
        assert!(index.exists("c").unwrap());
        assert!(index.exists("d").unwrap());
        assert_eq!(RecordStore::new(&conn).count().unwrap(), 2);
    }

    #[test]
    fn test_prune_ties_break_by_id() {
        let conn = setup();
        insert(&conn, "first", 5);
        insert(&conn, "second", 5);
        insert(&conn, "third", 5);

        assert_eq!(prune(&conn, 1).unwrap(), 2);

        let index = KeyIndex::new(&conn);
        assert!(!index.exists("first").unwrap());
        assert!(!index.exists("second").unwrap());
        assert!(index.exists("third").unwrap());
    }

    #[test]
    fn test_prune_to_zero() {
        let conn = setup();
        insert(&conn, "a", 1);
        insert(&conn, "b", 2);

        assert_eq!(prune(&conn, 0).unwrap(), 2);
        assert_eq!(RecordStore::new(&conn).count().unwrap(), 0);
    }
}
