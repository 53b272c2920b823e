//! Schema Bootstrap Module
//!
//! Opens the backing database and makes sure both cache tables exist.

use std::fs;
use std::path::Path;

use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::error::Result;

// == Table Names ==
pub(crate) const INDEX_TABLE: &str = "cache_index";
pub(crate) const RECORD_TABLE: &str = "cache_records";

const CREATE_INDEX_TABLE: &str = "
    CREATE TABLE cache_index (
        id   INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
        name TEXT NOT NULL
    );
    CREATE UNIQUE INDEX idx_cache_index_name ON cache_index (name ASC);
";

const CREATE_RECORD_TABLE: &str = "
    CREATE TABLE cache_records (
        record_id     INTEGER REFERENCES cache_index (id) ON DELETE CASCADE ON UPDATE CASCADE,
        timestamp     INTEGER NOT NULL,
        data          BLOB NOT NULL,
        last_modified INTEGER
    );
    CREATE UNIQUE INDEX idx_cache_records_record_id ON cache_records (record_id ASC);
";

/// Speed over durability: a lost cache is refetched, not corrupted state.
const PERFORMANCE_PRAGMAS: [(&str, &str); 4] = [
    ("synchronous", "OFF"),
    ("count_changes", "OFF"),
    ("journal_mode", "MEMORY"),
    ("temp_store", "MEMORY"),
];

// == Open ==
/// Opens (or creates) the database at `path` and bootstraps the schema.
///
/// The parent directory is created when missing.
pub(crate) fn open_or_create(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(dir)?;
            debug!(dir = %dir.display(), "created cache directory");
        }
    }

    let conn = Connection::open(path)?;
    info!(path = %path.display(), "opened cache database");
    bootstrap(&conn)?;
    Ok(conn)
}

// == Bootstrap ==
/// Creates the index and record tables if absent and applies pragmas.
///
/// Existence is checked through table introspection, so running this against
/// an initialized database is a no-op apart from the pragmas.
pub fn bootstrap(conn: &Connection) -> Result<()> {
    // Cascading deletes depend on this; not optional.
    apply_pragma(conn, "foreign_keys", "ON")?;

    if !table_exists(conn, INDEX_TABLE)? {
        create(conn, CREATE_INDEX_TABLE)?;
        info!(table = INDEX_TABLE, "created table");
    }

    if !table_exists(conn, RECORD_TABLE)? {
        create(conn, CREATE_RECORD_TABLE)?;
        info!(table = RECORD_TABLE, "created table");
    }

    for (name, value) in PERFORMANCE_PRAGMAS {
        if let Err(e) = apply_pragma(conn, name, value) {
            warn!(pragma = name, value, error = %e, "failed to apply pragma");
        }
    }

    Ok(())
}

/// Returns true if `table` has at least one column.
pub(crate) fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let columns: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1)",
        [table],
        |row| row.get(0),
    )?;
    Ok(columns > 0)
}

fn create(conn: &Connection, ddl: &str) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(ddl)?;
    tx.commit()?;
    Ok(())
}

/// Some pragmas answer with a row (journal_mode), so drain instead of `execute`.
fn apply_pragma(conn: &Connection, name: &str, value: &str) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare(&format!("PRAGMA {name} = {value}"))?;
    let mut rows = stmt.query([])?;
    while rows.next()?.is_some() {}
    Ok(())
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_bootstrap_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(!table_exists(&conn, INDEX_TABLE).unwrap());
        assert!(!table_exists(&conn, RECORD_TABLE).unwrap());

        bootstrap(&conn).unwrap();

        assert!(table_exists(&conn, INDEX_TABLE).unwrap());
        assert!(table_exists(&conn, RECORD_TABLE).unwrap());
    }

    #[test]
    fn test_bootstrap_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        bootstrap(&conn).unwrap();
        conn.execute("INSERT INTO cache_index (name) VALUES ('kept')", [])
            .unwrap();

        bootstrap(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM cache_index", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_bootstrap_enables_foreign_keys() {
        let conn = Connection::open_in_memory().unwrap();
        bootstrap(&conn).unwrap();

        let enabled: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[test]
    fn test_unique_name_index() {
        let conn = Connection::open_in_memory().unwrap();
        bootstrap(&conn).unwrap();

        conn.execute("INSERT INTO cache_index (name) VALUES ('dup')", [])
            .unwrap();
        let second = conn.execute("INSERT INTO cache_index (name) VALUES ('dup')", []);
        assert!(second.is_err());
    }

    #[test]
    fn test_open_or_create_makes_directory() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("cache").join("test.db");

        let conn = open_or_create(&path).unwrap();

        assert!(path.exists());
        assert!(table_exists(&conn, INDEX_TABLE).unwrap());
    }

    #[test]
    fn test_reopen_keeps_data() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("test.db");

        {
            let conn = open_or_create(&path).unwrap();
            conn.execute("INSERT INTO cache_index (name) VALUES ('a')", [])
                .unwrap();
        }

        let conn = open_or_create(&path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM cache_index", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
