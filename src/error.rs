//! Error types for the cache engine
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache engine.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Filesystem failure (cache directory, backing file)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Storage backend failure
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A write touched a different number of rows than expected
    #[error("{operation}: expected {expected} row(s) affected, got {affected}")]
    UnexpectedRowCount {
        operation: &'static str,
        expected: usize,
        affected: usize,
    },

    /// The cache was cleared and has not been re-initialized
    #[error("Cache is not initialized")]
    NotInitialized,
}

impl CacheError {
    /// Checks an affected-row count, returning `UnexpectedRowCount` on mismatch.
    pub(crate) fn expect_rows(operation: &'static str, expected: usize, affected: usize) -> Result<()> {
        if affected == expected {
            Ok(())
        } else {
            Err(CacheError::UnexpectedRowCount {
                operation,
                expected,
                affected,
            })
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache engine.
pub type Result<T> = std::result::Result<T, CacheError>;
