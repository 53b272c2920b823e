//! Cache Item Module
//!
//! Defines the caller-facing cache item and time helpers.

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

// == Cache Item ==
/// A cached payload with its metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheItem {
    /// The cached bytes
    pub data: Vec<u8>,
    /// When the item was written to the cache (Unix seconds)
    pub added_at: i64,
    /// Caller-supplied external modification time
    pub last_modified: Option<DateTime<Utc>>,
}

impl CacheItem {
    // == Constructor ==
    /// Creates an item carrying only a payload.
    ///
    /// `added_at` is assigned by the cache when the item is stored.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            added_at: 0,
            last_modified: None,
        }
    }

    /// Sets the external modification marker.
    pub fn with_last_modified(mut self, last_modified: DateTime<Utc>) -> Self {
        self.last_modified = Some(last_modified);
        self
    }
}

// == Clock ==
/// Source of "now" for record timestamps.
pub trait Clock: Send + Sync {
    /// Current time in whole seconds since the Unix epoch.
    fn now_secs(&self) -> i64;
}

/// Wall clock backed by `SystemTime`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> i64 {
        current_timestamp_secs()
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in seconds.
///
/// Clocks set before the epoch yield negative values instead of panicking.
pub fn current_timestamp_secs() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_secs() as i64,
        Err(before) => -(before.duration().as_secs() as i64),
    }
}

/// Converts Unix seconds into a UTC timestamp, `None` if out of range.
pub fn epoch_to_datetime(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_new() {
        let item = CacheItem::new(vec![1, 2, 3]);
        assert_eq!(item.data, vec![1, 2, 3]);
        assert_eq!(item.added_at, 0);
        assert!(item.last_modified.is_none());
    }

    #[test]
    fn test_item_with_last_modified() {
        let when = Utc.with_ymd_and_hms(2020, 5, 1, 12, 0, 0).unwrap();
        let item = CacheItem::new(Vec::new()).with_last_modified(when);
        assert_eq!(item.last_modified, Some(when));
        assert!(item.data.is_empty());
    }

    #[test]
    fn test_system_clock_is_after_2020() {
        // 2020-01-01T00:00:00Z
        assert!(SystemClock.now_secs() > 1_577_836_800);
    }

    #[test]
    fn test_epoch_to_datetime() {
        let dt = epoch_to_datetime(86_400).unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(1970, 1, 2, 0, 0, 0).unwrap());
        assert_eq!(epoch_to_datetime(0).unwrap().timestamp(), 0);
    }

    #[test]
    fn test_epoch_to_datetime_out_of_range() {
        assert!(epoch_to_datetime(i64::MAX).is_none());
    }
}
