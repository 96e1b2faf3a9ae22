//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert a timestamp to epoch milliseconds (storage representation)
pub fn to_epoch_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

/// Convert epoch milliseconds back to a timestamp
///
/// Returns `None` when the value is outside chrono's representable range.
pub fn from_epoch_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}
