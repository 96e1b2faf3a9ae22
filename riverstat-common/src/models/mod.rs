//! Data model for detection statistics
//!
//! Events arrive as [`RawDetection`] payloads, are validated into immutable
//! [`DetectionEvent`]s and then folded into the [`LiveAggregate`], minute and
//! hour [`Bucket`]s, and the bounded [`LogEntry`] index.

mod aggregate;
mod bucket;
mod detection;
mod log_entry;

pub use aggregate::{LiveAggregate, RateSpec, RateWindow, HOUR_RATE, MINUTE_RATE};
pub use bucket::{Bucket, BucketWidth};
pub use detection::{BoundingBox, DetectionEvent, RawDetection};
pub use log_entry::{LogEntry, LogKey, MAX_LOG_SIZE};

use std::collections::BTreeMap;

/// Per-class detection counts keyed by class label
pub type ClassCounts = BTreeMap<String, u64>;

/// Increment the count for `label`, creating the entry on first sight
pub(crate) fn bump_class(counts: &mut ClassCounts, label: &str) {
    *counts.entry(label.to_string()).or_insert(0) += 1;
}

/// Mean confidence, 0.0 for an empty tally
pub(crate) fn mean(sum: f64, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
