//! Storage backends for aggregate records
//!
//! The store is a plain record store: it loads and saves whole records and
//! never merges concurrent writes itself. Read-modify-write serialization is
//! the caller's job (see [`crate::keyed_lock`]); a failed save must leave the
//! previously stored record untouched.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use riverstat_common::{Bucket, BucketWidth, LiveAggregate, LogEntry, Result};

/// Record store backing the live aggregate, rollups and detection log
#[async_trait]
pub trait AggregateStore: Send + Sync {
    /// Backend name for health reporting
    fn backend(&self) -> &'static str;

    /// Verify the backend is reachable
    async fn ping(&self) -> Result<()>;

    /// Current live aggregate, `None` before the first event
    async fn load_live(&self) -> Result<Option<LiveAggregate>>;

    /// Replace the live aggregate in one write
    async fn save_live(&self, aggregate: &LiveAggregate) -> Result<()>;

    async fn load_bucket(
        &self,
        width: BucketWidth,
        window_start: DateTime<Utc>,
    ) -> Result<Option<Bucket>>;

    /// Create or replace the bucket at `bucket.window_start`
    async fn save_bucket(&self, width: BucketWidth, bucket: &Bucket) -> Result<()>;

    /// Stored buckets with `from <= window_start < to`, ascending
    async fn buckets_in_range(
        &self,
        width: BucketWidth,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Bucket>>;

    /// Delete buckets whose window starts before `cutoff`; returns count removed
    async fn delete_buckets_before(&self, width: BucketWidth, cutoff: DateTime<Utc>)
        -> Result<u64>;

    async fn insert_log_entry(&self, entry: &LogEntry) -> Result<()>;

    /// Most recent entries by `(observed_at, id)` descending
    async fn recent_log_entries(&self, limit: usize) -> Result<Vec<LogEntry>>;

    async fn log_len(&self) -> Result<usize>;

    /// Delete every entry ranked beyond `keep` in recency order; returns count removed
    async fn evict_log_beyond(&self, keep: usize) -> Result<u64>;
}
