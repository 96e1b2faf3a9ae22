//! In-process store
//!
//! Buckets live in a sharded map so writers to different windows never share
//! a lock; the log is an ordered index trimmed to its cap on eviction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use riverstat_common::models::LogKey;
use riverstat_common::{Bucket, BucketWidth, Error, LiveAggregate, LogEntry, Result};
use std::collections::BTreeMap;
use std::sync::RwLock;

use super::AggregateStore;

type BucketKey = (BucketWidth, i64);

/// Store that keeps every record in memory for the process lifetime
#[derive(Default)]
pub struct MemoryStore {
    live: RwLock<Option<LiveAggregate>>,
    buckets: DashMap<BucketKey, Bucket>,
    log: RwLock<BTreeMap<LogKey, LogEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn bucket_key(width: BucketWidth, window_start: DateTime<Utc>) -> BucketKey {
        (width, window_start.timestamp_millis())
    }
}

fn poisoned(what: &str) -> Error {
    Error::StorageUnavailable(format!("{} lock poisoned", what))
}

#[async_trait]
impl AggregateStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn load_live(&self) -> Result<Option<LiveAggregate>> {
        let live = self.live.read().map_err(|_| poisoned("live aggregate"))?;
        Ok(live.clone())
    }

    async fn save_live(&self, aggregate: &LiveAggregate) -> Result<()> {
        let mut live = self.live.write().map_err(|_| poisoned("live aggregate"))?;
        *live = Some(aggregate.clone());
        Ok(())
    }

    async fn load_bucket(
        &self,
        width: BucketWidth,
        window_start: DateTime<Utc>,
    ) -> Result<Option<Bucket>> {
        let key = Self::bucket_key(width, window_start);
        Ok(self.buckets.get(&key).map(|b| b.value().clone()))
    }

    async fn save_bucket(&self, width: BucketWidth, bucket: &Bucket) -> Result<()> {
        let key = Self::bucket_key(width, bucket.window_start);
        self.buckets.insert(key, bucket.clone());
        Ok(())
    }

    async fn buckets_in_range(
        &self,
        width: BucketWidth,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Bucket>> {
        if from >= to {
            return Ok(Vec::new());
        }

        let windows = ((to - from).num_milliseconds() / width.millis()) as usize;
        let mut found: Vec<Bucket> = if windows <= self.buckets.len() {
            // Short range: probe each window key
            width
                .window_starts(from, to)
                .filter(|start| *start >= from)
                .filter_map(|start| {
                    self.buckets
                        .get(&Self::bucket_key(width, start))
                        .map(|b| b.value().clone())
                })
                .collect()
        } else {
            self.buckets
                .iter()
                .filter(|e| {
                    e.key().0 == width
                        && e.value().window_start >= from
                        && e.value().window_start < to
                })
                .map(|e| e.value().clone())
                .collect()
        };

        found.sort_by_key(|b| b.window_start);
        Ok(found)
    }

    async fn delete_buckets_before(
        &self,
        width: BucketWidth,
        cutoff: DateTime<Utc>,
    ) -> Result<u64> {
        let cutoff_ms = cutoff.timestamp_millis();
        let before = self.buckets.len();
        self.buckets
            .retain(|(w, start), _| !(*w == width && *start < cutoff_ms));
        Ok(before.saturating_sub(self.buckets.len()) as u64)
    }

    async fn insert_log_entry(&self, entry: &LogEntry) -> Result<()> {
        let mut log = self.log.write().map_err(|_| poisoned("detection log"))?;
        log.insert(entry.key(), entry.clone());
        Ok(())
    }

    async fn recent_log_entries(&self, limit: usize) -> Result<Vec<LogEntry>> {
        let log = self.log.read().map_err(|_| poisoned("detection log"))?;
        Ok(log.values().rev().take(limit).cloned().collect())
    }

    async fn log_len(&self) -> Result<usize> {
        let log = self.log.read().map_err(|_| poisoned("detection log"))?;
        Ok(log.len())
    }

    async fn evict_log_beyond(&self, keep: usize) -> Result<u64> {
        let mut log = self.log.write().map_err(|_| poisoned("detection log"))?;
        let excess = log.len().saturating_sub(keep);
        for _ in 0..excess {
            log.pop_first();
        }
        Ok(excess as u64)
    }
}
