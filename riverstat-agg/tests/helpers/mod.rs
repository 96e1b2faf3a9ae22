//! Shared test helpers: engine setup and store wrappers with injected faults

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use chrono::{DateTime, Utc};
use riverstat_agg::store::{AggregateStore, MemoryStore};
use riverstat_agg::{build_router, AppState, StatsEngine};
use riverstat_common::config::TomlConfig;
use riverstat_common::{Bucket, BucketWidth, Error, LiveAggregate, LogEntry, Result};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// Config with short retry backoff so failure tests stay fast
pub fn test_config() -> TomlConfig {
    let mut config = TomlConfig::default();
    config.ingest.retry_backoff_ms = 1;
    config.ingest.lock_timeout_ms = 500;
    config.retention.enabled = false;
    config
}

pub fn engine_with(store: Arc<dyn AggregateStore>, config: &TomlConfig) -> StatsEngine {
    StatsEngine::new(store, config)
}

pub fn memory_engine() -> StatsEngine {
    engine_with(Arc::new(MemoryStore::new()), &test_config())
}

pub fn app_for(engine: StatsEngine) -> axum::Router {
    build_router(AppState::new(engine))
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

fn take_failure(remaining: &AtomicU32) -> bool {
    remaining
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn injected(what: &str) -> Error {
    Error::StorageUnavailable(format!("injected {} failure", what))
}

/// Memory store whose writes fail a configurable number of times
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub live_save_failures: AtomicU32,
    pub bucket_save_failures: AtomicU32,
    pub log_insert_failures: AtomicU32,
    pub evictions_fail: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AggregateStore for FlakyStore {
    fn backend(&self) -> &'static str {
        "flaky"
    }

    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }

    async fn load_live(&self) -> Result<Option<LiveAggregate>> {
        self.inner.load_live().await
    }

    async fn save_live(&self, aggregate: &LiveAggregate) -> Result<()> {
        if take_failure(&self.live_save_failures) {
            return Err(injected("live save"));
        }
        self.inner.save_live(aggregate).await
    }

    async fn load_bucket(&self, width: BucketWidth, window_start: DateTime<Utc>) -> Result<Option<Bucket>> {
        self.inner.load_bucket(width, window_start).await
    }

    async fn save_bucket(&self, width: BucketWidth, bucket: &Bucket) -> Result<()> {
        if take_failure(&self.bucket_save_failures) {
            return Err(injected("bucket save"));
        }
        self.inner.save_bucket(width, bucket).await
    }

    async fn buckets_in_range(
        &self,
        width: BucketWidth,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Bucket>> {
        self.inner.buckets_in_range(width, from, to).await
    }

    async fn delete_buckets_before(&self, width: BucketWidth, cutoff: DateTime<Utc>) -> Result<u64> {
        self.inner.delete_buckets_before(width, cutoff).await
    }

    async fn insert_log_entry(&self, entry: &LogEntry) -> Result<()> {
        if take_failure(&self.log_insert_failures) {
            return Err(injected("log insert"));
        }
        self.inner.insert_log_entry(entry).await
    }

    async fn recent_log_entries(&self, limit: usize) -> Result<Vec<LogEntry>> {
        self.inner.recent_log_entries(limit).await
    }

    async fn log_len(&self) -> Result<usize> {
        self.inner.log_len().await
    }

    async fn evict_log_beyond(&self, keep: usize) -> Result<u64> {
        if self.evictions_fail.load(Ordering::SeqCst) {
            return Err(injected("eviction"));
        }
        self.inner.evict_log_beyond(keep).await
    }
}

/// Memory store with artificial latency
///
/// `delay` is slept before every live aggregate save and `insert_delay`
/// before every log insert. `evict_delay` is slept after a log eviction has
/// already trimmed, like a slow commit.
pub struct SlowStore {
    pub inner: MemoryStore,
    pub delay: Duration,
    pub insert_delay: Duration,
    pub evict_delay: Duration,
}

impl SlowStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MemoryStore::new(),
            delay,
            insert_delay: Duration::ZERO,
            evict_delay: Duration::ZERO,
        }
    }

    pub fn slow_eviction(evict_delay: Duration) -> Self {
        Self {
            evict_delay,
            ..Self::new(Duration::ZERO)
        }
    }

    pub fn slow_log_inserts(insert_delay: Duration) -> Self {
        Self {
            insert_delay,
            ..Self::new(Duration::ZERO)
        }
    }
}

#[async_trait]
impl AggregateStore for SlowStore {
    fn backend(&self) -> &'static str {
        "slow"
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn load_live(&self) -> Result<Option<LiveAggregate>> {
        self.inner.load_live().await
    }

    async fn save_live(&self, aggregate: &LiveAggregate) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.save_live(aggregate).await
    }

    async fn load_bucket(&self, width: BucketWidth, window_start: DateTime<Utc>) -> Result<Option<Bucket>> {
        self.inner.load_bucket(width, window_start).await
    }

    async fn save_bucket(&self, width: BucketWidth, bucket: &Bucket) -> Result<()> {
        self.inner.save_bucket(width, bucket).await
    }

    async fn buckets_in_range(
        &self,
        width: BucketWidth,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Bucket>> {
        self.inner.buckets_in_range(width, from, to).await
    }

    async fn delete_buckets_before(&self, width: BucketWidth, cutoff: DateTime<Utc>) -> Result<u64> {
        self.inner.delete_buckets_before(width, cutoff).await
    }

    async fn insert_log_entry(&self, entry: &LogEntry) -> Result<()> {
        tokio::time::sleep(self.insert_delay).await;
        self.inner.insert_log_entry(entry).await
    }

    async fn recent_log_entries(&self, limit: usize) -> Result<Vec<LogEntry>> {
        self.inner.recent_log_entries(limit).await
    }

    async fn log_len(&self) -> Result<usize> {
        self.inner.log_len().await
    }

    async fn evict_log_beyond(&self, keep: usize) -> Result<u64> {
        let removed = self.inner.evict_log_beyond(keep).await?;
        tokio::time::sleep(self.evict_delay).await;
        Ok(removed)
    }
}
