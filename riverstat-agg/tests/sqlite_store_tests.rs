//! SQLite store behaviour, mirroring the in-memory store contract

mod helpers;

use chrono::Duration;
use helpers::{engine_with, t0, test_config};
use riverstat_agg::store::{AggregateStore, SqliteStore};
use riverstat_common::{Bucket, BucketWidth, DetectionEvent, LiveAggregate, LogEntry, RawDetection};
use std::sync::Arc;
use tempfile::TempDir;

async fn open_store(dir: &TempDir) -> SqliteStore {
    SqliteStore::open(&dir.path().join("riverstat.db"))
        .await
        .expect("Should open test database")
}

#[tokio::test]
async fn test_open_creates_database_in_missing_directory() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested/data/riverstat.db");

    let store = SqliteStore::open(&path).await.unwrap();
    store.ping().await.unwrap();
    assert!(path.exists());
    assert_eq!(store.backend(), "sqlite");
}

#[tokio::test]
async fn test_live_aggregate_round_trip() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    assert!(store.load_live().await.unwrap().is_none());

    let mut aggregate = LiveAggregate::default();
    aggregate.apply(&DetectionEvent::new("PET", 0.9, t0()).unwrap(), t0());
    aggregate.apply(&DetectionEvent::new("HDPE", 0.7, t0() + Duration::seconds(3)).unwrap(), t0());
    store.save_live(&aggregate).await.unwrap();

    let loaded = store.load_live().await.unwrap().unwrap();
    assert_eq!(loaded, aggregate);
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let store = open_store(&dir).await;
        let mut bucket = Bucket::empty(t0());
        bucket.fold(&DetectionEvent::new("PP", 0.4, t0()).unwrap());
        store.save_bucket(BucketWidth::Hour, &bucket).await.unwrap();
        store.pool().close().await;
    }

    let store = open_store(&dir).await;
    let bucket = store.load_bucket(BucketWidth::Hour, t0()).await.unwrap().unwrap();
    assert_eq!(bucket.count, 1);
    assert_eq!(bucket.count_by_class.get("PP"), Some(&1));
    assert!(store.load_bucket(BucketWidth::Minute, t0()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_bucket_range_and_delete() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    for minutes in [0, 1, 2, 5] {
        store
            .save_bucket(BucketWidth::Minute, &Bucket::empty(t0() + Duration::minutes(minutes)))
            .await
            .unwrap();
    }

    let found = store
        .buckets_in_range(BucketWidth::Minute, t0() + Duration::minutes(1), t0() + Duration::minutes(5))
        .await
        .unwrap();
    let starts: Vec<_> = found.iter().map(|b| b.window_start).collect();
    assert_eq!(starts, vec![t0() + Duration::minutes(1), t0() + Duration::minutes(2)]);

    let removed = store
        .delete_buckets_before(BucketWidth::Minute, t0() + Duration::minutes(2))
        .await
        .unwrap();
    assert_eq!(removed, 2);
}

#[tokio::test]
async fn test_log_eviction_keeps_most_recent() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let mut ids = Vec::new();
    for secs in 0..10 {
        let entry = LogEntry::from(&DetectionEvent::new("PET", 0.5, t0() + Duration::seconds(secs)).unwrap());
        ids.push(entry.id);
        store.insert_log_entry(&entry).await.unwrap();
    }

    assert_eq!(store.evict_log_beyond(4).await.unwrap(), 6);
    assert_eq!(store.log_len().await.unwrap(), 4);

    let recent: Vec<_> = store
        .recent_log_entries(100)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();
    let expected: Vec<_> = ids.iter().rev().take(4).cloned().collect();
    assert_eq!(recent, expected);
}

#[tokio::test]
async fn test_engine_over_sqlite() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(open_store(&dir).await);
    let engine = engine_with(store, &test_config());

    let batch: Vec<RawDetection> = ["PET", "PET", "HDPE"]
        .iter()
        .zip([0.9, 0.8, 0.7])
        .map(|(label, score)| RawDetection {
            score: Some(score),
            class_name: Some(label.to_string()),
            timestamp: Some(t0() + Duration::seconds(10)),
            ..Default::default()
        })
        .collect();

    let report = engine.ingestor.ingest(batch).await.unwrap();
    assert!(report.all_accepted());

    let live = engine.query.live_aggregate().await.unwrap();
    assert_eq!(live.total_count, 3);
    assert_eq!(live.count_by_class.get("PET"), Some(&2));
    assert!((live.avg_confidence - 0.8).abs() < 1e-9);

    let series = engine
        .query
        .series(BucketWidth::Minute, t0(), t0() + Duration::minutes(2))
        .await
        .unwrap();
    let counts: Vec<u64> = series.iter().map(|b| b.count).collect();
    assert_eq!(counts, vec![3, 0]);

    assert_eq!(engine.query.recent_log(500).await.unwrap().len(), 3);
}
