//! SQLite-backed store
//!
//! Timestamps are stored as epoch milliseconds and class maps as JSON text.
//! Every save is a single `INSERT OR REPLACE`, so a failed write leaves the
//! previous row in place.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use riverstat_common::models::RateWindow;
use riverstat_common::time::{from_epoch_millis, to_epoch_millis};
use riverstat_common::{Bucket, BucketWidth, ClassCounts, Error, LiveAggregate, LogEntry, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use super::AggregateStore;

/// Store persisting records to a SQLite database file
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `db_path` and ensure the schema
    pub async fn open(db_path: &Path) -> Result<Self> {
        let newly_created = !db_path.exists();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(5000));

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        if newly_created {
            info!("Initialized new database: {}", db_path.display());
        } else {
            info!("Opened existing database: {}", db_path.display());
        }

        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, creating tables if they do not exist
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        create_live_stats_table(&pool).await?;
        create_buckets_table(&pool).await?;
        create_detection_log_table(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn create_live_stats_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS live_stats (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            total_count INTEGER NOT NULL,
            count_by_class TEXT NOT NULL,
            confidence_sum REAL NOT NULL,
            confidence_count INTEGER NOT NULL,
            avg_confidence REAL NOT NULL,
            minute_window_start INTEGER,
            minute_window_count INTEGER NOT NULL,
            items_per_minute REAL NOT NULL,
            hour_window_start INTEGER,
            hour_window_count INTEGER NOT NULL,
            items_per_hour REAL NOT NULL,
            last_updated INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_buckets_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS buckets (
            width TEXT NOT NULL,
            window_start INTEGER NOT NULL,
            count INTEGER NOT NULL,
            count_by_class TEXT NOT NULL,
            confidence_sum REAL NOT NULL,
            avg_confidence REAL NOT NULL,
            PRIMARY KEY (width, window_start)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_detection_log_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS detection_log (
            id TEXT PRIMARY KEY,
            observed_at INTEGER NOT NULL,
            class_label TEXT NOT NULL,
            confidence REAL NOT NULL,
            class_id INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_detection_log_recency ON detection_log (observed_at DESC, id DESC)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

fn encode_classes(counts: &ClassCounts) -> Result<String> {
    serde_json::to_string(counts)
        .map_err(|e| Error::Internal(format!("Failed to encode class counts: {}", e)))
}

fn decode_classes(text: &str) -> Result<ClassCounts> {
    serde_json::from_str(text)
        .map_err(|e| Error::StorageUnavailable(format!("Corrupt class counts: {}", e)))
}

fn decode_millis(millis: i64, column: &str) -> Result<DateTime<Utc>> {
    from_epoch_millis(millis)
        .ok_or_else(|| Error::StorageUnavailable(format!("Invalid timestamp in {}", column)))
}

fn decode_opt_millis(millis: Option<i64>, column: &str) -> Result<Option<DateTime<Utc>>> {
    millis.map(|m| decode_millis(m, column)).transpose()
}

fn live_from_row(row: &SqliteRow) -> Result<LiveAggregate> {
    Ok(LiveAggregate {
        total_count: row.try_get::<i64, _>("total_count")? as u64,
        count_by_class: decode_classes(&row.try_get::<String, _>("count_by_class")?)?,
        confidence_sum: row.try_get("confidence_sum")?,
        confidence_count: row.try_get::<i64, _>("confidence_count")? as u64,
        avg_confidence: row.try_get("avg_confidence")?,
        minute_window: RateWindow {
            start: decode_opt_millis(row.try_get("minute_window_start")?, "minute_window_start")?,
            count: row.try_get::<i64, _>("minute_window_count")? as u64,
            rate: row.try_get("items_per_minute")?,
        },
        hour_window: RateWindow {
            start: decode_opt_millis(row.try_get("hour_window_start")?, "hour_window_start")?,
            count: row.try_get::<i64, _>("hour_window_count")? as u64,
            rate: row.try_get("items_per_hour")?,
        },
        last_updated: decode_opt_millis(row.try_get("last_updated")?, "last_updated")?,
    })
}

fn bucket_from_row(row: &SqliteRow) -> Result<Bucket> {
    Ok(Bucket {
        window_start: decode_millis(row.try_get("window_start")?, "window_start")?,
        count: row.try_get::<i64, _>("count")? as u64,
        count_by_class: decode_classes(&row.try_get::<String, _>("count_by_class")?)?,
        confidence_sum: row.try_get("confidence_sum")?,
        avg_confidence: row.try_get("avg_confidence")?,
    })
}

fn log_entry_from_row(row: &SqliteRow) -> Result<LogEntry> {
    let id: String = row.try_get("id")?;
    Ok(LogEntry {
        id: Uuid::from_str(&id)
            .map_err(|e| Error::StorageUnavailable(format!("Invalid log entry id: {}", e)))?,
        observed_at: decode_millis(row.try_get("observed_at")?, "observed_at")?,
        class_label: row.try_get("class_label")?,
        confidence: row.try_get("confidence")?,
        class_id: row.try_get::<i64, _>("class_id")? as u32,
    })
}

#[async_trait]
impl AggregateStore for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn load_live(&self) -> Result<Option<LiveAggregate>> {
        let row = sqlx::query("SELECT * FROM live_stats WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(live_from_row).transpose()
    }

    async fn save_live(&self, aggregate: &LiveAggregate) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO live_stats (
                id, total_count, count_by_class, confidence_sum, confidence_count,
                avg_confidence, minute_window_start, minute_window_count, items_per_minute,
                hour_window_start, hour_window_count, items_per_hour, last_updated
            ) VALUES (1, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(aggregate.total_count as i64)
        .bind(encode_classes(&aggregate.count_by_class)?)
        .bind(aggregate.confidence_sum)
        .bind(aggregate.confidence_count as i64)
        .bind(aggregate.avg_confidence)
        .bind(aggregate.minute_window.start.map(to_epoch_millis))
        .bind(aggregate.minute_window.count as i64)
        .bind(aggregate.minute_window.rate)
        .bind(aggregate.hour_window.start.map(to_epoch_millis))
        .bind(aggregate.hour_window.count as i64)
        .bind(aggregate.hour_window.rate)
        .bind(aggregate.last_updated.map(to_epoch_millis))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_bucket(
        &self,
        width: BucketWidth,
        window_start: DateTime<Utc>,
    ) -> Result<Option<Bucket>> {
        let row = sqlx::query("SELECT * FROM buckets WHERE width = ? AND window_start = ?")
            .bind(width.as_str())
            .bind(to_epoch_millis(window_start))
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(bucket_from_row).transpose()
    }

    async fn save_bucket(&self, width: BucketWidth, bucket: &Bucket) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO buckets (
                width, window_start, count, count_by_class, confidence_sum, avg_confidence
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(width.as_str())
        .bind(to_epoch_millis(bucket.window_start))
        .bind(bucket.count as i64)
        .bind(encode_classes(&bucket.count_by_class)?)
        .bind(bucket.confidence_sum)
        .bind(bucket.avg_confidence)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn buckets_in_range(
        &self,
        width: BucketWidth,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Bucket>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM buckets
            WHERE width = ? AND window_start >= ? AND window_start < ?
            ORDER BY window_start ASC
            "#,
        )
        .bind(width.as_str())
        .bind(to_epoch_millis(from))
        .bind(to_epoch_millis(to))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(bucket_from_row).collect()
    }

    async fn delete_buckets_before(
        &self,
        width: BucketWidth,
        cutoff: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query("DELETE FROM buckets WHERE width = ? AND window_start < ?")
            .bind(width.as_str())
            .bind(to_epoch_millis(cutoff))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_log_entry(&self, entry: &LogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO detection_log (id, observed_at, class_label, confidence, class_id)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id.hyphenated().to_string())
        .bind(to_epoch_millis(entry.observed_at))
        .bind(&entry.class_label)
        .bind(entry.confidence)
        .bind(entry.class_id as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_log_entries(&self, limit: usize) -> Result<Vec<LogEntry>> {
        let rows = sqlx::query(
            "SELECT * FROM detection_log ORDER BY observed_at DESC, id DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(log_entry_from_row).collect()
    }

    async fn log_len(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM detection_log")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn evict_log_beyond(&self, keep: usize) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM detection_log WHERE id IN (
                SELECT id FROM detection_log
                ORDER BY observed_at DESC, id DESC
                LIMIT -1 OFFSET ?
            )
            "#,
        )
        .bind(keep as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
