//! Read-only queries over the aggregate state
//!
//! Queries never take the writer locks and never fail for lack of data: an
//! empty store answers with the zero aggregate, zero-valued buckets and an
//! empty log.

use chrono::{DateTime, Utc};
use riverstat_common::config::MAX_SERIES_POINTS;
use riverstat_common::{Bucket, BucketWidth, Error, LiveAggregate, LogEntry, Result};
use std::sync::Arc;

use crate::detection_log::DetectionLog;
use crate::live::LiveAggregateUpdater;
use crate::rollup::RollupStore;

#[derive(Clone)]
pub struct StatsQuery {
    live: LiveAggregateUpdater,
    rollups: Arc<RollupStore>,
    log: Arc<DetectionLog>,
    max_points: usize,
}

impl StatsQuery {
    pub fn new(
        live: LiveAggregateUpdater,
        rollups: Arc<RollupStore>,
        log: Arc<DetectionLog>,
        max_points: usize,
    ) -> Self {
        Self {
            live,
            rollups,
            log,
            max_points: max_points.clamp(1, MAX_SERIES_POINTS),
        }
    }

    pub fn max_points(&self) -> usize {
        self.max_points
    }

    pub async fn live_aggregate(&self) -> Result<LiveAggregate> {
        self.live.snapshot().await
    }

    /// Buckets for every window in `[from, to)`, ascending and zero-filled
    pub async fn series(
        &self,
        width: BucketWidth,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Bucket>> {
        if from > to {
            return Err(Error::Validation(format!(
                "series range start {} is after end {}",
                from, to
            )));
        }

        let points = (to - width.truncate(from)).num_milliseconds() / width.millis();
        if points > self.max_points as i64 {
            return Err(Error::Validation(format!(
                "series range spans {} {} windows (max {})",
                points, width, self.max_points
            )));
        }

        self.rollups.range(width, from, to).await
    }

    /// The `count` most recent windows, ending with the one containing `now`
    ///
    /// `count` is clamped to `[1, max_points]`.
    pub async fn latest_series(
        &self,
        width: BucketWidth,
        count: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Bucket>> {
        let count = count.clamp(1, self.max_points);
        let to = width.truncate(now) + width.duration();
        let windows = i32::try_from(count)
            .map_err(|_| Error::Validation(format!("series count {} is too large", count)))?;
        let from = to - width.duration() * windows;
        self.rollups.range(width, from, to).await
    }

    /// Up to `limit` most recent log entries, newest first
    pub async fn recent_log(&self, limit: usize) -> Result<Vec<LogEntry>> {
        self.log.recent(limit).await
    }
}
