//! Live aggregate and time-series endpoints

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use riverstat_common::time;
use riverstat_common::{Bucket, BucketWidth, ClassCounts, LiveAggregate};
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::AppState;

/// Dashboard view of the live aggregate
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentStats {
    pub total_items: u64,
    pub items_per_minute: f64,
    pub items_per_hour: f64,
    pub avg_confidence: f64,
    pub by_type: ClassCounts,
    pub last_updated: Option<DateTime<Utc>>,
    /// Same value as `items_per_minute`
    pub detection_rate: f64,
}

impl From<LiveAggregate> for CurrentStats {
    fn from(agg: LiveAggregate) -> Self {
        Self {
            total_items: agg.total_count,
            items_per_minute: agg.items_per_minute(),
            items_per_hour: agg.items_per_hour(),
            avg_confidence: agg.avg_confidence,
            detection_rate: agg.items_per_minute(),
            last_updated: agg.last_updated,
            by_type: agg.count_by_class,
        }
    }
}

/// GET /stats/current
pub async fn current_stats(State(state): State<AppState>) -> ApiResult<Json<CurrentStats>> {
    let aggregate = state.engine.query.live_aggregate().await?;
    Ok(Json(aggregate.into()))
}

#[derive(Debug, Deserialize)]
pub struct SeriesParams {
    pub width: Option<String>,
    pub count: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesPoint {
    pub window_start: DateTime<Utc>,
    pub count: u64,
    pub by_type: ClassCounts,
    pub avg_confidence: f64,
}

impl From<Bucket> for SeriesPoint {
    fn from(bucket: Bucket) -> Self {
        Self {
            window_start: bucket.window_start,
            count: bucket.count,
            by_type: bucket.count_by_class,
            avg_confidence: bucket.avg_confidence,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SeriesResponse {
    pub width: BucketWidth,
    pub series: Vec<SeriesPoint>,
}

fn default_count(width: BucketWidth) -> usize {
    match width {
        BucketWidth::Minute => 60,
        BucketWidth::Hour => 24,
    }
}

/// GET /stats/series?width={minute|hour}&count=N
///
/// Exactly `count` points (clamped to the configured maximum), ending with
/// the window containing the current time.
pub async fn stats_series(
    State(state): State<AppState>,
    params: Result<Query<SeriesParams>, QueryRejection>,
) -> ApiResult<Json<SeriesResponse>> {
    let Query(params) = params?;

    let width = match params.width.as_deref() {
        Some(w) => w.parse::<BucketWidth>()?,
        None => BucketWidth::Minute,
    };
    let count = params.count.unwrap_or_else(|| default_count(width));

    let buckets = state
        .engine
        .query
        .latest_series(width, count, time::now())
        .await?;

    Ok(Json(SeriesResponse {
        width,
        series: buckets.into_iter().map(SeriesPoint::from).collect(),
    }))
}
