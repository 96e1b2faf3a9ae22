//! GET /log

use axum::extract::{Query, State};
use axum::Json;
use riverstat_common::{LogEntry, MAX_LOG_SIZE};
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LogParams {
    /// Kept as text: a non-numeric value falls back to the default
    pub limit: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LogResponse {
    pub entries: Vec<LogEntry>,
    pub count: usize,
}

/// Missing, non-numeric or zero limits mean the full log
fn effective_limit(raw: Option<&str>) -> usize {
    raw.and_then(|s| s.trim().parse::<usize>().ok())
        .filter(|n| *n > 0)
        .map_or(MAX_LOG_SIZE, |n| n.min(MAX_LOG_SIZE))
}

/// GET /log?limit=N
pub async fn recent_log(
    State(state): State<AppState>,
    Query(params): Query<LogParams>,
) -> ApiResult<Json<LogResponse>> {
    let limit = effective_limit(params.limit.as_deref());
    let entries = state.engine.query.recent_log(limit).await?;

    Ok(Json(LogResponse {
        count: entries.len(),
        entries,
    }))
}
