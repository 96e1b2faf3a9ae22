//! POST /ingest

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct RejectedDetection {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct PendingDetection {
    pub index: usize,
    pub id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    /// True only when every detection was accepted
    pub success: bool,
    pub accepted: Vec<Uuid>,
    pub rejected: Vec<RejectedDetection>,
    /// Still being applied when the batch deadline passed
    pub pending: Vec<PendingDetection>,
    pub timestamp: DateTime<Utc>,
}

/// POST /ingest
///
/// Body: `{ "detections": [ {x, y, w, h, score, class_id, class_name, timestamp}, ... ] }`.
/// Partial success is a 200 with the failures listed in `rejected`.
pub async fn ingest_detections(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<IngestResponse>> {
    let Json(body) = body?;

    let detections = match body.get("detections") {
        Some(Value::Array(items)) if !items.is_empty() => items.clone(),
        Some(Value::Array(_)) => {
            return Err(ApiError::BadRequest("detections must not be empty".to_string()))
        }
        Some(_) => {
            return Err(ApiError::BadRequest("detections must be an array".to_string()))
        }
        None => return Err(ApiError::BadRequest("detections is required".to_string())),
    };

    let report = state.engine.ingestor.ingest_json(detections).await?;

    Ok(Json(IngestResponse {
        success: report.all_accepted(),
        accepted: report.accepted_ids(),
        rejected: report
            .rejected()
            .into_iter()
            .map(|(index, reason)| RejectedDetection { index, reason })
            .collect(),
        pending: report
            .pending()
            .into_iter()
            .map(|(index, id)| PendingDetection { index, id })
            .collect(),
        timestamp: report.timestamp,
    }))
}
