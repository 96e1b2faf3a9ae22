//! Health check and build info endpoints

use axum::{extract::State, Json};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", or "degraded" when the store does not answer
    pub status: String,
    pub module: String,
    pub version: String,
    pub uptime_seconds: u64,
    /// Storage backend name
    pub storage: String,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let status = match state.engine.store.ping().await {
        Ok(()) => "ok",
        Err(e) => {
            tracing::warn!(error = %e, "Health check: store ping failed");
            "degraded"
        }
    };

    Json(HealthResponse {
        status: status.to_string(),
        module: "riverstat-agg".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        storage: state.engine.store.backend().to_string(),
    })
}

/// Build information response
#[derive(Debug, Serialize)]
pub struct BuildInfo {
    pub version: String,
    pub git_hash: String,
    pub build_timestamp: String,
    pub build_profile: String,
}

/// GET /build_info
pub async fn build_info() -> Json<BuildInfo> {
    Json(BuildInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("GIT_HASH").to_string(),
        build_timestamp: env!("BUILD_TIMESTAMP").to_string(),
        build_profile: env!("BUILD_PROFILE").to_string(),
    })
}
