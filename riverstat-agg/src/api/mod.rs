//! HTTP API handlers for riverstat-agg

pub mod health;
pub mod ingest;
pub mod log;
pub mod sse;
pub mod stats;

use axum::routing::{get, post};
use axum::Router;

use crate::AppState;

pub use health::{build_info, health_check};
pub use ingest::ingest_detections;
pub use log::recent_log;
pub use sse::event_stream;
pub use stats::{current_stats, stats_series};

/// Ingest and read routes
pub fn stats_routes() -> Router<AppState> {
    Router::new()
        .route("/ingest", post(ingest_detections))
        .route("/stats/current", get(current_stats))
        .route("/stats/series", get(stats_series))
        .route("/log", get(recent_log))
}

/// Health, build info and event stream routes
pub fn service_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/build_info", get(build_info))
        .route("/events", get(event_stream))
}
