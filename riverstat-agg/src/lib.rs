//! riverstat-agg library interface
//!
//! Aggregation engine for detection statistics: a live running aggregate,
//! minute and hour rollups, and a bounded recency log, served over HTTP.

pub mod api;
pub mod detection_log;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod keyed_lock;
pub mod live;
pub mod query;
pub mod retention;
pub mod retry;
pub mod rollup;
pub mod store;

pub use crate::engine::StatsEngine;
pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: StatsEngine,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(engine: StatsEngine) -> Self {
        Self {
            engine,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::stats_routes())
        .merge(api::service_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
