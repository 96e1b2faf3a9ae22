//! # riverstat Common Library
//!
//! Shared code for the riverstat detection statistics service:
//! - Detection, aggregate, bucket and log entry models
//! - Fold arithmetic and the throughput-rate estimator
//! - Stats event types (StatsEvent enum) and the EventBus
//! - Bootstrap configuration loading
//! - Error taxonomy and timestamp utilities

pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod time;

pub use error::{Error, Result};
pub use models::{
    Bucket, BucketWidth, ClassCounts, DetectionEvent, LiveAggregate, LogEntry, RawDetection,
    MAX_LOG_SIZE,
};
