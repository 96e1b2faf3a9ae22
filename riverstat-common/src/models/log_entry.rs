//! Recency log entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::DetectionEvent;

/// Retention cap of the detection log
pub const MAX_LOG_SIZE: usize = 500;

/// One detection kept for recency display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: Uuid,
    pub observed_at: DateTime<Utc>,
    pub class_label: String,
    pub confidence: f64,
    pub class_id: u32,
}

impl LogEntry {
    pub fn key(&self) -> LogKey {
        LogKey {
            observed_at: self.observed_at,
            id: self.id,
        }
    }
}

impl From<&DetectionEvent> for LogEntry {
    fn from(event: &DetectionEvent) -> Self {
        Self {
            id: event.id,
            observed_at: event.observed_at,
            class_label: event.class_label.clone(),
            confidence: event.confidence,
            class_id: event.class_id,
        }
    }
}

/// Log ordering key
///
/// Sorts ascending by observation time, then id. Recency order is the
/// reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogKey {
    pub observed_at: DateTime<Utc>,
    pub id: Uuid,
}
