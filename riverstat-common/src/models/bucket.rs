//! Fixed-width time buckets (minute and hour rollups)

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{bump_class, mean, ClassCounts, DetectionEvent};
use crate::Error;

/// Rollup granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketWidth {
    Minute,
    Hour,
}

impl BucketWidth {
    pub fn as_str(&self) -> &'static str {
        match self {
            BucketWidth::Minute => "minute",
            BucketWidth::Hour => "hour",
        }
    }

    pub fn millis(&self) -> i64 {
        match self {
            BucketWidth::Minute => 60_000,
            BucketWidth::Hour => 3_600_000,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::milliseconds(self.millis())
    }

    /// Bucket key: the start of the window containing `ts` (UTC epoch aligned)
    pub fn truncate(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let offset = ts.timestamp_millis().rem_euclid(self.millis());
        ts - Duration::milliseconds(offset)
    }

    /// Window starts covering `[from, to)`, ascending
    ///
    /// `from` is truncated to the window containing it, so a range that begins
    /// mid-window still includes that window.
    pub fn window_starts(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> impl Iterator<Item = DateTime<Utc>> {
        let step = self.duration();
        let first = self.truncate(from);
        std::iter::successors(Some(first), move |prev| Some(*prev + step))
            .take_while(move |start| *start < to)
    }
}

impl fmt::Display for BucketWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BucketWidth {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minute" | "minutes" | "min" => Ok(BucketWidth::Minute),
            "hour" | "hours" | "h" => Ok(BucketWidth::Hour),
            other => Err(Error::Validation(format!(
                "unknown bucket width '{}' (expected minute or hour)",
                other
            ))),
        }
    }
}

/// Aggregate scoped to one fixed-width window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub window_start: DateTime<Utc>,
    pub count: u64,
    pub count_by_class: ClassCounts,
    pub confidence_sum: f64,
    pub avg_confidence: f64,
}

impl Bucket {
    /// Zero-valued bucket for a window with no events
    pub fn empty(window_start: DateTime<Utc>) -> Self {
        Self {
            window_start,
            count: 0,
            count_by_class: ClassCounts::new(),
            confidence_sum: 0.0,
            avg_confidence: 0.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Fold one event into the bucket
    ///
    /// The caller is responsible for routing the event to the bucket whose
    /// window contains its observation time.
    pub fn fold(&mut self, event: &DetectionEvent) {
        self.count += 1;
        bump_class(&mut self.count_by_class, &event.class_label);
        self.confidence_sum += event.confidence;
        self.avg_confidence = mean(self.confidence_sum, self.count);
    }

    /// Whether `ts` falls inside this bucket's window
    pub fn contains(&self, width: BucketWidth, ts: DateTime<Utc>) -> bool {
        ts >= self.window_start && ts < self.window_start + width.duration()
    }
}
