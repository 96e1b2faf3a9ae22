//! Live running aggregate and the resetting-window rate estimator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{bump_class, mean, ClassCounts, DetectionEvent};

/// Window width and divisor floor for one throughput estimator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateSpec {
    /// Window width in seconds; the rate is expressed per window
    pub width_secs: f64,
    /// Smallest elapsed fraction used as divisor while the window is open
    pub divisor_floor: f64,
}

/// Items-per-minute estimator
pub const MINUTE_RATE: RateSpec = RateSpec {
    width_secs: 60.0,
    divisor_floor: 0.1,
};

/// Items-per-hour estimator
pub const HOUR_RATE: RateSpec = RateSpec {
    width_secs: 3600.0,
    divisor_floor: 0.01,
};

/// State of one resetting rate window
///
/// The window opens at the first observation. While less than one window
/// width has elapsed, the rate is the running count over the elapsed
/// fraction (floored); once a full width has elapsed, the rate is fixed from
/// the closed window and a new window opens at the current observation.
/// This is an instantaneous, intentionally spiky estimate, not a moving
/// average.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateWindow {
    pub start: Option<DateTime<Utc>>,
    pub count: u64,
    pub rate: f64,
}

impl RateWindow {
    /// Record one observation at `at`
    pub fn observe(&mut self, at: DateTime<Utc>, spec: RateSpec) {
        let Some(start) = self.start else {
            self.start = Some(at);
            self.count = 1;
            return;
        };

        let elapsed = (at - start).num_milliseconds() as f64 / (spec.width_secs * 1000.0);
        if elapsed >= 1.0 {
            self.rate = self.count as f64 / elapsed;
            self.start = Some(at);
            self.count = 1;
        } else {
            self.count += 1;
            self.rate = self.count as f64 / elapsed.max(spec.divisor_floor);
        }
    }
}

/// The single process-wide running total of detection statistics
///
/// Mutated only through [`LiveAggregate::apply`]; callers that share one
/// instance must serialize calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveAggregate {
    pub total_count: u64,
    pub count_by_class: ClassCounts,
    pub confidence_sum: f64,
    pub confidence_count: u64,
    pub avg_confidence: f64,
    pub minute_window: RateWindow,
    pub hour_window: RateWindow,
    pub last_updated: Option<DateTime<Utc>>,
}

impl LiveAggregate {
    /// Fold one event into the aggregate
    ///
    /// Rate windows advance on the event's observation time; `now` only
    /// stamps `last_updated`.
    pub fn apply(&mut self, event: &DetectionEvent, now: DateTime<Utc>) {
        self.total_count += 1;
        bump_class(&mut self.count_by_class, &event.class_label);
        self.confidence_sum += event.confidence;
        self.confidence_count += 1;
        self.avg_confidence = mean(self.confidence_sum, self.confidence_count);

        self.minute_window.observe(event.observed_at, MINUTE_RATE);
        self.hour_window.observe(event.observed_at, HOUR_RATE);

        self.last_updated = Some(now);
    }

    pub fn items_per_minute(&self) -> f64 {
        self.minute_window.rate
    }

    pub fn items_per_hour(&self) -> f64 {
        self.hour_window.rate
    }

    /// `total_count` equals the sum of the per-class counts
    pub fn is_consistent(&self) -> bool {
        self.total_count == self.count_by_class.values().sum::<u64>()
    }
}
