//! Stats event types and the EventBus
//!
//! Writers emit a [`StatsEvent`] after every committed mutation; dashboards
//! subscribe (typically over SSE) instead of polling the read endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{Bucket, BucketWidth, LiveAggregate, LogEntry};

/// riverstat event types
///
/// Events are broadcast via [`EventBus`] and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StatsEvent {
    /// Live aggregate committed a new snapshot
    LiveStatsUpdated {
        snapshot: LiveAggregate,
        timestamp: DateTime<Utc>,
    },

    /// A minute or hour bucket was created or updated
    BucketUpdated {
        width: BucketWidth,
        bucket: Bucket,
        timestamp: DateTime<Utc>,
    },

    /// A detection was appended to the recency log
    DetectionLogged {
        entry: LogEntry,
        timestamp: DateTime<Utc>,
    },

    /// Eviction sweep removed entries beyond the log cap
    LogEvicted {
        removed: u64,
        timestamp: DateTime<Utc>,
    },

    /// An ingest batch finished (successfully or not)
    BatchIngested {
        accepted: Vec<Uuid>,
        rejected: usize,
        pending: usize,
        timestamp: DateTime<Utc>,
    },
}

impl StatsEvent {
    /// SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            StatsEvent::LiveStatsUpdated { .. } => "LiveStatsUpdated",
            StatsEvent::BucketUpdated { .. } => "BucketUpdated",
            StatsEvent::DetectionLogged { .. } => "DetectionLogged",
            StatsEvent::LogEvicted { .. } => "LogEvicted",
            StatsEvent::BatchIngested { .. } => "BatchIngested",
        }
    }
}

/// Broadcast channel for [`StatsEvent`]s
///
/// Cloning is cheap; all clones share one channel. Slow subscribers lose the
/// oldest events once `capacity` is exceeded.
///
/// # Examples
///
/// ```
/// use riverstat_common::events::{EventBus, StatsEvent};
///
/// let bus = EventBus::new(16);
/// let mut rx = bus.subscribe();
///
/// bus.emit_lossy(StatsEvent::LogEvicted {
///     removed: 3,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(matches!(rx.try_recv(), Ok(StatsEvent::LogEvicted { removed: 3, .. })));
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StatsEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<StatsEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: StatsEvent,
    ) -> Result<usize, broadcast::error::SendError<StatsEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: StatsEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
