//! Minute and hour rollup buckets

use chrono::{DateTime, Utc};
use riverstat_common::events::{EventBus, StatsEvent};
use riverstat_common::time;
use riverstat_common::{Bucket, BucketWidth, DetectionEvent, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::keyed_lock::KeyedLocks;
use crate::store::AggregateStore;

type WindowKey = (BucketWidth, DateTime<Utc>);

/// Folds events into fixed-width buckets and answers range reads
///
/// Writes are serialized per `(width, window_start)`; events landing in
/// different windows never wait on each other.
pub struct RollupStore {
    store: Arc<dyn AggregateStore>,
    locks: KeyedLocks<WindowKey>,
    events: EventBus,
}

impl RollupStore {
    pub fn new(store: Arc<dyn AggregateStore>, lock_timeout: Duration, events: EventBus) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(lock_timeout),
            events,
        }
    }

    /// Fold `event` into the `width` bucket containing its observation time
    pub async fn fold(&self, event: &DetectionEvent, width: BucketWidth) -> Result<Bucket> {
        let window_start = width.truncate(event.observed_at);
        let _guard = self.locks.acquire(&(width, window_start)).await?;

        let mut bucket = self
            .store
            .load_bucket(width, window_start)
            .await?
            .unwrap_or_else(|| Bucket::empty(window_start));
        debug_assert!(bucket.contains(width, event.observed_at));
        bucket.fold(event);
        self.store.save_bucket(width, &bucket).await?;

        debug!(
            event_id = %event.id,
            width = %width,
            window_start = %window_start,
            count = bucket.count,
            "Bucket updated"
        );

        self.events.emit_lossy(StatsEvent::BucketUpdated {
            width,
            bucket: bucket.clone(),
            timestamp: time::now(),
        });

        Ok(bucket)
    }

    /// One bucket per window in `[from, to)`, ascending, zero-filled
    ///
    /// `from` is truncated to its window start. An empty or inverted range
    /// yields an empty series.
    pub async fn range(
        &self,
        width: BucketWidth,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Bucket>> {
        let first = width.truncate(from);
        if first >= to {
            return Ok(Vec::new());
        }

        let mut stored: HashMap<DateTime<Utc>, Bucket> = self
            .store
            .buckets_in_range(width, first, to)
            .await?
            .into_iter()
            .map(|b| (b.window_start, b))
            .collect();

        Ok(width
            .window_starts(first, to)
            .map(|start| stored.remove(&start).unwrap_or_else(|| Bucket::empty(start)))
            .collect())
    }

    /// Delete `width` buckets that start before `cutoff`
    pub async fn prune(&self, width: BucketWidth, cutoff: DateTime<Utc>) -> Result<u64> {
        let removed = self.store.delete_buckets_before(width, cutoff).await?;
        self.locks.prune_idle();
        Ok(removed)
    }
}
