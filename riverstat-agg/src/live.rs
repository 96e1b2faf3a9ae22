//! Live aggregate updater
//!
//! The live aggregate is a single record; every apply is a locked
//! load-fold-save so concurrent ingests never lose an increment.

use riverstat_common::events::{EventBus, StatsEvent};
use riverstat_common::time;
use riverstat_common::{DetectionEvent, LiveAggregate, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use crate::keyed_lock::acquire_within;
use crate::store::AggregateStore;

#[derive(Clone)]
pub struct LiveAggregateUpdater {
    store: Arc<dyn AggregateStore>,
    lock: Arc<Mutex<()>>,
    lock_timeout: Duration,
    events: EventBus,
}

impl LiveAggregateUpdater {
    pub fn new(store: Arc<dyn AggregateStore>, lock_timeout: Duration, events: EventBus) -> Self {
        Self {
            store,
            lock: Arc::new(Mutex::new(())),
            lock_timeout,
            events,
        }
    }

    /// Fold one event into the live aggregate and return the committed snapshot
    ///
    /// If the save fails the stored aggregate is unchanged and the event may
    /// be retried.
    pub async fn apply(&self, event: &DetectionEvent) -> Result<LiveAggregate> {
        let _guard = acquire_within(self.lock.clone(), self.lock_timeout, "live aggregate").await?;

        let mut aggregate = self.store.load_live().await?.unwrap_or_default();
        aggregate.apply(event, time::now());
        self.store.save_live(&aggregate).await?;

        debug!(
            event_id = %event.id,
            total = aggregate.total_count,
            "Live aggregate updated"
        );

        self.events.emit_lossy(StatsEvent::LiveStatsUpdated {
            snapshot: aggregate.clone(),
            timestamp: time::now(),
        });

        Ok(aggregate)
    }

    /// Current aggregate, all zeros before the first event
    pub async fn snapshot(&self) -> Result<LiveAggregate> {
        Ok(self.store.load_live().await?.unwrap_or_default())
    }
}
