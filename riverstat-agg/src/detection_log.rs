//! Bounded detection log
//!
//! Appends are unconditional; the cap is enforced by a separate eviction
//! sweep, so the log may briefly exceed `max_size` between an append and the
//! next sweep. Only one sweep runs at a time. A request that arrives while a
//! sweep is running is picked up by the running sweep before it returns.
//! Eviction failures are logged and never fail an ingest.

use riverstat_common::events::{EventBus, StatsEvent};
use riverstat_common::time;
use riverstat_common::{DetectionEvent, LogEntry, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::store::AggregateStore;

pub struct DetectionLog {
    store: Arc<dyn AggregateStore>,
    max_size: usize,
    sweep: Mutex<()>,
    sweep_requested: AtomicBool,
    events: EventBus,
}

impl DetectionLog {
    pub fn new(store: Arc<dyn AggregateStore>, max_size: usize, events: EventBus) -> Self {
        Self {
            store,
            max_size,
            sweep: Mutex::new(()),
            sweep_requested: AtomicBool::new(false),
            events,
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Record `event` in the log
    pub async fn append(&self, event: &DetectionEvent) -> Result<LogEntry> {
        let entry = LogEntry::from(event);
        self.store.insert_log_entry(&entry).await?;

        self.events.emit_lossy(StatsEvent::DetectionLogged {
            entry: entry.clone(),
            timestamp: time::now(),
        });

        Ok(entry)
    }

    /// Trim the log to its `max_size` most recent entries
    ///
    /// If another sweep is running, the request is handed to it and this call
    /// returns 0 at once. The running sweep repeats until no request is left.
    /// Returns the number of entries this call removed.
    pub async fn evict(&self) -> u64 {
        self.sweep_requested.store(true, Ordering::SeqCst);

        let mut removed = 0;
        loop {
            let Ok(guard) = self.sweep.try_lock() else {
                debug!("Log eviction already in progress, request handed over");
                return removed;
            };
            while self.sweep_requested.swap(false, Ordering::SeqCst) {
                removed += self.sweep_once().await;
            }
            drop(guard);

            // A request that lost the try_lock race after the last swap
            if !self.sweep_requested.load(Ordering::SeqCst) {
                return removed;
            }
        }
    }

    async fn sweep_once(&self) -> u64 {
        match self.store.evict_log_beyond(self.max_size).await {
            Ok(0) => 0,
            Ok(removed) => {
                debug!(removed, "Evicted detection log entries");
                self.events.emit_lossy(StatsEvent::LogEvicted {
                    removed,
                    timestamp: time::now(),
                });
                removed
            }
            Err(e) => {
                warn!(error = %e, "Detection log eviction failed");
                0
            }
        }
    }

    /// Up to `limit` most recent entries, never more than `max_size`
    pub async fn recent(&self, limit: usize) -> Result<Vec<LogEntry>> {
        self.store
            .recent_log_entries(limit.min(self.max_size))
            .await
    }

    pub async fn len(&self) -> Result<usize> {
        self.store.log_len().await
    }
}
