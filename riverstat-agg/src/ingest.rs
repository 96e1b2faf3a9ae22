//! Ingest orchestration
//!
//! Validates a batch of raw detections and dispatches each accepted event to
//! the live aggregate, both rollup widths and the detection log. Events are
//! processed as independent tasks; the three component folds of one event run
//! concurrently and each is retried on transient failure. The batch as a
//! whole is bounded by `batch_timeout`.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use riverstat_common::config::IngestConfig;
use riverstat_common::events::{EventBus, StatsEvent};
use riverstat_common::time;
use riverstat_common::{BucketWidth, DetectionEvent, Error, RawDetection, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::detection_log::DetectionLog;
use crate::live::LiveAggregateUpdater;
use crate::retry::retry_with_backoff;
use crate::rollup::RollupStore;

/// Result for one input position of a batch
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    /// Every component fold committed
    Accepted { index: usize, id: Uuid },
    /// Failed validation; nothing was written
    Rejected { index: usize, reason: String },
    /// At least one component fold failed after retries
    Failed { index: usize, id: Uuid, reason: String },
    /// Unresolved when the batch deadline passed; work continues in background
    TimedOut { index: usize, id: Uuid },
}

impl EventOutcome {
    pub fn index(&self) -> usize {
        match self {
            EventOutcome::Accepted { index, .. }
            | EventOutcome::Rejected { index, .. }
            | EventOutcome::Failed { index, .. }
            | EventOutcome::TimedOut { index, .. } => *index,
        }
    }
}

/// Per-event outcomes of one batch, in input order
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub outcomes: Vec<EventOutcome>,
    pub timestamp: DateTime<Utc>,
}

impl IngestReport {
    pub fn accepted_ids(&self) -> Vec<Uuid> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                EventOutcome::Accepted { id, .. } => Some(*id),
                _ => None,
            })
            .collect()
    }

    /// Rejected and failed events with their reasons
    pub fn rejected(&self) -> Vec<(usize, String)> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                EventOutcome::Rejected { index, reason } | EventOutcome::Failed { index, reason, .. } => {
                    Some((*index, reason.clone()))
                }
                _ => None,
            })
            .collect()
    }

    pub fn pending(&self) -> Vec<(usize, Uuid)> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                EventOutcome::TimedOut { index, id } => Some((*index, *id)),
                _ => None,
            })
            .collect()
    }

    /// Every input was accepted
    pub fn all_accepted(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| matches!(o, EventOutcome::Accepted { .. }))
    }
}

fn rejection_reason(err: Error) -> String {
    match err {
        Error::Validation(reason) => reason,
        other => other.to_string(),
    }
}

/// Component folds for one event, shared by all event tasks
#[derive(Clone)]
struct Pipeline {
    live: LiveAggregateUpdater,
    rollups: Arc<RollupStore>,
    log: Arc<DetectionLog>,
    max_attempts: u32,
    backoff: Duration,
}

impl Pipeline {
    /// Run every fold for `event`; on failure, describe which components failed
    async fn dispatch(&self, event: &DetectionEvent) -> std::result::Result<(), String> {
        let (live, minute, hour, log) = tokio::join!(
            retry_with_backoff("live aggregate", self.max_attempts, self.backoff, || {
                self.live.apply(event)
            }),
            retry_with_backoff("minute bucket", self.max_attempts, self.backoff, || {
                self.rollups.fold(event, BucketWidth::Minute)
            }),
            retry_with_backoff("hour bucket", self.max_attempts, self.backoff, || {
                self.rollups.fold(event, BucketWidth::Hour)
            }),
            retry_with_backoff("detection log", self.max_attempts, self.backoff, || {
                self.log.append(event)
            }),
        );

        let failures: Vec<String> = [
            ("live aggregate", live.err()),
            ("minute bucket", minute.err()),
            ("hour bucket", hour.err()),
            ("detection log", log.err()),
        ]
        .into_iter()
        .filter_map(|(component, err)| err.map(|e| format!("{}: {}", component, e)))
        .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(failures.join("; "))
        }
    }
}

/// Batch ingest entry point
pub struct Ingestor {
    pipeline: Pipeline,
    events: EventBus,
    batch_timeout: Duration,
}

impl Ingestor {
    pub fn new(
        live: LiveAggregateUpdater,
        rollups: Arc<RollupStore>,
        log: Arc<DetectionLog>,
        events: EventBus,
        config: &IngestConfig,
    ) -> Self {
        Self {
            pipeline: Pipeline {
                live,
                rollups,
                log,
                max_attempts: config.max_attempts,
                backoff: config.retry_backoff(),
            },
            events,
            batch_timeout: config.batch_timeout(),
        }
    }

    /// Ingest typed payloads
    pub async fn ingest(&self, batch: Vec<RawDetection>) -> Result<IngestReport> {
        self.ingest_parsed(batch.into_iter().map(Ok).collect()).await
    }

    /// Ingest untyped JSON payloads, rejecting elements that do not parse
    pub async fn ingest_json(&self, batch: Vec<Value>) -> Result<IngestReport> {
        let parsed = batch
            .into_iter()
            .map(|value| {
                serde_json::from_value::<RawDetection>(value)
                    .map_err(|e| format!("malformed detection: {}", e))
            })
            .collect();
        self.ingest_parsed(parsed).await
    }

    async fn ingest_parsed(
        &self,
        batch: Vec<std::result::Result<RawDetection, String>>,
    ) -> Result<IngestReport> {
        if batch.is_empty() {
            return Err(Error::Validation("detections must not be empty".to_string()));
        }

        let started = tokio::time::Instant::now();
        let deadline = started + self.batch_timeout;
        let now = time::now();
        let total = batch.len();

        let mut outcomes: BTreeMap<usize, EventOutcome> = BTreeMap::new();
        let mut unresolved: BTreeMap<usize, Uuid> = BTreeMap::new();
        let mut tasks = JoinSet::new();
        // Set once the deadline passes; detached tasks then sweep the log themselves
        let expired = Arc::new(AtomicBool::new(false));

        for (index, payload) in batch.into_iter().enumerate() {
            let event = match payload.and_then(|raw| raw.into_event(now).map_err(rejection_reason)) {
                Ok(event) => event,
                Err(reason) => {
                    debug!(index, reason = %reason, "Rejected detection");
                    outcomes.insert(index, EventOutcome::Rejected { index, reason });
                    continue;
                }
            };

            unresolved.insert(index, event.id);
            let pipeline = self.pipeline.clone();
            let expired = expired.clone();
            tasks.spawn(async move {
                let result = AssertUnwindSafe(pipeline.dispatch(&event))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| Err("internal: fold task panicked".to_string()));
                if expired.load(Ordering::SeqCst) {
                    pipeline.log.evict().await;
                }
                (index, event.id, result)
            });
        }

        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((index, id, result)))) => {
                    unresolved.remove(&index);
                    let outcome = match result {
                        Ok(()) => EventOutcome::Accepted { index, id },
                        Err(reason) => {
                            warn!(event_id = %id, index, reason = %reason, "Detection fold failed");
                            EventOutcome::Failed { index, id, reason }
                        }
                    };
                    outcomes.insert(index, outcome);
                }
                Ok(Some(Err(join_error))) => {
                    error!(error = %join_error, "Ingest task aborted");
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        unresolved = unresolved.len(),
                        timeout_ms = self.batch_timeout.as_millis() as u64,
                        "Ingest batch timed out; remaining work continues in background"
                    );
                    expired.store(true, Ordering::SeqCst);
                    tasks.detach_all();
                    for (index, id) in std::mem::take(&mut unresolved) {
                        outcomes.insert(index, EventOutcome::TimedOut { index, id });
                    }
                    break;
                }
            }
        }

        // Tasks that ended without reporting (aborted) count as failed
        for (index, id) in unresolved {
            outcomes.insert(
                index,
                EventOutcome::Failed {
                    index,
                    id,
                    reason: "internal: ingest task aborted".to_string(),
                },
            );
        }

        self.pipeline.log.evict().await;

        let report = IngestReport {
            outcomes: outcomes.into_values().collect(),
            timestamp: time::now(),
        };

        let accepted = report.accepted_ids();
        let rejected = report.rejected().len();
        let pending = report.pending().len();

        info!(
            total,
            accepted = accepted.len(),
            rejected,
            pending,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Ingested detection batch"
        );

        self.events.emit_lossy(StatsEvent::BatchIngested {
            accepted,
            rejected,
            pending,
            timestamp: report.timestamp,
        });

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AggregateStore, MemoryStore};
    use riverstat_common::MAX_LOG_SIZE;
    use serde_json::json;

    fn ingestor_with(store: Arc<dyn AggregateStore>) -> (Ingestor, LiveAggregateUpdater) {
        let events = EventBus::new(256);
        let config = IngestConfig::default();
        let live = LiveAggregateUpdater::new(store.clone(), config.lock_timeout(), events.clone());
        let rollups = Arc::new(RollupStore::new(store.clone(), config.lock_timeout(), events.clone()));
        let log = Arc::new(DetectionLog::new(store, MAX_LOG_SIZE, events.clone()));
        (Ingestor::new(live.clone(), rollups, log, events, &config), live)
    }

    fn raw(label: &str, score: f64) -> RawDetection {
        RawDetection {
            score: Some(score),
            class_name: Some(label.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_empty_batch_is_validation_error() {
        let (ingestor, _) = ingestor_with(Arc::new(MemoryStore::new()));
        let result = ingestor.ingest(Vec::new()).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_mixed_batch_reports_per_index() {
        let (ingestor, live) = ingestor_with(Arc::new(MemoryStore::new()));
        let report = ingestor
            .ingest(vec![raw("PET", 0.9), raw("", 0.8), raw("HDPE", 1.5)])
            .await
            .unwrap();

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.accepted_ids().len(), 1);
        let rejected: Vec<usize> = report.rejected().iter().map(|(i, _)| *i).collect();
        assert_eq!(rejected, vec![1, 2]);
        assert!(!report.all_accepted());

        let snapshot = live.snapshot().await.unwrap();
        assert_eq!(snapshot.total_count, 1);
    }

    #[tokio::test]
    async fn test_malformed_json_element_is_rejected() {
        let (ingestor, _) = ingestor_with(Arc::new(MemoryStore::new()));
        let report = ingestor
            .ingest_json(vec![
                json!({"class_name": "PET", "score": 0.9}),
                json!("not an object"),
                json!({"class_name": "PET", "score": "high"}),
            ])
            .await
            .unwrap();

        assert_eq!(report.accepted_ids().len(), 1);
        let reasons = report.rejected();
        assert_eq!(reasons.len(), 2);
        assert!(reasons[0].1.starts_with("malformed detection"));
    }

    #[tokio::test]
    async fn test_outcomes_are_in_input_order() {
        let (ingestor, _) = ingestor_with(Arc::new(MemoryStore::new()));
        let batch: Vec<RawDetection> = (0..20).map(|_| raw("PET", 0.5)).collect();
        let report = ingestor.ingest(batch).await.unwrap();

        let indices: Vec<usize> = report.outcomes.iter().map(EventOutcome::index).collect();
        assert_eq!(indices, (0..20).collect::<Vec<_>>());
        assert!(report.all_accepted());
    }

    #[tokio::test]
    async fn test_supplied_timestamp_becomes_observed_at() {
        let store: Arc<dyn AggregateStore> = Arc::new(MemoryStore::new());
        let (ingestor, _) = ingestor_with(store.clone());
        let at = DateTime::parse_from_rfc3339("2025-06-01T12:00:30Z")
            .unwrap()
            .with_timezone(&Utc);

        let mut detection = raw("PET", 0.9);
        detection.timestamp = Some(at);
        ingestor.ingest(vec![detection]).await.unwrap();

        let entries = store.recent_log_entries(10).await.unwrap();
        assert_eq!(entries[0].observed_at, at);
        let bucket = store
            .load_bucket(BucketWidth::Minute, BucketWidth::Minute.truncate(at))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bucket.count, 1);
    }
}
