//! Bucket retention sweep
//!
//! Periodically deletes minute and hour buckets older than their retention
//! horizon. A failed sweep is logged and retried on the next tick.

use chrono::{DateTime, Utc};
use riverstat_common::config::RetentionConfig;
use riverstat_common::time;
use riverstat_common::{BucketWidth, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::rollup::RollupStore;

/// Delete buckets past their horizon relative to `now`; returns (minute, hour) counts removed
pub async fn sweep_once(
    rollups: &RollupStore,
    config: &RetentionConfig,
    now: DateTime<Utc>,
) -> Result<(u64, u64)> {
    let minute_cutoff = BucketWidth::Minute.truncate(now - config.minute_retention());
    let hour_cutoff = BucketWidth::Hour.truncate(now - config.hour_retention());

    let minutes = rollups.prune(BucketWidth::Minute, minute_cutoff).await?;
    let hours = rollups.prune(BucketWidth::Hour, hour_cutoff).await?;
    Ok((minutes, hours))
}

/// Spawn the sweep loop; returns `None` when retention is disabled
pub fn spawn_retention_task(
    rollups: Arc<RollupStore>,
    config: RetentionConfig,
    shutdown: CancellationToken,
) -> Option<JoinHandle<()>> {
    if !config.enabled {
        info!("Bucket retention disabled");
        return None;
    }

    info!(
        minute_retention_hours = config.minute_retention_hours,
        hour_retention_days = config.hour_retention_days,
        interval_secs = config.sweep_interval_secs,
        "Starting bucket retention sweep"
    );

    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(config.sweep_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Retention sweep stopping");
                    break;
                }
                _ = interval.tick() => {
                    match sweep_once(&rollups, &config, time::now()).await {
                        Ok((0, 0)) => {}
                        Ok((minutes, hours)) => {
                            info!(minutes, hours, "Pruned expired buckets");
                        }
                        Err(e) => {
                            warn!(error = %e, "Retention sweep failed, will retry next tick");
                        }
                    }
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Duration;
    use riverstat_common::events::EventBus;
    use riverstat_common::DetectionEvent;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn rollups() -> RollupStore {
        RollupStore::new(
            Arc::new(MemoryStore::new()),
            std::time::Duration::from_secs(1),
            EventBus::new(64),
        )
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired_buckets() {
        let rollups = rollups();
        let config = RetentionConfig {
            minute_retention_hours: 1,
            hour_retention_days: 1,
            ..Default::default()
        };

        let old = DetectionEvent::new("PET", 0.5, t0() - Duration::hours(2)).unwrap();
        let fresh = DetectionEvent::new("PET", 0.5, t0() - Duration::minutes(5)).unwrap();
        for event in [&old, &fresh] {
            rollups.fold(event, BucketWidth::Minute).await.unwrap();
            rollups.fold(event, BucketWidth::Hour).await.unwrap();
        }

        let (minutes, hours) = sweep_once(&rollups, &config, t0()).await.unwrap();
        assert_eq!(minutes, 1);
        assert_eq!(hours, 0);

        let remaining = rollups
            .range(BucketWidth::Minute, t0() - Duration::hours(3), t0())
            .await
            .unwrap();
        assert_eq!(remaining.iter().map(|b| b.count).sum::<u64>(), 1);
    }

    #[tokio::test]
    async fn test_disabled_retention_spawns_nothing() {
        let config = RetentionConfig {
            enabled: false,
            ..Default::default()
        };
        let handle = spawn_retention_task(Arc::new(rollups()), config, CancellationToken::new());
        assert!(handle.is_none());
    }

    #[tokio::test]
    async fn test_task_stops_on_cancel() {
        let token = CancellationToken::new();
        let handle = spawn_retention_task(Arc::new(rollups()), RetentionConfig::default(), token.clone())
            .unwrap();
        token.cancel();
        handle.await.unwrap();
    }
}
