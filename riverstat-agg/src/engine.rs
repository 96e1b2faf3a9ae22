//! Aggregation engine wiring

use riverstat_common::config::TomlConfig;
use riverstat_common::events::EventBus;
use riverstat_common::MAX_LOG_SIZE;
use std::sync::Arc;

use crate::detection_log::DetectionLog;
use crate::ingest::Ingestor;
use crate::live::LiveAggregateUpdater;
use crate::query::StatsQuery;
use crate::rollup::RollupStore;
use crate::store::AggregateStore;

/// All engine components over one store and one event bus
#[derive(Clone)]
pub struct StatsEngine {
    pub store: Arc<dyn AggregateStore>,
    pub live: LiveAggregateUpdater,
    pub rollups: Arc<RollupStore>,
    pub log: Arc<DetectionLog>,
    pub ingestor: Arc<Ingestor>,
    pub query: StatsQuery,
    pub events: EventBus,
}

impl StatsEngine {
    pub fn new(store: Arc<dyn AggregateStore>, config: &TomlConfig) -> Self {
        let events = EventBus::new(config.events.channel_capacity);
        Self::with_events(store, config, events)
    }

    pub fn with_events(store: Arc<dyn AggregateStore>, config: &TomlConfig, events: EventBus) -> Self {
        let lock_timeout = config.ingest.lock_timeout();

        let live = LiveAggregateUpdater::new(store.clone(), lock_timeout, events.clone());
        let rollups = Arc::new(RollupStore::new(store.clone(), lock_timeout, events.clone()));
        let log = Arc::new(DetectionLog::new(store.clone(), MAX_LOG_SIZE, events.clone()));

        let ingestor = Arc::new(Ingestor::new(
            live.clone(),
            rollups.clone(),
            log.clone(),
            events.clone(),
            &config.ingest,
        ));
        let query = StatsQuery::new(live.clone(), rollups.clone(), log.clone(), config.series.max_points);

        Self {
            store,
            live,
            rollups,
            log,
            ingestor,
            query,
            events,
        }
    }
}
