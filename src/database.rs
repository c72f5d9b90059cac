//! Database handle: storage, schema cache, statistics, rules and the
//! shared traversal engine.

use crate::config::Config;
use crate::graph::thing_graph::AttributeLocks;
use crate::graph::{SchemaGraph, Statistics, StatisticsDelta, StatisticsManager};
use crate::reasoner::Rule;
use crate::storage::{MemoryStorage, Storage};
use crate::transaction::{Session, SessionKind, WriterLatch};
use crate::traversal::TraversalEngine;
use arc_swap::ArcSwap;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

/// A single-node database instance
pub struct Database {
    storage: Arc<dyn Storage>,
    schema: ArcSwap<SchemaGraph>,
    stats: StatisticsManager,
    rules: ArcSwap<Vec<Rule>>,
    engine: TraversalEngine,
    key_counter: Arc<AtomicU64>,
    attribute_locks: AttributeLocks,
    config: Config,
}

impl Database {
    /// Open over the in-memory reference storage
    pub fn new(config: Config) -> Arc<Database> {
        Database::with_storage(Arc::new(MemoryStorage::new()), config)
    }

    /// Open over any storage honouring the ordered byte-key contract
    pub fn with_storage(storage: Arc<dyn Storage>, config: Config) -> Arc<Database> {
        let snapshot = storage.snapshot();
        let schema = SchemaGraph::load(&*snapshot);
        // Resume the thing-key generator past every key ever issued
        let next_key = snapshot
            .get(&crate::encoding::key_counter_key())
            .and_then(|bytes| bytes.try_into().ok().map(u64::from_be_bytes))
            .unwrap_or(1);
        let engine = TraversalEngine::new(config.planner.clone());
        Arc::new(Database {
            storage,
            schema: ArcSwap::from_pointee(schema),
            stats: StatisticsManager::new(),
            rules: ArcSwap::from_pointee(Vec::new()),
            engine,
            key_counter: Arc::new(AtomicU64::new(next_key)),
            attribute_locks: Arc::new(dashmap::DashMap::new()),
            config,
        })
    }

    /// Open a session
    pub fn session(self: &Arc<Database>, kind: SessionKind) -> Session {
        Session {
            db: Arc::clone(self),
            kind,
            writer: Arc::new(WriterLatch::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// The current schema view
    pub fn schema(&self) -> Arc<SchemaGraph> {
        self.schema.load_full()
    }

    pub(crate) fn publish_schema(&self, schema: SchemaGraph) {
        self.schema.store(Arc::new(schema));
    }

    /// The current rule set
    pub fn rules(&self) -> Arc<Vec<Rule>> {
        self.rules.load_full()
    }

    pub(crate) fn publish_rules(&self, rules: Vec<Rule>) {
        self.rules.store(Arc::new(rules));
    }

    /// Lock-free statistics snapshot
    pub fn statistics_handle(&self) -> Arc<Statistics> {
        self.stats.handle()
    }

    /// The statistics snapshot counter
    pub fn statistics_snapshot(&self) -> u64 {
        self.stats.snapshot()
    }

    pub(crate) fn apply_statistics(&self, delta: &StatisticsDelta) {
        self.stats.apply(delta);
    }

    pub(crate) fn engine(&self) -> &TraversalEngine {
        &self.engine
    }

    pub(crate) fn key_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.key_counter)
    }

    pub(crate) fn attribute_locks(&self) -> AttributeLocks {
        Arc::clone(&self.attribute_locks)
    }
}
