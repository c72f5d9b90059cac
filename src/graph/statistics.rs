//! Schema statistics with versioned snapshots.
//!
//! Writers fold a [`StatisticsDelta`] in at commit time: the manager clones
//! the current statistics, applies the delta, advances the monotone
//! `snapshot` counter and publishes through `arc-swap`. Readers (above all
//! the planner) load a snapshot handle lock-free and never observe a
//! half-applied update. The planner keys its plan cache on the snapshot
//! counter.

use super::type_graph::SchemaGraph;
use crate::encoding::TypeIid;
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;

/// Point-in-time statistics over the instance graph
#[derive(Debug, Clone, Default)]
pub struct Statistics {
    /// Monotone version; advances on every statistic-affecting commit
    pub snapshot: u64,
    /// Direct instance counts per type
    thing_counts: HashMap<TypeIid, u64>,
    /// HAS edge counts per (owner type, attribute type)
    has_counts: HashMap<(TypeIid, TypeIid), u64>,
    /// Role instance counts per role type
    role_counts: HashMap<TypeIid, u64>,
}

impl Statistics {
    /// Direct instance count of one type
    pub fn instances_count(&self, iid: TypeIid) -> u64 {
        self.thing_counts.get(&iid).copied().unwrap_or(0)
    }

    /// Transitive instance count: the type and all its subtypes
    pub fn instances_transitive(&self, schema: &SchemaGraph, iid: TypeIid) -> u64 {
        schema
            .subtypes_transitive(iid)
            .into_iter()
            .map(|sub| self.instances_count(sub))
            .sum()
    }

    /// Largest transitive instance count among the candidate types
    pub fn instances_max(&self, schema: &SchemaGraph, iids: &[TypeIid], transitive: bool) -> u64 {
        iids.iter()
            .map(|&iid| {
                if transitive {
                    self.instances_transitive(schema, iid)
                } else {
                    self.instances_count(iid)
                }
            })
            .max()
            .unwrap_or(0)
    }

    /// Sum of transitive instance counts over the candidate types
    pub fn instances_sum(&self, schema: &SchemaGraph, iids: &[TypeIid]) -> u64 {
        iids.iter()
            .map(|&iid| self.instances_transitive(schema, iid))
            .sum()
    }

    /// HAS edges between any owner in `owners` and any attribute in `attrs`,
    /// counted over the transitive closure of both sides
    pub fn count_has_edges(
        &self,
        schema: &SchemaGraph,
        owners: &[TypeIid],
        attrs: &[TypeIid],
    ) -> u64 {
        let mut total = 0;
        for &owner in owners {
            for owner_sub in schema.subtypes_transitive(owner) {
                for &attr in attrs {
                    for attr_sub in schema.subtypes_transitive(attr) {
                        total += self
                            .has_counts
                            .get(&(owner_sub, attr_sub))
                            .copied()
                            .unwrap_or(0);
                    }
                }
            }
        }
        total
    }

    /// Role instances of a role type, transitively
    pub fn role_instances_transitive(&self, schema: &SchemaGraph, iid: TypeIid) -> u64 {
        schema
            .subtypes_transitive(iid)
            .into_iter()
            .map(|sub| self.role_counts.get(&sub).copied().unwrap_or(0))
            .sum()
    }

    /// Total instances across a whole partition root
    pub fn partition_total(&self, schema: &SchemaGraph, root: TypeIid) -> u64 {
        self.instances_transitive(schema, root)
    }

    /// Mean out-degree of HAS edges over the given owner types
    pub fn mean_has_degree(&self, schema: &SchemaGraph, owners: &[TypeIid]) -> f64 {
        let instances: u64 = owners
            .iter()
            .map(|&o| self.instances_transitive(schema, o))
            .sum();
        if instances == 0 {
            return 0.0;
        }
        let edges: u64 = owners
            .iter()
            .map(|&o| {
                schema
                    .subtypes_transitive(o)
                    .into_iter()
                    .map(|sub| {
                        self.has_counts
                            .iter()
                            .filter(|((owner, _), _)| *owner == sub)
                            .map(|(_, count)| *count)
                            .sum::<u64>()
                    })
                    .sum::<u64>()
            })
            .sum();
        edges as f64 / instances as f64
    }

    /// Mean roles played per thing instance, the planner's branching
    /// factor estimate. Unclamped; the planner applies its configured
    /// clamp range.
    pub fn branching_factor(&self, schema: &SchemaGraph) -> f64 {
        let roles: u64 = self.role_counts.values().sum();
        let things: u64 = [
            schema.root(super::type_graph::Kind::Entity),
            schema.root(super::type_graph::Kind::Relation),
        ]
        .into_iter()
        .map(|root| self.instances_transitive(schema, root))
        .sum();
        if things == 0 {
            return 0.0;
        }
        roles as f64 / things as f64
    }
}

/// Accumulated statistic changes of one transaction
#[derive(Debug, Clone, Default)]
pub struct StatisticsDelta {
    thing: HashMap<TypeIid, i64>,
    has: HashMap<(TypeIid, TypeIid), i64>,
    role: HashMap<TypeIid, i64>,
}

impl StatisticsDelta {
    pub fn new() -> StatisticsDelta {
        StatisticsDelta::default()
    }

    pub fn thing_created(&mut self, type_iid: TypeIid) {
        *self.thing.entry(type_iid).or_insert(0) += 1;
    }

    pub fn thing_deleted(&mut self, type_iid: TypeIid) {
        *self.thing.entry(type_iid).or_insert(0) -= 1;
    }

    pub fn has_created(&mut self, owner: TypeIid, attr: TypeIid) {
        *self.has.entry((owner, attr)).or_insert(0) += 1;
    }

    pub fn has_deleted(&mut self, owner: TypeIid, attr: TypeIid) {
        *self.has.entry((owner, attr)).or_insert(0) -= 1;
    }

    pub fn role_created(&mut self, role_type: TypeIid) {
        *self.role.entry(role_type).or_insert(0) += 1;
    }

    pub fn role_deleted(&mut self, role_type: TypeIid) {
        *self.role.entry(role_type).or_insert(0) -= 1;
    }

    pub fn is_empty(&self) -> bool {
        self.thing.is_empty() && self.has.is_empty() && self.role.is_empty()
    }
}

/// Versioned snapshot container for statistics
pub struct StatisticsManager {
    current: ArcSwap<Statistics>,
}

impl StatisticsManager {
    pub fn new() -> StatisticsManager {
        StatisticsManager {
            current: ArcSwap::from_pointee(Statistics::default()),
        }
    }

    /// Lock-free read handle to the latest statistics
    pub fn handle(&self) -> Arc<Statistics> {
        self.current.load_full()
    }

    /// The current snapshot counter
    pub fn snapshot(&self) -> u64 {
        self.current.load().snapshot
    }

    /// Fold a delta in and publish a new snapshot. Called by writers only,
    /// under the commit lock, so publishes never race.
    pub fn apply(&self, delta: &StatisticsDelta) {
        if delta.is_empty() {
            return;
        }
        let mut next = (**self.current.load()).clone();
        next.snapshot += 1;
        for (&iid, &d) in &delta.thing {
            let slot = next.thing_counts.entry(iid).or_insert(0);
            *slot = slot.saturating_add_signed(d);
        }
        for (&key, &d) in &delta.has {
            let slot = next.has_counts.entry(key).or_insert(0);
            *slot = slot.saturating_add_signed(d);
        }
        for (&iid, &d) in &delta.role {
            let slot = next.role_counts.entry(iid).or_insert(0);
            *slot = slot.saturating_add_signed(d);
        }
        self.current.store(Arc::new(next));
    }
}

impl Default for StatisticsManager {
    fn default() -> Self {
        StatisticsManager::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::type_graph::Kind;

    #[test]
    fn test_snapshot_advances_on_apply() {
        let manager = StatisticsManager::new();
        assert_eq!(manager.snapshot(), 0);

        let schema = {
            let mut s = SchemaGraph::new();
            s.define_type("person", Kind::Entity).expect("defines");
            s
        };
        let person = schema.get("person").expect("exists").iid;

        let mut delta = StatisticsDelta::new();
        delta.thing_created(person);
        manager.apply(&delta);
        assert_eq!(manager.snapshot(), 1);
        assert_eq!(manager.handle().instances_count(person), 1);

        // Empty deltas do not advance the snapshot
        manager.apply(&StatisticsDelta::new());
        assert_eq!(manager.snapshot(), 1);
    }

    #[test]
    fn test_old_handles_unaffected_by_new_commits() {
        let manager = StatisticsManager::new();
        let mut schema = SchemaGraph::new();
        schema.define_type("person", Kind::Entity).expect("defines");
        let person = schema.get("person").expect("exists").iid;

        let mut delta = StatisticsDelta::new();
        delta.thing_created(person);
        manager.apply(&delta);

        let pinned = manager.handle();
        manager.apply(&delta);

        assert_eq!(pinned.instances_count(person), 1);
        assert_eq!(manager.handle().instances_count(person), 2);
    }

    #[test]
    fn test_transitive_counts_sum_subtypes() {
        let mut schema = SchemaGraph::new();
        schema.define_type("animal", Kind::Entity).expect("defines");
        schema.define_type("dog", Kind::Entity).expect("defines");
        schema.set_sub("dog", "animal").expect("sub");
        let animal = schema.get("animal").expect("a").iid;
        let dog = schema.get("dog").expect("d").iid;

        let manager = StatisticsManager::new();
        let mut delta = StatisticsDelta::new();
        delta.thing_created(animal);
        delta.thing_created(dog);
        delta.thing_created(dog);
        manager.apply(&delta);

        let stats = manager.handle();
        assert_eq!(stats.instances_count(animal), 1);
        assert_eq!(stats.instances_transitive(&schema, animal), 3);
        assert_eq!(stats.instances_max(&schema, &[animal, dog], true), 3);
    }
}
