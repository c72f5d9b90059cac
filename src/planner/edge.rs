//! Planner-side edge cost model.
//!
//! Every structure edge yields two directionals (forward as projected,
//! backward reversed). `update_objective` recomputes each directional's
//! cost from the current schema statistics; the planner compares the
//! result against the costs recorded at the last solve to decide whether
//! a cached plan has gone stale.

use crate::encoding::TypeIid;
use crate::graph::{Kind, SchemaGraph, Statistics};
use crate::pattern::Comparator;
use crate::structure::{EdgeKind, Structure, VertexId};
use std::collections::BTreeSet;

/// One direction of a structure edge
#[derive(Debug, Clone)]
pub struct Directional {
    /// Structure edge this belongs to
    pub edge: usize,
    pub from: VertexId,
    pub to: VertexId,
    /// Whether this is the projected direction
    pub forward: bool,
    /// Cost under the statistics passed to the latest `update_objective`
    pub cost: f64,
}

/// Both directions of one structure edge
#[derive(Debug, Clone)]
pub struct PlannerEdge {
    pub id: usize,
    pub kind: EdgeKind,
    pub forward: Directional,
    pub backward: Directional,
}

impl PlannerEdge {
    pub fn build_all(structure: &Structure) -> Vec<PlannerEdge> {
        structure
            .edges()
            .iter()
            .map(|e| PlannerEdge {
                id: e.id,
                kind: e.kind.clone(),
                forward: Directional {
                    edge: e.id,
                    from: e.from,
                    to: e.to,
                    forward: true,
                    cost: 0.0,
                },
                backward: Directional {
                    edge: e.id,
                    from: e.to,
                    to: e.from,
                    forward: false,
                    cost: 0.0,
                },
            })
            .collect()
    }

    /// Recompute both directionals' costs from current statistics
    pub fn update_objective(&mut self, ctx: &CostContext<'_>) {
        let (fwd, bwd) = match &self.kind {
            EdgeKind::Equal => (0.0, 0.0),
            EdgeKind::Predicate(cmp) => (
                ctx.predicate_cost(*cmp, self.forward.to),
                ctx.predicate_cost(*cmp, self.backward.to),
            ),
            EdgeKind::Isa { explicit } => (
                ctx.isa_forward_cost(self.forward.to, *explicit),
                ctx.isa_backward_cost(self.backward.from, *explicit),
            ),
            EdgeKind::Sub { .. } => (
                1.0,
                ctx.sub_backward_cost(self.backward.from),
            ),
            EdgeKind::Owns { .. } => (
                ctx.schema_degree_cost(self.forward.from, SchemaDegree::Owns),
                ctx.schema_degree_cost(self.backward.from, SchemaDegree::OwnedBy),
            ),
            EdgeKind::Plays => (
                ctx.schema_degree_cost(self.forward.from, SchemaDegree::Plays),
                ctx.schema_degree_cost(self.backward.from, SchemaDegree::PlayedBy),
            ),
            EdgeKind::Relates => (
                ctx.schema_degree_cost(self.forward.from, SchemaDegree::Relates),
                ctx.schema_degree_cost(self.backward.from, SchemaDegree::RelatedBy),
            ),
            EdgeKind::Has => (
                ctx.has_cost(self.forward.from, self.forward.to, true),
                ctx.has_cost(self.backward.to, self.backward.from, false),
            ),
            EdgeKind::Playing => (
                ctx.role_ratio_cost(self.forward.to, self.forward.from),
                1.0,
            ),
            EdgeKind::Relating => (
                ctx.role_ratio_cost(self.forward.to, self.forward.from),
                1.0,
            ),
            EdgeKind::RolePlayer { roles } => (
                ctx.role_player_cost(roles.as_ref(), self.forward.from),
                ctx.role_player_cost(roles.as_ref(), self.backward.from),
            ),
        };
        self.forward.cost = fwd;
        self.backward.cost = bwd;
    }
}

enum SchemaDegree {
    Owns,
    OwnedBy,
    Plays,
    PlayedBy,
    Relates,
    RelatedBy,
}

/// Everything the cost formulas read
pub struct CostContext<'a> {
    pub schema: &'a SchemaGraph,
    pub stats: &'a Statistics,
    pub structure: &'a Structure,
}

impl CostContext<'_> {
    fn hints(&self, vertex: VertexId) -> Option<&BTreeSet<TypeIid>> {
        self.structure.vertex(vertex).props.types.as_ref()
    }

    fn hint_vec(&self, vertex: VertexId) -> Option<Vec<TypeIid>> {
        self.hints(vertex).map(|s| s.iter().copied().collect())
    }

    fn attribute_type_count(&self) -> f64 {
        (self
            .schema
            .types()
            .filter(|t| t.kind == Kind::Attribute && !t.is_root)
            .count() as f64)
            .max(1.0)
    }

    /// Predicate edges: EQ against a known type set is a batch of point
    /// lookups; anything else walks attribute instances.
    fn predicate_cost(&self, cmp: Comparator, target: VertexId) -> f64 {
        match (cmp, self.hint_vec(target)) {
            (Comparator::Eq, Some(types)) => (types.len() as f64).max(1.0),
            (Comparator::Eq, None) => self.attribute_type_count(),
            (_, Some(types)) => {
                (self.stats.instances_max(self.schema, &types, true) as f64).max(1.0)
            }
            (_, None) => {
                let root = self.schema.root(Kind::Attribute);
                (self.stats.instances_transitive(self.schema, root) as f64).max(1.0)
            }
        }
    }

    /// ISA forward: thing to its type, then the subtype closure of the
    /// target's labels decides the check width.
    fn isa_forward_cost(&self, type_vertex: VertexId, explicit: bool) -> f64 {
        match self.hint_vec(type_vertex) {
            Some(types) if explicit => (types.len() as f64).max(1.0),
            Some(types) => types
                .iter()
                .map(|&t| self.schema.subtypes_transitive(t).len() as f64)
                .sum::<f64>()
                .max(1.0),
            None => self.schema.types().count() as f64,
        }
    }

    /// ISA backward: scanning the instances of the candidate types
    fn isa_backward_cost(&self, type_vertex: VertexId, explicit: bool) -> f64 {
        match self.hint_vec(type_vertex) {
            Some(types) => (self
                .stats
                .instances_max(self.schema, &types, !explicit) as f64)
                .max(1.0),
            None => {
                let total: u64 = [Kind::Entity, Kind::Relation, Kind::Attribute]
                    .into_iter()
                    .map(|k| {
                        self.stats
                            .instances_transitive(self.schema, self.schema.root(k))
                    })
                    .sum();
                (total as f64).max(1.0)
            }
        }
    }

    fn sub_backward_cost(&self, supertype_vertex: VertexId) -> f64 {
        match self.hint_vec(supertype_vertex) {
            Some(types) => types
                .iter()
                .map(|&t| self.schema.subtypes_transitive(t).len() as f64)
                .sum::<f64>()
                .max(1.0),
            None => self.schema.types().count() as f64,
        }
    }

    /// HAS: mean has-degree over the relevant side
    fn has_cost(&self, owner: VertexId, attribute: VertexId, from_owner: bool) -> f64 {
        let owners = self
            .hint_vec(owner)
            .unwrap_or_else(|| vec![self.schema.root(Kind::Entity), self.schema.root(Kind::Relation)]);
        let attrs = self
            .hint_vec(attribute)
            .unwrap_or_else(|| vec![self.schema.root(Kind::Attribute)]);
        let edges = self.stats.count_has_edges(self.schema, &owners, &attrs) as f64;
        let denominator = if from_owner {
            self.stats.instances_sum(self.schema, &owners)
        } else {
            self.stats.instances_sum(self.schema, &attrs)
        };
        (edges / (denominator as f64).max(1.0)).max(0.01)
    }

    /// PLAYING/RELATING: ratio of role instances to the source side
    fn role_ratio_cost(&self, role_vertex: VertexId, source: VertexId) -> f64 {
        let role_instances = match self.hint_vec(role_vertex) {
            Some(types) => types
                .iter()
                .map(|&t| self.stats.role_instances_transitive(self.schema, t))
                .sum::<u64>(),
            None => self
                .stats
                .role_instances_transitive(self.schema, self.schema.root(Kind::Role)),
        };
        let side = match self.hint_vec(source) {
            Some(types) => self.stats.instances_sum(self.schema, &types),
            None => [Kind::Entity, Kind::Relation]
                .into_iter()
                .map(|k| {
                    self.stats
                        .instances_transitive(self.schema, self.schema.root(k))
                })
                .sum(),
        };
        (role_instances as f64 / (side as f64).max(1.0)).max(0.01)
    }

    /// ROLEPLAYER: role instances of the allowed roles against the source
    fn role_player_cost(&self, roles: Option<&BTreeSet<TypeIid>>, source: VertexId) -> f64 {
        let role_instances = match roles {
            Some(set) => set
                .iter()
                .map(|&t| self.stats.role_instances_transitive(self.schema, t))
                .sum::<u64>(),
            None => self
                .stats
                .role_instances_transitive(self.schema, self.schema.root(Kind::Role)),
        };
        let side = match self.hint_vec(source) {
            Some(types) => self.stats.instances_sum(self.schema, &types),
            None => [Kind::Entity, Kind::Relation]
                .into_iter()
                .map(|k| {
                    self.stats
                        .instances_transitive(self.schema, self.schema.root(k))
                })
                .sum(),
        };
        (role_instances as f64 / (side as f64).max(1.0)).max(0.01)
    }

    /// Schema-degree costs for type edges
    fn schema_degree_cost(&self, vertex: VertexId, degree: SchemaDegree) -> f64 {
        let Some(types) = self.hint_vec(vertex) else {
            return self.schema.types().count() as f64;
        };
        let total: usize = types
            .iter()
            .map(|&t| match degree {
                SchemaDegree::Owns => self.schema.owns_transitive(t).len(),
                SchemaDegree::Plays => self.schema.plays_transitive(t).len(),
                SchemaDegree::Relates => self
                    .schema
                    .vertex(t)
                    .map_or(0, |v| v.relates.len()),
                SchemaDegree::OwnedBy => self
                    .schema
                    .types()
                    .filter(|v| v.owns.iter().any(|&(a, _)| a == t))
                    .count(),
                SchemaDegree::PlayedBy => self
                    .schema
                    .types()
                    .filter(|v| v.plays.contains(&t))
                    .count(),
                SchemaDegree::RelatedBy => self
                    .schema
                    .types()
                    .filter(|v| v.relates.contains(&t))
                    .count(),
            })
            .sum();
        (total as f64).max(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{StatisticsDelta, StatisticsManager};
    use crate::pattern::Conjunction;

    fn setup() -> (SchemaGraph, StatisticsManager) {
        let mut schema = SchemaGraph::new();
        schema.define_type("person", Kind::Entity).expect("defines");
        schema
            .define_attribute_type("name", crate::encoding::ValueKind::String)
            .expect("defines");
        schema.set_owns("person", "name", false).expect("owns");
        (schema, StatisticsManager::new())
    }

    #[test]
    fn test_isa_backward_tracks_instance_counts() {
        let (schema, manager) = setup();
        let person = schema.get("person").expect("exists").iid;

        let conj = Conjunction::build(|b| {
            let x = b.var("x");
            b.isa(x, "person");
        });
        let structure = Structure::project(&conj, &schema).expect("projects");
        let mut edges = PlannerEdge::build_all(&structure);

        let mut delta = StatisticsDelta::new();
        for _ in 0..100 {
            delta.thing_created(person);
        }
        manager.apply(&delta);
        let stats = manager.handle();
        let ctx = CostContext {
            schema: &schema,
            stats: &stats,
            structure: &structure,
        };
        for edge in &mut edges {
            edge.update_objective(&ctx);
        }
        let isa = &edges[0];
        // Forward isa is a constant-time type check; backward scans 100
        // instances
        assert!(isa.forward.cost < isa.backward.cost);
        assert!((isa.backward.cost - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_has_cost_is_mean_degree() {
        let (schema, manager) = setup();
        let person = schema.get("person").expect("exists").iid;
        let name = schema.get("name").expect("exists").iid;

        // 10 people, 20 has edges, 5 names
        let mut delta = StatisticsDelta::new();
        for _ in 0..10 {
            delta.thing_created(person);
        }
        for _ in 0..5 {
            delta.thing_created(name);
        }
        for _ in 0..20 {
            delta.has_created(person, name);
        }
        manager.apply(&delta);

        let conj = Conjunction::build(|b| {
            let x = b.var("x");
            b.isa(x, "person");
            let n = b.var("n");
            b.isa(n, "name");
            b.has(x, n);
        });
        let structure = Structure::project(&conj, &schema).expect("projects");
        let mut edges = PlannerEdge::build_all(&structure);
        let stats = manager.handle();
        let ctx = CostContext {
            schema: &schema,
            stats: &stats,
            structure: &structure,
        };
        for edge in &mut edges {
            edge.update_objective(&ctx);
        }
        let has = edges
            .iter()
            .find(|e| matches!(e.kind, EdgeKind::Has))
            .expect("has edge");
        assert!((has.forward.cost - 2.0).abs() < 1e-9); // 20 / 10
        assert!((has.backward.cost - 4.0).abs() < 1e-9); // 20 / 5
    }
}
