//! Planner-side vertex wrappers.
//!
//! Each structure vertex gets a retrieval-cost estimate used to choose the
//! greedy seed's starting point: an exact IID is a point lookup, a hinted
//! thing vertex costs its instance count, a type vertex its candidate
//! count.

use crate::graph::{SchemaGraph, Statistics};
use crate::structure::{Structure, StructureVertex, VertexId};

/// One structure vertex with its starting-cost estimate
#[derive(Debug, Clone)]
pub struct PlannerVertex {
    pub id: VertexId,
    pub start_cost: f64,
}

impl PlannerVertex {
    pub fn build_all(
        structure: &Structure,
        schema: &SchemaGraph,
        stats: &Statistics,
    ) -> Vec<PlannerVertex> {
        structure
            .vertices()
            .iter()
            .map(|v| PlannerVertex {
                id: v.id,
                start_cost: Self::estimate(v, schema, stats),
            })
            .collect()
    }

    fn estimate(vertex: &StructureVertex, schema: &SchemaGraph, stats: &Statistics) -> f64 {
        if vertex.props.iid.is_some() {
            return 1.0;
        }
        if let Some(types) = &vertex.props.types {
            if vertex.props.is_thing {
                let instances: u64 = types
                    .iter()
                    .map(|&t| stats.instances_transitive(schema, t))
                    .sum();
                // Value predicates narrow the scan considerably
                let narrowed = if vertex.props.predicates.is_empty() {
                    instances as f64
                } else {
                    (instances as f64).sqrt()
                };
                return narrowed.max(1.0);
            }
            return types.len() as f64;
        }
        if vertex.props.is_thing {
            // Unhinted thing: the whole instance space
            let total: u64 = [
                schema.root(crate::graph::Kind::Entity),
                schema.root(crate::graph::Kind::Relation),
                schema.root(crate::graph::Kind::Attribute),
            ]
            .into_iter()
            .map(|root| stats.instances_transitive(schema, root))
            .sum();
            (total as f64).max(1.0)
        } else {
            schema.types().count() as f64
        }
    }
}
