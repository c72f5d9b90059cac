//! Traversal Engine
//!
//! Shared evaluation pipeline: project a conjunction onto its structure,
//! split connected components, plan each component (with a per-fingerprint
//! plan cache), execute the procedures, and combine component answers as a
//! cartesian product. Negations run as sub-traversals required to be
//! empty; disjunctions as unions of branch traversals.
//!
//! Planners are cached by structure fingerprint, so repeated queries with
//! the same shape reuse plans across transactions; the planner itself
//! decides staleness against the statistics snapshot.

use crate::answer::ConceptMap;
use crate::config::PlannerConfig;
use crate::error::Result;
use crate::executor::{parallel::parallel_traverse, GraphIterator, TraversalContext};
use crate::graph::{Concept, Statistics};
use crate::pattern::Conjunction;
use crate::planner::Planner;
use crate::structure::Structure;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Shared traversal pipeline with a plan cache
pub struct TraversalEngine {
    config: PlannerConfig,
    planners: DashMap<u64, Arc<Planner>>,
}

/// Per-query execution options the engine cares about
#[derive(Debug, Clone, Copy, Default)]
pub struct TraversalOptions {
    pub parallel: bool,
    pub num_threads: usize,
    /// Ask the planner for its extended solve deadline
    pub extended_planning: bool,
}

impl TraversalEngine {
    pub fn new(config: PlannerConfig) -> TraversalEngine {
        TraversalEngine {
            config,
            planners: DashMap::new(),
        }
    }

    /// Number of distinct structures planned so far
    pub fn cached_plans(&self) -> usize {
        self.planners.len()
    }

    fn planner_for(&self, structure: Structure) -> Arc<Planner> {
        let fingerprint = structure.fingerprint();
        self.planners
            .entry(fingerprint)
            .or_insert_with(|| Arc::new(Planner::new(structure, self.config.clone())))
            .clone()
    }

    /// Evaluate a conjunction to a lazy answer stream
    pub fn answers(
        &self,
        ctx: &TraversalContext,
        stats: &Statistics,
        conjunction: &Conjunction,
        options: TraversalOptions,
    ) -> Result<Box<dyn Iterator<Item = Result<ConceptMap>>>> {
        // Disjunctions: union over branches merged into the core
        if !conjunction.disjunctions().is_empty() {
            return self.disjunction_answers(ctx, stats, conjunction, options);
        }

        let structure = Structure::project(conjunction, &ctx.schema)?;
        let components = structure.split();

        // Plan and execute each component; the first stays lazy, the rest
        // are materialised for the cartesian product
        let mut iters: Vec<Box<dyn Iterator<Item = Result<ConceptMap>>>> = Vec::new();
        for (i, component) in components.into_iter().enumerate() {
            let planner = self.planner_for(component);
            let procedure = planner.optimise(&ctx.schema, stats, options.extended_planning)?;
            let iter: Box<dyn Iterator<Item = Result<ConceptMap>>> =
                if options.parallel && i == 0 {
                    Box::new(parallel_traverse(
                        procedure,
                        ctx.clone(),
                        options.num_threads,
                    ))
                } else {
                    Box::new(GraphIterator::new(procedure, ctx.clone()))
                };
            iters.push(iter);
        }

        let mut combined = combine_components(iters);

        // Negations: exclude answers whose bound sub-pattern matches
        if !conjunction.negations().is_empty() {
            let negations: Vec<Conjunction> = conjunction.negations().to_vec();
            let ctx = ctx.clone();
            let stats = stats.clone();
            let engine_config = self.config.clone();
            combined = Box::new(combined.filter(move |answer| {
                let Ok(answer) = answer else {
                    return true; // propagate errors
                };
                // A fresh engine per check keeps the closure self-contained;
                // negation sub-patterns are small
                let engine = TraversalEngine::new(engine_config.clone());
                for negation in &negations {
                    let bound = negation.with_bound_answer(answer);
                    match engine.answers(&ctx, &stats, &bound, TraversalOptions::default()) {
                        Ok(mut sub) => {
                            if sub.next().is_some() {
                                return false;
                            }
                        }
                        Err(_) => return false,
                    }
                }
                true
            }));
        }

        Ok(combined)
    }

    fn disjunction_answers(
        &self,
        ctx: &TraversalContext,
        stats: &Statistics,
        conjunction: &Conjunction,
        options: TraversalOptions,
    ) -> Result<Box<dyn Iterator<Item = Result<ConceptMap>>>> {
        // One branch from each disjunction; union over all combinations
        let mut combos: Vec<Vec<&Conjunction>> = vec![Vec::new()];
        for branches in conjunction.disjunctions() {
            let mut next = Vec::new();
            for combo in &combos {
                for branch in branches {
                    let mut extended = combo.clone();
                    extended.push(branch);
                    next.push(extended);
                }
            }
            combos = next;
        }

        let mut seen: Vec<BTreeMap<String, Concept>> = Vec::new();
        let mut all: Vec<Result<ConceptMap>> = Vec::new();
        for combo in combos {
            let merged = conjunction.merge_branches(&combo);
            let answers = self.answers(ctx, stats, &merged, options)?;
            for answer in answers {
                match answer {
                    Ok(map) => {
                        let key: BTreeMap<String, Concept> =
                            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                        if !seen.contains(&key) {
                            seen.push(key);
                            all.push(Ok(map));
                        }
                    }
                    Err(e) => all.push(Err(e)),
                }
            }
        }
        Ok(Box::new(all.into_iter()))
    }
}

/// Cartesian product of component answer streams. The first component
/// stays lazy; later components are buffered.
fn combine_components(
    mut iters: Vec<Box<dyn Iterator<Item = Result<ConceptMap>>>>,
) -> Box<dyn Iterator<Item = Result<ConceptMap>>> {
    let first = iters.remove(0);
    if iters.is_empty() {
        return first;
    }
    let mut buffered: Vec<Vec<ConceptMap>> = Vec::new();
    for iter in iters {
        let mut component = Vec::new();
        for answer in iter {
            match answer {
                Ok(map) => component.push(map),
                Err(e) => return Box::new(std::iter::once(Err(e))),
            }
        }
        if component.is_empty() {
            // One empty component empties the whole product
            return Box::new(std::iter::empty());
        }
        buffered.push(component);
    }
    Box::new(first.flat_map(move |answer| -> Vec<Result<ConceptMap>> {
        let Ok(base) = answer else {
            return vec![answer];
        };
        let mut products: Vec<BTreeMap<String, Concept>> = vec![base
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()];
        for component in &buffered {
            let mut next = Vec::new();
            for partial in &products {
                for extension in component {
                    let mut merged = partial.clone();
                    for (k, v) in extension.iter() {
                        merged.insert(k.clone(), v.clone());
                    }
                    next.push(merged);
                }
            }
            products = next;
        }
        products
            .into_iter()
            .map(|map| Ok(ConceptMap::new(map)))
            .collect()
    }))
}
