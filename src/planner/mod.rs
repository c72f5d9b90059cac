//! Traversal Planner
//!
//! Formulates traversal ordering as a mixed-integer program. Per structure
//! edge the model carries a selection binary for each direction, an order
//! position integer, and position-assignment binaries; per vertex it
//! carries start/end/in/out indicators. The objective weights each edge's
//! statistics-derived cost by `bf^(|E|-1-order)`, so expensive edges are
//! pushed late where the walk has already narrowed.
//!
//! Plans are cached against the statistics snapshot: an unchanged snapshot
//! returns the cached procedure in O(1) without touching the solver, and a
//! changed snapshot only re-solves when the recomputed costs cross the
//! configured staleness thresholds. Re-solves are warm-started from a
//! greedy seed so the solver always holds a feasible incumbent when the
//! deadline lands.
//!
//! The planner is a per-structure singleton: concurrent callers block on a
//! condvar latch until the optimising thread publishes the procedure.

pub mod edge;
pub mod solver;
pub mod vertex;

pub use edge::{CostContext, Directional, PlannerEdge};
pub use solver::{BranchAndBound, LinearModel, MipSolver, SolveStatus, Solution, VarId};
pub use vertex::PlannerVertex;

use crate::config::PlannerConfig;
use crate::error::{PlanningError, Result};
use crate::graph::{SchemaGraph, Statistics};
use crate::procedure::{Procedure, ProcedureEdge, ProcedureVertex};
use crate::structure::{Structure, VertexId};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Per-structure traversal planner with a cached plan
pub struct Planner {
    structure: Structure,
    edges: Vec<PlannerEdge>,
    config: PlannerConfig,
    solver: Arc<dyn MipSolver>,
    state: Mutex<PlanState>,
    latch: Condvar,
}

#[derive(Default)]
struct PlanState {
    /// Statistics snapshot the cached plan was validated against
    snapshot: Option<u64>,
    /// Per-directional costs recorded at the last solve
    recorded: Vec<f64>,
    total: f64,
    procedure: Option<Arc<Procedure>>,
    optimising: bool,
}

impl Planner {
    pub fn new(structure: Structure, config: PlannerConfig) -> Planner {
        Planner::with_solver(structure, config, Arc::new(BranchAndBound))
    }

    /// Inject a different MIP backend
    pub fn with_solver(
        structure: Structure,
        config: PlannerConfig,
        solver: Arc<dyn MipSolver>,
    ) -> Planner {
        let edges = PlannerEdge::build_all(&structure);
        Planner {
            structure,
            edges,
            config,
            solver,
            state: Mutex::new(PlanState::default()),
            latch: Condvar::new(),
        }
    }

    pub fn structure(&self) -> &Structure {
        &self.structure
    }

    /// Produce the traversal procedure, reusing the cached plan when the
    /// statistics allow it. `extended` requests the longer solve deadline.
    pub fn optimise(
        &self,
        schema: &SchemaGraph,
        stats: &Statistics,
        extended: bool,
    ) -> Result<Arc<Procedure>> {
        let mut state = self.state.lock();
        loop {
            if let Some(procedure) = &state.procedure {
                if state.snapshot == Some(stats.snapshot) {
                    trace!(snapshot = stats.snapshot, "plan cache hit");
                    return Ok(Arc::clone(procedure));
                }
            }
            if state.optimising {
                self.latch.wait(&mut state);
                continue;
            }
            break;
        }

        // Snapshot moved (or no plan yet): recompute the objective
        let costs = self.compute_costs(schema, stats);
        let total: f64 = costs.iter().sum();
        if let Some(procedure) = &state.procedure {
            if !self.out_of_date(&state, &costs, total) {
                debug!(
                    snapshot = stats.snapshot,
                    "statistics drifted below thresholds; keeping cached plan"
                );
                let procedure = Arc::clone(procedure);
                state.snapshot = Some(stats.snapshot);
                return Ok(procedure);
            }
        }

        state.optimising = true;
        drop(state);

        let outcome = self.solve(schema, stats, &costs, extended);

        let mut state = self.state.lock();
        state.optimising = false;
        match outcome {
            Ok(procedure) => {
                state.procedure = Some(Arc::clone(&procedure));
                state.snapshot = Some(stats.snapshot);
                state.recorded = costs;
                state.total = total;
                self.latch.notify_all();
                Ok(procedure)
            }
            Err(err) => {
                self.latch.notify_all();
                Err(err)
            }
        }
    }

    /// Flattened per-directional costs: index 2·edge for forward,
    /// 2·edge+1 for backward
    fn compute_costs(&self, schema: &SchemaGraph, stats: &Statistics) -> Vec<f64> {
        let ctx = CostContext {
            schema,
            stats,
            structure: &self.structure,
        };
        let mut edges = self.edges.clone();
        let mut costs = Vec::with_capacity(edges.len() * 2);
        for edge in &mut edges {
            edge.update_objective(&ctx);
            costs.push(edge.forward.cost);
            costs.push(edge.backward.cost);
        }
        costs
    }

    fn out_of_date(&self, state: &PlanState, next: &[f64], total_next: f64) -> bool {
        if state.recorded.len() != next.len() {
            return true;
        }
        let total_prev = state.total.max(f64::MIN_POSITIVE);
        if ((total_next - state.total).abs() / total_prev) >= self.config.total_cost_change {
            return true;
        }
        state.recorded.iter().zip(next).any(|(&prev, &cost)| {
            cost / prev.max(f64::MIN_POSITIVE) >= self.config.edge_cost_change
                && cost / total_prev >= self.config.edge_cost_share
        })
    }

    fn directionals(&self) -> Vec<&Directional> {
        let mut dirs = Vec::with_capacity(self.edges.len() * 2);
        for edge in &self.edges {
            dirs.push(&edge.forward);
            dirs.push(&edge.backward);
        }
        dirs
    }

    fn solve(
        &self,
        schema: &SchemaGraph,
        stats: &Statistics,
        costs: &[f64],
        extended: bool,
    ) -> Result<Arc<Procedure>> {
        let dirs = self.directionals();
        let num_edges = self.edges.len();

        // Edgeless structures need no solver: the single vertex is the plan
        if num_edges == 0 {
            let start = self
                .cheapest_vertex(schema, stats)
                .unwrap_or(VertexId(0));
            return Ok(Arc::new(self.extract(&[], start)));
        }

        let branching = stats
            .branching_factor(schema)
            .clamp(self.config.branching_factor_min, self.config.branching_factor_max);
        let seed = self.greedy_seed(schema, stats, &dirs, costs);
        let (model, vars) = self.build_model(&dirs, costs, branching, &seed);

        let deadline = if extended {
            Duration::from_millis(self.config.extended_time_limit_ms)
        } else {
            Duration::from_millis(self.config.time_limit_ms)
        };
        let solution = self.solver.solve(&model, deadline);
        debug!(
            status = ?solution.status,
            objective = solution.objective,
            edges = num_edges,
            "planner solve finished"
        );
        if !solution.status.is_usable() {
            return Err(PlanningError::UnexpectedPlanningError {
                status: format!("{:?}", solution.status),
                model_dump: model.dump(),
            }
            .into());
        }

        // Selected directionals in ascending order position
        let mut selected: Vec<(i64, usize)> = dirs
            .iter()
            .enumerate()
            .filter(|(d, _)| solution.values[vars.x[*d].0] == 1)
            .map(|(d, _)| (solution.values[vars.o[d].0], d))
            .collect();
        selected.sort_unstable();
        let ordered: Vec<usize> = selected.into_iter().map(|(_, d)| d).collect();

        let start = vars
            .start
            .iter()
            .position(|v| solution.values[v.0] == 1)
            .map(VertexId)
            .or_else(|| ordered.first().map(|&d| dirs[d].from))
            .unwrap_or(VertexId(0));

        let ordered_dirs: Vec<&Directional> = ordered.iter().map(|&d| dirs[d]).collect();
        let procedure = self.extract(&ordered_dirs, start);
        debug_assert!(procedure.is_valid_walk());
        Ok(Arc::new(procedure))
    }

    fn cheapest_vertex(&self, schema: &SchemaGraph, stats: &Statistics) -> Option<VertexId> {
        PlannerVertex::build_all(&self.structure, schema, stats)
            .into_iter()
            .min_by(|a, b| {
                a.start_cost
                    .partial_cmp(&b.start_cost)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.id.cmp(&b.id))
            })
            .map(|v| v.id)
    }

    /// Greedy BFS from the cheapest vertex, edges by ascending recorded
    /// cost. Ties prefer the forward direction, then declaration order;
    /// backward directionals that close onto an already-visited target
    /// are skipped in the seed.
    ///
    /// The seed must satisfy the model's order-sequence constraint, so
    /// closure edges (both endpoints already visited) are oriented toward
    /// the later-visited endpoint and the final order sorts every edge
    /// before its target's outgoing edges.
    fn greedy_seed(
        &self,
        schema: &SchemaGraph,
        stats: &Statistics,
        dirs: &[&Directional],
        costs: &[f64],
    ) -> Seed {
        let start = self.cheapest_vertex(schema, stats).unwrap_or(VertexId(0));
        let mut visited: HashSet<VertexId> = HashSet::from([start]);
        let mut rank: HashMap<VertexId, usize> = HashMap::from([(start, 0)]);
        let mut used_edges: HashSet<usize> = HashSet::new();
        let mut order: Vec<usize> = Vec::new();

        while used_edges.len() < self.edges.len() {
            let candidate = dirs
                .iter()
                .enumerate()
                .filter(|(_, d)| !used_edges.contains(&d.edge) && visited.contains(&d.from))
                .filter(|(_, d)| d.forward || !visited.contains(&d.to))
                .min_by(|(i, a), (j, b)| {
                    costs[*i]
                        .partial_cmp(&costs[*j])
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then(b.forward.cmp(&a.forward))
                        .then(a.edge.cmp(&b.edge))
                })
                .map(|(i, _)| i);
            let Some(mut chosen) = candidate else {
                break; // disconnected remainder; the MIP will reject it
            };
            if visited.contains(&dirs[chosen].to) {
                // Closure: point at the later-visited endpoint so the walk
                // order stays consistent
                let counterpart = chosen ^ 1;
                if rank[&dirs[chosen].to] < rank[&dirs[chosen].from] {
                    chosen = counterpart;
                }
            } else {
                rank.insert(dirs[chosen].to, rank.len());
            }
            used_edges.insert(dirs[chosen].edge);
            visited.insert(dirs[chosen].to);
            order.push(chosen);
        }
        // Every edge into a vertex precedes that vertex's outgoing edges
        let mut indexed: Vec<(usize, usize)> = order
            .iter()
            .enumerate()
            .map(|(i, &d)| (i, d))
            .collect();
        indexed.sort_by_key(|&(i, d)| (rank.get(&dirs[d].to).copied().unwrap_or(usize::MAX), i));
        let order: Vec<usize> = indexed.into_iter().map(|(_, d)| d).collect();
        Seed { start, order }
    }

    fn build_model(
        &self,
        dirs: &[&Directional],
        costs: &[f64],
        branching: f64,
        seed: &Seed,
    ) -> (LinearModel, ModelVars) {
        let num_edges = self.edges.len();
        let num_vertices = self.structure.vertices().len();
        let big_m = num_edges as f64;
        let mut model = LinearModel::new();

        let x: Vec<VarId> = (0..dirs.len())
            .map(|d| model.binary(format!("x_{d}")))
            .collect();
        let o: Vec<VarId> = (0..dirs.len())
            .map(|d| model.integer(format!("o_{d}"), 0, num_edges as i64))
            .collect();
        let a: Vec<Vec<VarId>> = (0..dirs.len())
            .map(|d| {
                (0..num_edges)
                    .map(|i| model.binary(format!("a_{d}_{i}")))
                    .collect()
            })
            .collect();
        let start: Vec<VarId> = (0..num_vertices)
            .map(|v| model.binary(format!("start_{v}")))
            .collect();
        let end: Vec<VarId> = (0..num_vertices)
            .map(|v| model.binary(format!("end_{v}")))
            .collect();
        let inn: Vec<VarId> = (0..num_vertices)
            .map(|v| model.binary(format!("in_{v}")))
            .collect();
        let out: Vec<VarId> = (0..num_vertices)
            .map(|v| model.binary(format!("out_{v}")))
            .collect();

        // (1) exactly one starting vertex
        model.equality(start.iter().map(|&v| (v, 1.0)).collect(), 1.0);

        // (2) exactly one direction per pattern edge
        for e in 0..num_edges {
            model.equality(vec![(x[2 * e], 1.0), (x[2 * e + 1], 1.0)], 1.0);
        }

        // (3) vertex flow indicators; an ending vertex has no outgoing
        for (d, dir) in dirs.iter().enumerate() {
            model.constraint(
                vec![(out[dir.from.0], 1.0), (x[d], -1.0)],
                0.0,
                f64::INFINITY,
            );
            model.constraint(
                vec![(inn[dir.to.0], 1.0), (x[d], -1.0)],
                0.0,
                f64::INFINITY,
            );
            model.constraint(
                vec![(end[dir.from.0], 1.0), (x[d], 1.0)],
                f64::NEG_INFINITY,
                1.0,
            );
        }

        // (4) every vertex is the start or the target of a selected edge
        for v in 0..num_vertices {
            let mut terms = vec![(start[v], 1.0)];
            for (d, dir) in dirs.iter().enumerate() {
                if dir.to.0 == v {
                    terms.push((x[d], 1.0));
                }
            }
            model.constraint(terms, 1.0, f64::INFINITY);
        }

        // (5) order sequence: an edge leaving v follows every selected
        // edge entering v, unless v is an ending vertex
        for (d, dir) in dirs.iter().enumerate() {
            for (d2, dir2) in dirs.iter().enumerate() {
                if dir2.from != dir.to || dir2.edge == dir.edge {
                    continue;
                }
                // o_d2 - o_d - M·x_d - M·x_d2 + M·end_v >= 1 - 2M
                model.constraint(
                    vec![
                        (o[d2], 1.0),
                        (o[d], -1.0),
                        (x[d], -big_m),
                        (x[d2], -big_m),
                        (end[dir.to.0], big_m),
                    ],
                    1.0 - 2.0 * big_m,
                    f64::INFINITY,
                );
            }
        }

        // (6) position assignment linked to selection and order
        for d in 0..dirs.len() {
            let mut sum_terms: Vec<(VarId, f64)> =
                a[d].iter().map(|&v| (v, 1.0)).collect();
            sum_terms.push((x[d], -1.0));
            model.equality(sum_terms, 0.0);

            let mut order_terms: Vec<(VarId, f64)> = a[d]
                .iter()
                .enumerate()
                .map(|(i, &v)| (v, i as f64))
                .collect();
            order_terms.push((o[d], -1.0));
            model.equality(order_terms, 0.0);
        }

        // (7) exactly one edge per order position
        for i in 0..num_edges {
            model.equality((0..dirs.len()).map(|d| (a[d][i], 1.0)).collect(), 1.0);
        }

        // Objective: cost(e) · bf^(|E|-1-order(e))
        for (d, &cost) in costs.iter().enumerate() {
            for i in 0..num_edges {
                let weight = branching.powi((num_edges - 1 - i) as i32);
                model.objective(a[d][i], cost * weight);
            }
        }

        // Warm start from the greedy seed
        let mut seeded_x = vec![0i64; dirs.len()];
        for (pos, &d) in seed.order.iter().enumerate() {
            seeded_x[d] = 1;
            model.hint(o[d], pos as i64);
            for i in 0..num_edges {
                model.hint(a[d][i], i64::from(i == pos));
            }
        }
        for (d, &sel) in seeded_x.iter().enumerate() {
            model.hint(x[d], sel);
            if sel == 0 {
                model.hint(o[d], 0);
                for i in 0..num_edges {
                    model.hint(a[d][i], 0);
                }
            }
        }
        for v in 0..num_vertices {
            let has_out = seed
                .order
                .iter()
                .any(|&d| dirs[d].from.0 == v);
            let has_in = seed.order.iter().any(|&d| dirs[d].to.0 == v);
            model.hint(start[v], i64::from(v == seed.start.0));
            model.hint(out[v], i64::from(has_out));
            model.hint(inn[v], i64::from(has_in));
            model.hint(end[v], i64::from(!has_out));
        }

        (
            model,
            ModelVars {
                x,
                o,
                start,
            },
        )
    }

    fn extract(&self, ordered: &[&Directional], start: VertexId) -> Procedure {
        let vertices: Vec<ProcedureVertex> = self
            .structure
            .vertices()
            .iter()
            .map(|v| ProcedureVertex {
                id: v.id,
                variable: v.variable,
                reference: v.reference.clone(),
                props: v.props.clone(),
                is_start: v.id == start,
            })
            .collect();
        let edges: Vec<ProcedureEdge> = ordered
            .iter()
            .enumerate()
            .map(|(order, dir)| ProcedureEdge {
                from: dir.from,
                to: dir.to,
                kind: self.edges[dir.edge].kind.clone(),
                forward: dir.forward,
                order,
            })
            .collect();
        Procedure::new(vertices, edges, start)
    }
}

struct Seed {
    start: VertexId,
    order: Vec<usize>,
}

struct ModelVars {
    x: Vec<VarId>,
    o: Vec<VarId>,
    start: Vec<VarId>,
}
