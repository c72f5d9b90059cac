//! Solver-agnostic mixed-integer model plus the built-in backend.
//!
//! The planner talks to its solver through a minimal capability surface:
//! declare bounded integer variables, add linear constraints, set a
//! minimisation objective, hint a warm start, solve under a deadline and
//! read the solution. Any MIP library supplying these operations can be
//! injected behind [`MipSolver`].
//!
//! The built-in [`BranchAndBound`] backend is a depth-first search with
//! activity-based bounds propagation and incumbent pruning. The warm-start
//! hint is dived first, so a feasible incumbent exists almost immediately
//! and a deadline expiry downgrades the result to `Feasible` rather than
//! losing it.

use std::fmt::Write as _;
use std::time::{Duration, Instant};

const EPS: f64 = 1e-6;

/// Index of a model variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId(pub usize);

#[derive(Debug, Clone)]
struct ModelVar {
    name: String,
    lo: i64,
    hi: i64,
}

/// `lo ≤ Σ coef·var ≤ hi`
#[derive(Debug, Clone)]
pub struct LinearConstraint {
    pub terms: Vec<(VarId, f64)>,
    pub lo: f64,
    pub hi: f64,
}

/// A bounded-integer linear program
#[derive(Debug, Clone, Default)]
pub struct LinearModel {
    vars: Vec<ModelVar>,
    constraints: Vec<LinearConstraint>,
    objective: Vec<f64>,
    hints: Vec<Option<i64>>,
}

impl LinearModel {
    pub fn new() -> LinearModel {
        LinearModel::default()
    }

    /// Declare a {0,1} variable
    pub fn binary(&mut self, name: impl Into<String>) -> VarId {
        self.integer(name, 0, 1)
    }

    /// Declare a bounded integer variable
    pub fn integer(&mut self, name: impl Into<String>, lo: i64, hi: i64) -> VarId {
        let id = VarId(self.vars.len());
        self.vars.push(ModelVar {
            name: name.into(),
            lo,
            hi,
        });
        self.objective.push(0.0);
        self.hints.push(None);
        id
    }

    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    /// Add `lo ≤ Σ terms ≤ hi`
    pub fn constraint(&mut self, terms: Vec<(VarId, f64)>, lo: f64, hi: f64) {
        self.constraints.push(LinearConstraint { terms, lo, hi });
    }

    /// Add `Σ terms = value`
    pub fn equality(&mut self, terms: Vec<(VarId, f64)>, value: f64) {
        self.constraint(terms, value, value);
    }

    /// Add to a variable's objective coefficient (minimisation)
    pub fn objective(&mut self, var: VarId, coef: f64) {
        self.objective[var.0] += coef;
    }

    /// Warm-start hint for one variable
    pub fn hint(&mut self, var: VarId, value: i64) {
        self.hints[var.0] = Some(value.clamp(self.vars[var.0].lo, self.vars[var.0].hi));
    }

    /// Human-readable dump attached to planning failures
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "minimise:");
        for (i, coef) in self.objective.iter().enumerate() {
            if coef.abs() > EPS {
                let _ = writeln!(out, "  {:+.4} {}", coef, self.vars[i].name);
            }
        }
        let _ = writeln!(out, "subject to:");
        for c in &self.constraints {
            let terms: Vec<String> = c
                .terms
                .iter()
                .map(|(v, coef)| format!("{:+.4} {}", coef, self.vars[v.0].name))
                .collect();
            let _ = writeln!(out, "  {} <= {} <= {}", c.lo, terms.join(" "), c.hi);
        }
        let _ = writeln!(out, "bounds:");
        for v in &self.vars {
            let _ = writeln!(out, "  {} in [{}, {}]", v.name, v.lo, v.hi);
        }
        out
    }
}

/// Terminal solver status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// Search space exhausted with an incumbent
    Optimal,
    /// Deadline expired with an incumbent
    Feasible,
    /// Search space exhausted without any solution
    Infeasible,
    /// Deadline expired before any solution was found
    Abnormal,
}

impl SolveStatus {
    pub fn is_usable(self) -> bool {
        matches!(self, SolveStatus::Optimal | SolveStatus::Feasible)
    }
}

/// Solver output
#[derive(Debug, Clone)]
pub struct Solution {
    pub status: SolveStatus,
    pub values: Vec<i64>,
    pub objective: f64,
}

/// The injected solver capability
pub trait MipSolver: Send + Sync {
    fn solve(&self, model: &LinearModel, time_limit: Duration) -> Solution;
}

/// Built-in depth-first branch-and-bound
#[derive(Debug, Default, Clone, Copy)]
pub struct BranchAndBound;

struct SearchState<'m> {
    model: &'m LinearModel,
    deadline: Instant,
    incumbent: Option<(Vec<i64>, f64)>,
    nodes: u64,
    timed_out: bool,
}

impl MipSolver for BranchAndBound {
    fn solve(&self, model: &LinearModel, time_limit: Duration) -> Solution {
        let mut state = SearchState {
            model,
            deadline: Instant::now() + time_limit,
            incumbent: None,
            nodes: 0,
            timed_out: false,
        };
        // A feasible hint assignment becomes the first incumbent, so the
        // warm start survives even an immediate deadline
        state.try_hint_incumbent();
        let bounds: Vec<(i64, i64)> = model.vars.iter().map(|v| (v.lo, v.hi)).collect();
        state.search(bounds);

        match (state.incumbent, state.timed_out) {
            (Some((values, objective)), false) => Solution {
                status: SolveStatus::Optimal,
                values,
                objective,
            },
            (Some((values, objective)), true) => Solution {
                status: SolveStatus::Feasible,
                values,
                objective,
            },
            (None, false) => Solution {
                status: SolveStatus::Infeasible,
                values: Vec::new(),
                objective: f64::INFINITY,
            },
            (None, true) => Solution {
                status: SolveStatus::Abnormal,
                values: Vec::new(),
                objective: f64::INFINITY,
            },
        }
    }
}

impl SearchState<'_> {
    fn try_hint_incumbent(&mut self) {
        if self.model.hints.iter().all(Option::is_none) {
            return;
        }
        let values: Vec<i64> = self
            .model
            .vars
            .iter()
            .zip(&self.model.hints)
            .map(|(var, hint)| hint.unwrap_or(var.lo).clamp(var.lo, var.hi))
            .collect();
        let feasible = self.model.constraints.iter().all(|c| {
            let activity: f64 = c
                .terms
                .iter()
                .map(|&(v, coef)| coef * values[v.0] as f64)
                .sum();
            activity >= c.lo - EPS && activity <= c.hi + EPS
        });
        if feasible {
            let objective = self.objective_value(&values);
            self.incumbent = Some((values, objective));
        }
    }

    fn search(&mut self, mut bounds: Vec<(i64, i64)>) {
        if !self.propagate(&mut bounds) {
            return;
        }
        self.dfs(bounds);
    }

    fn dfs(&mut self, bounds: Vec<(i64, i64)>) {
        self.nodes += 1;
        if self.nodes % 64 == 0 && Instant::now() >= self.deadline {
            self.timed_out = true;
        }
        if self.timed_out {
            return;
        }

        // Prune against the incumbent using the objective's lower bound
        if let Some((_, best)) = &self.incumbent {
            if self.objective_lower_bound(&bounds) >= *best - EPS {
                return;
            }
        }

        // Branch on the first unfixed variable, hint value first
        let branch_var = bounds.iter().position(|&(lo, hi)| lo < hi);
        let Some(var) = branch_var else {
            // All fixed: propagation kept it feasible, record the leaf
            let values: Vec<i64> = bounds.iter().map(|&(lo, _)| lo).collect();
            let objective = self.objective_value(&values);
            let better = match &self.incumbent {
                Some((_, best)) => objective < *best - EPS,
                None => true,
            };
            if better {
                self.incumbent = Some((values, objective));
            }
            return;
        };

        let (lo, hi) = bounds[var];
        let mut order: Vec<i64> = (lo..=hi).collect();
        if let Some(hint) = self.model.hints[var] {
            if let Some(pos) = order.iter().position(|&v| v == hint) {
                order.remove(pos);
                order.insert(0, hint);
            }
        }
        for value in order {
            if self.timed_out {
                return;
            }
            let mut child = bounds.clone();
            child[var] = (value, value);
            if self.propagate(&mut child) {
                self.dfs(child);
            }
        }
    }

    /// Activity-based bounds tightening. Returns false when some
    /// constraint cannot be satisfied within the bounds.
    fn propagate(&self, bounds: &mut [(i64, i64)]) -> bool {
        loop {
            let mut changed = false;
            for c in &self.model.constraints {
                let mut min_act = 0.0;
                let mut max_act = 0.0;
                for &(v, coef) in &c.terms {
                    let (lo, hi) = bounds[v.0];
                    if coef >= 0.0 {
                        min_act += coef * lo as f64;
                        max_act += coef * hi as f64;
                    } else {
                        min_act += coef * hi as f64;
                        max_act += coef * lo as f64;
                    }
                }
                if min_act > c.hi + EPS || max_act < c.lo - EPS {
                    return false;
                }
                for &(v, coef) in &c.terms {
                    if coef.abs() < EPS {
                        continue;
                    }
                    let (lo, hi) = bounds[v.0];
                    if lo == hi {
                        continue;
                    }
                    // Residual activity of the other terms
                    let (other_min, other_max) = if coef >= 0.0 {
                        (min_act - coef * lo as f64, max_act - coef * hi as f64)
                    } else {
                        (min_act - coef * hi as f64, max_act - coef * lo as f64)
                    };
                    let (mut new_lo, mut new_hi) = (lo, hi);
                    if coef > 0.0 {
                        // coef*v ≤ hi - other_min  and  coef*v ≥ lo - other_max
                        new_hi = new_hi.min(((c.hi - other_min) / coef + EPS).floor() as i64);
                        new_lo = new_lo.max(((c.lo - other_max) / coef - EPS).ceil() as i64);
                    } else {
                        new_hi = new_hi.min(((c.lo - other_max) / coef + EPS).floor() as i64);
                        new_lo = new_lo.max(((c.hi - other_min) / coef - EPS).ceil() as i64);
                    }
                    if new_lo > new_hi {
                        return false;
                    }
                    if new_lo > lo || new_hi < hi {
                        bounds[v.0] = (new_lo, new_hi);
                        changed = true;
                    }
                }
            }
            if !changed {
                return true;
            }
        }
    }

    fn objective_lower_bound(&self, bounds: &[(i64, i64)]) -> f64 {
        self.model
            .objective
            .iter()
            .enumerate()
            .map(|(i, &coef)| {
                let (lo, hi) = bounds[i];
                if coef >= 0.0 {
                    coef * lo as f64
                } else {
                    coef * hi as f64
                }
            })
            .sum()
    }

    fn objective_value(&self, values: &[i64]) -> f64 {
        self.model
            .objective
            .iter()
            .zip(values)
            .map(|(&coef, &v)| coef * v as f64)
            .sum()
    }
}
