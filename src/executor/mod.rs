//! Procedure Executor
//!
//! Depth-first evaluation of a procedure's ordered edge list. For each
//! edge in order the executor materialises candidate bindings for the
//! target vertex given the current partial answer, intersecting with the
//! vertex-local properties (types, iid, value predicates). Edges whose
//! target is already bound degenerate into closure checks.
//!
//! Answers are produced lazily through a pull-based iterator; dropping the
//! iterator releases the underlying storage view. A per-query cancellation
//! flag is checked at every yield.

mod instructions;
pub mod parallel;

use crate::answer::ConceptMap;
use crate::encoding::{ThingIid, TypeIid};
use crate::error::Result;
use crate::graph::{Concept, SchemaGraph, ThingConcept, TypeConcept};
use crate::procedure::Procedure;
use crate::storage::ReadableStorage;
use crate::structure::VertexId;
use instructions::{check_edge, start_candidates, target_candidates};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag shared across a query's iterators
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> CancelFlag {
        CancelFlag::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A vertex binding during traversal
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Binding {
    Thing(ThingIid),
    Type(TypeIid),
}

/// Everything a traversal needs to run
#[derive(Clone)]
pub struct TraversalContext {
    pub view: Arc<dyn ReadableStorage>,
    pub schema: Arc<SchemaGraph>,
    pub cancel: CancelFlag,
    /// Things materialised by the reasoner, flagged in answers
    pub inferred: Arc<HashSet<ThingIid>>,
}

impl TraversalContext {
    pub fn new(view: Arc<dyn ReadableStorage>, schema: Arc<SchemaGraph>) -> TraversalContext {
        TraversalContext {
            view,
            schema,
            cancel: CancelFlag::new(),
            inferred: Arc::new(HashSet::new()),
        }
    }

    fn concept(&self, binding: &Binding) -> Concept {
        match binding {
            Binding::Type(iid) => {
                let (label, kind) = self
                    .schema
                    .vertex(*iid)
                    .map(|v| (v.label.clone(), v.kind))
                    .unwrap_or((crate::graph::Label::of("?"), crate::graph::Kind::Entity));
                Concept::Type(TypeConcept {
                    iid: *iid,
                    label,
                    kind,
                })
            }
            Binding::Thing(iid) => {
                let type_label = self
                    .schema
                    .label_of(iid.type_iid())
                    .cloned()
                    .unwrap_or(crate::graph::Label::of("?"));
                Concept::Thing(ThingConcept {
                    iid: iid.clone(),
                    type_label,
                    inferred: self.inferred.contains(iid),
                })
            }
        }
    }
}

enum Step {
    /// Not yet started
    Init,
    /// Mid-walk; `depth` points at the position being extended
    Active,
    Done,
}

/// Pull-based depth-first traversal over one procedure
pub struct GraphIterator {
    procedure: Arc<Procedure>,
    ctx: TraversalContext,
    /// Optional restriction of the start vertex's candidates, used by the
    /// parallel producer to partition the search space
    start_restriction: Option<Vec<Binding>>,
    bindings: Vec<Option<Binding>>,
    /// Iterator per position: position 0 binds the start vertex, position
    /// i+1 runs edge i
    iters: Vec<Option<Box<dyn Iterator<Item = Binding>>>>,
    /// Which positions bound their vertex (closure positions do not)
    bound_here: Vec<Option<VertexId>>,
    depth: usize,
    step: Step,
}

impl GraphIterator {
    pub fn new(procedure: Arc<Procedure>, ctx: TraversalContext) -> GraphIterator {
        let positions = procedure.edges().len() + 1;
        let vertices = procedure.vertices().len();
        GraphIterator {
            procedure,
            ctx,
            start_restriction: None,
            bindings: vec![None; vertices],
            iters: (0..positions).map(|_| None).collect(),
            bound_here: vec![None; positions],
            depth: 0,
            step: Step::Init,
        }
    }

    /// Restrict the start vertex to the given candidates (parallel fan-out)
    pub fn with_start_restriction(mut self, candidates: Vec<Binding>) -> GraphIterator {
        self.start_restriction = Some(candidates);
        self
    }

    fn open_position(&mut self, position: usize) -> Box<dyn Iterator<Item = Binding>> {
        if position == 0 {
            if let Some(restriction) = &self.start_restriction {
                let start = self.procedure.start();
                let vertex = self.procedure.vertex(start).clone();
                let ctx = self.ctx.clone();
                let candidates: Vec<Binding> = restriction
                    .iter()
                    .filter(|b| instructions::check_props(&ctx, &vertex.props, b))
                    .cloned()
                    .collect();
                return Box::new(candidates.into_iter());
            }
            return start_candidates(&self.ctx, &self.procedure, self.procedure.start());
        }
        let edge = &self.procedure.edges()[position - 1];
        let source = self.bindings[edge.from.0]
            .clone()
            .expect("walk order guarantees the source is bound");
        match &self.bindings[edge.to.0] {
            Some(target) => {
                // Closure edge: at most one pass-through when the edge holds
                let holds = check_edge(&self.ctx, edge, &source, target);
                if holds {
                    Box::new(std::iter::once(target.clone()))
                } else {
                    Box::new(std::iter::empty())
                }
            }
            None => target_candidates(&self.ctx, &self.procedure, edge, &source),
        }
    }

    /// Two role-player slots of the same relation variable must consume
    /// distinct role-player edges: with intersecting role sets, their
    /// players may not coincide.
    fn role_player_distinct(&self, edge_index: usize, candidate: &Binding) -> bool {
        use crate::structure::EdgeKind;

        fn role_sets_intersect(
            a: &Option<std::collections::BTreeSet<TypeIid>>,
            b: &Option<std::collections::BTreeSet<TypeIid>>,
        ) -> bool {
            match (a, b) {
                (Some(x), Some(y)) => !x.is_disjoint(y),
                _ => true,
            }
        }

        let edge = &self.procedure.edges()[edge_index];
        let EdgeKind::RolePlayer { roles } = &edge.kind else {
            return true;
        };
        // The relation endpoint is the projected source
        let (relation_vertex, player_binding) = if edge.forward {
            (edge.from, Some(candidate))
        } else {
            (edge.to, self.bindings[edge.from.0].as_ref())
        };
        let Some(player_binding) = player_binding else {
            return true;
        };
        for (other_index, other) in self.procedure.edges().iter().enumerate() {
            if other_index == edge_index {
                continue;
            }
            let EdgeKind::RolePlayer { roles: other_roles } = &other.kind else {
                continue;
            };
            let other_relation = if other.forward { other.from } else { other.to };
            if other_relation != relation_vertex {
                continue;
            }
            if !role_sets_intersect(roles, other_roles) {
                continue;
            }
            let other_player_vertex = if other.forward { other.to } else { other.from };
            if let Some(other_player) = &self.bindings[other_player_vertex.0] {
                if other_player == player_binding {
                    return false;
                }
            }
        }
        true
    }

    fn emit(&self) -> ConceptMap {
        let mut map = BTreeMap::new();
        for vertex in self.procedure.vertices() {
            let Some(reference) = &vertex.reference else {
                continue;
            };
            let Some(name) = reference.name() else {
                continue;
            };
            if let Some(binding) = &self.bindings[vertex.id.0] {
                map.insert(name.to_string(), self.ctx.concept(binding));
            }
        }
        ConceptMap::new(map)
    }
}

impl Iterator for GraphIterator {
    type Item = Result<ConceptMap>;

    fn next(&mut self) -> Option<Self::Item> {
        if matches!(self.step, Step::Done) {
            return None;
        }
        if matches!(self.step, Step::Init) {
            self.step = Step::Active;
            self.depth = 0;
        }
        let positions = self.procedure.edges().len() + 1;
        loop {
            if self.ctx.cancel.is_cancelled() {
                self.step = Step::Done;
                return None;
            }
            // All positions satisfied: emit and backtrack for the next pull
            if self.depth == positions {
                let answer = self.emit();
                self.depth = positions - 1;
                return Some(Ok(answer));
            }

            if self.iters[self.depth].is_none() {
                let iter = self.open_position(self.depth);
                self.iters[self.depth] = Some(iter);
            }

            // Release the binding this position made for its previous
            // candidate before pulling the next one
            if let Some(vertex) = self.bound_here[self.depth].take() {
                self.bindings[vertex.0] = None;
            }

            let candidate = self.iters[self.depth]
                .as_mut()
                .and_then(|it| it.next());
            match candidate {
                Some(binding) => {
                    let target = if self.depth == 0 {
                        self.procedure.start()
                    } else {
                        self.procedure.edges()[self.depth - 1].to
                    };
                    if self.depth > 0 && !self.role_player_distinct(self.depth - 1, &binding) {
                        continue;
                    }
                    if self.bindings[target.0].is_none() {
                        self.bindings[target.0] = Some(binding);
                        self.bound_here[self.depth] = Some(target);
                    }
                    self.depth += 1;
                }
                None => {
                    // Exhausted: release this position and backtrack
                    self.iters[self.depth] = None;
                    if self.depth == 0 {
                        self.step = Step::Done;
                        return None;
                    }
                    self.depth -= 1;
                }
            }
        }
    }
}
