//! Rule resolution by iterative materialisation.
//!
//! From the query's concludables the resolver closes over the rules whose
//! heads unify (transitively through rule bodies), then materialises
//! exactly that closure into an inferred-fact overlay on top of the
//! transaction snapshot, iterating to fixpoint. Memoisation by
//! (rule, bound head arguments) short-circuits re-application; derived
//! facts are content-addressed (attributes by value, relations by type
//! plus role-player set, has edges by key), so recursive rule sets
//! converge. A pass budget bounds divergence.

use super::concludable::Concludable;
use super::rule::{Rule, RuleHead};
use super::unify::unify;
use crate::answer::ConceptMap;
use crate::encoding::{ThingIid, TypeIid};
use crate::error::{ReasoningError, Result};
use crate::graph::thing_graph::{attribute_get, scan_instances, scan_role_player_edges, DataGraph};
use crate::graph::{SchemaGraph, Statistics};
use crate::pattern::Conjunction;
use crate::storage::ReadableStorage;
use crate::traversal::{TraversalEngine, TraversalOptions};
use crate::encoding::Infix;
use crate::executor::TraversalContext;
use std::collections::HashSet;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tracing::debug;

/// The reasoner's output: a read view including inferred facts, and the
/// set of things the rules materialised
pub struct InferenceResult {
    pub view: Arc<dyn ReadableStorage>,
    pub inferred: Arc<HashSet<ThingIid>>,
}

/// Materialise the rule closure relevant to `query` over `base`
pub fn resolve(
    engine: &TraversalEngine,
    base: Arc<dyn ReadableStorage>,
    schema: Arc<SchemaGraph>,
    stats: &Statistics,
    rules: &[Rule],
    query: &Conjunction,
    key_counter: Arc<AtomicU64>,
    budget: usize,
) -> Result<InferenceResult> {
    let relevant = relevant_rules(rules, query, &schema);
    if relevant.is_empty() {
        return Ok(InferenceResult {
            view: base,
            inferred: Arc::new(HashSet::new()),
        });
    }
    debug!(rules = relevant.len(), "materialising rule closure");

    let mut data = DataGraph::new(
        Arc::clone(&base),
        key_counter,
        Arc::new(dashmap::DashMap::new()),
    );
    let mut inferred: HashSet<ThingIid> = HashSet::new();
    let mut memo: HashSet<(usize, String)> = HashSet::new();
    let mut passes = 0;

    loop {
        if passes >= budget {
            return Err(ReasoningError::ReasoningBudgetExceeded { budget }.into());
        }
        passes += 1;
        let mut changed = false;

        let view = data.freeze_view();
        let ctx = TraversalContext::new(Arc::clone(&view), Arc::clone(&schema));
        for &rule_index in &relevant {
            let rule = &rules[rule_index];
            let answers: Vec<ConceptMap> = engine
                .answers(&ctx, stats, &rule.when, TraversalOptions::default())?
                .collect::<Result<Vec<_>>>()?;
            for answer in answers {
                let key = binding_key(&answer);
                if memo.contains(&(rule_index, key.clone())) {
                    continue;
                }
                let applied = apply_head(rule, &answer, &schema, &mut data, &mut inferred)?;
                memo.insert((rule_index, key));
                changed |= applied;
            }
        }
        if !changed {
            break;
        }
    }
    debug!(passes, inferred = inferred.len(), "reasoning reached fixpoint");

    Ok(InferenceResult {
        view: data.freeze_view(),
        inferred: Arc::new(inferred),
    })
}

/// The transitive closure of rules whose heads unify with the query's
/// concludables, through the rules' own bodies
fn relevant_rules(rules: &[Rule], query: &Conjunction, schema: &SchemaGraph) -> Vec<usize> {
    let mut relevant: Vec<usize> = Vec::new();
    let mut frontier: Vec<Concludable> = Concludable::create_conjunction(query);
    // Negation and disjunction bodies can also trigger rules
    for negation in query.negations() {
        frontier.extend(Concludable::create_conjunction(negation));
    }
    for branches in query.disjunctions() {
        for branch in branches {
            frontier.extend(Concludable::create_conjunction(branch));
        }
    }
    while let Some(concludable) = frontier.pop() {
        for (i, rule) in rules.iter().enumerate() {
            if relevant.contains(&i) {
                continue;
            }
            if !unify(&concludable, rule, schema).is_empty() {
                relevant.push(i);
                frontier.extend(rule.when_concludables());
            }
        }
    }
    relevant.sort_unstable();
    relevant
}

/// Canonical memo key of one body answer. Keyed on the full answer, not
/// just the head variables, so heads that mint fresh instances (isa
/// insertions) produce one instance per distinct body answer.
fn binding_key(answer: &ConceptMap) -> String {
    let mut parts: Vec<String> = answer
        .iter()
        .map(|(name, concept)| match concept {
            crate::graph::Concept::Thing(t) => format!("{name}={}", t.iid),
            crate::graph::Concept::Type(t) => format!("{name}={}", t.iid),
        })
        .collect();
    parts.sort();
    parts.join("|")
}

fn thing_of<'a>(answer: &'a ConceptMap, name: &str) -> Option<&'a ThingIid> {
    answer.get(name).and_then(|c| c.as_thing()).map(|t| &t.iid)
}

/// Apply a rule head to one body answer. Existence checks run against the
/// live overlay so two answers in one pass cannot derive the same fact
/// twice. Returns whether anything new was materialised.
fn apply_head(
    rule: &Rule,
    answer: &ConceptMap,
    schema: &SchemaGraph,
    data: &mut DataGraph,
    inferred: &mut HashSet<ThingIid>,
) -> Result<bool> {
    let view = data.freeze_view();
    let view = &*view;
    match &rule.head {
        RuleHead::Relation {
            relation_label,
            role_players,
        } => {
            let relation_type = schema.expect(&relation_label.scoped_name())?;
            let mut players: Vec<(TypeIid, ThingIid)> = Vec::new();
            for (role_label, player_name) in role_players {
                let role = schema.expect(&role_label.scoped_name())?;
                let Some(player) = thing_of(answer, player_name) else {
                    return Ok(false);
                };
                players.push((role.iid, player.clone()));
            }
            if find_relation(view, relation_type.iid, &players).is_some() {
                return Ok(false);
            }
            let relation = data.create_relation(relation_type)?;
            inferred.insert(relation.clone());
            for (role, player) in &players {
                let role_instance = data.put_role_player(&relation, *role, player)?;
                inferred.insert(role_instance);
            }
            Ok(true)
        }

        RuleHead::HasVariable { owner, attribute } => {
            let (Some(owner_iid), Some(attr_iid)) =
                (thing_of(answer, owner), thing_of(answer, attribute))
            else {
                return Ok(false);
            };
            let edge = crate::encoding::thing_edge_key(owner_iid, Infix::Has, attr_iid);
            if view.get(&edge).is_some() {
                return Ok(false);
            }
            let owner_iid = owner_iid.clone();
            let attr_iid = attr_iid.clone();
            data.put_has(&owner_iid, &attr_iid)?;
            Ok(true)
        }

        RuleHead::HasConcrete {
            owner,
            attribute_label,
            value,
        } => {
            let attr_type = schema.expect(&attribute_label.scoped_name())?;
            let Some(owner_iid) = thing_of(answer, owner).cloned() else {
                return Ok(false);
            };
            let existing = attribute_get(view, attr_type.iid, value);
            let attr_iid = match existing {
                Some(iid) => iid,
                None => {
                    let iid = data.put_attribute(attr_type, value)?;
                    inferred.insert(iid.clone());
                    iid
                }
            };
            let edge = crate::encoding::thing_edge_key(&owner_iid, Infix::Has, &attr_iid);
            if view.get(&edge).is_some() {
                return Ok(false);
            }
            data.put_has(&owner_iid, &attr_iid)?;
            Ok(true)
        }

        RuleHead::Isa {
            variable: _,
            type_label,
        } => {
            // One fresh instance per distinct body answer; the memo keyed
            // on the body bindings prevents regeneration
            let vertex = schema.expect(&type_label.scoped_name())?;
            let thing = match vertex.kind {
                crate::graph::Kind::Relation => data.create_relation(vertex)?,
                _ => data.create_entity(vertex)?,
            };
            inferred.insert(thing);
            Ok(true)
        }
    }
}

/// An existing relation of `relation_type` whose role-player set equals
/// `players`, if any
fn find_relation(
    view: &dyn ReadableStorage,
    relation_type: TypeIid,
    players: &[(TypeIid, ThingIid)],
) -> Option<ThingIid> {
    let mut wanted: Vec<(TypeIid, ThingIid)> = players.to_vec();
    wanted.sort();
    for candidate in scan_instances(view, relation_type) {
        let mut found: Vec<(TypeIid, ThingIid)> =
            scan_role_player_edges(view, &candidate, Infix::RolePlayer).collect();
        found.sort();
        if found == wanted {
            return Some(candidate);
        }
    }
    None
}
