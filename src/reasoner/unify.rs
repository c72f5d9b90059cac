//! Unification between query concludables and rule heads.
//!
//! A unifier is a variable renaming plus compatibility checks: a rule only
//! unifies with a concludable when the head's type set intersects the
//! concludable's hint set (closed under subtyping), value comparators are
//! compatible, and for relations every query role player maps injectively
//! onto a head role player with a compatible role.

use super::concludable::Concludable;
use super::rule::{Rule, RuleHead};
use crate::graph::{Label, SchemaGraph};
use std::collections::BTreeSet;

/// A variable renaming from the query fragment into the rule
#[derive(Debug, Clone)]
pub struct Unifier {
    pub rule: String,
    /// (query variable name or synthetic slot, rule body variable name)
    pub mapping: Vec<(String, String)>,
}

/// All unifiers between a query concludable and a rule's head
pub fn unify(concludable: &Concludable, rule: &Rule, schema: &SchemaGraph) -> Vec<Unifier> {
    match (concludable, &rule.head) {
        (Concludable::Isa { types, values, .. }, head) => {
            let produced = match head {
                RuleHead::Relation { relation_label, .. } => Some(relation_label.clone()),
                RuleHead::Isa { type_label, .. } => Some(type_label.clone()),
                RuleHead::HasConcrete {
                    attribute_label, ..
                } => Some(attribute_label.clone()),
                RuleHead::HasVariable { .. } => None,
            };
            let Some(produced) = produced else {
                return Vec::new();
            };
            if !type_compatible(types, &produced, schema) {
                return Vec::new();
            }
            // A value-constrained isa only unifies with a head producing a
            // satisfying concrete value
            if !values.is_empty() {
                match head {
                    RuleHead::HasConcrete { value, .. } => {
                        if !values.iter().all(|(cmp, v)| cmp.test(value, v)) {
                            return Vec::new();
                        }
                    }
                    _ => return Vec::new(),
                }
            }
            vec![Unifier {
                rule: rule.label.clone(),
                mapping: Vec::new(),
            }]
        }

        (
            Concludable::Has {
                attribute_types,
                values,
                ..
            },
            RuleHead::HasVariable { owner, attribute },
        ) => {
            // The head attribute ranges over whatever the body binds; type
            // compatibility is resolved at materialisation
            let _ = values;
            vec![Unifier {
                rule: rule.label.clone(),
                mapping: vec![
                    ("owner".to_string(), owner.clone()),
                    ("attribute".to_string(), attribute.clone()),
                ],
            }]
            .into_iter()
            .filter(|_| {
                attribute_types.is_empty()
                    || body_attribute_may_match(attribute_types, rule, attribute, schema)
            })
            .collect()
        }

        (
            Concludable::Has {
                attribute_types,
                values,
                ..
            },
            RuleHead::HasConcrete {
                owner,
                attribute_label,
                value,
            },
        ) => {
            if !attribute_types.is_empty()
                && !type_compatible(attribute_types, attribute_label, schema)
            {
                return Vec::new();
            }
            if !values.iter().all(|(cmp, v)| cmp.test(value, v)) {
                return Vec::new();
            }
            vec![Unifier {
                rule: rule.label.clone(),
                mapping: vec![("owner".to_string(), owner.clone())],
            }]
        }

        (
            Concludable::Relation {
                types,
                role_players,
                ..
            },
            RuleHead::Relation {
                relation_label,
                role_players: head_players,
            },
        ) => {
            if !types.is_empty() && !type_compatible(types, relation_label, schema) {
                return Vec::new();
            }
            // Injective assignments of query role players onto head slots
            let mut unifiers = Vec::new();
            let mut assignment = Vec::new();
            assign_role_players(
                role_players,
                head_players,
                schema,
                0,
                &mut assignment,
                &mut unifiers,
                &rule.label,
            );
            unifiers
        }

        // Bare value concludables never unify: rule-head value assertions
        // are unsupported
        (Concludable::Value { .. }, _) => Vec::new(),

        _ => Vec::new(),
    }
}

/// Does the head's produced label fall inside the hint set (closed under
/// subtyping)?
fn type_compatible(hints: &BTreeSet<Label>, produced: &Label, schema: &SchemaGraph) -> bool {
    if hints.is_empty() {
        return true;
    }
    let Some(produced_vertex) = schema.get(&produced.scoped_name()) else {
        return false;
    };
    hints.iter().any(|hint| {
        schema
            .get(&hint.scoped_name())
            .map(|v| schema.subtypes_transitive(v.iid).contains(&produced_vertex.iid))
            .unwrap_or(false)
    })
}

/// For has-variable heads: can any attribute type the body allows for the
/// head attribute fall inside the query's hint set?
fn body_attribute_may_match(
    hints: &BTreeSet<Label>,
    rule: &Rule,
    attribute_name: &str,
    schema: &SchemaGraph,
) -> bool {
    // The body's isa on the attribute variable, when present, decides
    let body_types: Vec<Label> = rule
        .when
        .named_variables()
        .filter(|v| v.reference.name() == Some(attribute_name))
        .flat_map(|v| {
            super::concludable::Concludable::create_conjunction(&rule.when)
                .into_iter()
                .filter_map(move |c| match c {
                    Concludable::Isa {
                        variable, types, ..
                    } if variable == v.id => Some(types),
                    _ => None,
                })
        })
        .flatten()
        .collect();
    if body_types.is_empty() {
        return true;
    }
    body_types
        .iter()
        .any(|t| type_compatible(hints, t, schema) || hint_overlaps(hints, t, schema))
}

/// Symmetric overlap: the body type may be a supertype of a hint
fn hint_overlaps(hints: &BTreeSet<Label>, body_type: &Label, schema: &SchemaGraph) -> bool {
    let Some(body_vertex) = schema.get(&body_type.scoped_name()) else {
        return false;
    };
    let body_subtypes = schema.subtypes_transitive(body_vertex.iid);
    hints.iter().any(|hint| {
        schema
            .get(&hint.scoped_name())
            .map(|v| body_subtypes.contains(&v.iid))
            .unwrap_or(false)
    })
}

fn roles_compatible(
    query_roles: Option<&BTreeSet<Label>>,
    head_role: &Label,
    schema: &SchemaGraph,
) -> bool {
    match query_roles {
        None => true,
        Some(set) => type_compatible(set, head_role, schema),
    }
}

#[allow(clippy::too_many_arguments)]
fn assign_role_players(
    query: &[super::concludable::ConcludableRolePlayer],
    head: &[(Label, String)],
    schema: &SchemaGraph,
    index: usize,
    assignment: &mut Vec<usize>,
    unifiers: &mut Vec<Unifier>,
    rule_label: &str,
) {
    if index == query.len() {
        let mapping = assignment
            .iter()
            .enumerate()
            .map(|(q, &h)| (format!("player_{q}"), head[h].1.clone()))
            .collect();
        unifiers.push(Unifier {
            rule: rule_label.to_string(),
            mapping,
        });
        return;
    }
    for (h, (role_label, _)) in head.iter().enumerate() {
        if assignment.contains(&h) {
            continue;
        }
        if !roles_compatible(query[index].roles.as_ref(), role_label, schema) {
            continue;
        }
        assignment.push(h);
        assign_role_players(query, head, schema, index + 1, assignment, unifiers, rule_label);
        assignment.pop();
    }
}
