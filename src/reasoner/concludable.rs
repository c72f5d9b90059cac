//! Concludables: pattern fragments a rule head could produce.
//!
//! `create_conjunction` builds the absorbing form used for rule bodies and
//! query conjunctions: a relation constraint absorbs its variable's isa, a
//! has constraint absorbs the attribute's isa and value, remaining isas
//! absorb their owner's value predicates, and only then do leftover value
//! constraints stand alone. `create_head` enumerates a head pattern's
//! assertions without absorption.

use crate::encoding::Value;
use crate::graph::Label;
use crate::pattern::{
    Comparator, Conjunction, Constraint, RolePlayer, RoleRef, ValueOperand, VariableId,
};
use std::collections::BTreeSet;

/// One concludable fragment
#[derive(Debug, Clone)]
pub enum Concludable {
    /// `$x isa T` (with any value predicates on $x folded in)
    Isa {
        variable: VariableId,
        types: BTreeSet<Label>,
        values: Vec<(Comparator, Value)>,
    },
    /// `$x has $a` (with the attribute's isa/value folded in)
    Has {
        owner: VariableId,
        attribute: VariableId,
        attribute_types: BTreeSet<Label>,
        values: Vec<(Comparator, Value)>,
    },
    /// `(role: $x, ...) isa R`
    Relation {
        relation: VariableId,
        types: BTreeSet<Label>,
        role_players: Vec<ConcludableRolePlayer>,
    },
    /// A value constraint on a variable without an isa
    Value {
        variable: VariableId,
        comparator: Comparator,
        value: Value,
    },
}

/// Role-player slot of a relation concludable
#[derive(Debug, Clone)]
pub struct ConcludableRolePlayer {
    pub player: VariableId,
    pub roles: Option<BTreeSet<Label>>,
}

impl Concludable {
    pub fn is_isa(&self) -> bool {
        matches!(self, Concludable::Isa { .. })
    }

    pub fn is_has(&self) -> bool {
        matches!(self, Concludable::Has { .. })
    }

    pub fn is_relation(&self) -> bool {
        matches!(self, Concludable::Relation { .. })
    }

    pub fn is_value(&self) -> bool {
        matches!(self, Concludable::Value { .. })
    }

    /// Absorbing construction over a body or query conjunction
    pub fn create_conjunction(conjunction: &Conjunction) -> Vec<Concludable> {
        let mut out = Vec::new();
        let mut absorbed_isa_owners: Vec<VariableId> = Vec::new();
        let mut absorbed_value_owners: Vec<VariableId> = Vec::new();

        // Relations first: they absorb their own variable's isa
        for constraint in conjunction.constraints() {
            if let Constraint::Relation {
                owner,
                role_players,
            } = constraint
            {
                absorbed_isa_owners.push(*owner);
                out.push(Concludable::Relation {
                    relation: *owner,
                    types: isa_labels(conjunction, *owner),
                    role_players: role_players
                        .iter()
                        .map(|rp| to_concludable_role_player(rp))
                        .collect(),
                });
            }
        }

        // Has: absorbs the attribute's isa and value predicates
        for constraint in conjunction.constraints() {
            if let Constraint::Has { owner, attribute } = constraint {
                absorbed_isa_owners.push(*attribute);
                absorbed_value_owners.push(*attribute);
                out.push(Concludable::Has {
                    owner: *owner,
                    attribute: *attribute,
                    attribute_types: isa_labels(conjunction, *attribute),
                    values: constant_values(conjunction, *attribute),
                });
            }
        }

        // Remaining isas absorb their owner's value predicates
        for constraint in conjunction.constraints() {
            if let Constraint::Isa { owner, .. } = constraint {
                if absorbed_isa_owners.contains(owner) {
                    continue;
                }
                absorbed_isa_owners.push(*owner);
                absorbed_value_owners.push(*owner);
                out.push(Concludable::Isa {
                    variable: *owner,
                    types: isa_labels(conjunction, *owner),
                    values: constant_values(conjunction, *owner),
                });
            }
        }

        // Leftover value constraints
        for constraint in conjunction.constraints() {
            if let Constraint::Value {
                owner,
                comparator,
                operand: ValueOperand::Constant(value),
            } = constraint
            {
                if absorbed_value_owners.contains(owner) {
                    continue;
                }
                out.push(Concludable::Value {
                    variable: *owner,
                    comparator: *comparator,
                    value: value.clone(),
                });
            }
        }
        out
    }

    /// Per-assertion construction over a head pattern: no absorption, but
    /// value predicates folded into has attributes do not stand alone
    pub fn create_head(then: &Conjunction) -> Vec<Concludable> {
        let mut out = Vec::new();
        let has_attributes: Vec<VariableId> = then
            .constraints()
            .iter()
            .filter_map(|c| match c {
                Constraint::Has { attribute, .. } => Some(*attribute),
                _ => None,
            })
            .collect();

        for constraint in then.constraints() {
            match constraint {
                Constraint::Relation {
                    owner,
                    role_players,
                } => out.push(Concludable::Relation {
                    relation: *owner,
                    types: isa_labels(then, *owner),
                    role_players: role_players
                        .iter()
                        .map(|rp| to_concludable_role_player(rp))
                        .collect(),
                }),
                Constraint::Has { owner, attribute } => out.push(Concludable::Has {
                    owner: *owner,
                    attribute: *attribute,
                    attribute_types: isa_labels(then, *attribute),
                    values: constant_values(then, *attribute),
                }),
                Constraint::Isa { owner, .. } => out.push(Concludable::Isa {
                    variable: *owner,
                    types: isa_labels(then, *owner),
                    values: constant_values(then, *owner),
                }),
                Constraint::Value {
                    owner,
                    comparator,
                    operand: ValueOperand::Constant(value),
                } if !has_attributes.contains(owner) => out.push(Concludable::Value {
                    variable: *owner,
                    comparator: *comparator,
                    value: value.clone(),
                }),
                _ => {}
            }
        }
        out
    }
}

fn to_concludable_role_player(rp: &RolePlayer) -> ConcludableRolePlayer {
    ConcludableRolePlayer {
        player: rp.player,
        roles: match &rp.role {
            Some(RoleRef::Labels(labels)) => Some(labels.clone()),
            _ => None,
        },
    }
}

/// Labels fixed by isa constraints on a variable
fn isa_labels(conjunction: &Conjunction, variable: VariableId) -> BTreeSet<Label> {
    let mut labels = BTreeSet::new();
    for constraint in conjunction.constraints() {
        if let Constraint::Isa { owner, type_, .. } = constraint {
            if *owner != variable {
                continue;
            }
            for c2 in conjunction.constraints() {
                if let Constraint::Label { owner, label } = c2 {
                    if owner == type_ {
                        labels.insert(label.clone());
                    }
                }
            }
        }
    }
    labels
}

/// Constant value predicates on a variable
fn constant_values(conjunction: &Conjunction, variable: VariableId) -> Vec<(Comparator, Value)> {
    conjunction
        .constraints()
        .iter()
        .filter_map(|c| match c {
            Constraint::Value {
                owner,
                comparator,
                operand: ValueOperand::Constant(value),
            } if *owner == variable => Some((*comparator, value.clone())),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absorption_on_body() {
        // { $x isa milk; $a 10 isa age-in-days } -> 2 isa concludables
        let conj = Conjunction::build(|b| {
            let x = b.var("x");
            b.isa(x, "milk");
            let a = b.var("a");
            b.isa(a, "age-in-days");
            b.value(a, Comparator::Eq, Value::Long(10));
        });
        let concludables = Concludable::create_conjunction(&conj);
        assert_eq!(concludables.iter().filter(|c| c.is_isa()).count(), 2);
        assert_eq!(concludables.iter().filter(|c| c.is_value()).count(), 0);

        // The bound value is folded into its isa
        let with_value = concludables
            .iter()
            .find_map(|c| match c {
                Concludable::Isa { values, .. } if !values.is_empty() => Some(values.clone()),
                _ => None,
            })
            .expect("one isa carries the value");
        assert_eq!(with_value, vec![(Comparator::Eq, Value::Long(10))]);
    }

    #[test]
    fn test_lone_value_stands_alone() {
        let conj = Conjunction::build(|b| {
            let a = b.var("a");
            b.value(a, Comparator::Gt, Value::Long(5));
        });
        let concludables = Concludable::create_conjunction(&conj);
        assert_eq!(concludables.len(), 1);
        assert!(concludables[0].is_value());
    }
}
