//! Pattern constraints.
//!
//! Constraints are a tagged variant per owner partition: thing variables
//! carry isa/has/relation/value/iid/is, type variables carry label/sub/
//! owns/plays/relates/value-kind/regex/abstract. Every constraint holds a
//! back-reference to its owning variable.

use super::variable::VariableId;
use crate::encoding::{ThingIid, Value, ValueKind};
use crate::graph::Label;
use std::collections::BTreeSet;
use std::fmt;

/// Value comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparator {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Comparator {
    /// Apply the comparator; non-comparable kinds never satisfy it
    pub fn test(self, lhs: &Value, rhs: &Value) -> bool {
        use std::cmp::Ordering;
        match lhs.compare(rhs) {
            None => false,
            Some(ord) => match self {
                Comparator::Eq => ord == Ordering::Equal,
                Comparator::Neq => ord != Ordering::Equal,
                Comparator::Lt => ord == Ordering::Less,
                Comparator::Lte => ord != Ordering::Greater,
                Comparator::Gt => ord == Ordering::Greater,
                Comparator::Gte => ord != Ordering::Less,
            },
        }
    }

    /// Comparators compatible for unification: an answer satisfying
    /// `self` must be able to satisfy `other`
    pub fn compatible_with(self, other: Comparator) -> bool {
        match (self, other) {
            (a, b) if a == b => true,
            (Comparator::Eq, Comparator::Lte | Comparator::Gte) => true,
            (Comparator::Lt, Comparator::Lte) => true,
            (Comparator::Gt, Comparator::Gte) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Comparator::Eq => "=",
            Comparator::Neq => "!=",
            Comparator::Lt => "<",
            Comparator::Lte => "<=",
            Comparator::Gt => ">",
            Comparator::Gte => ">=",
        };
        write!(f, "{symbol}")
    }
}

/// Right-hand side of a value constraint
#[derive(Debug, Clone, PartialEq)]
pub enum ValueOperand {
    Constant(Value),
    Variable(VariableId),
}

/// The role of a role-player entry: a set of allowed role labels, a role
/// type variable, or unspecified (any role of the relation type)
#[derive(Debug, Clone, PartialEq)]
pub enum RoleRef {
    Labels(BTreeSet<Label>),
    Variable(VariableId),
}

/// One role-player entry of a relation constraint
#[derive(Debug, Clone, PartialEq)]
pub struct RolePlayer {
    pub role: Option<RoleRef>,
    pub player: VariableId,
}

/// A constraint attached to a pattern variable
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    // -------- thing constraints --------
    /// `$x isa T` (explicit: no subtype widening)
    Isa {
        owner: VariableId,
        type_: VariableId,
        explicit: bool,
    },
    /// `$x has $a`
    Has {
        owner: VariableId,
        attribute: VariableId,
    },
    /// `$r (role: $x, ...)`
    Relation {
        owner: VariableId,
        role_players: Vec<RolePlayer>,
    },
    /// `$x <cmp> operand`
    Value {
        owner: VariableId,
        comparator: Comparator,
        operand: ValueOperand,
    },
    /// `$x iid 0x...`
    Iid { owner: VariableId, iid: ThingIid },
    /// `$x is $y`
    Is { owner: VariableId, other: VariableId },

    // -------- type constraints --------
    /// `$t type person`
    Label { owner: VariableId, label: Label },
    /// `$t sub $s` (explicit: direct subtypes only)
    Sub {
        owner: VariableId,
        supertype: VariableId,
        explicit: bool,
    },
    /// `$t owns $a`
    Owns {
        owner: VariableId,
        attribute: VariableId,
        is_key: bool,
    },
    /// `$t plays $r`
    Plays { owner: VariableId, role: VariableId },
    /// `$t relates $r`
    Relates { owner: VariableId, role: VariableId },
    /// `$t value long`
    ValueKindIs { owner: VariableId, kind: ValueKind },
    /// `$t regex "..."`
    RegexIs { owner: VariableId, pattern: String },
    /// `$t abstract`
    Abstract { owner: VariableId },
}

impl Constraint {
    /// The variable this constraint is attached to
    pub fn owner(&self) -> VariableId {
        match self {
            Constraint::Isa { owner, .. }
            | Constraint::Has { owner, .. }
            | Constraint::Relation { owner, .. }
            | Constraint::Value { owner, .. }
            | Constraint::Iid { owner, .. }
            | Constraint::Is { owner, .. }
            | Constraint::Label { owner, .. }
            | Constraint::Sub { owner, .. }
            | Constraint::Owns { owner, .. }
            | Constraint::Plays { owner, .. }
            | Constraint::Relates { owner, .. }
            | Constraint::ValueKindIs { owner, .. }
            | Constraint::RegexIs { owner, .. }
            | Constraint::Abstract { owner } => *owner,
        }
    }

    /// Variables referenced besides the owner
    pub fn other_variables(&self) -> Vec<VariableId> {
        match self {
            Constraint::Isa { type_, .. } => vec![*type_],
            Constraint::Has { attribute, .. } => vec![*attribute],
            Constraint::Relation { role_players, .. } => role_players
                .iter()
                .flat_map(|rp| {
                    let mut vars = vec![rp.player];
                    if let Some(RoleRef::Variable(role)) = &rp.role {
                        vars.push(*role);
                    }
                    vars
                })
                .collect(),
            Constraint::Value {
                operand: ValueOperand::Variable(other),
                ..
            } => vec![*other],
            Constraint::Is { other, .. } => vec![*other],
            Constraint::Sub { supertype, .. } => vec![*supertype],
            Constraint::Owns { attribute, .. } => vec![*attribute],
            Constraint::Plays { role, .. } | Constraint::Relates { role, .. } => vec![*role],
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparator_semantics() {
        assert!(Comparator::Eq.test(&Value::Long(3), &Value::Long(3)));
        assert!(Comparator::Lt.test(&Value::Long(2), &Value::Double(2.5)));
        assert!(Comparator::Gte.test(&Value::String("b".into()), &Value::String("a".into())));
        // Non-comparable kinds fail every comparator
        assert!(!Comparator::Neq.test(&Value::Long(1), &Value::Bool(true)));
    }

    #[test]
    fn test_comparator_unification_compatibility() {
        assert!(Comparator::Eq.compatible_with(Comparator::Eq));
        assert!(Comparator::Eq.compatible_with(Comparator::Lte));
        assert!(!Comparator::Lt.compatible_with(Comparator::Gt));
    }
}
