//! Pattern Normal Form
//!
//! The query surface parser (an external collaborator) produces patterns
//! in this normal form: a [`Conjunction`] owning an arena of typed
//! variables with constraints, plus nested negations and disjunctions.
//! The [`ConjunctionBuilder`] constructs patterns programmatically.
//!
//! ## Example
//!
//! ```
//! use typegraph::pattern::Conjunction;
//!
//! // { $x isa person; $x has name $n; }
//! let pattern = Conjunction::build(|b| {
//!     let x = b.var("x");
//!     b.isa(x, "person");
//!     let n = b.var("n");
//!     b.isa(n, "name");
//!     b.has(x, n);
//! });
//! assert_eq!(pattern.named_variables().count(), 2);
//! ```

pub mod constraint;
pub mod variable;

pub use constraint::{Comparator, Constraint, RolePlayer, RoleRef, ValueOperand};
pub use variable::{Reference, Variable, VariableId, VariableKind};

use crate::encoding::{ThingIid, Value, ValueKind};
use crate::graph::Label;
use std::collections::{BTreeSet, HashMap};

/// A conjunction of constraints over an arena of variables, with nested
/// negations and disjunctions
#[derive(Debug, Clone, Default)]
pub struct Conjunction {
    variables: Vec<Variable>,
    constraints: Vec<Constraint>,
    negations: Vec<Conjunction>,
    disjunctions: Vec<Vec<Conjunction>>,
}

impl Conjunction {
    /// Build a conjunction through the builder API
    pub fn build(f: impl FnOnce(&mut ConjunctionBuilder)) -> Conjunction {
        let mut builder = ConjunctionBuilder::new();
        f(&mut builder);
        builder.finish()
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable(&self, id: VariableId) -> &Variable {
        &self.variables[id.0]
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Constraints owned by one variable
    pub fn constraints_of(&self, id: VariableId) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter().filter(move |c| c.owner() == id)
    }

    pub fn negations(&self) -> &[Conjunction] {
        &self.negations
    }

    pub fn disjunctions(&self) -> &[Vec<Conjunction>] {
        &self.disjunctions
    }

    /// Variables retrievable in answers
    pub fn named_variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables
            .iter()
            .filter(|v| v.reference.is_retrievable())
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// A copy with the answer's named bindings pinned: bound thing
    /// variables gain an `iid` constraint, bound type variables a label
    /// constraint. Used to evaluate negations and rule bodies under an
    /// outer answer.
    pub fn with_bound_answer(&self, answer: &crate::answer::ConceptMap) -> Conjunction {
        let mut bound = self.clone();
        for variable in &self.variables {
            let Some(name) = variable.reference.name() else {
                continue;
            };
            let Some(concept) = answer.get(name) else {
                continue;
            };
            match concept {
                crate::graph::Concept::Thing(thing) => {
                    bound.constraints.push(Constraint::Iid {
                        owner: variable.id,
                        iid: thing.iid.clone(),
                    });
                }
                crate::graph::Concept::Type(type_concept) => {
                    bound.constraints.push(Constraint::Label {
                        owner: variable.id,
                        label: type_concept.label.clone(),
                    });
                }
            }
        }
        bound
    }

    /// Merge one branch from each disjunction into the core conjunction,
    /// joining variables by name. The result carries no disjunctions.
    pub fn merge_branches(&self, branches: &[&Conjunction]) -> Conjunction {
        let mut merged = self.clone();
        merged.disjunctions.clear();
        for branch in branches {
            let mut remap: HashMap<VariableId, VariableId> = HashMap::new();
            for variable in &branch.variables {
                let existing = merged.variables.iter().find(|v| match (&v.reference, &variable.reference) {
                    (Reference::Name(a), Reference::Name(b)) => a == b,
                    (Reference::Label(a), Reference::Label(b)) => a == b,
                    _ => false,
                });
                let id = match existing {
                    Some(v) => v.id,
                    None => {
                        let id = VariableId(merged.variables.len());
                        let reference = match &variable.reference {
                            // Re-number anonymous variables to avoid clashes
                            Reference::Anon(n) => Reference::Anon(n + 10_000),
                            other => other.clone(),
                        };
                        merged.variables.push(Variable {
                            id,
                            reference,
                            kind: variable.kind,
                        });
                        id
                    }
                };
                remap.insert(variable.id, id);
            }
            for constraint in &branch.constraints {
                merged.constraints.push(remap_constraint(constraint, &remap));
            }
            for negation in &branch.negations {
                merged.negations.push(negation.clone());
            }
        }
        merged
    }
}

fn remap_constraint(constraint: &Constraint, remap: &HashMap<VariableId, VariableId>) -> Constraint {
    let m = |id: &VariableId| remap.get(id).copied().unwrap_or(*id);
    match constraint {
        Constraint::Isa {
            owner,
            type_,
            explicit,
        } => Constraint::Isa {
            owner: m(owner),
            type_: m(type_),
            explicit: *explicit,
        },
        Constraint::Has { owner, attribute } => Constraint::Has {
            owner: m(owner),
            attribute: m(attribute),
        },
        Constraint::Relation {
            owner,
            role_players,
        } => Constraint::Relation {
            owner: m(owner),
            role_players: role_players
                .iter()
                .map(|rp| RolePlayer {
                    role: rp.role.as_ref().map(|r| match r {
                        RoleRef::Labels(labels) => RoleRef::Labels(labels.clone()),
                        RoleRef::Variable(v) => RoleRef::Variable(m(v)),
                    }),
                    player: m(&rp.player),
                })
                .collect(),
        },
        Constraint::Value {
            owner,
            comparator,
            operand,
        } => Constraint::Value {
            owner: m(owner),
            comparator: *comparator,
            operand: match operand {
                ValueOperand::Constant(v) => ValueOperand::Constant(v.clone()),
                ValueOperand::Variable(v) => ValueOperand::Variable(m(v)),
            },
        },
        Constraint::Iid { owner, iid } => Constraint::Iid {
            owner: m(owner),
            iid: iid.clone(),
        },
        Constraint::Is { owner, other } => Constraint::Is {
            owner: m(owner),
            other: m(other),
        },
        Constraint::Label { owner, label } => Constraint::Label {
            owner: m(owner),
            label: label.clone(),
        },
        Constraint::Sub {
            owner,
            supertype,
            explicit,
        } => Constraint::Sub {
            owner: m(owner),
            supertype: m(supertype),
            explicit: *explicit,
        },
        Constraint::Owns {
            owner,
            attribute,
            is_key,
        } => Constraint::Owns {
            owner: m(owner),
            attribute: m(attribute),
            is_key: *is_key,
        },
        Constraint::Plays { owner, role } => Constraint::Plays {
            owner: m(owner),
            role: m(role),
        },
        Constraint::Relates { owner, role } => Constraint::Relates {
            owner: m(owner),
            role: m(role),
        },
        Constraint::ValueKindIs { owner, kind } => Constraint::ValueKindIs {
            owner: m(owner),
            kind: *kind,
        },
        Constraint::RegexIs { owner, pattern } => Constraint::RegexIs {
            owner: m(owner),
            pattern: pattern.clone(),
        },
        Constraint::Abstract { owner } => Constraint::Abstract { owner: m(owner) },
    }
}

/// Programmatic pattern construction
pub struct ConjunctionBuilder {
    variables: Vec<Variable>,
    constraints: Vec<Constraint>,
    negations: Vec<Conjunction>,
    disjunctions: Vec<Vec<Conjunction>>,
    names: HashMap<String, VariableId>,
    anon_counter: usize,
}

impl ConjunctionBuilder {
    pub fn new() -> ConjunctionBuilder {
        ConjunctionBuilder {
            variables: Vec::new(),
            constraints: Vec::new(),
            negations: Vec::new(),
            disjunctions: Vec::new(),
            names: HashMap::new(),
            anon_counter: 0,
        }
    }

    fn push_variable(&mut self, reference: Reference, kind: VariableKind) -> VariableId {
        let id = VariableId(self.variables.len());
        self.variables.push(Variable {
            id,
            reference,
            kind,
        });
        id
    }

    /// Named thing variable; repeated names return the same variable
    pub fn var(&mut self, name: &str) -> VariableId {
        if let Some(&id) = self.names.get(name) {
            return id;
        }
        let id = self.push_variable(Reference::Name(name.to_string()), VariableKind::Thing);
        self.names.insert(name.to_string(), id);
        id
    }

    /// Named type variable
    pub fn type_var(&mut self, name: &str) -> VariableId {
        if let Some(&id) = self.names.get(name) {
            return id;
        }
        let id = self.push_variable(Reference::Name(name.to_string()), VariableKind::Type);
        self.names.insert(name.to_string(), id);
        id
    }

    /// Anonymous thing variable
    pub fn anon(&mut self) -> VariableId {
        let id = self.anon_counter;
        self.anon_counter += 1;
        self.push_variable(Reference::Anon(id), VariableKind::Thing)
    }

    /// Type variable fixed to a label (`person` in variable position)
    pub fn label_var(&mut self, label: &str) -> VariableId {
        let key = format!("label:{label}");
        if let Some(&id) = self.names.get(&key) {
            return id;
        }
        let id = self.push_variable(Reference::Label(label.to_string()), VariableKind::Type);
        self.names.insert(key, id);
        self.constraints.push(Constraint::Label {
            owner: id,
            label: parse_label(label),
        });
        id
    }

    /// `$thing isa <label>` (transitive)
    pub fn isa(&mut self, thing: VariableId, type_label: &str) {
        let type_var = self.label_var(type_label);
        self.constraints.push(Constraint::Isa {
            owner: thing,
            type_: type_var,
            explicit: false,
        });
    }

    /// `$thing isa! <label>` (no subtype widening)
    pub fn isa_explicit(&mut self, thing: VariableId, type_label: &str) {
        let type_var = self.label_var(type_label);
        self.constraints.push(Constraint::Isa {
            owner: thing,
            type_: type_var,
            explicit: true,
        });
    }

    /// `$thing isa $type`
    pub fn isa_var(&mut self, thing: VariableId, type_var: VariableId) {
        self.constraints.push(Constraint::Isa {
            owner: thing,
            type_: type_var,
            explicit: false,
        });
    }

    /// `$owner has $attribute`
    pub fn has(&mut self, owner: VariableId, attribute: VariableId) {
        self.constraints.push(Constraint::Has { owner, attribute });
    }

    /// `$owner has <attr-label> <value>`: anonymous attribute variable
    /// with isa + value + has
    pub fn has_value(&mut self, owner: VariableId, attr_label: &str, value: Value) -> VariableId {
        let attr = self.anon();
        self.isa(attr, attr_label);
        self.value(attr, Comparator::Eq, value);
        self.has(owner, attr);
        attr
    }

    /// `$relation (role: $player, ...)`, roles by label
    pub fn rel(&mut self, relation: VariableId, players: &[(Option<&str>, VariableId)]) {
        let role_players = players
            .iter()
            .map(|(role, player)| RolePlayer {
                role: role.map(|r| {
                    RoleRef::Labels(BTreeSet::from([parse_label(r)]))
                }),
                player: *player,
            })
            .collect();
        self.constraints.push(Constraint::Relation {
            owner: relation,
            role_players,
        });
    }

    /// A role-player entry whose role is a type variable
    pub fn rel_role_var(
        &mut self,
        relation: VariableId,
        players: &[(VariableId, VariableId)],
    ) {
        let role_players = players
            .iter()
            .map(|(role, player)| RolePlayer {
                role: Some(RoleRef::Variable(*role)),
                player: *player,
            })
            .collect();
        self.constraints.push(Constraint::Relation {
            owner: relation,
            role_players,
        });
    }

    /// `$var <cmp> <constant>`
    pub fn value(&mut self, owner: VariableId, comparator: Comparator, value: Value) {
        self.constraints.push(Constraint::Value {
            owner,
            comparator,
            operand: ValueOperand::Constant(value),
        });
    }

    /// `$var <cmp> $other`
    pub fn value_var(&mut self, owner: VariableId, comparator: Comparator, other: VariableId) {
        self.constraints.push(Constraint::Value {
            owner,
            comparator,
            operand: ValueOperand::Variable(other),
        });
    }

    /// `$var iid <iid>`
    pub fn iid(&mut self, owner: VariableId, iid: ThingIid) {
        self.constraints.push(Constraint::Iid { owner, iid });
    }

    /// `$a is $b`
    pub fn is(&mut self, owner: VariableId, other: VariableId) {
        self.constraints.push(Constraint::Is { owner, other });
    }

    /// `$sub sub $super`
    pub fn sub(&mut self, subtype: VariableId, supertype: VariableId, explicit: bool) {
        self.constraints.push(Constraint::Sub {
            owner: subtype,
            supertype,
            explicit,
        });
    }

    /// `$owner owns $attribute`
    pub fn owns(&mut self, owner: VariableId, attribute: VariableId, is_key: bool) {
        self.constraints.push(Constraint::Owns {
            owner,
            attribute,
            is_key,
        });
    }

    /// `$player plays $role`
    pub fn plays(&mut self, player: VariableId, role: VariableId) {
        self.constraints.push(Constraint::Plays {
            owner: player,
            role,
        });
    }

    /// `$relation relates $role`
    pub fn relates(&mut self, relation: VariableId, role: VariableId) {
        self.constraints.push(Constraint::Relates {
            owner: relation,
            role,
        });
    }

    /// `$type value <kind>`
    pub fn value_kind(&mut self, owner: VariableId, kind: ValueKind) {
        self.constraints.push(Constraint::ValueKindIs { owner, kind });
    }

    /// `$type regex <pattern>`
    pub fn regex(&mut self, owner: VariableId, pattern: &str) {
        self.constraints.push(Constraint::RegexIs {
            owner,
            pattern: pattern.to_string(),
        });
    }

    /// Nested negation: answers matching it are excluded. The negation
    /// owns its own variable arena; variables join the outer pattern by
    /// name at evaluation time.
    pub fn not(&mut self, f: impl FnOnce(&mut ConjunctionBuilder)) {
        let mut inner = ConjunctionBuilder::new();
        f(&mut inner);
        self.negations.push(inner.finish());
    }

    /// Disjunction of alternative branches
    pub fn or(&mut self, branches: Vec<Conjunction>) {
        self.disjunctions.push(branches);
    }

    pub fn finish(self) -> Conjunction {
        Conjunction {
            variables: self.variables,
            constraints: self.constraints,
            negations: self.negations,
            disjunctions: self.disjunctions,
        }
    }
}

impl Default for ConjunctionBuilder {
    fn default() -> Self {
        ConjunctionBuilder::new()
    }
}

/// Parse `scope:name` role labels; plain labels stay unscoped
fn parse_label(label: &str) -> Label {
    match label.split_once(':') {
        Some((scope, name)) => Label::scoped(scope, name),
        None => Label::of(label),
    }
}
