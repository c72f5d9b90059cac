//! Rule definitions.
//!
//! A rule pairs a `when` conjunction with a `then` head: exactly one of an
//! isa insertion, a has assertion (variable or concrete attribute), or a
//! relation with role players. A bare value head is rejected. From the
//! rule the core derives its two concludable sets: what the head can
//! produce (`then_concludables`) and what parts of the body other rules
//! could satisfy (`when_concludables`).

use super::concludable::Concludable;
use crate::encoding::Value;
use crate::error::{Result, SchemaError};
use crate::graph::{Kind, Label, SchemaGraph};
use crate::pattern::{Comparator, Conjunction, Constraint, RoleRef, ValueOperand, VariableId};

/// The normalised shape of a rule head
#[derive(Debug, Clone)]
pub enum RuleHead {
    /// `then { $x isa T }` where $x is new: one fresh instance per body
    /// answer
    Isa { variable: String, type_label: Label },
    /// `then { $x has $a }`: both bound in the body
    HasVariable { owner: String, attribute: String },
    /// `then { $x has <attr> <value> }`: content-addressed attribute
    HasConcrete {
        owner: String,
        attribute_label: Label,
        value: Value,
    },
    /// `then { (role: $x, ...) isa R }`: fresh relation per body answer
    Relation {
        relation_label: Label,
        /// (role label, body variable name)
        role_players: Vec<(Label, String)>,
    },
}

/// A named rule
#[derive(Debug, Clone)]
pub struct Rule {
    pub label: String,
    pub when: Conjunction,
    /// The head pattern as written (one thing variable, one constraint)
    pub then: Conjunction,
    pub head: RuleHead,
}

impl Rule {
    /// Validate and normalise a rule. The `then` conjunction must contain
    /// exactly one head assertion over one thing variable.
    pub fn new(
        label: &str,
        when: Conjunction,
        then: Conjunction,
        schema: &SchemaGraph,
    ) -> Result<Rule> {
        let head = Self::parse_head(label, &when, &then, schema)?;
        Ok(Rule {
            label: label.to_string(),
            when,
            then,
            head,
        })
    }

    fn illegal(label: &str, reason: &str) -> crate::error::TypeGraphError {
        SchemaError::IllegalRuleHead {
            rule: label.to_string(),
            reason: reason.to_string(),
        }
        .into()
    }

    fn parse_head(
        label: &str,
        when: &Conjunction,
        then: &Conjunction,
        schema: &SchemaGraph,
    ) -> Result<RuleHead> {
        let relations: Vec<&Constraint> = then
            .constraints()
            .iter()
            .filter(|c| matches!(c, Constraint::Relation { .. }))
            .collect();
        let hases: Vec<&Constraint> = then
            .constraints()
            .iter()
            .filter(|c| matches!(c, Constraint::Has { .. }))
            .collect();
        if relations.len() + hases.len() > 1 {
            return Err(Self::illegal(label, "more than one head assertion"));
        }

        let when_names: Vec<&str> = when
            .named_variables()
            .filter_map(|v| v.reference.name())
            .collect();

        if let Some(Constraint::Relation {
            owner,
            role_players,
        }) = relations.first()
        {
            if role_players.is_empty() {
                return Err(Self::illegal(label, "relation head without role players"));
            }
            let relation_label = Self::isa_label_of(then, *owner)
                .ok_or_else(|| Self::illegal(label, "relation head without an isa type"))?;
            let relation_type = schema.expect(&relation_label.scoped_name())?;
            if relation_type.kind != Kind::Relation {
                return Err(Self::illegal(label, "relation head type is not a relation"));
            }
            let mut players = Vec::new();
            for rp in role_players {
                let role_label = match &rp.role {
                    Some(RoleRef::Labels(labels)) if labels.len() == 1 => labels
                        .iter()
                        .next()
                        .cloned()
                        .expect("non-empty label set"),
                    _ => {
                        return Err(Self::illegal(
                            label,
                            "relation head roles must be single labels",
                        ))
                    }
                };
                schema.expect(&role_label.scoped_name())?;
                let player_name = then
                    .variable(rp.player)
                    .reference
                    .name()
                    .ok_or_else(|| {
                        Self::illegal(label, "relation head players must be named body variables")
                    })?
                    .to_string();
                if !when_names.contains(&player_name.as_str()) {
                    return Err(Self::illegal(label, "relation head player not bound in body"));
                }
                players.push((role_label, player_name));
            }
            return Ok(RuleHead::Relation {
                relation_label,
                role_players: players,
            });
        }

        if let Some(Constraint::Has { owner, attribute }) = hases.first() {
            let owner_name = then
                .variable(*owner)
                .reference
                .name()
                .ok_or_else(|| Self::illegal(label, "has head owner must be named"))?
                .to_string();
            if !when_names.contains(&owner_name.as_str()) {
                return Err(Self::illegal(label, "has head owner not bound in body"));
            }
            let attr_var = then.variable(*attribute);
            if let Some(attr_name) = attr_var.reference.name() {
                if !when_names.contains(&attr_name) {
                    return Err(Self::illegal(label, "has head attribute not bound in body"));
                }
                return Ok(RuleHead::HasVariable {
                    owner: owner_name,
                    attribute: attr_name.to_string(),
                });
            }
            // Anonymous attribute: requires isa + concrete value in the head
            let attribute_label = Self::isa_label_of(then, *attribute)
                .ok_or_else(|| Self::illegal(label, "has head attribute without a type"))?;
            let attr_type = schema.expect(&attribute_label.scoped_name())?;
            if attr_type.kind != Kind::Attribute {
                return Err(Self::illegal(label, "has head type is not an attribute"));
            }
            let value = Self::eq_value_of(then, *attribute)
                .ok_or_else(|| Self::illegal(label, "has head attribute without a value"))?;
            return Ok(RuleHead::HasConcrete {
                owner: owner_name,
                attribute_label,
                value,
            });
        }

        // No relation or has: a single isa insertion is the only remaining
        // legal head; a bare value assertion is rejected
        let isas: Vec<&Constraint> = then
            .constraints()
            .iter()
            .filter(|c| matches!(c, Constraint::Isa { .. }))
            .collect();
        if let [Constraint::Isa { owner, .. }] = isas.as_slice() {
            let type_label = Self::isa_label_of(then, *owner)
                .ok_or_else(|| Self::illegal(label, "isa head without a type label"))?;
            let vertex = schema.expect(&type_label.scoped_name())?;
            if vertex.kind == Kind::Role {
                return Err(Self::illegal(label, "isa head cannot insert a role"));
            }
            let variable = then
                .variable(*owner)
                .reference
                .name()
                .unwrap_or("_")
                .to_string();
            return Ok(RuleHead::Isa {
                variable,
                type_label,
            });
        }
        if then
            .constraints()
            .iter()
            .any(|c| matches!(c, Constraint::Value { .. }))
        {
            return Err(Self::illegal(label, "bare value heads are not supported"));
        }
        Err(Self::illegal(label, "head must assert isa, has or a relation"))
    }

    /// The label fixed by an isa constraint on `variable`, if any
    fn isa_label_of(conjunction: &Conjunction, variable: VariableId) -> Option<Label> {
        conjunction.constraints().iter().find_map(|c| match c {
            Constraint::Isa { owner, type_, .. } if *owner == variable => {
                conjunction.constraints().iter().find_map(|c2| match c2 {
                    Constraint::Label { owner, label } if owner == type_ => Some(label.clone()),
                    _ => None,
                })
            }
            _ => None,
        })
    }

    fn eq_value_of(conjunction: &Conjunction, variable: VariableId) -> Option<Value> {
        conjunction.constraints().iter().find_map(|c| match c {
            Constraint::Value {
                owner,
                comparator: Comparator::Eq,
                operand: ValueOperand::Constant(value),
            } if *owner == variable => Some(value.clone()),
            _ => None,
        })
    }

    /// Concludables of the body, with absorption: a relation absorbs its
    /// variable's isa, a has absorbs the attribute's isa and value,
    /// remaining isas absorb their owner's value predicates.
    pub fn when_concludables(&self) -> Vec<Concludable> {
        Concludable::create_conjunction(&self.when)
    }

    /// Concludables of the head pattern, one per assertion, without
    /// absorption.
    pub fn then_concludables(&self) -> Vec<Concludable> {
        Concludable::create_head(&self.then)
    }

    /// Names shared between body and head
    pub fn head_variable_names(&self) -> Vec<String> {
        match &self.head {
            RuleHead::Isa { variable, .. } => vec![variable.clone()],
            RuleHead::HasVariable { owner, attribute } => {
                vec![owner.clone(), attribute.clone()]
            }
            RuleHead::HasConcrete { owner, .. } => vec![owner.clone()],
            RuleHead::Relation { role_players, .. } => {
                role_players.iter().map(|(_, name)| name.clone()).collect()
            }
        }
    }
}
