//! Query Dispatcher
//!
//! Entry points for the six query kinds: `match` returns a lazy answer
//! stream through the executor (and through the reasoner when inference
//! is enabled), `insert` materialises its variables (running the `when`
//! clause first if present), `delete` matches then removes, `update` is
//! delete-then-insert per matched answer, and `define`/`undefine` mutate
//! the schema working copy of a schema transaction. Session and
//! transaction kind violations are rejected before any execution.

use crate::answer::{AnswerGroup, ConceptMap, Numeric};
use crate::encoding::Value;
use crate::error::{Result, SchemaError, WriteError};
use crate::executor::TraversalContext;
use crate::graph::{Concept, Kind, Label, SchemaGraph};
use crate::pattern::{Conjunction, Constraint, RoleRef, ValueOperand, Variable, VariableId};
use crate::reasoner::{self, Rule};
use crate::transaction::Transaction;
use crate::traversal::TraversalOptions;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info_span};

/// Per-query options
#[derive(Debug, Clone)]
pub struct Options {
    /// Expand answers with rule-derived facts
    pub infer: bool,
    /// Flag inferred concepts in answers
    pub explain: bool,
    /// Fan the top-level traversal out over starting-vertex partitions
    pub parallel: bool,
    /// Streaming batch size for network callers
    pub batch_size: usize,
    /// Emit tracing events around planning and traversal
    pub trace_enabled: bool,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            infer: false,
            explain: false,
            parallel: false,
            batch_size: 50,
            trace_enabled: false,
        }
    }
}

impl Options {
    pub fn infer(mut self, value: bool) -> Options {
        self.infer = value;
        self
    }

    pub fn parallel(mut self, value: bool) -> Options {
        self.parallel = value;
        self
    }
}

/// Aggregation over a match stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Count,
    Sum,
    Min,
    Max,
    Mean,
}

type AnswerStream = Box<dyn Iterator<Item = Result<ConceptMap>>>;

impl Transaction {
    /// `match`: a lazy stream of answers
    pub fn match_(&self, pattern: &Conjunction, options: &Options) -> Result<AnswerStream> {
        self.check_open()?;
        let span = info_span!("match", infer = options.infer);
        let _guard = span.enter();

        let schema = self.schema_view();
        let base = self.read_view();
        let mut ctx = TraversalContext {
            view: base,
            schema: Arc::clone(&schema),
            cancel: self.cancel_flag(),
            inferred: Arc::new(Default::default()),
        };

        if options.infer && !self.rules.is_empty() {
            let result = reasoner::resolve(
                self.db.engine(),
                Arc::clone(&ctx.view),
                Arc::clone(&schema),
                &self.stats,
                &self.rules,
                pattern,
                self.db.key_counter(),
                self.db.config().reasoner.pass_budget,
            )?;
            ctx.view = result.view;
            ctx.inferred = result.inferred;
        }

        if options.trace_enabled {
            debug!(variables = pattern.variables().len(), "dispatching traversal");
        }
        self.db.engine().answers(
            &ctx,
            &self.stats,
            pattern,
            TraversalOptions {
                parallel: options.parallel,
                num_threads: self.db.config().execution.num_threads,
                extended_planning: false,
            },
        )
    }

    /// `match ... aggregate`: reduce the stream to a numeric
    pub fn match_aggregate(
        &self,
        pattern: &Conjunction,
        op: AggregateOp,
        variable: &str,
        options: &Options,
    ) -> Result<Numeric> {
        let answers = self.match_(pattern, options)?;
        let mut count: i64 = 0;
        let mut sum = 0.0;
        let mut all_long = true;
        let mut min: Option<f64> = None;
        let mut max: Option<f64> = None;
        for answer in answers {
            let answer = answer?;
            count += 1;
            if op == AggregateOp::Count {
                continue;
            }
            let value = answer
                .get(variable)
                .and_then(|c| c.as_thing())
                .and_then(|t| t.value());
            let numeric = match value {
                Some(Value::Long(v)) => v as f64,
                Some(Value::Double(v)) => {
                    all_long = false;
                    v
                }
                _ => continue,
            };
            sum += numeric;
            min = Some(min.map_or(numeric, |m: f64| m.min(numeric)));
            max = Some(max.map_or(numeric, |m: f64| m.max(numeric)));
        }
        Ok(match op {
            AggregateOp::Count => Numeric::Long(count),
            AggregateOp::Sum => {
                if all_long {
                    Numeric::Long(sum as i64)
                } else {
                    Numeric::Double(sum)
                }
            }
            AggregateOp::Min => min.map_or(Numeric::Empty, |v| {
                if all_long {
                    Numeric::Long(v as i64)
                } else {
                    Numeric::Double(v)
                }
            }),
            AggregateOp::Max => max.map_or(Numeric::Empty, |v| {
                if all_long {
                    Numeric::Long(v as i64)
                } else {
                    Numeric::Double(v)
                }
            }),
            AggregateOp::Mean => {
                if count == 0 {
                    Numeric::Empty
                } else {
                    Numeric::Double(sum / count as f64)
                }
            }
        })
    }

    /// `match ... group`: partition answers by one variable's concept
    pub fn match_group(
        &self,
        pattern: &Conjunction,
        by: &str,
        options: &Options,
    ) -> Result<Vec<AnswerGroup>> {
        let answers = self.match_(pattern, options)?;
        let mut groups: Vec<AnswerGroup> = Vec::new();
        for answer in answers {
            let answer = answer?;
            let Some(owner) = answer.get(by).cloned() else {
                continue;
            };
            match groups.iter_mut().find(|g| g.owner == owner) {
                Some(group) => group.answers.push(answer),
                None => groups.push(AnswerGroup {
                    owner,
                    answers: vec![answer],
                }),
            }
        }
        Ok(groups)
    }

    /// `insert` without a when-clause
    pub fn insert(&mut self, things: &Conjunction) -> Result<Vec<ConceptMap>> {
        self.check_data_write()?;
        Ok(vec![self.insert_one(None, things)?])
    }

    /// `match ... insert`: materialise per matched answer
    pub fn insert_when(
        &mut self,
        when: &Conjunction,
        things: &Conjunction,
        options: &Options,
    ) -> Result<Vec<ConceptMap>> {
        self.check_data_write()?;
        let answers: Vec<ConceptMap> = self.match_(when, options)?.collect::<Result<Vec<_>>>()?;
        let mut out = Vec::new();
        for answer in &answers {
            out.push(self.insert_one(Some(answer), things)?);
        }
        Ok(out)
    }

    /// `match ... delete`
    pub fn delete(
        &mut self,
        when: &Conjunction,
        deletion: &Conjunction,
        options: &Options,
    ) -> Result<usize> {
        self.check_data_write()?;
        let answers: Vec<ConceptMap> = self.match_(when, options)?.collect::<Result<Vec<_>>>()?;
        for answer in &answers {
            self.delete_one(answer, deletion)?;
        }
        Ok(answers.len())
    }

    /// `match ... delete ... insert`: update per matched answer
    pub fn update(
        &mut self,
        when: &Conjunction,
        deletion: &Conjunction,
        insertion: &Conjunction,
        options: &Options,
    ) -> Result<Vec<ConceptMap>> {
        self.check_data_write()?;
        let answers: Vec<ConceptMap> = self.match_(when, options)?.collect::<Result<Vec<_>>>()?;
        let mut out = Vec::new();
        for answer in &answers {
            self.delete_one(answer, deletion)?;
            out.push(self.insert_one(Some(answer), insertion)?);
        }
        Ok(out)
    }

    /// `define`: mutate the schema working copy
    pub fn define(&mut self, f: impl FnOnce(&mut SchemaGraph) -> Result<()>) -> Result<()> {
        self.check_schema_write()?;
        let working = self
            .schema_mut
            .as_mut()
            .expect("schema write transactions carry a working copy");
        f(working)
    }

    /// `undefine`: remove a type
    pub fn undefine_type(&mut self, label: &str) -> Result<()> {
        self.check_schema_write()?;
        let working = self
            .schema_mut
            .as_mut()
            .expect("schema write transactions carry a working copy");
        working.undefine_type(label)
    }

    /// Define a rule; rejected with `IllegalRuleHead` when the head is not
    /// exactly one isa/has/relation assertion
    pub fn put_rule(&mut self, label: &str, when: Conjunction, then: Conjunction) -> Result<()> {
        self.check_schema_write()?;
        let schema = self.schema_view();
        if self.rules.iter().any(|r| r.label == label)
            || self
                .rules_mut
                .as_ref()
                .is_some_and(|rs| rs.iter().any(|r| r.label == label))
        {
            return Err(SchemaError::RuleLabelTaken(label.to_string()).into());
        }
        let rule = Rule::new(label, when, then, &schema)?;
        self.rules_mut
            .get_or_insert_with(|| (*self.rules).clone())
            .push(rule);
        Ok(())
    }

    /// Remove a rule by label
    pub fn undefine_rule(&mut self, label: &str) -> Result<()> {
        self.check_schema_write()?;
        let rules = self.rules_mut.get_or_insert_with(|| (*self.rules).clone());
        rules.retain(|r| r.label != label);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Write internals
    // ------------------------------------------------------------------

    fn insert_one(
        &mut self,
        matched: Option<&ConceptMap>,
        things: &Conjunction,
    ) -> Result<ConceptMap> {
        let schema = self.schema_view();
        let mut bound: HashMap<VariableId, crate::encoding::ThingIid> = HashMap::new();

        // Pre-bind variables the match clause already resolved
        for variable in things.variables() {
            if let Some(name) = variable.reference.name() {
                if let Some(Concept::Thing(thing)) = matched.and_then(|m| m.get(name)) {
                    bound.insert(variable.id, thing.iid.clone());
                }
            }
        }

        // Create one thing per unbound thing variable
        for variable in things.variables() {
            if !variable.is_thing() || bound.contains_key(&variable.id) {
                continue;
            }
            let display = variable.reference.to_string();
            if things
                .constraints_of(variable.id)
                .any(|c| matches!(c, Constraint::Iid { .. }))
            {
                return Err(WriteError::IllegalIidOnInsert(display).into());
            }
            let isas: Vec<&Constraint> = things
                .constraints_of(variable.id)
                .filter(|c| matches!(c, Constraint::Isa { .. }))
                .collect();
            if isas.is_empty() {
                return Err(WriteError::IsaMissing(display).into());
            }
            if isas.len() > 1 {
                return Err(WriteError::MultipleIsa(display).into());
            }
            let type_label = isa_label(things, variable.id)
                .ok_or_else(|| WriteError::IsaMissing(display.clone()))?;
            let vertex = schema.expect(&type_label.scoped_name())?;
            let data = self
                .data
                .as_mut()
                .expect("data write transactions carry a data graph");
            let iid = match vertex.kind {
                Kind::Attribute => {
                    let values: Vec<&Value> = things
                        .constraints_of(variable.id)
                        .filter_map(|c| match c {
                            Constraint::Value {
                                comparator: crate::pattern::Comparator::Eq,
                                operand: ValueOperand::Constant(v),
                                ..
                            } => Some(v),
                            _ => None,
                        })
                        .collect();
                    let [value] = values.as_slice() else {
                        return Err(WriteError::AttributeValueMissing(display).into());
                    };
                    data.put_attribute(vertex, value)?
                }
                Kind::Relation => data.create_relation(vertex)?,
                Kind::Entity => data.create_entity(vertex)?,
                Kind::Role => {
                    return Err(WriteError::IllegalAbstractWrite(type_label.scoped_name()).into())
                }
            };
            bound.insert(variable.id, iid);
        }

        // HAS edges
        for constraint in things.constraints() {
            if let Constraint::Has { owner, attribute } = constraint {
                let owner_iid = bound
                    .get(owner)
                    .cloned()
                    .ok_or_else(|| missing_var(things.variable(*owner)))?;
                let attr_iid = bound
                    .get(attribute)
                    .cloned()
                    .ok_or_else(|| missing_var(things.variable(*attribute)))?;
                if !attr_iid.is_attribute() {
                    return Err(WriteError::AttributeValueMissing(
                        things.variable(*attribute).reference.to_string(),
                    )
                    .into());
                }
                let data = self.data.as_mut().expect("write transaction");
                data.put_has(&owner_iid, &attr_iid)?;
            }
        }

        // Role players, and the check that inserted relations carry some
        for constraint in things.constraints() {
            if let Constraint::Relation {
                owner,
                role_players,
            } = constraint
            {
                let rel_iid = bound
                    .get(owner)
                    .cloned()
                    .ok_or_else(|| missing_var(things.variable(*owner)))?;
                if role_players.is_empty() {
                    return Err(WriteError::RelationConstraintMissing(
                        things.variable(*owner).reference.to_string(),
                    )
                    .into());
                }
                let rel_type = rel_iid.type_iid();
                for rp in role_players {
                    let player_iid = bound
                        .get(&rp.player)
                        .cloned()
                        .ok_or_else(|| missing_var(things.variable(rp.player)))?;
                    let role = resolve_role(&schema, rel_type, rp.role.as_ref())?;
                    let data = self.data.as_mut().expect("write transaction");
                    data.put_role_player(&rel_iid, role, &player_iid)?;
                }
            }
        }

        // Inserted relation variables must have gained role players
        for variable in things.variables() {
            if !variable.is_thing() {
                continue;
            }
            let Some(iid) = bound.get(&variable.id) else {
                continue;
            };
            let is_new_relation = iid.prefix() == crate::encoding::Prefix::ThingRelation
                && matched
                    .and_then(|m| variable.reference.name().and_then(|n| m.get(n)))
                    .is_none();
            if is_new_relation
                && !things.constraints().iter().any(|c| {
                    matches!(c, Constraint::Relation { owner, .. } if *owner == variable.id)
                })
            {
                return Err(WriteError::RelationConstraintMissing(
                    variable.reference.to_string(),
                )
                .into());
            }
        }

        // Answer: named insert variables plus the matched bindings
        let schema_for_answer = self.schema_view();
        let mut map = BTreeMap::new();
        if let Some(matched) = matched {
            for (name, concept) in matched.iter() {
                map.insert(name.clone(), concept.clone());
            }
        }
        for variable in things.variables() {
            let Some(name) = variable.reference.name() else {
                continue;
            };
            if let Some(iid) = bound.get(&variable.id) {
                let type_label = schema_for_answer
                    .label_of(iid.type_iid())
                    .cloned()
                    .unwrap_or(Label::of("?"));
                map.insert(
                    name.to_string(),
                    Concept::Thing(crate::graph::ThingConcept {
                        iid: iid.clone(),
                        type_label,
                        inferred: false,
                    }),
                );
            }
        }
        Ok(ConceptMap::new(map))
    }

    fn delete_one(&mut self, answer: &ConceptMap, deletion: &Conjunction) -> Result<()> {
        let schema = self.schema_view();
        let iid_of = |variable: &Variable| -> Result<crate::encoding::ThingIid> {
            variable
                .reference
                .name()
                .and_then(|name| answer.get(name))
                .and_then(|c| c.as_thing())
                .map(|t| t.iid.clone())
                .ok_or_else(|| missing_var(variable))
        };

        // Edges first
        for constraint in deletion.constraints() {
            match constraint {
                Constraint::Has { owner, attribute } => {
                    let owner_iid = iid_of(deletion.variable(*owner))?;
                    let attr_iid = iid_of(deletion.variable(*attribute))?;
                    let data = self.data.as_mut().expect("write transaction");
                    data.delete_has(&owner_iid, &attr_iid);
                }
                Constraint::Relation {
                    owner,
                    role_players,
                } => {
                    let rel_iid = iid_of(deletion.variable(*owner))?;
                    for rp in role_players {
                        let player_iid = iid_of(deletion.variable(rp.player))?;
                        let role = resolve_role(&schema, rel_iid.type_iid(), rp.role.as_ref())?;
                        let data = self.data.as_mut().expect("write transaction");
                        data.delete_role_player(&rel_iid, role, &player_iid)?;
                    }
                }
                _ => {}
            }
        }

        // Things marked by an isa in the deletion pattern
        for variable in deletion.variables() {
            if !variable.is_thing() {
                continue;
            }
            let marked = deletion
                .constraints_of(variable.id)
                .any(|c| matches!(c, Constraint::Isa { .. }));
            if !marked {
                continue;
            }
            let iid = iid_of(variable)?;
            let data = self.data.as_mut().expect("write transaction");
            // Relations take their role-player triples with them
            if iid.prefix() == crate::encoding::Prefix::ThingRelation {
                let view = data.freeze_view();
                let players: Vec<(crate::encoding::TypeIid, crate::encoding::ThingIid)> =
                    crate::graph::thing_graph::scan_role_player_edges(
                        &*view,
                        &iid,
                        crate::encoding::Infix::RolePlayer,
                    )
                    .collect();
                drop(view);
                for (role, player) in players {
                    data.delete_role_player(&iid, role, &player)?;
                }
            }
            data.delete_thing(&iid)?;
        }
        Ok(())
    }
}

fn missing_var(variable: &Variable) -> crate::error::TypeGraphError {
    WriteError::RelationConstraintMissing(variable.reference.to_string()).into()
}

/// The label fixed by an isa constraint on a variable
fn isa_label(conjunction: &Conjunction, variable: VariableId) -> Option<Label> {
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

/// Resolve a role reference against the relation type's related roles
fn resolve_role(
    schema: &SchemaGraph,
    relation_type: crate::encoding::TypeIid,
    role: Option<&RoleRef>,
) -> Result<crate::encoding::TypeIid> {
    let relation = schema
        .vertex(relation_type)
        .ok_or_else(|| SchemaError::UnknownLabel(format!("{relation_type}")))?;
    match role {
        None => {
            // A single related role is unambiguous
            if let [only] = relation.relates.as_slice() {
                Ok(*only)
            } else {
                Err(WriteError::UnknownRole {
                    relation: relation.label.scoped_name(),
                    role: "_".to_string(),
                }
                .into())
            }
        }
        Some(RoleRef::Variable(_)) => Err(WriteError::UnknownRole {
            relation: relation.label.scoped_name(),
            role: "$role".to_string(),
        }
        .into()),
        Some(RoleRef::Labels(labels)) => {
            let label = labels.iter().next().cloned().unwrap_or(Label::of("_"));
            // Accept either the scoped form or the bare role name
            let scoped = match &label.scope {
                Some(_) => label.scoped_name(),
                None => format!("{}:{}", relation.label.name, label.name),
            };
            let role_vertex = schema
                .get(&scoped)
                .or_else(|| schema.get(&label.scoped_name()));
            match role_vertex {
                Some(v) if relation.relates.contains(&v.iid) => Ok(v.iid),
                _ => Err(WriteError::UnknownRole {
                    relation: relation.label.scoped_name(),
                    role: label.scoped_name(),
                }
                .into()),
            }
        }
    }
}
