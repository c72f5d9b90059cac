//! Concept handles returned in answers.
//!
//! A concept is either a type (schema vertex) or a thing (instance
//! vertex). Attribute things carry their decoded value; things derived by
//! the reasoner are flagged inferred.

use super::type_graph::{Kind, Label};
use crate::encoding::{ThingIid, TypeIid, Value};
use std::fmt;

/// A schema type handle
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeConcept {
    pub iid: TypeIid,
    pub label: Label,
    pub kind: Kind,
}

/// An instance handle
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThingConcept {
    pub iid: ThingIid,
    pub type_label: Label,
    pub inferred: bool,
}

impl ThingConcept {
    /// The decoded value, for attribute things
    pub fn value(&self) -> Option<Value> {
        self.iid.value()
    }
}

/// Any stored entity, relation, attribute, role instance or type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Concept {
    Type(TypeConcept),
    Thing(ThingConcept),
}

impl Concept {
    pub fn as_type(&self) -> Option<&TypeConcept> {
        match self {
            Concept::Type(t) => Some(t),
            Concept::Thing(_) => None,
        }
    }

    pub fn as_thing(&self) -> Option<&ThingConcept> {
        match self {
            Concept::Thing(t) => Some(t),
            Concept::Type(_) => None,
        }
    }

    pub fn is_inferred(&self) -> bool {
        matches!(self, Concept::Thing(t) if t.inferred)
    }
}

impl fmt::Display for Concept {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Concept::Type(t) => write!(f, "type({})", t.label),
            Concept::Thing(t) => match t.value() {
                Some(value) => write!(f, "{} {}", t.type_label, value),
                None => write!(f, "{}({})", t.type_label, t.iid),
            },
        }
    }
}
