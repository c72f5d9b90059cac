//! Answer types.
//!
//! A traversal answer maps named variables to concept handles; anonymous
//! and label variables are elided. Aggregates reduce answer streams to a
//! numeric value; groups partition them by a variable's concept.

use crate::graph::Concept;
use std::collections::BTreeMap;
use std::fmt;

/// One answer: named variables to concepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConceptMap {
    map: BTreeMap<String, Concept>,
}

impl ConceptMap {
    pub fn new(map: BTreeMap<String, Concept>) -> ConceptMap {
        ConceptMap { map }
    }

    pub fn get(&self, name: &str) -> Option<&Concept> {
        self.map.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Concept)> {
        self.map.iter()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Whether any bound concept was derived by a rule
    pub fn has_inferred(&self) -> bool {
        self.map.values().any(Concept::is_inferred)
    }
}

impl fmt::Display for ConceptMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, concept)) in self.map.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "${name}: {concept}")?;
        }
        write!(f, "}}")
    }
}

/// Aggregate result
#[derive(Debug, Clone, PartialEq)]
pub enum Numeric {
    Long(i64),
    Double(f64),
    /// Aggregation over an empty stream (min/max/mean)
    Empty,
}

impl Numeric {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Numeric::Long(v) => Some(*v as f64),
            Numeric::Double(v) => Some(*v),
            Numeric::Empty => None,
        }
    }
}

/// Group of answers sharing one owner concept
#[derive(Debug, Clone)]
pub struct AnswerGroup {
    pub owner: Concept,
    pub answers: Vec<ConceptMap>,
}
