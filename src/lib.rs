//! # TypeGraph
//!
//! The query-execution core of a schema-aware knowledge-graph database:
//! typed entities, relations and attributes over an ordered byte-key
//! store, pattern-matching queries planned by a mixed-integer cost model,
//! and a rule-reasoning layer that derives additional answers to fixpoint.
//!
//! ## Pipeline
//!
//! ```text
//! Conjunction (pattern)
//!     ↓
//! [Structure]        → graph projection: vertices = variables,
//!     ↓                edges = constraints
//! [Planner]          → MIP-ordered Procedure (cached by statistics
//!     ↓                snapshot, warm-started on re-solve)
//! [Executor]         → lazy depth-first answer stream
//!     ↑
//! [Reasoner]         → inferred-fact overlay, materialised to fixpoint
//! ```
//!
//! ## Usage
//!
//! ```
//! use typegraph::{Config, Database, Options, SessionKind, TransactionKind};
//! use typegraph::pattern::Conjunction;
//! use typegraph::graph::Kind;
//! use typegraph::encoding::{Value, ValueKind};
//!
//! let db = Database::new(Config::default());
//!
//! // Define a schema
//! let session = db.session(SessionKind::Schema);
//! let mut tx = session.transaction(TransactionKind::Write);
//! tx.define(|schema| {
//!     schema.define_type("person", Kind::Entity)?;
//!     schema.define_attribute_type("name", ValueKind::String)?;
//!     schema.set_owns("person", "name", false)?;
//!     Ok(())
//! }).expect("schema defined");
//! tx.commit().expect("commits");
//!
//! // Insert and query
//! let session = db.session(SessionKind::Data);
//! let mut tx = session.transaction(TransactionKind::Write);
//! let insert = Conjunction::build(|b| {
//!     let x = b.var("x");
//!     b.isa(x, "person");
//!     b.has_value(x, "name", Value::String("ada".into()));
//! });
//! tx.insert(&insert).expect("inserts");
//! tx.commit().expect("commits");
//!
//! let tx = session.transaction(TransactionKind::Read);
//! let query = Conjunction::build(|b| {
//!     let x = b.var("x");
//!     b.isa(x, "person");
//! });
//! let answers: Vec<_> = tx.match_(&query, &Options::default())
//!     .expect("matches")
//!     .collect();
//! assert_eq!(answers.len(), 1);
//! ```

pub mod answer;
pub mod config;
pub mod database;
pub mod encoding;
pub mod error;
pub mod executor;
pub mod graph;
pub mod pattern;
pub mod planner;
pub mod procedure;
pub mod query;
pub mod reasoner;
pub mod storage;
pub mod structure;
pub mod transaction;
pub mod traversal;

// Re-export the public surface
pub use answer::{AnswerGroup, ConceptMap, Numeric};
pub use config::{init_logging, Config};
pub use database::Database;
pub use encoding::{ThingIid, TypeIid, Value, ValueKind};
pub use error::{Result, TypeGraphError};
pub use executor::CancelFlag;
pub use graph::{Concept, Kind, Label, SchemaGraph};
pub use pattern::{Comparator, Conjunction};
pub use procedure::Procedure;
pub use query::{AggregateOp, Options};
pub use reasoner::Rule;
pub use transaction::{Session, SessionKind, Transaction, TransactionKind};
