//! Rule Reasoning Layer
//!
//! Rewrites pattern queries into traversals over an inferred-fact overlay.
//! [`rule`] validates and normalises rule definitions; [`concludable`]
//! derives the fragments rule heads can produce; [`unify`] decides which
//! rules can contribute to a query; [`materialise`] drives the bounded
//! fixpoint that derives the facts.
//!
//! Enabling inference only ever adds answers: the overlay extends the
//! snapshot, and queries with inference disabled never read it.

pub mod concludable;
pub mod materialise;
pub mod rule;
pub mod unify;

pub use concludable::Concludable;
pub use materialise::{resolve, InferenceResult};
pub use rule::{Rule, RuleHead};
pub use unify::{unify, Unifier};
