//! Error Taxonomy
//!
//! One error enum per subsystem, unified under [`TypeGraphError`]. Every
//! variant maps to a stable numeric code so failures can cross a wire
//! boundary without losing their identity:
//!
//! - Schema: 1xx
//! - Write: 2xx
//! - Transaction: 3xx
//! - Planning: 4xx
//! - Reasoning: 5xx
//! - Encoding: 6xx
//! - Internal: 9xx
//!
//! Constraint-level violations fail the enclosing operation immediately;
//! traversal iterators surface the failure to the caller on the next pull.

use thiserror::Error;

/// Schema-level violations (type definitions and rule definitions)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    /// Label does not resolve to any type
    #[error("Unknown type label: '{0}'")]
    UnknownLabel(String),

    /// A `sub` edge would close a cycle in the type DAG
    #[error("Defining '{child}' sub '{parent}' would create a cycle")]
    CyclicSub { child: String, parent: String },

    /// Subtyping across partitions (e.g. an entity type under a relation type)
    #[error("'{child}' ({child_kind}) cannot subtype '{parent}' ({parent_kind})")]
    IncompatibleSub {
        child: String,
        child_kind: String,
        parent: String,
        parent_kind: String,
    },

    /// `owns` must point at an attribute type
    #[error("'{owner}' cannot own '{attribute}': not an attribute type")]
    IllegalOwns { owner: String, attribute: String },

    /// `plays`/`relates` must point at a role type
    #[error("'{type_}' cannot reference '{role}': not a role type")]
    IllegalRoleReference { type_: String, role: String },

    /// A rule head must be exactly one isa, has, relation or value assertion
    #[error("Rule '{rule}' has an illegal head: {reason}")]
    IllegalRuleHead { rule: String, reason: String },

    /// A type already exists under this label
    #[error("Type '{0}' already exists")]
    LabelTaken(String),

    /// A rule already exists under this label
    #[error("Rule '{0}' already exists")]
    RuleLabelTaken(String),

    /// Value-kind constraint applied to a non-attribute type
    #[error("'{0}' is not an attribute type and cannot carry a value kind")]
    ValueKindOnNonAttribute(String),
}

/// Write-time violations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WriteError {
    /// Inserted thing variable has no `isa` constraint
    #[error("Variable '{0}' has no 'isa' constraint and cannot be inserted")]
    IsaMissing(String),

    /// Inserted thing variable has more than one `isa`
    #[error("Variable '{0}' has multiple 'isa' constraints")]
    MultipleIsa(String),

    /// Attribute insert without a value, or with conflicting values
    #[error("Attribute variable '{0}' must have exactly one value")]
    AttributeValueMissing(String),

    /// `iid` constraints are illegal in insert clauses
    #[error("Variable '{0}' carries an 'iid' constraint, which is illegal on insert")]
    IllegalIidOnInsert(String),

    /// Writes against abstract types are rejected
    #[error("Type '{0}' is abstract and cannot have instances")]
    IllegalAbstractWrite(String),

    /// A relation insert must supply at least one role player
    #[error("Relation variable '{0}' has no role players")]
    RelationConstraintMissing(String),

    /// Deleting a vertex that still has live edges
    #[error("Cannot delete '{0}': live edges remain outside this transaction")]
    VertexHasEdges(String),

    /// Role label does not belong to the relation type
    #[error("Relation type '{relation}' does not relate role '{role}'")]
    UnknownRole { relation: String, role: String },

    /// Attribute value kind does not match the attribute type
    #[error("Value kind mismatch for attribute type '{type_}': expected {expected}, got {actual}")]
    ValueKindMismatch {
        type_: String,
        expected: String,
        actual: String,
    },
}

/// Session/transaction kind mismatches, caught before execution
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransactionError {
    #[error("Cannot execute a write operation in a read transaction")]
    IllegalWriteInReadTransaction,

    #[error("Schema mutations require a schema session")]
    SchemaMutationInDataSession,

    #[error("Data writes are not permitted in a schema session")]
    DataWriteInSchemaSession,

    #[error("Transaction is already closed")]
    TransactionClosed,
}

/// Planner failures. The solver statuses INFEASIBLE/UNBOUNDED/ABNORMAL are
/// never expected on a well-formed structure, so they carry the model dump.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanningError {
    #[error("Unexpected planning failure ({status}); model dump:\n{model_dump}")]
    UnexpectedPlanningError { status: String, model_dump: String },
}

/// Reasoner failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReasoningError {
    /// Fixpoint iteration exceeded the configured pass budget
    #[error("Reasoning exceeded its budget of {budget} passes")]
    ReasoningBudgetExceeded { budget: usize },

    /// A unifier could not be constructed between a concludable and a rule head
    #[error("Failed to construct a unifier for rule '{rule}': {reason}")]
    UnifierConstructionFailed { rule: String, reason: String },
}

/// Encoding violations observable at the API boundary
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EncodingError {
    /// STRING attribute values are length-prefixed with a single byte
    #[error("String value of {length} bytes exceeds the encodable maximum of 255")]
    ValueTooLong { length: usize },
}

/// Invariant violations. These indicate a bug and are fatal to the query.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InternalError {
    #[error("Unreachable branch reached: {0}")]
    Unreachable(String),

    #[error("Encoding invariant violated: {0}")]
    CorruptKey(String),
}

/// Unified error type for the query core
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TypeGraphError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    Planning(#[from] PlanningError),

    #[error(transparent)]
    Reasoning(#[from] ReasoningError),

    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    Internal(#[from] InternalError),
}

impl TypeGraphError {
    /// Stable numeric code for wire transport
    pub fn code(&self) -> u16 {
        match self {
            TypeGraphError::Schema(e) => match e {
                SchemaError::UnknownLabel(_) => 101,
                SchemaError::CyclicSub { .. } => 102,
                SchemaError::IncompatibleSub { .. } => 103,
                SchemaError::IllegalOwns { .. } => 104,
                SchemaError::IllegalRoleReference { .. } => 105,
                SchemaError::IllegalRuleHead { .. } => 106,
                SchemaError::LabelTaken(_) => 107,
                SchemaError::RuleLabelTaken(_) => 108,
                SchemaError::ValueKindOnNonAttribute(_) => 109,
            },
            TypeGraphError::Write(e) => match e {
                WriteError::IsaMissing(_) => 201,
                WriteError::MultipleIsa(_) => 202,
                WriteError::AttributeValueMissing(_) => 203,
                WriteError::IllegalIidOnInsert(_) => 204,
                WriteError::IllegalAbstractWrite(_) => 205,
                WriteError::RelationConstraintMissing(_) => 206,
                WriteError::VertexHasEdges(_) => 207,
                WriteError::UnknownRole { .. } => 208,
                WriteError::ValueKindMismatch { .. } => 209,
            },
            TypeGraphError::Transaction(e) => match e {
                TransactionError::IllegalWriteInReadTransaction => 301,
                TransactionError::SchemaMutationInDataSession => 302,
                TransactionError::DataWriteInSchemaSession => 303,
                TransactionError::TransactionClosed => 304,
            },
            TypeGraphError::Planning(e) => match e {
                PlanningError::UnexpectedPlanningError { .. } => 401,
            },
            TypeGraphError::Reasoning(e) => match e {
                ReasoningError::ReasoningBudgetExceeded { .. } => 501,
                ReasoningError::UnifierConstructionFailed { .. } => 502,
            },
            TypeGraphError::Encoding(e) => match e {
                EncodingError::ValueTooLong { .. } => 601,
            },
            TypeGraphError::Internal(e) => match e {
                InternalError::Unreachable(_) => 901,
                InternalError::CorruptKey(_) => 902,
            },
        }
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, TypeGraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_partitioned_by_kind() {
        let schema = TypeGraphError::from(SchemaError::UnknownLabel("x".into()));
        let write = TypeGraphError::from(WriteError::IsaMissing("$x".into()));
        let tx = TypeGraphError::from(TransactionError::IllegalWriteInReadTransaction);
        let planning = TypeGraphError::from(PlanningError::UnexpectedPlanningError {
            status: "Infeasible".into(),
            model_dump: String::new(),
        });
        let reasoning = TypeGraphError::from(ReasoningError::ReasoningBudgetExceeded { budget: 8 });
        let encoding = TypeGraphError::from(EncodingError::ValueTooLong { length: 300 });
        let internal = TypeGraphError::from(InternalError::CorruptKey("bad prefix".into()));
        assert!((100..200).contains(&schema.code()));
        assert!((200..300).contains(&write.code()));
        assert!((300..400).contains(&tx.code()));
        assert!((400..500).contains(&planning.code()));
        assert!((500..600).contains(&reasoning.code()));
        assert!((600..700).contains(&encoding.code()));
        assert!((900..1000).contains(&internal.code()));
    }

    #[test]
    fn test_display_includes_context() {
        let err = WriteError::UnknownRole {
            relation: "employment".into(),
            role: "witness".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("employment"));
        assert!(msg.contains("witness"));
    }

    #[test]
    fn test_transparent_display_through_the_unified_type() {
        let err = TypeGraphError::from(SchemaError::CyclicSub {
            child: "dog".into(),
            parent: "animal".into(),
        });
        assert!(err.to_string().contains("would create a cycle"));
    }
}
