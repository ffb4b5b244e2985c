//! Engine Error Types

use thiserror::Error;

/// Engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    /// Relation already registered under this name
    #[error("Relation '{0}' is already defined")]
    AlreadyDefined(String),

    /// Relation referenced before registration
    #[error("Relation '{0}' is not defined")]
    RelationNotDefined(String),

    /// Scan or join references a relation the graph does not know
    #[error("Unknown relation '{0}'")]
    UnknownRelation(String),

    /// Query id already registered
    #[error("Query '{0}' is already registered")]
    DuplicateQuery(String),

    /// Query id not registered
    #[error("Query '{0}' is not registered")]
    UnknownQuery(String),

    /// Provider already registered under this name
    #[error("Compute provider '{0}' is already registered")]
    DuplicateProvider(String),

    /// Provider referenced before registration
    #[error("Compute provider '{0}' is not registered")]
    UnknownProvider(String),

    /// Operation on a handle whose query was deactivated
    #[error("Query '{0}' is no longer active")]
    InactiveQuery(String),

    /// Tuple arity does not match the expected arity
    #[error("Arity mismatch: expected {expected}, found {found}")]
    ArityMismatch { expected: usize, found: usize },

    /// Value does not satisfy the declared column type
    #[error("Type mismatch in column '{column}': expected {expected}, found {found}")]
    TypeMismatch {
        column: String,
        expected: String,
        found: String,
    },

    /// Schema definition is invalid (empty, duplicate column names, ...)
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// Named column does not exist in the schema
    #[error("Unknown column '{column}' in relation '{relation}'")]
    UnknownColumn { relation: String, column: String },

    /// Named row is missing a value for a schema column
    #[error("Missing value for column '{column}' of relation '{relation}'")]
    MissingValue { relation: String, column: String },

    /// Projection index out of range for the input arity
    #[error("Projection index {index} out of range for arity {arity}")]
    InvalidProjection { index: usize, arity: usize },

    /// Node configuration incomplete for its operator
    #[error("Node '{node}' is missing required configuration: {what}")]
    MissingConfig { node: String, what: String },

    /// Join node registered without an atom specification
    #[error("Join node '{0}' has no atom specification")]
    MissingAtomSpec(String),

    /// Node id used twice within one graph
    #[error("Duplicate node id '{0}' in graph")]
    DuplicateNode(String),

    /// Edge references a node id that is not part of the graph
    #[error("Node '{node}' input {input} references unknown node '{target}'")]
    DanglingEdge {
        node: String,
        input: usize,
        target: String,
    },

    /// Graph declares no output nodes
    #[error("Graph '{0}' has no output nodes")]
    EmptyOutputs(String),

    /// Graph is not a DAG
    #[error("Graph '{graph}' contains a cycle through node '{node}'")]
    CycleDetected { graph: String, node: String },

    /// A graph must contain at most one scan per relation
    #[error("Graph '{graph}' scans relation '{relation}' more than once")]
    DuplicateScan { graph: String, relation: String },

    /// Tuple decoding failed
    #[error("Malformed tuple encoding: {0}")]
    MalformedEncoding(String),

    /// Provider does not implement a method its declared mode requires
    #[error("Provider method '{0}' is not implemented")]
    NotImplemented(&'static str),

    /// Provider reported a mode the engine does not know
    #[error("Unknown provider mode for '{0}'")]
    UnknownProviderMode(String),

    /// `output()` convenience used on a graph with several outputs
    #[error("Query '{graph}' has {count} outputs; output() needs exactly one")]
    AmbiguousOutput { graph: String, count: usize },

    /// Configuration file or environment could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal invariant broken; this is a bug in the engine
    #[error("Invariant violation: {0}")]
    Invariant(String),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
