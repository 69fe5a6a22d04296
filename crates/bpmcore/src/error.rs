use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Definition error: {0}")]
    Definition(#[from] DefinitionError),

    #[error("Parameter error: {0}")]
    ParameterType(#[from] ParameterTypeError),

    #[error("Handler error: {0}")]
    UnregisteredHandler(#[from] UnregisteredHandlerError),

    #[error("Process instance already started")]
    AlreadyStarted,

    #[error("Process instance was stopped")]
    Stopped,

    #[error("Definition not found: {0}")]
    DefinitionNotFound(uuid::Uuid),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Problems found while resolving a definition into a graph.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DefinitionError {
    #[error("Definition has no start node")]
    MissingStart,

    #[error("Definition has more than one start node: {}", .0.join(", "))]
    MultipleStarts(Vec<String>),

    #[error("Duplicate template id: {0}")]
    DuplicateId(String),

    #[error("Transition '{transition}' targets unknown node '{target}'")]
    UnresolvedTarget { transition: String, target: String },

    #[error("Transition '{transition}' starts at unknown node '{origin}'")]
    UnresolvedSource { transition: String, origin: String },

    #[error("Node '{node}' references unknown source '{origin}'")]
    UnresolvedSourceRef { node: String, origin: String },

    #[error("Unknown value kind: {0}")]
    UnknownKind(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterTypeError {
    #[error("Invalid type for '{name}': expected {expected}, got {actual}")]
    KindMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Parameter '{name}' is not declared by the process definition")]
    Undeclared { name: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("No handler registered for node type(s): {}", .node_types.join(", "))]
pub struct UnregisteredHandlerError {
    pub node_types: Vec<String>,
}

/// Failure raised by an expression evaluator. Recovered by the handler
/// that asked for the evaluation; never returned to the host.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("Syntax error: {0}")]
    Syntax(String),

    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Division by zero")]
    DivisionByZero,
}
