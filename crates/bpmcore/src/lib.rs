//! Core abstractions for the process engine
//!
//! Process definitions, parameter values, the error taxonomy, the
//! expression-evaluator contract and execution events. Everything the
//! runtime and the handler library share lives here.

mod definition;
mod error;
pub mod events;
mod expression;
mod value;

pub use definition::{
    node_types, DefinitionId, EvaluationFailure, NodeTemplate, ProcessDefinition,
    ProcessSettings, PropertyDeclaration, TransitionTemplate,
};
pub use error::{
    DefinitionError, EvaluationError, ParameterTypeError, ProcessError,
    UnregisteredHandlerError,
};
pub use events::*;
pub use expression::ExpressionEvaluator;
pub use value::{Bindings, Value, ValueKind};

/// Result type for process operations
pub type Result<T> = std::result::Result<T, ProcessError>;
