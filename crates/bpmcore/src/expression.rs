use crate::{Bindings, EvaluationError};

/// Pluggable evaluator for guard and computed-output expressions.
///
/// The engine never interprets expression text itself; handlers hand it to
/// an evaluator together with the node's current input binding.
pub trait ExpressionEvaluator: Send + Sync {
    /// Evaluate a guard to a boolean.
    fn evaluate_guard(&self, expression: &str, inputs: &Bindings) -> Result<bool, EvaluationError>;

    /// Evaluate a computed-output body to the values it produces.
    fn evaluate_outputs(
        &self,
        expression: &str,
        inputs: &Bindings,
    ) -> Result<Bindings, EvaluationError>;
}
