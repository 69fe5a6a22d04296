use async_trait::async_trait;
use bpmcore::{EvaluationFailure, ExpressionEvaluator};
use bpmruntime::{HandlerMetadata, NodeHandler, ProcessNode};
use std::sync::Arc;

/// Computes its output from the node's expression
pub struct ScriptTaskHandler {
    evaluator: Arc<dyn ExpressionEvaluator>,
}

impl ScriptTaskHandler {
    pub fn new(evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        Self { evaluator }
    }
}

#[async_trait]
impl NodeHandler for ScriptTaskHandler {
    async fn execute(&self, node: Arc<ProcessNode>, _previous: Option<Arc<ProcessNode>>) {
        let input = node.input().unwrap_or_default();

        let Some(body) = node.expression() else {
            node.set_output(input);
            node.complete();
            return;
        };

        match self.evaluator.evaluate_outputs(body, &input) {
            Ok(output) => {
                node.info(format!("computed {} output(s)", output.len()));
                node.set_output(output);
                node.complete();
            }
            Err(e) => {
                tracing::warn!(node = %node.id(), error = %e, "Script evaluation failed");
                node.warn(format!("script failed: {}", e));
                match node.evaluation_policy() {
                    EvaluationFailure::HaltBranch => {
                        node.halt(format!("script failed: {}", e));
                    }
                    EvaluationFailure::Continue => {
                        node.set_output(Default::default());
                        node.complete();
                    }
                }
            }
        }
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            description: "Evaluates `name = expression` assignments into its output".to_string(),
            category: "task".to_string(),
        }
    }
}
