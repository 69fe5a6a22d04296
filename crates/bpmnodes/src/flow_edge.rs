use async_trait::async_trait;
use bpmcore::ExpressionEvaluator;
use bpmruntime::{HandlerMetadata, NodeHandler, ProcessNode};
use std::sync::Arc;

/// Transition vertex: propagates only when its guard holds
///
/// An unguarded edge always propagates. A guard that fails to evaluate
/// counts as false.
pub struct FlowEdgeHandler {
    evaluator: Arc<dyn ExpressionEvaluator>,
}

impl FlowEdgeHandler {
    pub fn new(evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        Self { evaluator }
    }
}

#[async_trait]
impl NodeHandler for FlowEdgeHandler {
    async fn execute(&self, node: Arc<ProcessNode>, _previous: Option<Arc<ProcessNode>>) {
        let input = node.input().unwrap_or_default();

        if let Some(guard) = node.expression() {
            match self.evaluator.evaluate_guard(guard, &input) {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(edge = %node.id(), guard, "Guard is false");
                    node.halt(format!("guard '{}' is false", guard));
                    return;
                }
                Err(e) => {
                    tracing::warn!(edge = %node.id(), guard, error = %e, "Guard evaluation failed");
                    node.warn(format!("guard '{}' failed: {}", guard, e));
                    node.halt(format!("guard '{}' failed: {}", guard, e));
                    return;
                }
            }
        }

        node.set_output(input);
        node.complete();
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            description: "Sequence flow; propagates when its guard holds".to_string(),
            category: "flow".to_string(),
        }
    }
}
