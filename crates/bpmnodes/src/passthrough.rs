use async_trait::async_trait;
use bpmruntime::{HandlerMetadata, NodeHandler, ProcessNode};
use std::sync::Arc;

/// Forwards its input unchanged
///
/// Used for events, plain tasks and exclusive gateways, whose routing is
/// decided by the guards on their outgoing edges.
pub struct PassThroughHandler;

#[async_trait]
impl NodeHandler for PassThroughHandler {
    async fn execute(&self, node: Arc<ProcessNode>, previous: Option<Arc<ProcessNode>>) {
        let input = node.input().unwrap_or_default();

        let label = node.name().unwrap_or(node.id());
        match &previous {
            Some(previous) => node.info(format!("{} reached from {}", label, previous.id())),
            None => node.info(format!("{} reached", label)),
        }
        for (key, value) in &input {
            tracing::trace!(key = %key, ?value, "Forwarding binding");
        }

        node.set_output(input);
        node.complete();
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            description: "Forwards input to output unchanged".to_string(),
            category: "flow".to_string(),
        }
    }
}
