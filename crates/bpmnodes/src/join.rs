use async_trait::async_trait;
use bpmruntime::{HandlerMetadata, NodeHandler, ProcessNode};
use std::sync::Arc;

/// Fan-in: completes once every predecessor has arrived
///
/// The barrier lives on the node itself, so each instance gets its own.
/// Arrivals before the last one end their execution without completing.
pub struct JoinHandler;

#[async_trait]
impl NodeHandler for JoinHandler {
    async fn execute(&self, node: Arc<ProcessNode>, previous: Option<Arc<ProcessNode>>) {
        if !node.arrive(previous.as_ref().map(|p| p.id())) {
            return;
        }

        let mut merged = node.take_arrivals();
        if merged.is_empty() {
            merged = node.input().unwrap_or_default();
        }
        node.info(format!("joined {} predecessor(s)", node.predecessor_ids().len()));
        node.set_output(merged);
        node.complete();
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            description: "Waits for every incoming branch, then merges their outputs".to_string(),
            category: "gateway".to_string(),
        }
    }
}
