use crate::node::ProcessNode;
use async_trait::async_trait;
use std::sync::Arc;

/// Behavior behind one node type
///
/// `execute` runs as its own task. It must eventually call
/// [`ProcessNode::complete`] on `node` to advance the walk, or deliberately
/// not call it to end the branch. It may read and write the node's
/// bindings beforehand and may take as long as it needs; the engine only
/// reacts to the completion signal.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    async fn execute(&self, node: Arc<ProcessNode>, previous: Option<Arc<ProcessNode>>);

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata::default()
    }
}

/// Descriptive information about a handler, for listings
#[derive(Debug, Clone)]
pub struct HandlerMetadata {
    pub description: String,
    pub category: String,
}

impl Default for HandlerMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: "general".to_string(),
        }
    }
}
