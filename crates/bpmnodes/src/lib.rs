//! Standard handler library
//!
//! Built-in handlers for the node types a loaded definition uses, plus a
//! small expression evaluator for guards and computed outputs.

mod evaluator;
mod flow_edge;
mod join;
mod passthrough;
mod script;

pub use evaluator::SimpleEvaluator;
pub use flow_edge::FlowEdgeHandler;
pub use join::JoinHandler;
pub use passthrough::PassThroughHandler;
pub use script::ScriptTaskHandler;

use bpmcore::{node_types, ExpressionEvaluator};
use bpmruntime::HandlerRegistry;
use std::sync::Arc;

/// Register every built-in handler with `registry`.
pub fn register_all(registry: &mut HandlerRegistry, evaluator: Arc<dyn ExpressionEvaluator>) {
    let passthrough = Arc::new(PassThroughHandler);
    for node_type in [
        node_types::START_EVENT,
        node_types::END_EVENT,
        node_types::TASK,
        node_types::BUSINESS_RULE_TASK,
        node_types::EXCLUSIVE_GATEWAY,
    ] {
        registry.register(node_type, passthrough.clone());
    }

    let join = Arc::new(JoinHandler);
    registry.register(node_types::INCLUSIVE_GATEWAY, join.clone());
    registry.register(node_types::PARALLEL_GATEWAY, join);

    registry.register(
        node_types::FLOW_EDGE,
        Arc::new(FlowEdgeHandler::new(evaluator.clone())),
    );
    registry.register(
        node_types::SCRIPT_TASK,
        Arc::new(ScriptTaskHandler::new(evaluator)),
    );
}

/// A registry covering every built-in node type.
pub fn default_handlers(evaluator: Arc<dyn ExpressionEvaluator>) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    register_all(&mut registry, evaluator);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covers_every_builtin_type() {
        let registry = default_handlers(Arc::new(SimpleEvaluator::new()));

        assert_eq!(registry.len(), 9);
        assert!(registry.contains(node_types::FLOW_EDGE));
        assert_eq!(
            registry
                .get_metadata(node_types::PARALLEL_GATEWAY)
                .map(|m| m.category),
            Some("gateway".to_string())
        );
    }
}
