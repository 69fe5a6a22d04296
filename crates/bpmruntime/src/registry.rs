use crate::handler::{HandlerMetadata, NodeHandler};
use bpmcore::UnregisteredHandlerError;
use std::collections::HashMap;
use std::sync::Arc;

/// Handlers keyed by node type tag
///
/// Open for extension: any tag can be registered, so custom node types are
/// handled the same way as the built-in ones.
#[derive(Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn NodeHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register (or replace) the handler for a node type
    pub fn register(&mut self, node_type: impl Into<String>, handler: Arc<dyn NodeHandler>) {
        let node_type = node_type.into();
        tracing::debug!("Registering handler for node type: {}", node_type);
        self.handlers.insert(node_type, handler);
    }

    pub fn get(&self, node_type: &str) -> Option<Arc<dyn NodeHandler>> {
        self.handlers.get(node_type).cloned()
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.handlers.contains_key(node_type)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered node types, sorted
    pub fn list_node_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn get_metadata(&self, node_type: &str) -> Option<HandlerMetadata> {
        self.handlers.get(node_type).map(|h| h.metadata())
    }

    /// Types from `node_types` with no registered handler, sorted
    pub fn missing<'a>(&self, node_types: impl IntoIterator<Item = &'a String>) -> Vec<String> {
        let mut missing: Vec<String> = node_types
            .into_iter()
            .filter(|t| !self.handlers.contains_key(t.as_str()))
            .cloned()
            .collect();
        missing.sort();
        missing.dedup();
        missing
    }

    /// Fail unless every type in `node_types` has a handler.
    pub fn validate<'a>(
        &self,
        node_types: impl IntoIterator<Item = &'a String>,
    ) -> Result<(), UnregisteredHandlerError> {
        let missing = self.missing(node_types);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(UnregisteredHandlerError {
                node_types: missing,
            })
        }
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
