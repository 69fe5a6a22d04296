use crate::instance::ProcessInstance;
use bpmcore::{DefinitionError, DefinitionId, EventBus, ProcessDefinition, ProcessError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Keeps loaded definitions and creates instances from them
pub struct Engine {
    config: RuntimeConfig,
    event_bus: Arc<EventBus>,
    definitions: Arc<RwLock<HashMap<DefinitionId, Arc<ProcessDefinition>>>>,
}

impl Engine {
    /// Create a new engine with default settings
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));

        Self {
            config,
            event_bus,
            definitions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Validate and keep a definition for later instantiation
    pub fn register_definition(
        &self,
        definition: ProcessDefinition,
    ) -> Result<DefinitionId, DefinitionError> {
        definition.validate()?;
        let id = definition.id;
        tracing::info!("Registering process definition: {} ({})", definition.name, id);
        self.definitions.write().insert(id, Arc::new(definition));
        Ok(id)
    }

    pub fn definition(&self, id: DefinitionId) -> Option<Arc<ProcessDefinition>> {
        self.definitions.read().get(&id).cloned()
    }

    pub fn list_definitions(&self) -> Vec<Arc<ProcessDefinition>> {
        self.definitions.read().values().cloned().collect()
    }

    /// Create an instance of a registered definition
    pub fn instantiate(&self, id: DefinitionId) -> Result<ProcessInstance, ProcessError> {
        let definition = self
            .definition(id)
            .ok_or(ProcessError::DefinitionNotFound(id))?;
        Ok(self.instantiate_definition(definition)?)
    }

    /// Create an instance directly (without registration)
    pub fn instantiate_definition(
        &self,
        definition: Arc<ProcessDefinition>,
    ) -> Result<ProcessInstance, DefinitionError> {
        ProcessInstance::with_config(definition, &self.config, self.event_bus.clone())
    }

    /// Subscribe to events from every instance this engine created
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<bpmcore::ExecutionEvent> {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the engine and the instances it creates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub event_buffer_size: usize,
    /// Fallback handler timeout for definitions that set none
    pub handler_timeout_ms: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: 1000,
            handler_timeout_ms: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bpmcore::{node_types, NodeTemplate};

    fn minimal() -> ProcessDefinition {
        let mut def = ProcessDefinition::new("minimal");
        def.add_node(NodeTemplate::new("start", node_types::START_EVENT));
        def.add_node(NodeTemplate::new("end", node_types::END_EVENT));
        def.connect("f1", "start", "end");
        def
    }

    #[test]
    fn instantiates_registered_definitions() {
        let engine = Engine::new();
        let id = engine.register_definition(minimal()).unwrap();

        let first = engine.instantiate(id).unwrap();
        let second = engine.instantiate(id).unwrap();

        assert_ne!(first.id(), second.id());
        assert_eq!(first.graph().describe(), second.graph().describe());
    }

    #[test]
    fn unknown_definition_is_reported() {
        let engine = Engine::new();
        let missing = DefinitionId::new_v4();

        assert!(matches!(
            engine.instantiate(missing),
            Err(ProcessError::DefinitionNotFound(id)) if id == missing
        ));
    }

    #[test]
    fn invalid_definitions_are_not_registered() {
        let engine = Engine::new();
        let mut def = minimal();
        def.connect("f2", "end", "ghost");

        assert!(engine.register_definition(def).is_err());
        assert!(engine.list_definitions().is_empty());
    }
}
