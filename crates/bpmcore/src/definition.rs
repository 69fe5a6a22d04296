use crate::{DefinitionError, Value, ValueKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

pub type DefinitionId = Uuid;

/// Type tags understood by the default handler set.
pub mod node_types {
    pub const START_EVENT: &str = "start-event";
    pub const END_EVENT: &str = "end-event";
    pub const TASK: &str = "task";
    pub const SCRIPT_TASK: &str = "script-task";
    pub const BUSINESS_RULE_TASK: &str = "business-rule-task";
    pub const FLOW_EDGE: &str = "flow-edge";
    pub const EXCLUSIVE_GATEWAY: &str = "exclusive-gateway";
    pub const INCLUSIVE_GATEWAY: &str = "inclusive-gateway";
    pub const PARALLEL_GATEWAY: &str = "parallel-gateway";
}

/// Immutable process template, as produced by a definition loader
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessDefinition {
    pub id: DefinitionId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub nodes: Vec<NodeTemplate>,
    #[serde(default)]
    pub transitions: Vec<TransitionTemplate>,
    #[serde(default)]
    pub properties: Vec<PropertyDeclaration>,
    #[serde(default)]
    pub settings: ProcessSettings,
}

impl ProcessDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            nodes: Vec::new(),
            transitions: Vec::new(),
            properties: Vec::new(),
            settings: ProcessSettings::default(),
        }
    }

    pub fn add_node(&mut self, node: NodeTemplate) -> String {
        let id = node.id.clone();
        self.nodes.push(node);
        id
    }

    /// Add an unguarded transition from `source` to `target`.
    pub fn connect(
        &mut self,
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> String {
        self.push_transition(TransitionTemplate::new(id, source, target))
    }

    /// Add a transition that only propagates when `guard` evaluates true.
    pub fn connect_when(
        &mut self,
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        guard: impl Into<String>,
    ) -> String {
        self.push_transition(TransitionTemplate::new(id, source, target).with_guard(guard))
    }

    fn push_transition(&mut self, transition: TransitionTemplate) -> String {
        let id = transition.id.clone();
        self.transitions.push(transition);
        id
    }

    pub fn declare(&mut self, property: PropertyDeclaration) {
        self.properties.push(property);
    }

    pub fn find_node(&self, id: &str) -> Option<&NodeTemplate> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn find_transition(&self, id: &str) -> Option<&TransitionTemplate> {
        self.transitions.iter().find(|t| t.id == id)
    }

    pub fn find_property(&self, name: &str) -> Option<&PropertyDeclaration> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// The unique node typed as a start event.
    pub fn start_node(&self) -> Result<&NodeTemplate, DefinitionError> {
        let mut starts = self
            .nodes
            .iter()
            .filter(|n| n.node_type == node_types::START_EVENT);

        let first = starts.next().ok_or(DefinitionError::MissingStart)?;
        let rest: Vec<&NodeTemplate> = starts.collect();
        if rest.is_empty() {
            Ok(first)
        } else {
            let mut ids = vec![first.id.clone()];
            ids.extend(rest.iter().map(|n| n.id.clone()));
            Err(DefinitionError::MultipleStarts(ids))
        }
    }

    /// Check the structural rules a graph build relies on.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        self.start_node()?;

        let mut seen = HashSet::new();
        let ids = self
            .nodes
            .iter()
            .map(|n| &n.id)
            .chain(self.transitions.iter().map(|t| &t.id));
        for id in ids {
            if !seen.insert(id.as_str()) {
                return Err(DefinitionError::DuplicateId(id.clone()));
            }
        }

        for transition in &self.transitions {
            if self.find_node(&transition.source).is_none() {
                return Err(DefinitionError::UnresolvedSource {
                    transition: transition.id.clone(),
                    origin: transition.source.clone(),
                });
            }
            if self.find_node(&transition.target).is_none() {
                return Err(DefinitionError::UnresolvedTarget {
                    transition: transition.id.clone(),
                    target: transition.target.clone(),
                });
            }
        }

        for node in &self.nodes {
            if let Some(source) = &node.source_ref {
                if self.find_node(source).is_none() {
                    return Err(DefinitionError::UnresolvedSourceRef {
                        node: node.id.clone(),
                        origin: source.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Declared vertex of a process
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeTemplate {
    pub id: String,
    pub node_type: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Guard or computed-output body, interpreted by the node's handler.
    #[serde(default)]
    pub expression: Option<String>,
    /// Implicit transition: this node follows `source_ref`.
    #[serde(default)]
    pub source_ref: Option<String>,
}

impl NodeTemplate {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            name: None,
            expression: None,
            source_ref: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }

    pub fn following(mut self, source: impl Into<String>) -> Self {
        self.source_ref = Some(source.into());
        self
    }
}

/// Declared edge between two nodes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransitionTemplate {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub guard: Option<String>,
}

impl TransitionTemplate {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            guard: None,
        }
    }

    pub fn with_guard(mut self, guard: impl Into<String>) -> Self {
        self.guard = Some(guard.into());
        self
    }
}

impl From<&TransitionTemplate> for NodeTemplate {
    fn from(transition: &TransitionTemplate) -> Self {
        NodeTemplate {
            id: transition.id.clone(),
            node_type: node_types::FLOW_EDGE.to_string(),
            name: None,
            expression: transition.guard.clone(),
            source_ref: Some(transition.source.clone()),
        }
    }
}

/// Named, typed process parameter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PropertyDeclaration {
    pub id: String,
    pub name: String,
    pub kind: ValueKind,
    #[serde(default)]
    pub is_collection: bool,
}

impl PropertyDeclaration {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            is_collection: false,
        }
    }

    pub fn collection(mut self) -> Self {
        self.is_collection = true;
        self
    }

    pub fn accepts(&self, value: &Value) -> bool {
        if self.is_collection {
            match value {
                Value::Array(items) => items.iter().all(|item| self.kind.accepts(item)),
                _ => false,
            }
        } else {
            self.kind.accepts(value)
        }
    }

    /// Human-readable declared type, e.g. `string` or `[integer]`.
    pub fn expected(&self) -> String {
        if self.is_collection {
            format!("[{}]", self.kind)
        } else {
            self.kind.to_string()
        }
    }
}

/// Per-definition execution settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProcessSettings {
    /// Upper bound on a single handler execution.
    #[serde(default)]
    pub handler_timeout_ms: Option<u64>,
    #[serde(default)]
    pub on_evaluation_error: EvaluationFailure,
}

/// What a script handler does when its computed-output expression fails.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum EvaluationFailure {
    /// Do not complete the node; the branch ends there.
    #[default]
    HaltBranch,
    /// Complete the node with an empty output.
    Continue,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear() -> ProcessDefinition {
        let mut def = ProcessDefinition::new("linear");
        def.add_node(NodeTemplate::new("start", node_types::START_EVENT));
        def.add_node(NodeTemplate::new("end", node_types::END_EVENT));
        def.connect("f1", "start", "end");
        def
    }

    #[test]
    fn validates_linear_definition() {
        assert!(linear().validate().is_ok());
    }

    #[test]
    fn rejects_missing_and_multiple_starts() {
        let mut def = ProcessDefinition::new("empty");
        def.add_node(NodeTemplate::new("end", node_types::END_EVENT));
        assert_eq!(def.validate(), Err(DefinitionError::MissingStart));

        let mut def = linear();
        def.add_node(NodeTemplate::new("start2", node_types::START_EVENT));
        assert!(matches!(
            def.validate(),
            Err(DefinitionError::MultipleStarts(ids)) if ids.len() == 2
        ));
    }

    #[test]
    fn rejects_unresolvable_transition_target() {
        let mut def = linear();
        def.connect("f2", "end", "nowhere");
        assert_eq!(
            def.validate(),
            Err(DefinitionError::UnresolvedTarget {
                transition: "f2".into(),
                target: "nowhere".into(),
            })
        );
    }

    #[test]
    fn rejects_ids_shared_by_node_and_transition() {
        let mut def = linear();
        def.connect("end", "start", "end");
        assert_eq!(def.validate(), Err(DefinitionError::DuplicateId("end".into())));
    }

    #[test]
    fn source_ref_must_name_a_node() {
        let mut def = linear();
        def.add_node(NodeTemplate::new("audit", node_types::TASK).following("f1"));
        assert_eq!(
            def.validate(),
            Err(DefinitionError::UnresolvedSourceRef {
                node: "audit".into(),
                origin: "f1".into(),
            })
        );

        let mut def = linear();
        def.add_node(NodeTemplate::new("audit", node_types::TASK).following("start"));
        assert!(def.validate().is_ok());
    }

    #[test]
    fn declarations_accept_loader_kind_names() {
        let prop: PropertyDeclaration =
            serde_json::from_str(r#"{"id":"p","name":"x","kind":"int32"}"#).unwrap();
        assert_eq!(prop.kind, ValueKind::Integer);

        let prop: PropertyDeclaration =
            serde_json::from_str(r#"{"id":"p","name":"ok","kind":"Boolean"}"#).unwrap();
        assert_eq!(prop.kind, ValueKind::Boolean);

        let json = serde_json::to_string(&prop).unwrap();
        assert!(json.contains(r#""kind":"boolean""#));
        let back: PropertyDeclaration = serde_json::from_str(&json).unwrap();
        assert_eq!(back, prop);

        assert!(serde_json::from_str::<PropertyDeclaration>(
            r#"{"id":"p","name":"x","kind":"decimal128"}"#
        )
        .is_err());
    }

    #[test]
    fn collection_property_checks_every_element() {
        let prop = PropertyDeclaration::new("p1", "scores", ValueKind::Number).collection();
        assert!(prop.accepts(&Value::Array(vec![1.0.into(), 2.5.into()])));
        assert!(!prop.accepts(&Value::Array(vec![1.0.into(), "x".into()])));
        assert!(!prop.accepts(&Value::Number(1.0)));
        assert_eq!(prop.expected(), "[number]");
    }

    #[test]
    fn definition_round_trips_through_json() {
        let mut def = linear();
        def.settings.handler_timeout_ms = Some(500);
        let json = serde_json::to_string(&def).unwrap();
        let back: ProcessDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(back.nodes, def.nodes);
        assert_eq!(back.transitions, def.transitions);
        assert_eq!(back.settings, def.settings);
    }
}
