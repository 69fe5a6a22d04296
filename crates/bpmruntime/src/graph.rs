use crate::node::ProcessNode;
use bpmcore::{node_types, DefinitionError, NodeTemplate, ProcessDefinition};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

/// Anything that can sit on a vertex of a [`ProcessGraph`].
pub trait Vertex {
    fn node_type(&self) -> &str;
}

impl Vertex for NodeTemplate {
    fn node_type(&self) -> &str {
        &self.node_type
    }
}

impl Vertex for Arc<ProcessNode> {
    fn node_type(&self) -> &str {
        ProcessNode::node_type(self)
    }
}

/// One row of [`ProcessGraph::describe`]: id, successor ids, predecessor ids.
pub type VertexLinks = (String, Vec<String>, Vec<String>);

/// Linked process graph rooted at the start node
///
/// Holds exactly one vertex per template id reachable from the start node.
#[derive(Debug, Clone)]
pub struct ProcessGraph<N> {
    graph: DiGraph<N, ()>,
    index: HashMap<String, NodeIndex>,
    ids: Vec<String>,
    start: NodeIndex,
}

impl<N> ProcessGraph<N> {
    pub fn start(&self) -> &N {
        &self.graph[self.start]
    }

    pub fn start_id(&self) -> &str {
        &self.ids[self.start.index()]
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&N> {
        self.index.get(id).map(|idx| &self.graph[*idx])
    }

    /// Vertex ids in sorted order.
    pub fn node_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.ids.iter().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn nodes(&self) -> impl Iterator<Item = &N> {
        self.graph.node_weights()
    }

    /// Direct successors, in the order their links were declared.
    pub fn successors(&self, id: &str) -> Vec<&N> {
        self.neighbors(id, Direction::Outgoing)
            .into_iter()
            .map(|idx| &self.graph[idx])
            .collect()
    }

    pub fn predecessors(&self, id: &str) -> Vec<&N> {
        self.neighbors(id, Direction::Incoming)
            .into_iter()
            .map(|idx| &self.graph[idx])
            .collect()
    }

    pub fn successor_ids(&self, id: &str) -> Vec<String> {
        self.neighbor_ids(id, Direction::Outgoing)
    }

    pub fn predecessor_ids(&self, id: &str) -> Vec<String> {
        self.neighbor_ids(id, Direction::Incoming)
    }

    /// Sorted `(id, successors, predecessors)` rows; two builds of the same
    /// definition describe identically.
    pub fn describe(&self) -> Vec<VertexLinks> {
        let mut rows: Vec<VertexLinks> = self
            .ids
            .iter()
            .map(|id| {
                let mut successors = self.successor_ids(id);
                let mut predecessors = self.predecessor_ids(id);
                successors.sort();
                predecessors.sort();
                (id.clone(), successors, predecessors)
            })
            .collect();
        rows.sort();
        rows
    }

    /// Same shape, new vertex payload.
    pub fn map<M>(&self, mut f: impl FnMut(&N) -> M) -> ProcessGraph<M> {
        ProcessGraph {
            graph: self.graph.map(|_, node| f(node), |_, edge| *edge),
            index: self.index.clone(),
            ids: self.ids.clone(),
            start: self.start,
        }
    }

    fn neighbors(&self, id: &str, direction: Direction) -> Vec<NodeIndex> {
        let Some(idx) = self.index.get(id) else {
            return Vec::new();
        };
        // petgraph lists neighbors newest-first
        let mut found: Vec<NodeIndex> = self.graph.neighbors_directed(*idx, direction).collect();
        found.reverse();
        found
    }

    fn neighbor_ids(&self, id: &str, direction: Direction) -> Vec<String> {
        self.neighbors(id, direction)
            .into_iter()
            .map(|idx| self.ids[idx.index()].clone())
            .collect()
    }
}

impl<N: Vertex> ProcessGraph<N> {
    /// Every distinct type tag present in the graph.
    pub fn node_types(&self) -> BTreeSet<String> {
        self.graph
            .node_weights()
            .map(|n| n.node_type().to_string())
            .collect()
    }
}

/// Resolves a definition into a linked [`ProcessGraph`]
///
/// Successors of a node are the flow-edge vertices of the transitions
/// leaving it; a node with no outgoing transitions is followed by the
/// templates whose `source_ref` names it. A flow-edge vertex is followed by
/// its transition's target. The walk is a breadth-first worklist keyed by
/// template id, so reconverging and cyclic paths link back to the vertex
/// that already exists instead of building it again.
pub struct GraphBuilder<'a> {
    definition: &'a ProcessDefinition,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(definition: &'a ProcessDefinition) -> Self {
        Self { definition }
    }

    pub fn build(&self) -> Result<ProcessGraph<NodeTemplate>, DefinitionError> {
        self.definition.validate()?;
        let start = self.definition.start_node()?;

        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        let mut ids = Vec::new();

        let start_idx = graph.add_node(start.clone());
        index.insert(start.id.clone(), start_idx);
        ids.push(start.id.clone());

        let mut queue = VecDeque::from([start_idx]);
        while let Some(current) = queue.pop_front() {
            let template = graph[current].clone();
            for successor in self.successors_of(&template)? {
                let next = match index.get(&successor.id) {
                    Some(existing) => *existing,
                    None => {
                        let id = successor.id.clone();
                        let idx = graph.add_node(successor);
                        index.insert(id.clone(), idx);
                        ids.push(id);
                        queue.push_back(idx);
                        idx
                    }
                };
                graph.update_edge(current, next, ());
            }
        }

        tracing::debug!(
            definition = %self.definition.id,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "Built process graph"
        );

        Ok(ProcessGraph {
            graph,
            index,
            ids,
            start: start_idx,
        })
    }

    fn successors_of(&self, node: &NodeTemplate) -> Result<Vec<NodeTemplate>, DefinitionError> {
        if node.node_type == node_types::FLOW_EDGE {
            if let Some(transition) = self.definition.find_transition(&node.id) {
                let target = self.definition.find_node(&transition.target).ok_or_else(|| {
                    DefinitionError::UnresolvedTarget {
                        transition: transition.id.clone(),
                        target: transition.target.clone(),
                    }
                })?;
                return Ok(vec![target.clone()]);
            }
        }

        let outgoing: Vec<NodeTemplate> = self
            .definition
            .transitions
            .iter()
            .filter(|t| t.source == node.id)
            .map(NodeTemplate::from)
            .collect();
        if !outgoing.is_empty() {
            return Ok(outgoing);
        }

        Ok(self
            .definition
            .nodes
            .iter()
            .filter(|n| n.source_ref.as_deref() == Some(node.id.as_str()))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bpmcore::node_types::*;

    fn split_join() -> ProcessDefinition {
        let mut def = ProcessDefinition::new("split-join");
        def.add_node(NodeTemplate::new("start", START_EVENT));
        def.add_node(NodeTemplate::new("split", PARALLEL_GATEWAY));
        def.add_node(NodeTemplate::new("a", TASK));
        def.add_node(NodeTemplate::new("b", TASK));
        def.add_node(NodeTemplate::new("join", PARALLEL_GATEWAY));
        def.add_node(NodeTemplate::new("end", END_EVENT));
        def.connect("f0", "start", "split");
        def.connect("f1", "split", "a");
        def.connect("f2", "split", "b");
        def.connect("f3", "a", "join");
        def.connect("f4", "b", "join");
        def.connect("f5", "join", "end");
        def
    }

    #[test]
    fn transitions_become_flow_edge_vertices() {
        let graph = GraphBuilder::new(&split_join()).build().unwrap();

        assert_eq!(graph.len(), 12);
        assert_eq!(graph.start_id(), "start");
        assert_eq!(graph.successor_ids("split"), vec!["f1", "f2"]);
        assert_eq!(graph.successor_ids("f1"), vec!["a"]);
        assert_eq!(graph.get("f1").unwrap().node_type, FLOW_EDGE);
    }

    #[test]
    fn reconverging_paths_share_one_vertex() {
        let graph = GraphBuilder::new(&split_join()).build().unwrap();

        let mut preds = graph.predecessor_ids("join");
        preds.sort();
        assert_eq!(preds, vec!["f3", "f4"]);
        assert_eq!(graph.node_ids().iter().filter(|id| **id == "join").count(), 1);
        assert_eq!(graph.successor_ids("join"), vec!["f5"]);
    }

    #[test]
    fn cycles_terminate_with_one_vertex_per_id() {
        let mut def = ProcessDefinition::new("loop");
        def.add_node(NodeTemplate::new("start", START_EVENT));
        def.add_node(NodeTemplate::new("check", EXCLUSIVE_GATEWAY));
        def.add_node(NodeTemplate::new("work", TASK));
        def.add_node(NodeTemplate::new("end", END_EVENT));
        def.connect("f0", "start", "check");
        def.connect_when("f1", "check", "work", "n < 3");
        def.connect("f2", "work", "check");
        def.connect_when("f3", "check", "end", "n >= 3");

        let graph = GraphBuilder::new(&def).build().unwrap();

        assert_eq!(graph.len(), 8);
        let mut preds = graph.predecessor_ids("check");
        preds.sort();
        assert_eq!(preds, vec!["f0", "f2"]);
        assert_eq!(graph.get("f1").unwrap().expression.as_deref(), Some("n < 3"));
    }

    #[test]
    fn self_loop_links_back_to_itself() {
        let mut def = ProcessDefinition::new("self");
        def.add_node(NodeTemplate::new("start", START_EVENT));
        def.add_node(NodeTemplate::new("spin", TASK));
        def.connect("f0", "start", "spin");
        def.connect("f1", "spin", "spin");

        let graph = GraphBuilder::new(&def).build().unwrap();

        assert_eq!(graph.len(), 4);
        assert_eq!(graph.successor_ids("f1"), vec!["spin"]);
        let mut preds = graph.predecessor_ids("spin");
        preds.sort();
        assert_eq!(preds, vec!["f0", "f1"]);
    }

    #[test]
    fn implicit_source_refs_link_when_no_transitions_leave() {
        let mut def = ProcessDefinition::new("implicit");
        def.add_node(NodeTemplate::new("start", START_EVENT));
        def.add_node(NodeTemplate::new("task", TASK).following("start"));
        def.add_node(NodeTemplate::new("end", END_EVENT).following("task"));

        let graph = GraphBuilder::new(&def).build().unwrap();

        assert_eq!(graph.len(), 3);
        assert_eq!(graph.successor_ids("start"), vec!["task"]);
        assert_eq!(graph.predecessor_ids("end"), vec!["task"]);
    }

    #[test]
    fn unreachable_templates_are_left_out() {
        let mut def = split_join();
        def.add_node(NodeTemplate::new("orphan", TASK));

        let graph = GraphBuilder::new(&def).build().unwrap();

        assert!(!graph.contains("orphan"));
    }

    #[test]
    fn building_twice_gives_identical_structure() {
        let def = split_join();
        let first = GraphBuilder::new(&def).build().unwrap();
        let second = GraphBuilder::new(&def).build().unwrap();

        assert_eq!(first.describe(), second.describe());
        assert_eq!(first.edge_count(), second.edge_count());
    }

    #[test]
    fn unresolvable_target_is_a_definition_error() {
        let mut def = split_join();
        def.connect("f9", "end", "missing");

        let err = GraphBuilder::new(&def).build().unwrap_err();

        assert_eq!(
            err,
            DefinitionError::UnresolvedTarget {
                transition: "f9".into(),
                target: "missing".into(),
            }
        );
    }

    #[test]
    fn node_types_are_distinct() {
        let graph = GraphBuilder::new(&split_join()).build().unwrap();
        let types: Vec<String> = graph.node_types().into_iter().collect();

        assert_eq!(
            types,
            vec![END_EVENT, FLOW_EDGE, PARALLEL_GATEWAY, START_EVENT, TASK]
        );
    }
}
