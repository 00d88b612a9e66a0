//! Routing graph: nodes, table-driven edges, compile and invoke.
//!
//! Nodes are registered on a [`StateGraph`] builder together with their
//! outgoing edge, then compiled into an immutable [`WorkflowGraph`]. An edge is
//! either fixed or a routing function that reads the `next_node` field the node
//! just produced. [`NodeId::Terminal`] is the sink: it is never registered and
//! reaching it ends the turn without touching the state.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{Result, WorkflowError};
use crate::types::{NodeId, NodeUpdate, RoutingState};

/// Default upper bound on node executions per turn
pub const DEFAULT_MAX_STEPS: usize = 8;

/// One unit of the routing graph
#[async_trait]
pub trait Node: Send + Sync {
    fn id(&self) -> NodeId;

    /// Consume the current state and produce the update to merge into it
    async fn run(&self, state: &RoutingState) -> Result<NodeUpdate>;
}

/// Routing function for a conditional edge
pub type RouteFn = fn(&RoutingState) -> NodeId;

/// Outgoing edge of a node
#[derive(Clone, Copy)]
pub enum Edge {
    Fixed(NodeId),
    Conditional(RouteFn),
}

impl Edge {
    fn target(&self, state: &RoutingState) -> NodeId {
        match self {
            Edge::Fixed(target) => *target,
            Edge::Conditional(route) => route(state),
        }
    }
}

impl std::fmt::Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Edge::Fixed(target) => write!(f, "Fixed({target})"),
            Edge::Conditional(_) => write!(f, "Conditional"),
        }
    }
}

/// Conditional edge out of the intent classifier.
///
/// Only the specialist is a valid follow-up; everything else, including a
/// classifier that names itself, ends the turn.
pub fn route_after_classification(state: &RoutingState) -> NodeId {
    let target = match state.next_node {
        NodeId::SpecialistResponder => NodeId::SpecialistResponder,
        NodeId::IntentClassifier | NodeId::Terminal => NodeId::Terminal,
    };
    debug!("Routing {} -> {}", state.next_node, target);
    target
}

/// Graph builder
pub struct StateGraph {
    nodes: HashMap<NodeId, Arc<dyn Node>>,
    edges: HashMap<NodeId, Edge>,
    entry: Option<NodeId>,
    max_steps: usize,
}

impl Default for StateGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl StateGraph {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            entry: None,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    pub fn add_node(mut self, node: Arc<dyn Node>) -> Self {
        self.nodes.insert(node.id(), node);
        self
    }

    pub fn add_edge(mut self, from: NodeId, to: NodeId) -> Self {
        self.edges.insert(from, Edge::Fixed(to));
        self
    }

    pub fn add_conditional_edges(mut self, from: NodeId, route: RouteFn) -> Self {
        self.edges.insert(from, Edge::Conditional(route));
        self
    }

    pub fn set_entry_point(mut self, entry: NodeId) -> Self {
        self.entry = Some(entry);
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Validate the wiring and freeze the graph
    pub fn compile(self) -> Result<WorkflowGraph> {
        if self.nodes.contains_key(&NodeId::Terminal) {
            return Err(WorkflowError::Configuration(
                "terminal is a sink and cannot be registered as a node".to_string(),
            ));
        }

        let entry = self
            .entry
            .ok_or_else(|| WorkflowError::Configuration("graph has no entry point".to_string()))?;
        if !self.nodes.contains_key(&entry) {
            return Err(WorkflowError::Configuration(format!(
                "entry point {entry} is not a registered node"
            )));
        }

        for id in self.nodes.keys() {
            if !self.edges.contains_key(id) {
                return Err(WorkflowError::Configuration(format!(
                    "node {id} has no outgoing edge"
                )));
            }
        }

        for (from, edge) in &self.edges {
            if !self.nodes.contains_key(from) {
                return Err(WorkflowError::Configuration(format!(
                    "edge starts at unregistered node {from}"
                )));
            }
            if let Edge::Fixed(to) = edge {
                if *to != NodeId::Terminal && !self.nodes.contains_key(to) {
                    return Err(WorkflowError::Configuration(format!(
                        "edge {from} -> {to} targets an unregistered node"
                    )));
                }
            }
        }

        if self.max_steps == 0 {
            return Err(WorkflowError::Configuration(
                "max_steps must be at least 1".to_string(),
            ));
        }

        debug!(
            "Compiled workflow graph: {} nodes, entry {}",
            self.nodes.len(),
            entry
        );

        Ok(WorkflowGraph {
            nodes: self.nodes,
            edges: self.edges,
            entry,
            max_steps: self.max_steps,
        })
    }
}

/// Compiled, immutable routing graph
pub struct WorkflowGraph {
    nodes: HashMap<NodeId, Arc<dyn Node>>,
    edges: HashMap<NodeId, Edge>,
    entry: NodeId,
    max_steps: usize,
}

impl std::fmt::Debug for WorkflowGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowGraph")
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .field("edges", &self.edges)
            .field("entry", &self.entry)
            .field("max_steps", &self.max_steps)
            .finish()
    }
}

impl WorkflowGraph {
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Run the graph starting at `state.next_node` until the terminal sink.
    ///
    /// A state pointing at the terminal or at an unregistered node starts at
    /// the entry point instead. Node errors come back tagged with the node id.
    pub async fn invoke(&self, mut state: RoutingState) -> Result<RoutingState> {
        let mut current = if self.contains(state.next_node) {
            state.next_node
        } else {
            self.entry
        };
        state.next_node = current;

        let mut steps = 0;
        while current != NodeId::Terminal {
            if steps >= self.max_steps {
                return Err(WorkflowError::StepLimit(self.max_steps));
            }
            steps += 1;

            let Some(node) = self.nodes.get(&current) else {
                warn!("Route targets unregistered node {}, ending turn", current);
                break;
            };

            debug!("Executing node {}", current);
            let update = node.run(&state).await.map_err(|e| e.in_node(current))?;
            state.apply(update);

            current = self
                .edges
                .get(&current)
                .map_or(NodeId::Terminal, |edge| edge.target(&state));
        }

        debug!("Ending workflow after {} steps, next_node={}", steps, state.next_node);
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Node that always answers with a fixed update and counts its runs
    struct FixedNode {
        id: NodeId,
        update: NodeUpdate,
        runs: AtomicUsize,
    }

    impl FixedNode {
        fn new(id: NodeId, response: &str, next_node: NodeId) -> Arc<Self> {
            Arc::new(Self {
                id,
                update: NodeUpdate::respond(response, next_node),
                runs: AtomicUsize::new(0),
            })
        }

        fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Node for FixedNode {
        fn id(&self) -> NodeId {
            self.id
        }

        async fn run(&self, _state: &RoutingState) -> Result<NodeUpdate> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(self.update.clone())
        }
    }

    struct FailingNode(NodeId);

    #[async_trait]
    impl Node for FailingNode {
        fn id(&self) -> NodeId {
            self.0
        }

        async fn run(&self, _state: &RoutingState) -> Result<NodeUpdate> {
            Err(WorkflowError::Provider(anyhow::anyhow!("connection reset")))
        }
    }

    fn two_node_graph(
        classifier: Arc<dyn Node>,
        specialist: Arc<dyn Node>,
    ) -> WorkflowGraph {
        StateGraph::new()
            .add_node(classifier)
            .add_node(specialist)
            .add_conditional_edges(NodeId::IntentClassifier, route_after_classification)
            .add_edge(NodeId::SpecialistResponder, NodeId::Terminal)
            .set_entry_point(NodeId::IntentClassifier)
            .compile()
            .unwrap()
    }

    #[test]
    fn test_route_after_classification() {
        let mut state = RoutingState::new("oi", vec![]);
        state.next_node = NodeId::SpecialistResponder;
        assert_eq!(route_after_classification(&state), NodeId::SpecialistResponder);
        state.next_node = NodeId::Terminal;
        assert_eq!(route_after_classification(&state), NodeId::Terminal);
        state.next_node = NodeId::IntentClassifier;
        assert_eq!(route_after_classification(&state), NodeId::Terminal);
    }

    #[tokio::test]
    async fn test_general_path_skips_specialist() {
        let classifier = FixedNode::new(NodeId::IntentClassifier, "horário", NodeId::Terminal);
        let specialist = FixedNode::new(NodeId::SpecialistResponder, "docs", NodeId::SpecialistResponder);
        let graph = two_node_graph(classifier.clone(), specialist.clone());

        let state = graph.invoke(RoutingState::new("oi", vec![])).await.unwrap();
        assert_eq!(state.response.as_deref(), Some("horário"));
        assert_eq!(state.next_node, NodeId::Terminal);
        assert_eq!(classifier.runs(), 1);
        assert_eq!(specialist.runs(), 0);
    }

    #[tokio::test]
    async fn test_open_company_path_runs_specialist_once() {
        let classifier =
            FixedNode::new(NodeId::IntentClassifier, "vamos lá", NodeId::SpecialistResponder);
        let specialist = FixedNode::new(NodeId::SpecialistResponder, "docs", NodeId::SpecialistResponder);
        let graph = two_node_graph(classifier.clone(), specialist.clone());

        let state = graph.invoke(RoutingState::new("abrir", vec![])).await.unwrap();
        assert_eq!(state.response.as_deref(), Some("docs"));
        // sticky routing field survives the fixed edge to the sink
        assert_eq!(state.next_node, NodeId::SpecialistResponder);
        assert_eq!(specialist.runs(), 1);
    }

    #[tokio::test]
    async fn test_invoke_can_start_at_specialist() {
        let classifier = FixedNode::new(NodeId::IntentClassifier, "x", NodeId::Terminal);
        let specialist = FixedNode::new(NodeId::SpecialistResponder, "docs", NodeId::SpecialistResponder);
        let graph = two_node_graph(classifier.clone(), specialist.clone());

        let mut state = RoutingState::new("e as taxas?", vec![]);
        state.next_node = NodeId::SpecialistResponder;
        let state = graph.invoke(state).await.unwrap();
        assert_eq!(state.next_node, NodeId::SpecialistResponder);
        assert_eq!(classifier.runs(), 0);
        assert_eq!(specialist.runs(), 1);
    }

    #[tokio::test]
    async fn test_terminal_start_uses_entry_point() {
        let classifier = FixedNode::new(NodeId::IntentClassifier, "x", NodeId::Terminal);
        let specialist = FixedNode::new(NodeId::SpecialistResponder, "docs", NodeId::SpecialistResponder);
        let graph = two_node_graph(classifier.clone(), specialist);

        let mut state = RoutingState::new("oi", vec![]);
        state.next_node = NodeId::Terminal;
        graph.invoke(state).await.unwrap();
        assert_eq!(classifier.runs(), 1);
    }

    #[tokio::test]
    async fn test_node_error_is_tagged() {
        let graph = two_node_graph(
            Arc::new(FailingNode(NodeId::IntentClassifier)),
            FixedNode::new(NodeId::SpecialistResponder, "docs", NodeId::SpecialistResponder),
        );
        let err = graph.invoke(RoutingState::new("oi", vec![])).await.unwrap_err();
        assert_eq!(err.node(), Some(NodeId::IntentClassifier));
    }

    #[tokio::test]
    async fn test_step_limit() {
        // specialist looping back to itself through a conditional edge
        fn stay(state: &RoutingState) -> NodeId {
            state.next_node
        }
        let graph = StateGraph::new()
            .add_node(FixedNode::new(NodeId::SpecialistResponder, "again", NodeId::SpecialistResponder))
            .add_conditional_edges(NodeId::SpecialistResponder, stay)
            .set_entry_point(NodeId::SpecialistResponder)
            .with_max_steps(3)
            .compile()
            .unwrap();

        let err = graph.invoke(RoutingState::new("oi", vec![])).await.unwrap_err();
        assert!(matches!(err, WorkflowError::StepLimit(3)));
    }

    #[test]
    fn test_compile_rejects_missing_entry() {
        let result = StateGraph::new()
            .add_node(FixedNode::new(NodeId::IntentClassifier, "x", NodeId::Terminal))
            .add_edge(NodeId::IntentClassifier, NodeId::Terminal)
            .compile();
        assert!(matches!(result, Err(WorkflowError::Configuration(_))));
    }

    #[test]
    fn test_compile_rejects_dangling_edge() {
        let result = StateGraph::new()
            .add_node(FixedNode::new(NodeId::IntentClassifier, "x", NodeId::Terminal))
            .add_edge(NodeId::IntentClassifier, NodeId::SpecialistResponder)
            .set_entry_point(NodeId::IntentClassifier)
            .compile();
        assert!(matches!(result, Err(WorkflowError::Configuration(msg)) if msg.contains("unregistered")));
    }

    #[test]
    fn test_compile_rejects_node_without_edge() {
        let result = StateGraph::new()
            .add_node(FixedNode::new(NodeId::IntentClassifier, "x", NodeId::Terminal))
            .set_entry_point(NodeId::IntentClassifier)
            .compile();
        assert!(matches!(result, Err(WorkflowError::Configuration(msg)) if msg.contains("no outgoing edge")));
    }

    #[test]
    fn test_compile_rejects_terminal_node() {
        let result = StateGraph::new()
            .add_node(FixedNode::new(NodeId::Terminal, "x", NodeId::Terminal))
            .add_edge(NodeId::Terminal, NodeId::Terminal)
            .set_entry_point(NodeId::Terminal)
            .compile();
        assert!(matches!(result, Err(WorkflowError::Configuration(_))));
    }
}
