//! The compiled, immutable task graph.
//!
//! Rules enforced at compile time — never during a walk:
//! 1. Node IDs must be unique within the task.
//! 2. Every transition target and composite child must reference an
//!    existing node.
//! 3. Every action reference must resolve against the `ActionRegistry`.
//! 4. The directed graph must be acyclic (topological sort must succeed).
//!
//! A compiled [`Graph`] is read-only and safely shared across all concurrent
//! task runs; per-action circuit-breaker state lives inside the invokers it
//! owns, built exactly once here.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use actions::{ActionInvoker, ActionRegistry, BreakerOptions, InvokerOptions};

use crate::models::{
    BreakerDefinition, CombinationPolicy, NodeDefinition, NodeKindDefinition, TaskDefinition,
    DEFAULT_TRANSITION,
};
use crate::GraphError;

/// Node identifier within one task graph.
pub type NodeId = String;

// ---------------------------------------------------------------------------
// Compiled nodes
// ---------------------------------------------------------------------------

/// A compiled graph node.
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    transitions: HashMap<String, NodeId>,
}

/// Compiled node behaviour.
pub enum NodeKind {
    /// A single action behind its invocation policy.  The invoker is shared
    /// across every run of this graph, so breaker counters see all traffic.
    Action(Arc<ActionInvoker>),
    /// Ordered child subgraph roots executed in parallel.
    Composite {
        children: Vec<NodeId>,
        policy: CombinationPolicy,
    },
}

impl Node {
    /// Resolve the next node for an outcome label; falls back to the
    /// `_default` wildcard entry, then `None` (stop here).
    pub fn next(&self, transition: &str) -> Option<&NodeId> {
        self.transitions
            .get(transition)
            .or_else(|| self.transitions.get(DEFAULT_TRANSITION))
    }
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// An immutable, validated task graph, compiled once and reused across runs.
pub struct Graph {
    task_name: String,
    root: NodeId,
    nodes: HashMap<NodeId, Node>,
}

impl Graph {
    /// Compile and validate a task definition against the action registry.
    ///
    /// # Errors
    /// - [`GraphError::DuplicateNodeId`] if two nodes share an ID.
    /// - [`GraphError::MissingRoot`] if the root ID is unknown.
    /// - [`GraphError::DanglingReference`] for unknown transition targets or
    ///   composite children.
    /// - [`GraphError::UnknownAction`] for unregistered action references.
    /// - [`GraphError::CycleDetected`] if the graph is not acyclic.
    pub fn compile(definition: TaskDefinition, registry: &ActionRegistry) -> Result<Self, GraphError> {
        let mut seen_ids: HashSet<&str> = HashSet::new();
        for node in &definition.nodes {
            if !seen_ids.insert(node.id.as_str()) {
                return Err(GraphError::DuplicateNodeId(node.id.clone()));
            }
        }

        if !seen_ids.contains(definition.root.as_str()) {
            return Err(GraphError::MissingRoot(definition.root.clone()));
        }

        validate_references(&definition.nodes, &seen_ids)?;
        validate_acyclic(&definition.nodes)?;

        let mut nodes = HashMap::with_capacity(definition.nodes.len());
        for node_def in definition.nodes {
            let node = compile_node(node_def, registry)?;
            nodes.insert(node.id.clone(), node);
        }

        debug!(task = %definition.name, nodes = nodes.len(), "task graph compiled");

        Ok(Self {
            task_name: definition.name,
            root: definition.root,
            nodes,
        })
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    /// ID of the node every walk starts at.
    pub fn root(&self) -> &NodeId {
        &self.root
    }

    /// Look up a node by ID.
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Resolve the next node from a finished node's outcome label.
    pub fn resolve_next(&self, node_id: &str, transition: &str) -> Option<&NodeId> {
        self.nodes.get(node_id).and_then(|node| node.next(transition))
    }
}

// ---------------------------------------------------------------------------
// Validation internals
// ---------------------------------------------------------------------------

fn validate_references(
    nodes: &[NodeDefinition],
    node_ids: &HashSet<&str>,
) -> Result<(), GraphError> {
    for node in nodes {
        for (transition, target) in &node.transitions {
            if !node_ids.contains(target.as_str()) {
                return Err(GraphError::DanglingReference {
                    node_id: node.id.clone(),
                    reference: transition.clone(),
                    target: target.clone(),
                });
            }
        }
        if let NodeKindDefinition::Composite { children, .. } = &node.kind {
            for child in children {
                if !node_ids.contains(child.as_str()) {
                    return Err(GraphError::DanglingReference {
                        node_id: node.id.clone(),
                        reference: "child".to_string(),
                        target: child.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Topological sort over transition and composite-child edges (Kahn's
/// algorithm).  If not every node is visited, the graph contains a cycle.
fn validate_acyclic(nodes: &[NodeDefinition]) -> Result<(), GraphError> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_degree: HashMap<&str, usize> = HashMap::new();

    for node in nodes {
        adjacency.entry(node.id.as_str()).or_default();
        in_degree.entry(node.id.as_str()).or_insert(0);
    }

    for node in nodes {
        for target in node.transitions.values() {
            adjacency
                .entry(node.id.as_str())
                .or_default()
                .push(target.as_str());
            *in_degree.entry(target.as_str()).or_insert(0) += 1;
        }
        if let NodeKindDefinition::Composite { children, .. } = &node.kind {
            for child in children {
                adjacency
                    .entry(node.id.as_str())
                    .or_default()
                    .push(child.as_str());
                *in_degree.entry(child.as_str()).or_insert(0) += 1;
            }
        }
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, &degree)| degree == 0)
        .map(|(&id, _)| id)
        .collect();

    let mut visited = 0usize;
    while let Some(node_id) = queue.pop_front() {
        visited += 1;
        if let Some(targets) = adjacency.get(node_id) {
            for &target in targets {
                let degree = in_degree.entry(target).or_insert(0);
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(target);
                }
            }
        }
    }

    if visited != nodes.len() {
        return Err(GraphError::CycleDetected);
    }
    Ok(())
}

fn compile_node(definition: NodeDefinition, registry: &ActionRegistry) -> Result<Node, GraphError> {
    let kind = match definition.kind {
        NodeKindDefinition::Action {
            action,
            timeout_ms,
            fallback,
            breaker,
        } => {
            let implementation =
                registry
                    .get(&action)
                    .ok_or_else(|| GraphError::UnknownAction {
                        node_id: definition.id.clone(),
                        action: action.clone(),
                    })?;

            let mut options = InvokerOptions::default();
            if let Some(ms) = timeout_ms {
                options.timeout = Duration::from_millis(ms);
            }
            options.breaker = breaker.map(breaker_options);

            let mut invoker = ActionInvoker::new(action, implementation, options);
            if let Some(fallback_name) = fallback {
                let fallback_action =
                    registry
                        .get(&fallback_name)
                        .ok_or_else(|| GraphError::UnknownAction {
                            node_id: definition.id.clone(),
                            action: fallback_name.clone(),
                        })?;
                invoker = invoker.with_fallback(fallback_name, fallback_action);
            }
            NodeKind::Action(Arc::new(invoker))
        }
        NodeKindDefinition::Composite { children, policy } => {
            NodeKind::Composite { children, policy }
        }
    };

    Ok(Node {
        id: definition.id,
        kind,
        transitions: definition.transitions,
    })
}

fn breaker_options(definition: BreakerDefinition) -> BreakerOptions {
    BreakerOptions {
        failure_threshold: definition.failure_threshold,
        window: Duration::from_millis(definition.window_ms),
        cooldown: Duration::from_millis(definition.cooldown_ms),
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use actions::mock::MockAction;
    use actions::ActionResult;

    fn registry() -> ActionRegistry {
        let mut registry = ActionRegistry::new();
        registry.register("noop", MockAction::returning("noop", ActionResult::success()));
        registry
    }

    fn action_node(id: &str, transitions: &[(&str, &str)]) -> NodeDefinition {
        NodeDefinition {
            id: id.to_string(),
            kind: NodeKindDefinition::Action {
                action: "noop".into(),
                timeout_ms: None,
                fallback: None,
                breaker: None,
            },
            transitions: transitions
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn composite_node(id: &str, children: &[&str], transitions: &[(&str, &str)]) -> NodeDefinition {
        NodeDefinition {
            id: id.to_string(),
            kind: NodeKindDefinition::Composite {
                children: children.iter().map(|c| c.to_string()).collect(),
                policy: CombinationPolicy::All,
            },
            transitions: transitions
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn linear_chain_compiles_and_resolves_transitions() {
        let definition = TaskDefinition::new(
            "page",
            "a",
            vec![
                action_node("a", &[("_success", "b")]),
                action_node("b", &[("_success", "c")]),
                action_node("c", &[]),
            ],
        );

        let graph = Graph::compile(definition, &registry()).expect("should compile");
        assert_eq!(graph.root(), "a");
        assert_eq!(graph.resolve_next("a", "_success"), Some(&"b".to_string()));
        assert_eq!(graph.resolve_next("c", "_success"), None);
        // No entry and no wildcard: stop.
        assert_eq!(graph.resolve_next("a", "_error"), None);
    }

    #[test]
    fn wildcard_transition_matches_any_label() {
        let definition = TaskDefinition::new(
            "page",
            "a",
            vec![
                action_node("a", &[("_default", "b")]),
                action_node("b", &[]),
            ],
        );

        let graph = Graph::compile(definition, &registry()).expect("should compile");
        assert_eq!(graph.resolve_next("a", "anything"), Some(&"b".to_string()));
    }

    #[test]
    fn duplicate_node_id_is_rejected() {
        let definition = TaskDefinition::new(
            "page",
            "a",
            vec![action_node("a", &[]), action_node("a", &[])],
        );
        assert!(matches!(
            Graph::compile(definition, &registry()),
            Err(GraphError::DuplicateNodeId(id)) if id == "a"
        ));
    }

    #[test]
    fn missing_root_is_rejected() {
        let definition = TaskDefinition::new("page", "ghost", vec![action_node("a", &[])]);
        assert!(matches!(
            Graph::compile(definition, &registry()),
            Err(GraphError::MissingRoot(id)) if id == "ghost"
        ));
    }

    #[test]
    fn dangling_transition_target_is_rejected() {
        let definition =
            TaskDefinition::new("page", "a", vec![action_node("a", &[("_success", "ghost")])]);
        assert!(matches!(
            Graph::compile(definition, &registry()),
            Err(GraphError::DanglingReference { target, .. }) if target == "ghost"
        ));
    }

    #[test]
    fn dangling_composite_child_is_rejected() {
        let definition = TaskDefinition::new(
            "page",
            "gather",
            vec![composite_node("gather", &["ghost"], &[])],
        );
        assert!(matches!(
            Graph::compile(definition, &registry()),
            Err(GraphError::DanglingReference { reference, .. }) if reference == "child"
        ));
    }

    #[test]
    fn unknown_action_is_rejected_at_compile_time() {
        let mut node = action_node("a", &[]);
        node.kind = NodeKindDefinition::Action {
            action: "unregistered".into(),
            timeout_ms: None,
            fallback: None,
            breaker: None,
        };
        let definition = TaskDefinition::new("page", "a", vec![node]);
        assert!(matches!(
            Graph::compile(definition, &registry()),
            Err(GraphError::UnknownAction { action, .. }) if action == "unregistered"
        ));
    }

    #[test]
    fn transition_cycle_is_detected() {
        // a → b → c → a  (back-edge through '_error')
        let definition = TaskDefinition::new(
            "page",
            "a",
            vec![
                action_node("a", &[("_success", "b")]),
                action_node("b", &[("_success", "c")]),
                action_node("c", &[("_error", "a")]),
            ],
        );
        assert!(matches!(
            Graph::compile(definition, &registry()),
            Err(GraphError::CycleDetected)
        ));
    }

    #[test]
    fn diamond_of_transitions_is_valid() {
        //   a
        //  / \
        // b   c     (different labels, both reach d)
        //  \ /
        //   d
        let definition = TaskDefinition::new(
            "page",
            "a",
            vec![
                action_node("a", &[("_success", "b"), ("_error", "c")]),
                action_node("b", &[("_success", "d")]),
                action_node("c", &[("_success", "d")]),
                action_node("d", &[]),
            ],
        );
        assert!(Graph::compile(definition, &registry()).is_ok());
    }

    #[test]
    fn composite_with_children_compiles() {
        let definition = TaskDefinition::new(
            "page",
            "gather",
            vec![
                composite_node("gather", &["left", "right"], &[("_success", "render")]),
                action_node("left", &[]),
                action_node("right", &[]),
                action_node("render", &[]),
            ],
        );
        let graph = Graph::compile(definition, &registry()).expect("should compile");
        assert!(matches!(
            graph.node("gather").unwrap().kind,
            NodeKind::Composite { ref children, .. } if children == &["left", "right"]
        ));
    }
}
