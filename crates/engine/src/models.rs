//! Serializable task-graph definitions.
//!
//! These types are what a configuration collaborator hands over — they can
//! be loaded from JSON, validated, and compiled once into an immutable
//! [`crate::Graph`] that is reused across every task run.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Wildcard transition entry: matches any outcome label without an explicit
/// entry in the transition table.
pub const DEFAULT_TRANSITION: &str = "_default";

// ---------------------------------------------------------------------------
// TaskDefinition
// ---------------------------------------------------------------------------

/// A complete task-graph definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    /// Task name, carried into every execution log.
    pub name: String,
    /// ID of the node the walk starts at.
    pub root: String,
    pub nodes: Vec<NodeDefinition>,
}

impl TaskDefinition {
    /// Convenience constructor for tests and inline definitions.
    pub fn new(
        name: impl Into<String>,
        root: impl Into<String>,
        nodes: Vec<NodeDefinition>,
    ) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            nodes,
        }
    }
}

// ---------------------------------------------------------------------------
// NodeDefinition
// ---------------------------------------------------------------------------

/// A single node in the task graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Unique identifier within this task (referenced by transitions).
    pub id: String,
    #[serde(flatten)]
    pub kind: NodeKindDefinition,
    /// Outcome label → next node id.  A missing entry (and no `_default`)
    /// means the walk stops at this node.
    #[serde(default)]
    pub transitions: HashMap<String, String>,
}

/// What the node does: a single bound action, or a parallel composite of
/// child subgraphs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKindDefinition {
    /// Bound to exactly one registered action.
    Action {
        /// Name of the action in the `ActionRegistry`.
        action: String,
        /// Node-level invocation timeout; invoker default when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
        /// Registered action invoked when the primary errors or times out.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fallback: Option<String>,
        /// Circuit-breaker thresholds; breaking disabled when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        breaker: Option<BreakerDefinition>,
    },
    /// An ordered list of child subgraph roots executed in parallel.
    Composite {
        children: Vec<String>,
        #[serde(default)]
        policy: CombinationPolicy,
    },
}

/// How a composite node combines its children's terminal statuses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinationPolicy {
    /// Wait for every child; the composite fails if any child failed.
    #[default]
    All,
    /// The first child to succeed wins; unresolved children are abandoned
    /// and their late results discarded.
    Any,
}

/// Serializable circuit-breaker thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerDefinition {
    pub failure_threshold: u32,
    pub window_ms: u64,
    pub cooldown_ms: u64,
}
