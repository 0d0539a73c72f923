//! Graph-construction error types.
//!
//! These are the only errors the engine ever raises to its caller: they
//! occur at load time, never during a task run.  Action-level failures are
//! absorbed into the graph's outcome-label vocabulary instead.

use thiserror::Error;

/// Errors produced while compiling a task definition into a graph.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Two or more nodes share the same ID.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    /// The declared root node does not exist.
    #[error("root node '{0}' does not exist in the graph")]
    MissingRoot(String),

    /// A transition or composite child references a node ID that doesn't
    /// exist in the graph.
    #[error("node '{node_id}' references unknown node '{target}' via '{reference}'")]
    DanglingReference {
        node_id: String,
        /// The transition label or `child` for composite children.
        reference: String,
        target: String,
    },

    /// An action node names an action that is not registered.
    #[error("node '{node_id}' references unregistered action '{action}'")]
    UnknownAction { node_id: String, action: String },

    /// The graph contains a transition cycle.
    #[error("task graph contains a cycle")]
    CycleDetected,
}
