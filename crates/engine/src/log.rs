//! The execution log — an ordered tree of per-node trace records.
//!
//! One log per task run.  Records for a single-node chain appear in
//! invocation order; records for composite children nest under the composite
//! record in declaration order, regardless of completion order.  The log is
//! frozen when the run finishes and is never mutated after handoff to
//! log-rendering consumers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use actions::{Invocation, InvocationStatus};

/// Status recorded for one node execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    Success,
    Error,
    Timeout,
    Fallback,
    ShortCircuited,
    /// The node produced a non-`_success` label with no matching transition.
    UnsupportedTransition,
    Unprocessed,
}

impl From<InvocationStatus> for NodeStatus {
    fn from(status: InvocationStatus) -> Self {
        match status {
            InvocationStatus::Success => NodeStatus::Success,
            InvocationStatus::Error => NodeStatus::Error,
            InvocationStatus::Timeout => NodeStatus::Timeout,
            InvocationStatus::Fallback => NodeStatus::Fallback,
            InvocationStatus::ShortCircuited => NodeStatus::ShortCircuited,
        }
    }
}

/// One entry in the execution log.
#[derive(Debug, Clone, Serialize)]
pub struct NodeRecord {
    /// Graph node this record belongs to.
    pub node: String,
    /// Action reference name, absent for composite nodes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub status: NodeStatus,
    /// Final outcome label the graph transition saw.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Free-form per-node log (action log, error details).
    #[serde(skip_serializing_if = "Value::is_null")]
    pub node_log: Value,
    /// Child-subwalk records, in declaration order.  Non-empty only for
    /// composite nodes.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeRecord>,
}

impl NodeRecord {
    /// Record for one invocation of a single action node.
    pub fn from_invocation(node: &str, invocation: &Invocation) -> Self {
        let node_log = match &invocation.error {
            Some(error) => json!({ "error": error, "action_log": invocation.result.log }),
            None => invocation.result.log.clone(),
        };
        Self {
            node: node.to_string(),
            action: Some(invocation.action.clone()),
            status: invocation.status.into(),
            transition: Some(invocation.result.transition.clone()),
            started_at: invocation.started_at,
            finished_at: invocation.finished_at,
            node_log,
            children: Vec::new(),
        }
    }

    /// Record for a finished composite node, nesting its children.
    pub fn composite(
        node: &str,
        status: NodeStatus,
        transition: &str,
        started_at: DateTime<Utc>,
        children: Vec<NodeRecord>,
    ) -> Self {
        Self {
            node: node.to_string(),
            action: None,
            status,
            transition: Some(transition.to_string()),
            started_at,
            finished_at: Utc::now(),
            node_log: Value::Null,
            children,
        }
    }

    /// Record for a node whose non-`_success` label had no transition entry.
    pub fn unsupported(node: &str, transition: &str) -> Self {
        let now = Utc::now();
        Self {
            node: node.to_string(),
            action: None,
            status: NodeStatus::UnsupportedTransition,
            transition: Some(transition.to_string()),
            started_at: now,
            finished_at: now,
            node_log: Value::Null,
            children: Vec::new(),
        }
    }

    /// Record for a fatal fault that aborted the run at this node.
    pub fn exception(node: &str, error: &str) -> Self {
        let now = Utc::now();
        Self {
            node: node.to_string(),
            action: None,
            status: NodeStatus::Error,
            transition: None,
            started_at: now,
            finished_at: now,
            node_log: json!({ "error": error }),
            children: Vec::new(),
        }
    }
}

/// The full, frozen trace tree for one fragment's task run.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionLog {
    /// Name of the task that produced this log.
    pub task: String,
    pub records: Vec<NodeRecord>,
}

impl ExecutionLog {
    pub fn new(task: impl Into<String>, records: Vec<NodeRecord>) -> Self {
        Self {
            task: task.into(),
            records,
        }
    }

    /// Log of a fragment that no task processed.
    pub fn empty() -> Self {
        Self::new("", Vec::new())
    }

    /// Total number of records, including nested composite children.
    pub fn len(&self) -> usize {
        fn count(records: &[NodeRecord]) -> usize {
            records.iter().map(|r| 1 + count(&r.children)).sum()
        }
        count(&self.records)
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Start of the earliest record, descending into children.
    pub fn earliest_timestamp(&self) -> Option<DateTime<Utc>> {
        fn earliest(records: &[NodeRecord]) -> Option<DateTime<Utc>> {
            records
                .iter()
                .flat_map(|r| std::iter::once(r.started_at).chain(earliest(&r.children)))
                .min()
        }
        earliest(&self.records)
    }

    /// End of the latest record, descending into children.
    pub fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        fn latest(records: &[NodeRecord]) -> Option<DateTime<Utc>> {
            records
                .iter()
                .flat_map(|r| std::iter::once(r.finished_at).chain(latest(&r.children)))
                .max()
        }
        latest(&self.records)
    }

    /// The sequence of (node, transition) pairs in log order — useful for
    /// asserting walk shape in tests.
    pub fn transition_sequence(&self) -> Vec<(String, Option<String>)> {
        self.records
            .iter()
            .map(|r| (r.node.clone(), r.transition.clone()))
            .collect()
    }
}
