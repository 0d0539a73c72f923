//! The task engine — walks a compiled graph for one fragment.
//!
//! `TaskEngine` drives the overall walk:
//! 1. Starts at the graph's root node.
//! 2. Executes the current node (action via its invoker, or a parallel
//!    composite of child sub-walks).
//! 3. Resolves the next node from the produced outcome label.
//! 4. Stops at terminal nodes or unmatched transitions and freezes the
//!    execution log.
//!
//! Single-node chains run strictly sequentially; composite nodes fork one
//! sub-walk per declared child, each on its own payload branch, and join per
//! the combination policy.

use std::sync::Arc;

use chrono::Utc;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use actions::{ActionContext, InvocationStatus, ERROR_TRANSITION, SUCCESS_TRANSITION};
use fragment::{Fragment, FragmentStatus, Payload, PayloadBranch, PayloadDelta};

use crate::graph::{Graph, NodeId, NodeKind};
use crate::log::{ExecutionLog, NodeRecord, NodeStatus};
use crate::models::CombinationPolicy;

// ---------------------------------------------------------------------------
// Task status & result
// ---------------------------------------------------------------------------

/// Terminal state of one task run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// No task was assigned to the fragment.
    Unprocessed,
    /// The walk ended on a success transition.
    Success,
    /// The walk ended on an error, timeout or unsupported transition.
    Failure,
    /// A fatal action error or engine-internal fault aborted the run.
    Error,
}

/// The result of one fragment's task run.
#[derive(Debug)]
pub struct TaskResult {
    /// The fragment with merged payload, final body and definite status.
    pub fragment: Fragment,
    pub status: TaskStatus,
    /// The frozen execution log, complete even for aborted runs.
    pub log: ExecutionLog,
}

impl TaskResult {
    /// Result for a fragment that no task processed.
    pub fn unprocessed(fragment: Fragment) -> Self {
        Self {
            fragment,
            status: TaskStatus::Unprocessed,
            log: ExecutionLog::empty(),
        }
    }
}

// ---------------------------------------------------------------------------
// TaskEngine
// ---------------------------------------------------------------------------

/// Stateless orchestrator that runs task graphs against fragments.
///
/// The engine holds no per-run state; one instance serves any number of
/// concurrent runs.  All shared mutable state lives in the graph's action
/// invokers (circuit-breaker counters) and is synchronized there.
#[derive(Debug, Default)]
pub struct TaskEngine;

impl TaskEngine {
    pub fn new() -> Self {
        Self
    }

    /// Run the graph against the fragment and return the final fragment plus
    /// the execution log.
    ///
    /// Action-level problems never surface as errors here: they are absorbed
    /// into the graph's outcome labels.  A fatal fault ends the run with
    /// [`TaskStatus::Error`] and whatever log was accumulated.
    #[instrument(skip_all, fields(task = %graph.task_name(), fragment_id = %fragment.id))]
    pub async fn execute(&self, fragment: Fragment, graph: Arc<Graph>) -> TaskResult {
        debug!("starting task run");

        let parent_payload = fragment.payload.clone();
        let root = graph.root().clone();
        let outcome = walk(graph.clone(), root, fragment, parent_payload).await;

        let mut fragment = outcome.fragment;
        fragment.merge_in_payload(&outcome.delta);
        fragment.status = match outcome.status {
            TaskStatus::Success => FragmentStatus::Success,
            TaskStatus::Unprocessed => FragmentStatus::Unprocessed,
            TaskStatus::Failure | TaskStatus::Error => FragmentStatus::Failure,
        };

        debug!(status = ?outcome.status, records = outcome.records.len(), "task run finished");

        TaskResult {
            fragment,
            status: outcome.status,
            log: ExecutionLog::new(graph.task_name(), outcome.records),
        }
    }
}

// ---------------------------------------------------------------------------
// Walk
// ---------------------------------------------------------------------------

/// Everything one (sub-)walk produced.
struct WalkOutcome {
    /// Fragment with body/status updates; payload changes travel separately
    /// in `delta` so parents can merge branches deterministically.
    fragment: Fragment,
    delta: PayloadDelta,
    status: TaskStatus,
    records: Vec<NodeRecord>,
}

/// Walk the graph from `start`, mutating an isolated payload branch seeded
/// from `parent_payload`.
///
/// Boxed because composite nodes recurse through spawned child sub-walks.
fn walk(
    graph: Arc<Graph>,
    start: NodeId,
    mut fragment: Fragment,
    parent_payload: Payload,
) -> BoxFuture<'static, WalkOutcome> {
    async move {
        let mut branch = PayloadBranch::from_parent(&parent_payload);
        let mut records: Vec<NodeRecord> = Vec::new();
        let mut status = TaskStatus::Success;
        let mut current = Some(start);

        while let Some(node_id) = current.take() {
            let Some(node) = graph.node(&node_id) else {
                // Unreachable for compiled graphs; treated as an
                // engine-internal fault rather than a panic.
                error!(node = %node_id, "node missing from compiled graph, aborting run");
                records.push(NodeRecord::exception(&node_id, "node missing from compiled graph"));
                status = TaskStatus::Error;
                break;
            };

            let transition = match &node.kind {
                NodeKind::Action(invoker) => {
                    let mut snapshot = fragment.clone();
                    snapshot.payload = branch.view().clone();
                    let ctx = ActionContext::new(snapshot, branch.view().clone());

                    match invoker.invoke(ctx).await {
                        Ok(invocation) => {
                            branch.apply(&invocation.result.delta);
                            if let Some(body) = &invocation.result.body {
                                fragment.set_body(body.clone());
                            }
                            status = match invocation.status {
                                InvocationStatus::Success | InvocationStatus::Fallback => {
                                    TaskStatus::Success
                                }
                                _ => TaskStatus::Failure,
                            };
                            let transition = invocation.result.transition.clone();
                            records.push(NodeRecord::from_invocation(&node_id, &invocation));
                            transition
                        }
                        Err(fatal) => {
                            error!(node = %node_id, error = %fatal, "fatal action error, aborting task run");
                            records.push(NodeRecord::exception(&node_id, &fatal.to_string()));
                            status = TaskStatus::Error;
                            break;
                        }
                    }
                }

                NodeKind::Composite { children, policy } => {
                    let started_at = Utc::now();
                    let entry_body = fragment.body.clone();
                    let entry_payload = branch.view().clone();

                    let handles: Vec<JoinHandle<WalkOutcome>> = children
                        .iter()
                        .map(|child_root| {
                            tokio::spawn(walk(
                                graph.clone(),
                                child_root.clone(),
                                fragment.clone(),
                                entry_payload.clone(),
                            ))
                        })
                        .collect();

                    let (mut finished, composite_status) = match policy {
                        CombinationPolicy::All => join_all_children(handles).await,
                        CombinationPolicy::Any => join_any_child(handles).await,
                    };

                    // Merge finished branches in declaration order so
                    // same-key writes resolve deterministically.
                    finished.sort_by_key(|(index, _)| *index);
                    let mut child_records = Vec::new();
                    for (_, outcome) in finished {
                        branch.apply(&outcome.delta);
                        if outcome.fragment.body != entry_body {
                            fragment.set_body(outcome.fragment.body);
                        }
                        child_records.extend(outcome.records);
                    }

                    let (node_status, transition) = match composite_status {
                        TaskStatus::Success => (NodeStatus::Success, SUCCESS_TRANSITION),
                        _ => (NodeStatus::Error, ERROR_TRANSITION),
                    };
                    records.push(NodeRecord::composite(
                        &node_id,
                        node_status,
                        transition,
                        started_at,
                        child_records,
                    ));

                    if composite_status == TaskStatus::Error {
                        status = TaskStatus::Error;
                        break;
                    }
                    status = composite_status;
                    transition.to_string()
                }
            };

            match node.next(&transition) {
                Some(next) => current = Some(next.clone()),
                None => {
                    if transition != SUCCESS_TRANSITION {
                        warn!(node = %node_id, %transition, "no transition entry, ending walk as failure");
                        status = TaskStatus::Failure;
                        records.push(NodeRecord::unsupported(&node_id, &transition));
                    }
                }
            }
        }

        WalkOutcome {
            fragment,
            delta: branch.into_delta(),
            status,
            records,
        }
    }
    .boxed()
}

// ---------------------------------------------------------------------------
// Combination policies
// ---------------------------------------------------------------------------

/// Wait for every child.  Status precedence: any `Error` wins, then any
/// `Failure`, else `Success`.
async fn join_all_children(
    handles: Vec<JoinHandle<WalkOutcome>>,
) -> (Vec<(usize, WalkOutcome)>, TaskStatus) {
    let mut finished = Vec::with_capacity(handles.len());
    let mut status = TaskStatus::Success;

    for (index, handle) in handles.into_iter().enumerate() {
        match handle.await {
            Ok(outcome) => {
                status = combine_status(status, outcome.status);
                finished.push((index, outcome));
            }
            Err(join_error) => {
                error!(child = index, error = %join_error, "child sub-walk panicked");
                status = TaskStatus::Error;
            }
        }
    }
    (finished, status)
}

/// First successful child wins; unresolved children are abandoned (they keep
/// running detached, their late results discarded, never merged).
async fn join_any_child(
    handles: Vec<JoinHandle<WalkOutcome>>,
) -> (Vec<(usize, WalkOutcome)>, TaskStatus) {
    let total = handles.len();
    let mut pending: FuturesUnordered<_> = handles
        .into_iter()
        .enumerate()
        .map(|(index, handle)| async move { (index, handle.await) })
        .collect();

    let mut finished = Vec::new();
    let mut status = TaskStatus::Failure;

    while let Some((index, joined)) = pending.next().await {
        match joined {
            Ok(outcome) => {
                let child_status = outcome.status;
                finished.push((index, outcome));
                match child_status {
                    TaskStatus::Success => {
                        status = TaskStatus::Success;
                        break;
                    }
                    TaskStatus::Error => {
                        status = TaskStatus::Error;
                        break;
                    }
                    _ => {}
                }
            }
            Err(join_error) => {
                error!(child = index, error = %join_error, "child sub-walk panicked");
                status = TaskStatus::Error;
                break;
            }
        }
    }

    if finished.len() < total {
        debug!(
            resolved = finished.len(),
            total, "stopping condition met, discarding unresolved children"
        );
    }
    // Dropping `pending` detaches the remaining join handles.
    (finished, status)
}

fn combine_status(left: TaskStatus, right: TaskStatus) -> TaskStatus {
    use TaskStatus::{Error, Failure};
    match (left, right) {
        (Error, _) | (_, Error) => Error,
        (Failure, _) | (_, Failure) => Failure,
        _ => TaskStatus::Success,
    }
}
