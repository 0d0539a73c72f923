//! Batch façade over the task engine.
//!
//! A request is split into many fragments; each fragment's task runs
//! independently and concurrently.  Results come back in incoming fragment
//! order regardless of completion order, so the assembler can stitch the
//! response without re-sorting.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, instrument};

use fragment::Fragment;

use crate::{Graph, TaskEngine, TaskResult, TaskStatus};

/// One fragment together with the task assigned to it, if any.
pub struct FragmentTask {
    pub fragment: Fragment,
    pub graph: Option<Arc<Graph>>,
}

impl FragmentTask {
    pub fn new(fragment: Fragment, graph: Arc<Graph>) -> Self {
        Self {
            fragment,
            graph: Some(graph),
        }
    }

    /// A fragment no task factory claimed; it passes through unprocessed.
    pub fn unassigned(fragment: Fragment) -> Self {
        Self {
            fragment,
            graph: None,
        }
    }
}

/// Processes a batch of fragments concurrently.
#[derive(Debug, Default)]
pub struct FragmentsEngine {
    engine: TaskEngine,
}

impl FragmentsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every fragment's task concurrently and return results in the
    /// incoming order.
    #[instrument(skip_all, fields(fragments = batch.len()))]
    pub async fn execute(&self, batch: Vec<FragmentTask>) -> Vec<TaskResult> {
        let results = join_all(batch.into_iter().map(|entry| async {
            match entry.graph {
                Some(graph) => self.engine.execute(entry.fragment, graph).await,
                None => TaskResult::unprocessed(entry.fragment),
            }
        }))
        .await;

        let processed = results
            .iter()
            .filter(|r| r.status != TaskStatus::Unprocessed)
            .count();
        debug!(processed, total = results.len(), "batch finished");

        results
    }
}
