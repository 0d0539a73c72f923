//! Action-level error type.

use thiserror::Error;

/// Errors returned by an action's `apply` method.
///
/// The invoker uses the variant to decide propagation:
/// - `Failed` — absorbed into a `_error` outcome and routed by the graph.
/// - `Fatal`  — surfaces to the engine and aborts the whole task run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// Ordinary failure; the graph author decides where `_error` leads.
    #[error("action failed: {0}")]
    Failed(String),

    /// Unrecoverable fault; the task run ends with status `Error`.
    #[error("fatal action error: {0}")]
    Fatal(String),
}

impl ActionError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ActionError::Fatal(_))
    }
}
