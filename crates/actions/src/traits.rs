//! The `Action` trait — the contract every pluggable action must fulfil.

use async_trait::async_trait;

use fragment::{Fragment, Payload};

use crate::{ActionError, ActionResult};

/// Context passed to every action invocation.
///
/// Defined here (in the actions crate) so both the engine and individual
/// action implementations can import it without a circular dependency.
#[derive(Debug, Clone)]
pub struct ActionContext {
    /// Snapshot of the fragment at invocation time.  Mutating it has no
    /// effect on the task run; writes go through [`ActionResult::delta`].
    pub fragment: Fragment,
    /// Consistent view of the payload so far for this branch.
    pub payload: Payload,
}

impl ActionContext {
    /// Build a context from a fragment snapshot and its branch payload view.
    pub fn new(fragment: Fragment, payload: Payload) -> Self {
        Self { fragment, payload }
    }
}

/// The core action trait.
///
/// Implementations must be safe to abandon mid-flight: when the invoker's
/// timeout elapses the invocation future is dropped and any late result is
/// discarded, so actions must not rely on running to completion.
#[async_trait]
pub trait Action: Send + Sync {
    /// Apply the action to the fragment snapshot and payload view, producing
    /// a labeled outcome and a payload delta.
    async fn apply(&self, ctx: ActionContext) -> Result<ActionResult, ActionError>;
}
