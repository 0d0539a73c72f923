//! `actions` crate — the `Action` contract and the invocation policy layer.
//!
//! Every pluggable action — HTTP fetcher, cache lookup, static default —
//! implements [`Action`].  The engine never calls an action directly: it goes
//! through an [`ActionInvoker`], which enforces the node-level timeout,
//! circuit breaking and fallback policy and emits one [`Invocation`] record
//! per call.

pub mod breaker;
pub mod error;
pub mod invoker;
pub mod mock;
pub mod registry;
pub mod result;
pub mod traits;

pub use breaker::{Breaker, BreakerOptions, BreakerState};
pub use error::ActionError;
pub use invoker::{ActionInvoker, Invocation, InvocationStatus, InvokerOptions};
pub use registry::ActionRegistry;
pub use result::{ActionResult, ERROR_TRANSITION, SUCCESS_TRANSITION, TIMEOUT_TRANSITION};
pub use traits::{Action, ActionContext};
