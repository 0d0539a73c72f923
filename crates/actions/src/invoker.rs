//! The action invoker — timeout, circuit breaking and fallback around one
//! pluggable action.
//!
//! The engine never applies an action directly.  Each action reference in a
//! graph is compiled into one `ActionInvoker`, shared across every concurrent
//! task run, so the breaker's rolling counters see all traffic for that
//! reference.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::result::{ERROR_TRANSITION, TIMEOUT_TRANSITION};
use crate::{Action, ActionContext, ActionError, ActionResult, Breaker, BreakerOptions};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Invocation policy for one action reference.
#[derive(Debug, Clone)]
pub struct InvokerOptions {
    /// Deadline after which the invocation is abandoned.
    pub timeout: Duration,
    /// Circuit-breaker thresholds; `None` disables breaking.
    pub breaker: Option<BreakerOptions>,
}

impl Default for InvokerOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            breaker: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Invocation record
// ---------------------------------------------------------------------------

/// Final status of one invocation, after all policy paths were applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvocationStatus {
    /// The action completed with a non-error transition.
    Success,
    /// The action failed or returned `_error`, and no fallback intercepted.
    Error,
    /// The invocation was abandoned at its timeout.
    Timeout,
    /// A fallback action supplied the final result.
    Fallback,
    /// The open circuit rejected the invocation without calling the action.
    ShortCircuited,
}

/// What one call through the invoker produced — exactly one per invocation,
/// regardless of path.
#[derive(Debug, Clone, Serialize)]
pub struct Invocation {
    /// Action reference name.
    pub action: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: InvocationStatus,
    /// The result the graph transition will see.  On `Error`/`Timeout`/
    /// `ShortCircuited` this is a synthesized result with an empty delta —
    /// failed invocations never contribute payload writes.
    pub result: ActionResult,
    /// Failure detail, when there was one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// ActionInvoker
// ---------------------------------------------------------------------------

/// Wraps one action reference behind timeout, circuit-breaker and fallback
/// policy, normalizing any outcome to a labeled result.
pub struct ActionInvoker {
    name: String,
    action: Arc<dyn Action>,
    fallback: Option<(String, Arc<dyn Action>)>,
    timeout: Duration,
    breaker: Option<Breaker>,
}

impl ActionInvoker {
    pub fn new(name: impl Into<String>, action: Arc<dyn Action>, options: InvokerOptions) -> Self {
        Self {
            name: name.into(),
            action,
            fallback: None,
            timeout: options.timeout,
            breaker: options.breaker.map(Breaker::new),
        }
    }

    /// Configure a fallback action, invoked on `_error`/`_timeout`/open
    /// circuit.  The fallback's own transition is what the graph sees.
    #[must_use]
    pub fn with_fallback(mut self, name: impl Into<String>, action: Arc<dyn Action>) -> Self {
        self.fallback = Some((name.into(), action));
        self
    }

    /// Action reference name this invoker is bound to.
    pub fn action_name(&self) -> &str {
        &self.name
    }

    /// Execute the bound action under policy.
    ///
    /// Ordinary failures and timeouts are absorbed into the outcome-label
    /// vocabulary; only [`ActionError::Fatal`] propagates, aborting the task
    /// run.
    pub async fn invoke(&self, ctx: ActionContext) -> Result<Invocation, ActionError> {
        let started_at = Utc::now();
        debug!(action = %self.name, "invoking action");

        let (mut status, mut result, mut error) = if self.acquire() {
            self.invoke_primary(ctx.clone()).await?
        } else {
            warn!(action = %self.name, "circuit open, short-circuiting invocation");
            (
                InvocationStatus::ShortCircuited,
                synthetic(ERROR_TRANSITION),
                Some("circuit open".to_string()),
            )
        };

        if status != InvocationStatus::Success {
            if let Some((fallback_name, fallback)) = &self.fallback {
                match tokio::time::timeout(self.timeout, fallback.apply(ctx)).await {
                    Ok(Ok(fallback_result)) => {
                        debug!(action = %self.name, fallback = %fallback_name,
                            transition = %fallback_result.transition, "fallback supplied result");
                        status = InvocationStatus::Fallback;
                        result = fallback_result;
                        error = None;
                    }
                    Ok(Err(e)) if e.is_fatal() => return Err(e),
                    Ok(Err(e)) => {
                        warn!(action = %self.name, fallback = %fallback_name, %e,
                            "fallback failed, keeping primary outcome");
                    }
                    Err(_) => {
                        warn!(action = %self.name, fallback = %fallback_name,
                            "fallback timed out, keeping primary outcome");
                    }
                }
            }
        }

        Ok(Invocation {
            action: self.name.clone(),
            started_at,
            finished_at: Utc::now(),
            status,
            result,
            error,
        })
    }

    fn acquire(&self) -> bool {
        self.breaker.as_ref().map_or(true, Breaker::try_acquire)
    }

    fn record(&self, success: bool) {
        if let Some(breaker) = &self.breaker {
            if success {
                breaker.record_success();
            } else {
                breaker.record_failure();
            }
        }
    }

    /// Run the primary action under the timeout, normalizing every outcome.
    ///
    /// The timeout drops the invocation future, so a late result can never
    /// race into shared state — it is simply discarded.
    async fn invoke_primary(
        &self,
        ctx: ActionContext,
    ) -> Result<(InvocationStatus, ActionResult, Option<String>), ActionError> {
        match tokio::time::timeout(self.timeout, self.action.apply(ctx)).await {
            Ok(Ok(result)) if result.is_error() => {
                // A delivered `_error` counts as a failure: the breaker sees
                // it and the fallback may intercept it.  Its delta is
                // dropped, its log kept.
                self.record(false);
                let log = result.log;
                Ok((
                    InvocationStatus::Error,
                    synthetic(ERROR_TRANSITION).log(log),
                    None,
                ))
            }
            Ok(Ok(result)) => {
                self.record(true);
                Ok((InvocationStatus::Success, result, None))
            }
            Ok(Err(e)) if e.is_fatal() => {
                self.record(false);
                Err(e)
            }
            Ok(Err(e)) => {
                self.record(false);
                warn!(action = %self.name, %e, "action failed, absorbing into '_error'");
                Ok((
                    InvocationStatus::Error,
                    synthetic(ERROR_TRANSITION),
                    Some(e.to_string()),
                ))
            }
            Err(_) => {
                self.record(false);
                warn!(action = %self.name, timeout = ?self.timeout, "action timed out, abandoning invocation");
                Ok((
                    InvocationStatus::Timeout,
                    synthetic(TIMEOUT_TRANSITION),
                    Some(format!("timed out after {:?}", self.timeout)),
                ))
            }
        }
    }
}

/// An empty-delta result carrying only a reserved transition.
fn synthetic(transition: &str) -> ActionResult {
    ActionResult::with_transition(transition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockAction;
    use crate::SUCCESS_TRANSITION;
    use fragment::{Fragment, Payload, PayloadDelta};
    use serde_json::json;

    fn ctx() -> ActionContext {
        ActionContext::new(Fragment::new("snippet", json!({}), "body"), Payload::new())
    }

    fn options_with_timeout(ms: u64) -> InvokerOptions {
        InvokerOptions {
            timeout: Duration::from_millis(ms),
            breaker: None,
        }
    }

    #[tokio::test]
    async fn success_result_passes_through_unchanged() {
        let delta = PayloadDelta::new().with("fetched", json!({ "items": 3 }));
        let action = MockAction::returning("fetch", ActionResult::success().delta(delta.clone()));
        let invoker = ActionInvoker::new("fetch", action, InvokerOptions::default());

        let invocation = invoker.invoke(ctx()).await.unwrap();

        assert_eq!(invocation.status, InvocationStatus::Success);
        assert_eq!(invocation.result.transition, SUCCESS_TRANSITION);
        assert_eq!(invocation.result.delta, delta);
        assert!(invocation.error.is_none());
    }

    #[tokio::test]
    async fn failure_is_absorbed_into_error_transition() {
        let action = MockAction::failing("fetch", "upstream 503");
        let invoker = ActionInvoker::new("fetch", action, InvokerOptions::default());

        let invocation = invoker.invoke(ctx()).await.unwrap();

        assert_eq!(invocation.status, InvocationStatus::Error);
        assert_eq!(invocation.result.transition, ERROR_TRANSITION);
        assert!(invocation.result.delta.is_empty());
        assert!(invocation.error.unwrap().contains("upstream 503"));
    }

    #[tokio::test]
    async fn fatal_error_propagates() {
        let action = MockAction::fatal("fetch", "engine bug");
        let invoker = ActionInvoker::new("fetch", action, InvokerOptions::default());

        let result = invoker.invoke(ctx()).await;
        assert!(matches!(result, Err(ActionError::Fatal(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_action_times_out_with_timeout_transition() {
        let action = MockAction::hanging("slow");
        let invoker = ActionInvoker::new("slow", action, options_with_timeout(100));

        let invocation = invoker.invoke(ctx()).await.unwrap();

        assert_eq!(invocation.status, InvocationStatus::Timeout);
        assert_eq!(invocation.result.transition, TIMEOUT_TRANSITION);
    }

    #[tokio::test(start_paused = true)]
    async fn late_result_is_discarded_not_merged() {
        let delta = PayloadDelta::new().with("late", json!(true));
        let action = MockAction::delayed(
            "slow",
            Duration::from_millis(200),
            ActionResult::success().delta(delta),
        );
        let invoker = ActionInvoker::new("slow", action.clone(), options_with_timeout(100));

        let invocation = invoker.invoke(ctx()).await.unwrap();

        assert_eq!(invocation.status, InvocationStatus::Timeout);
        assert!(invocation.result.delta.is_empty());
        // The invocation future was dropped at the deadline: the action never
        // reached its completion point.
        assert!(!action.ran_to_completion());
    }

    #[tokio::test]
    async fn fallback_transition_is_what_the_graph_sees() {
        let primary = MockAction::failing("fetch", "down");
        let fallback = MockAction::returning(
            "cached",
            ActionResult::with_transition("cached")
                .delta(PayloadDelta::new().with("source", json!("cache"))),
        );
        let invoker = ActionInvoker::new("fetch", primary, InvokerOptions::default())
            .with_fallback("cached", fallback);

        let invocation = invoker.invoke(ctx()).await.unwrap();

        assert_eq!(invocation.status, InvocationStatus::Fallback);
        assert_eq!(invocation.result.transition, "cached");
        assert_eq!(invocation.result.delta.get("source"), Some(&json!("cache")));
    }

    #[tokio::test]
    async fn open_circuit_short_circuits_without_calling_action() {
        let action = MockAction::failing("flaky", "boom");
        let invoker = ActionInvoker::new(
            "flaky",
            action.clone(),
            InvokerOptions {
                timeout: Duration::from_secs(1),
                breaker: Some(BreakerOptions {
                    failure_threshold: 2,
                    window: Duration::from_secs(60),
                    cooldown: Duration::from_secs(60),
                }),
            },
        );

        // Two failures within the window trip the circuit.
        for _ in 0..2 {
            let invocation = invoker.invoke(ctx()).await.unwrap();
            assert_eq!(invocation.status, InvocationStatus::Error);
        }
        assert_eq!(action.call_count(), 2);

        // The next invocation is rejected without touching the action.
        let invocation = invoker.invoke(ctx()).await.unwrap();
        assert_eq!(invocation.status, InvocationStatus::ShortCircuited);
        assert_eq!(invocation.result.transition, ERROR_TRANSITION);
        assert_eq!(action.call_count(), 2);
    }

    #[tokio::test]
    async fn half_open_probe_recovers_after_cooldown() {
        let action = MockAction::failing_until("recovering", 1, ActionResult::success());
        let invoker = ActionInvoker::new(
            "recovering",
            action.clone(),
            InvokerOptions {
                timeout: Duration::from_secs(1),
                breaker: Some(BreakerOptions {
                    failure_threshold: 1,
                    window: Duration::from_secs(60),
                    cooldown: Duration::from_millis(0),
                }),
            },
        );

        // Trip the circuit.
        let invocation = invoker.invoke(ctx()).await.unwrap();
        assert_eq!(invocation.status, InvocationStatus::Error);

        // Zero cool-down: the next call is the half-open probe and succeeds,
        // closing the circuit again.
        let invocation = invoker.invoke(ctx()).await.unwrap();
        assert_eq!(invocation.status, InvocationStatus::Success);
        assert_eq!(action.call_count(), 2);

        let invocation = invoker.invoke(ctx()).await.unwrap();
        assert_eq!(invocation.status, InvocationStatus::Success);
    }
}
