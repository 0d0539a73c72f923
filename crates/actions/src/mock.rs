//! `MockAction` — a test double for `Action`.
//!
//! Used across the workspace's unit and integration tests where a real
//! action implementation (HTTP client, CMS connector) is unavailable or
//! irrelevant.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::{Action, ActionContext, ActionError, ActionResult};

/// Behaviour injected into `MockAction` at construction time.
pub enum MockBehaviour {
    /// Return a specific result.
    Return(ActionResult),
    /// Fail with `ActionError::Failed`.
    Fail(String),
    /// Fail with `ActionError::Fatal`.
    Fatal(String),
    /// Never complete — for timeout tests.
    Hang,
    /// Sleep, then return; sets the `completed` flag only if the invocation
    /// was not abandoned before the delay elapsed.
    Delayed(Duration, ActionResult),
    /// Fail a fixed number of times, then return the given result.
    FailUntil(Mutex<u32>, ActionResult),
}

/// A mock action that records every call it receives and behaves as
/// programmed.
pub struct MockAction {
    /// Label used in test assertions.
    pub name: String,
    behaviour: MockBehaviour,
    /// All payload snapshots seen by this action (in call order).
    pub calls: Mutex<Vec<fragment::Payload>>,
    /// Set once a `Delayed` behaviour ran to completion.
    pub completed: AtomicBool,
}

impl MockAction {
    fn with_behaviour(name: impl Into<String>, behaviour: MockBehaviour) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            behaviour,
            calls: Mutex::new(Vec::new()),
            completed: AtomicBool::new(false),
        })
    }

    /// A mock that always succeeds with the given result.
    pub fn returning(name: impl Into<String>, result: ActionResult) -> Arc<Self> {
        Self::with_behaviour(name, MockBehaviour::Return(result))
    }

    /// A mock that always fails with `ActionError::Failed`.
    pub fn failing(name: impl Into<String>, msg: impl Into<String>) -> Arc<Self> {
        Self::with_behaviour(name, MockBehaviour::Fail(msg.into()))
    }

    /// A mock that always fails with `ActionError::Fatal`.
    pub fn fatal(name: impl Into<String>, msg: impl Into<String>) -> Arc<Self> {
        Self::with_behaviour(name, MockBehaviour::Fatal(msg.into()))
    }

    /// A mock that never completes.
    pub fn hanging(name: impl Into<String>) -> Arc<Self> {
        Self::with_behaviour(name, MockBehaviour::Hang)
    }

    /// A mock that completes after `delay`, marking `completed` when it does.
    pub fn delayed(name: impl Into<String>, delay: Duration, result: ActionResult) -> Arc<Self> {
        Self::with_behaviour(name, MockBehaviour::Delayed(delay, result))
    }

    /// A mock that fails `failures` times before succeeding with `result`.
    pub fn failing_until(
        name: impl Into<String>,
        failures: u32,
        result: ActionResult,
    ) -> Arc<Self> {
        Self::with_behaviour(name, MockBehaviour::FailUntil(Mutex::new(failures), result))
    }

    /// Number of times this action has been invoked.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Whether a `Delayed` behaviour ran to completion (i.e. was never
    /// abandoned).
    pub fn ran_to_completion(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Action for MockAction {
    async fn apply(&self, ctx: ActionContext) -> Result<ActionResult, ActionError> {
        self.calls.lock().unwrap().push(ctx.payload.clone());

        match &self.behaviour {
            MockBehaviour::Return(result) => Ok(result.clone()),
            MockBehaviour::Fail(msg) => Err(ActionError::Failed(msg.clone())),
            MockBehaviour::Fatal(msg) => Err(ActionError::Fatal(msg.clone())),
            MockBehaviour::Hang => {
                futures::future::pending::<()>().await;
                unreachable!("pending future resolved")
            }
            MockBehaviour::Delayed(delay, result) => {
                tokio::time::sleep(*delay).await;
                self.completed.store(true, Ordering::SeqCst);
                Ok(result.clone())
            }
            MockBehaviour::FailUntil(remaining, result) => {
                let mut remaining = remaining.lock().unwrap();
                if *remaining > 0 {
                    *remaining -= 1;
                    Err(ActionError::Failed("scripted failure".into()))
                } else {
                    Ok(result.clone())
                }
            }
        }
    }
}
