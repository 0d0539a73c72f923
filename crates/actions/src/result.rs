//! The outcome of a single action invocation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use fragment::PayloadDelta;

/// Default transition taken by actions that completed without signaling a
/// custom outcome.
pub const SUCCESS_TRANSITION: &str = "_success";
/// Transition taken when the action failed and no fallback intercepted it.
pub const ERROR_TRANSITION: &str = "_error";
/// Transition forced when the invocation was abandoned at its timeout.
pub const TIMEOUT_TRANSITION: &str = "_timeout";

/// A labeled outcome plus the payload mutations it carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    /// Outcome label used to select the next graph transition.
    pub transition: String,
    /// Writes to apply to the branch payload.
    #[serde(default, skip_serializing_if = "PayloadDelta::is_empty")]
    pub delta: PayloadDelta,
    /// Replacement fragment body, if the action produced one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Free-form action log attached to the node execution record.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub log: Value,
}

impl ActionResult {
    /// A plain `_success` outcome with no payload writes.
    pub fn success() -> Self {
        Self::with_transition(SUCCESS_TRANSITION)
    }

    /// An outcome with a custom transition and no payload writes.
    pub fn with_transition(transition: impl Into<String>) -> Self {
        Self {
            transition: transition.into(),
            delta: PayloadDelta::new(),
            body: None,
            log: Value::Null,
        }
    }

    /// Attach a payload delta.
    #[must_use]
    pub fn delta(mut self, delta: PayloadDelta) -> Self {
        self.delta = delta;
        self
    }

    /// Attach a replacement body.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Attach an action log.
    #[must_use]
    pub fn log(mut self, log: Value) -> Self {
        self.log = log;
        self
    }

    /// Whether this outcome carries the reserved error transition.
    pub fn is_error(&self) -> bool {
        self.transition == ERROR_TRANSITION
    }
}
