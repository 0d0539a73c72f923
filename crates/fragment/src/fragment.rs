//! The `Fragment` domain model.
//!
//! A fragment is a small piece of a request that may be processed
//! independently.  Its identity never changes during processing; its body,
//! payload and status are updated by the task engine as actions run.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::payload::{Payload, PayloadDelta};

// ---------------------------------------------------------------------------
// FragmentStatus
// ---------------------------------------------------------------------------

/// Processing status of a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FragmentStatus {
    /// No task has (fully) processed this fragment yet.
    Unprocessed,
    /// The task run finished on a success transition.
    Success,
    /// The task run finished on an error, timeout or unsupported transition.
    Failure,
}

// ---------------------------------------------------------------------------
// Fragment
// ---------------------------------------------------------------------------

/// A unit of page content carrying mutable payload and a processing status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fragment {
    /// Unique identifier, stable across the whole task execution.
    pub id: Uuid,
    /// Type of the fragment (e.g. `snippet`).  Never changes during
    /// processing.
    #[serde(rename = "type")]
    pub fragment_type: String,
    /// Immutable configuration supplied by the fragment producer.
    pub configuration: Value,
    /// The content itself; may be transformed many times during processing.
    pub body: String,
    /// Key/value state written by actions.
    pub payload: Payload,
    /// Current processing status.
    pub status: FragmentStatus,
}

impl Fragment {
    /// Create a fresh, unprocessed fragment.
    pub fn new(
        fragment_type: impl Into<String>,
        configuration: Value,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            fragment_type: fragment_type.into(),
            configuration,
            body: body.into(),
            payload: Payload::new(),
            status: FragmentStatus::Unprocessed,
        }
    }

    /// Replace the fragment body.
    pub fn set_body(&mut self, body: impl Into<String>) -> &mut Self {
        self.body = body.into();
        self
    }

    /// Append a single payload entry, overwriting any existing value under
    /// the same key.
    pub fn append_payload(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.payload.insert(key.into(), value);
        self
    }

    /// Merge a branch delta into this fragment's payload.
    pub fn merge_in_payload(&mut self, delta: &PayloadDelta) -> &mut Self {
        self.payload.apply(delta);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_fragment_is_unprocessed_with_empty_payload() {
        let fragment = Fragment::new("snippet", json!({}), "<div></div>");
        assert_eq!(fragment.status, FragmentStatus::Unprocessed);
        assert!(fragment.payload.is_empty());
    }

    #[test]
    fn identity_survives_body_and_payload_updates() {
        let mut fragment = Fragment::new("snippet", json!({}), "before");
        let id = fragment.id;

        fragment.set_body("after");
        fragment.append_payload("user", json!({ "name": "anonymous" }));

        assert_eq!(fragment.id, id);
        assert_eq!(fragment.body, "after");
        assert_eq!(fragment.payload.get("user"), Some(&json!({ "name": "anonymous" })));
    }

    #[test]
    fn serializes_with_type_alias() {
        let fragment = Fragment::new("snippet", json!({ "data": 1 }), "x");
        let json = serde_json::to_value(&fragment).unwrap();
        assert_eq!(json["type"], "snippet");
        assert_eq!(json["status"], "UNPROCESSED");
    }
}
