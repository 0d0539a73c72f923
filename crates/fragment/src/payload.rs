//! Payload store with branch-isolated copy/merge semantics.
//!
//! Parallel children of a composite node must never observe each other's
//! writes, so each child works on its own [`PayloadBranch`] seeded from the
//! state at composite entry.  After the children finish, their
//! [`PayloadDelta`]s are applied to the parent in child declaration order —
//! same-key conflicts resolve to the last-declared branch, never by race.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// Mutable key/value state attached to a fragment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Map<String, Value>);

impl Payload {
    /// Create an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a single entry.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Write a single entry, overwriting any existing value.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Apply a branch delta, entry by entry, overwriting existing keys.
    pub fn apply(&mut self, delta: &PayloadDelta) {
        for (key, value) in &delta.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// PayloadDelta
// ---------------------------------------------------------------------------

/// The set of writes captured by one action invocation or one branch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayloadDelta(Map<String, Value>);

impl PayloadDelta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a write.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Builder-style variant of [`PayloadDelta::insert`] for tests and
    /// simple actions.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fold another delta into this one (later writes win).
    pub fn extend(&mut self, other: &PayloadDelta) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// PayloadBranch
// ---------------------------------------------------------------------------

/// An isolated mutable copy of a payload, seeded from a parent snapshot.
///
/// Reads go against the branch view (parent state plus this branch's own
/// writes); every write is additionally captured in the branch delta so the
/// parent can merge exactly what this branch contributed.
#[derive(Debug, Clone)]
pub struct PayloadBranch {
    view: Payload,
    delta: PayloadDelta,
}

impl PayloadBranch {
    /// Branch off the given parent payload.
    pub fn from_parent(parent: &Payload) -> Self {
        Self {
            view: parent.clone(),
            delta: PayloadDelta::new(),
        }
    }

    /// The consistent read view: parent state at branch time plus this
    /// branch's writes.
    pub fn view(&self) -> &Payload {
        &self.view
    }

    /// Apply an action's delta to this branch.
    pub fn apply(&mut self, delta: &PayloadDelta) {
        self.view.apply(delta);
        self.delta.extend(delta);
    }

    /// Everything this branch wrote since it was created.
    pub fn delta(&self) -> &PayloadDelta {
        &self.delta
    }

    /// Consume the branch, yielding its accumulated delta.
    pub fn into_delta(self) -> PayloadDelta {
        self.delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn branch_sees_parent_state_but_not_vice_versa() {
        let mut parent = Payload::new();
        parent.insert("base", json!("inherited"));

        let mut branch = PayloadBranch::from_parent(&parent);
        branch.apply(&PayloadDelta::new().with("local", json!(42)));

        assert_eq!(branch.view().get("base"), Some(&json!("inherited")));
        assert_eq!(branch.view().get("local"), Some(&json!(42)));
        // Parent is untouched until the delta is merged back.
        assert_eq!(parent.get("local"), None);
    }

    #[test]
    fn sibling_branches_are_isolated() {
        let parent = Payload::new();

        let mut left = PayloadBranch::from_parent(&parent);
        let mut right = PayloadBranch::from_parent(&parent);

        left.apply(&PayloadDelta::new().with("k", json!("left")));
        right.apply(&PayloadDelta::new().with("k", json!("right")));

        assert_eq!(left.view().get("k"), Some(&json!("left")));
        assert_eq!(right.view().get("k"), Some(&json!("right")));
    }

    #[test]
    fn declaration_order_merge_is_last_branch_wins() {
        let mut parent = Payload::new();

        let mut first = PayloadBranch::from_parent(&parent);
        let mut second = PayloadBranch::from_parent(&parent);
        first.apply(&PayloadDelta::new().with("k", json!("first")).with("only-first", json!(1)));
        second.apply(&PayloadDelta::new().with("k", json!("second")));

        parent.apply(&first.into_delta());
        parent.apply(&second.into_delta());

        assert_eq!(parent.get("k"), Some(&json!("second")));
        // A later branch that did not touch a key must not clobber it.
        assert_eq!(parent.get("only-first"), Some(&json!(1)));
    }

    #[test]
    fn branch_delta_contains_only_own_writes() {
        let mut parent = Payload::new();
        parent.insert("base", json!("inherited"));

        let mut branch = PayloadBranch::from_parent(&parent);
        branch.apply(&PayloadDelta::new().with("mine", json!(true)));

        let delta = branch.into_delta();
        assert_eq!(delta.get("mine"), Some(&json!(true)));
        assert_eq!(delta.get("base"), None);
    }
}
