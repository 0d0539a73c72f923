//! Name-based lookup of pluggable action implementations.

use std::collections::HashMap;
use std::sync::Arc;

use crate::Action;

/// Maps action reference names to their implementations.
///
/// Populated once at startup; the graph compiler resolves every action
/// reference against it, so an unknown name fails at load time rather than
/// mid-walk.
#[derive(Default, Clone)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action under the given name, replacing any previous
    /// registration.
    pub fn register(&mut self, name: impl Into<String>, action: Arc<dyn Action>) -> &mut Self {
        self.actions.insert(name.into(), action);
        self
    }

    /// Look up an action by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .finish()
    }
}
