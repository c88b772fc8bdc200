//! Portable snapshots of component subtrees.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::State;

/// A serializable mirror of one instance and its descendants.
///
/// `child_map` is keyed by the same structural keys the reconciler uses, so a
/// reconnecting render finds each child's snapshot at the call site that
/// produced it. Entries are matched by declared `name`, never by id.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StateTree {
    pub name: String,
    #[serde(default)]
    pub state: State,
    #[serde(rename = "childMap", default)]
    pub child_map: BTreeMap<String, Vec<StateTree>>,
    /// Set when the snapshot was taken on graceful disconnect; rehydration
    /// then re-runs the component's async initial-state supplier.
    #[serde(default)]
    pub reload: bool,
}

impl StateTree {
    pub fn new(name: impl Into<String>, state: State) -> Self {
        Self {
            name: name.into(),
            state,
            child_map: BTreeMap::new(),
            reload: false,
        }
    }

    /// Removes and returns the first unconsumed snapshot at `key` whose name
    /// matches. Entries with a different name are left in place.
    pub fn take_child(&mut self, key: &str, name: &str) -> Option<StateTree> {
        let list = self.child_map.get_mut(key)?;
        let index = list.iter().position(|tree| tree.name == name)?;
        let tree = list.remove(index);
        if list.is_empty() {
            self.child_map.remove(key);
        }
        Some(tree)
    }

    /// Marks this tree and every descendant for reload.
    pub fn mark_reload(&mut self) {
        self.reload = true;
        for tree in self.child_map.values_mut().flatten() {
            tree.mark_reload();
        }
    }

    /// Number of instances in this tree.
    pub fn instance_count(&self) -> usize {
        1 + self
            .child_map
            .values()
            .flatten()
            .map(StateTree::instance_count)
            .sum::<usize>()
    }
}
