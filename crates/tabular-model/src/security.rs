//! Per-role security overlays attached to a table.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::ObjectId;

/// Role-keyed overlay state, e.g. row filters or object permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityOverlay<V> {
    entries: BTreeMap<ObjectId, V>,
}

impl<V> Default for SecurityOverlay<V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<V: Clone> SecurityOverlay<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, role: ObjectId) -> Option<&V> {
        self.entries.get(&role)
    }

    /// Store `value` for `role`, or drop the entry when `value` is `None`.
    ///
    /// Returns the previous value.
    pub fn set(&mut self, role: ObjectId, value: Option<V>) -> Option<V> {
        match value {
            Some(value) => self.entries.insert(role, value),
            None => self.entries.remove(&role),
        }
    }

    /// Remove every entry, returning what was removed in role order.
    pub fn clear(&mut self) -> Vec<(ObjectId, V)> {
        std::mem::take(&mut self.entries).into_iter().collect()
    }

    pub fn roles(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &V)> + '_ {
        self.entries.iter().map(|(role, value)| (*role, value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
