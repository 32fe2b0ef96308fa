//! Bidirectional expression dependency index.
//!
//! `depends_on[a]` holds every object a's expressions reference and
//! `referenced_by[b]` holds every object whose expressions reference b. The
//! two maps are only ever changed together, so an edge is present in one
//! exactly when it is present in the other.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tabular_model::ObjectId;

/// Edges added and removed by [`DependencyIndex::set_outgoing`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeDelta {
    pub added: Vec<ObjectId>,
    pub removed: Vec<ObjectId>,
}

impl EdgeDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DependencyIndex {
    depends_on: BTreeMap<ObjectId, BTreeSet<ObjectId>>,
    referenced_by: BTreeMap<ObjectId, BTreeSet<ObjectId>>,
}

impl DependencyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `source` references `target`. Returns false if already present.
    pub fn add_edge(&mut self, source: ObjectId, target: ObjectId) -> bool {
        let inserted = self.depends_on.entry(source).or_default().insert(target);
        self.referenced_by.entry(target).or_default().insert(source);
        inserted
    }

    /// Drop the edge if present. Removing a missing edge is a no-op.
    pub fn remove_edge(&mut self, source: ObjectId, target: ObjectId) -> bool {
        let removed = remove_from(&mut self.depends_on, source, target);
        remove_from(&mut self.referenced_by, target, source);
        removed
    }

    /// Replace the outgoing edges of `source` with `targets`, touching only
    /// the pairs that differ.
    pub fn set_outgoing(&mut self, source: ObjectId, targets: &BTreeSet<ObjectId>) -> EdgeDelta {
        let current = self.depends_on(source);
        let delta = EdgeDelta {
            added: targets.difference(&current).copied().collect(),
            removed: current.difference(targets).copied().collect(),
        };
        for target in &delta.removed {
            self.remove_edge(source, *target);
        }
        for target in &delta.added {
            self.add_edge(source, *target);
        }
        delta
    }

    /// Drop every edge incident to `id`, in both directions.
    pub fn remove_entity(&mut self, id: ObjectId) {
        for target in self.depends_on(id) {
            self.remove_edge(id, target);
        }
        for source in self.referenced_by(id) {
            self.remove_edge(source, id);
        }
    }

    pub fn depends_on(&self, id: ObjectId) -> BTreeSet<ObjectId> {
        self.depends_on.get(&id).cloned().unwrap_or_default()
    }

    pub fn referenced_by(&self, id: ObjectId) -> BTreeSet<ObjectId> {
        self.referenced_by.get(&id).cloned().unwrap_or_default()
    }

    pub fn is_referenced(&self, id: ObjectId) -> bool {
        self.referenced_by.get(&id).is_some_and(|set| !set.is_empty())
    }

    /// Every object that depends on `id` directly or through a chain of
    /// references, nearest first.
    pub fn transitive_dependents(&self, id: ObjectId) -> Vec<ObjectId> {
        let mut seen = BTreeSet::from([id]);
        let mut order = Vec::new();
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            for dependent in self.referenced_by(current) {
                if seen.insert(dependent) {
                    order.push(dependent);
                    queue.push_back(dependent);
                }
            }
        }
        order
    }

    pub fn edge_count(&self) -> usize {
        self.depends_on.values().map(BTreeSet::len).sum()
    }

    pub fn clear(&mut self) {
        self.depends_on.clear();
        self.referenced_by.clear();
    }

    /// Check that both adjacency views describe the same edge set.
    pub fn is_symmetric(&self) -> bool {
        let forward = self
            .depends_on
            .iter()
            .flat_map(|(source, targets)| targets.iter().map(move |target| (*source, *target)));
        let backward = self
            .referenced_by
            .iter()
            .flat_map(|(target, sources)| sources.iter().map(move |source| (*source, *target)));
        let forward: BTreeSet<_> = forward.collect();
        let backward: BTreeSet<_> = backward.collect();
        forward == backward
    }
}

fn remove_from(
    map: &mut BTreeMap<ObjectId, BTreeSet<ObjectId>>,
    key: ObjectId,
    value: ObjectId,
) -> bool {
    let Some(set) = map.get_mut(&key) else {
        return false;
    };
    let removed = set.remove(&value);
    if set.is_empty() {
        map.remove(&key);
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn id(index: usize) -> ObjectId {
        ObjectId::new(index)
    }

    #[test]
    fn edges_are_visible_from_both_sides() {
        let mut index = DependencyIndex::new();
        assert!(index.add_edge(id(1), id(2)));
        assert!(!index.add_edge(id(1), id(2)));
        assert_eq!(index.depends_on(id(1)), BTreeSet::from([id(2)]));
        assert_eq!(index.referenced_by(id(2)), BTreeSet::from([id(1)]));
        assert!(index.remove_edge(id(1), id(2)));
        assert!(!index.remove_edge(id(1), id(2)));
        assert_eq!(index.edge_count(), 0);
    }

    #[test]
    fn set_outgoing_applies_only_the_delta() {
        let mut index = DependencyIndex::new();
        index.add_edge(id(1), id(2));
        index.add_edge(id(1), id(3));
        let delta = index.set_outgoing(id(1), &BTreeSet::from([id(3), id(4)]));
        assert_eq!(delta.added, vec![id(4)]);
        assert_eq!(delta.removed, vec![id(2)]);
        assert!(index.referenced_by(id(2)).is_empty());
        assert!(index.set_outgoing(id(1), &BTreeSet::from([id(3), id(4)])).is_empty());
    }

    #[test]
    fn transitive_dependents_walk_breadth_first() {
        let mut index = DependencyIndex::new();
        index.add_edge(id(2), id(1));
        index.add_edge(id(3), id(2));
        index.add_edge(id(4), id(1));
        index.add_edge(id(1), id(3));
        assert_eq!(index.transitive_dependents(id(1)), vec![id(2), id(4), id(3)]);
    }

    #[test]
    fn remove_entity_drops_both_directions() {
        let mut index = DependencyIndex::new();
        index.add_edge(id(1), id(2));
        index.add_edge(id(2), id(3));
        index.remove_entity(id(2));
        assert_eq!(index.edge_count(), 0);
        assert!(index.is_symmetric());
    }

    proptest! {
        #[test]
        fn stays_symmetric_under_arbitrary_edits(
            ops in proptest::collection::vec((0u8..3, 0usize..6, 0usize..6), 0..64)
        ) {
            let mut index = DependencyIndex::new();
            for (op, a, b) in ops {
                match op {
                    0 => { index.add_edge(id(a), id(b)); }
                    1 => { index.remove_edge(id(a), id(b)); }
                    _ => {
                        let targets: BTreeSet<ObjectId> = (0..b).map(id).collect();
                        index.set_outgoing(id(a), &targets);
                    }
                }
                prop_assert!(index.is_symmetric());
            }
        }
    }
}
