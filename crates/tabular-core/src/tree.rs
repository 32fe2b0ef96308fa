//! Mirroring of structural changes into an external presentation tree.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use tabular_model::ObjectId;

/// Node of the presentation tree a notification is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TreeNode {
    Model,
    Object(ObjectId),
    /// Proxy node grouping a table's partitions.
    PartitionGroup(ObjectId),
    Relationships,
    Roles,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreeNotification {
    Inserted {
        parent: TreeNode,
        children: Vec<ObjectId>,
    },
    Removed {
        parent: TreeNode,
        children: Vec<ObjectId>,
    },
    Changed {
        node: TreeNode,
    },
}

/// Presentation tree receiving flushed notification batches.
pub trait ViewTree {
    fn apply(&mut self, batch: &[TreeNotification]);
}

/// Tree that discards every notification.
#[derive(Debug, Default)]
pub struct NullTree;

impl ViewTree for NullTree {
    fn apply(&mut self, _batch: &[TreeNotification]) {}
}

/// Tree that keeps every flushed batch. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingTree {
    batches: Rc<RefCell<Vec<Vec<TreeNotification>>>>,
}

impl RecordingTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<Vec<TreeNotification>> {
        self.batches.borrow().clone()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.borrow().len()
    }

    pub fn last_batch(&self) -> Option<Vec<TreeNotification>> {
        self.batches.borrow().last().cloned()
    }

    pub fn clear(&self) {
        self.batches.borrow_mut().clear();
    }
}

impl ViewTree for RecordingTree {
    fn apply(&mut self, batch: &[TreeNotification]) {
        self.batches.borrow_mut().push(batch.to_vec());
    }
}

/// Buffers notifications between `begin_update` and `end_update`.
///
/// Outside an update every notification is flushed on its own.
pub struct TreeSync {
    sink: Box<dyn ViewTree>,
    depth: usize,
    pending: Vec<TreeNotification>,
}

impl std::fmt::Debug for TreeSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeSync")
            .field("depth", &self.depth)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

impl TreeSync {
    pub fn new(sink: Box<dyn ViewTree>) -> Self {
        Self {
            sink,
            depth: 0,
            pending: Vec::new(),
        }
    }

    pub fn set_sink(&mut self, sink: Box<dyn ViewTree>) {
        self.sink = sink;
    }

    pub fn begin_update(&mut self) {
        self.depth += 1;
    }

    pub fn end_update(&mut self) {
        if self.depth == 0 {
            return;
        }
        self.depth -= 1;
        if self.depth == 0 {
            self.flush();
        }
    }

    pub fn is_updating(&self) -> bool {
        self.depth > 0
    }

    /// Forward a collection change under `parent`.
    pub fn children_changed(&mut self, parent: TreeNode, added: &[ObjectId], removed: &[ObjectId]) {
        for child in removed {
            self.push_removed(parent, *child);
        }
        if !added.is_empty() {
            self.push(TreeNotification::Inserted {
                parent,
                children: added.to_vec(),
            });
        }
        self.flush_if_idle();
    }

    pub fn node_changed(&mut self, node: TreeNode) {
        let duplicate = self
            .pending
            .iter()
            .any(|pending| matches!(pending, TreeNotification::Changed { node: n } if *n == node));
        if !duplicate {
            self.push(TreeNotification::Changed { node });
        }
        self.flush_if_idle();
    }

    /// A removal cancels an insert of the same child still pending under the
    /// same parent.
    fn push_removed(&mut self, parent: TreeNode, child: ObjectId) {
        let cancelled = self.pending.iter_mut().rev().any(|pending| match pending {
            TreeNotification::Inserted {
                parent: p,
                children,
            } if *p == parent => match children.iter().position(|c| *c == child) {
                Some(pos) => {
                    children.remove(pos);
                    true
                }
                None => false,
            },
            _ => false,
        });
        if cancelled {
            self.pending.retain(|pending| {
                !matches!(pending, TreeNotification::Inserted { children, .. } if children.is_empty())
            });
            self.pending.retain(|pending| {
                !matches!(pending, TreeNotification::Changed { node } if *node == TreeNode::Object(child))
            });
            return;
        }
        self.push(TreeNotification::Removed {
            parent,
            children: vec![child],
        });
    }

    fn push(&mut self, notification: TreeNotification) {
        trace!(?notification, "tree notification");
        self.pending.push(notification);
    }

    fn flush_if_idle(&mut self) {
        if self.depth == 0 {
            self.flush();
        }
    }

    fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.pending);
        self.sink.apply(&batch);
    }
}

impl Default for TreeSync {
    fn default() -> Self {
        Self::new(Box::new(NullTree))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(index: usize) -> ObjectId {
        ObjectId::new(index)
    }

    #[test]
    fn idle_notifications_flush_immediately() {
        let tree = RecordingTree::new();
        let mut sync = TreeSync::new(Box::new(tree.clone()));
        sync.children_changed(TreeNode::Object(id(0)), &[id(1)], &[]);
        sync.node_changed(TreeNode::Object(id(1)));
        assert_eq!(tree.batch_count(), 2);
    }

    #[test]
    fn updates_coalesce_into_one_batch() {
        let tree = RecordingTree::new();
        let mut sync = TreeSync::new(Box::new(tree.clone()));
        sync.begin_update();
        sync.begin_update();
        sync.children_changed(TreeNode::Object(id(0)), &[id(1)], &[]);
        sync.node_changed(TreeNode::Object(id(2)));
        sync.node_changed(TreeNode::Object(id(2)));
        sync.end_update();
        assert_eq!(tree.batch_count(), 0);
        sync.end_update();
        assert_eq!(
            tree.batches(),
            vec![vec![
                TreeNotification::Inserted {
                    parent: TreeNode::Object(id(0)),
                    children: vec![id(1)],
                },
                TreeNotification::Changed {
                    node: TreeNode::Object(id(2)),
                },
            ]]
        );
    }

    #[test]
    fn insert_then_remove_cancels_out() {
        let tree = RecordingTree::new();
        let mut sync = TreeSync::new(Box::new(tree.clone()));
        sync.begin_update();
        sync.children_changed(TreeNode::PartitionGroup(id(0)), &[id(5)], &[]);
        sync.node_changed(TreeNode::Object(id(5)));
        sync.children_changed(TreeNode::PartitionGroup(id(0)), &[], &[id(5)]);
        sync.end_update();
        assert_eq!(tree.batch_count(), 0);
    }
}
