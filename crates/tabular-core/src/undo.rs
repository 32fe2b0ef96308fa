//! Batched undo/redo ledger.
//!
//! Records are collected into the open batch. Opening a batch while one is
//! already open only deepens the nesting; the batch is committed when the
//! outermost level closes. While a batch is being undone or redone the
//! ledger ignores `add`, so replayed mutations cannot write new history.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use tabular_model::{ObjectId, PropertyKey, PropertyValue};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoRecord {
    pub target: ObjectId,
    pub key: PropertyKey,
    pub old: PropertyValue,
    pub new: PropertyValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoBatch {
    pub label: String,
    pub records: Vec<UndoRecord>,
}

impl UndoBatch {
    fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            records: Vec::new(),
        }
    }
}

/// Direction of a history replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replay {
    Undo,
    Redo,
}

#[derive(Debug)]
pub struct UndoLedger {
    undo: Vec<UndoBatch>,
    redo: Vec<UndoBatch>,
    open: Option<UndoBatch>,
    depth: usize,
    replaying: Option<Replay>,
    capacity: usize,
}

impl UndoLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            undo: Vec::new(),
            redo: Vec::new(),
            open: None,
            depth: 0,
            replaying: None,
            capacity: capacity.max(1),
        }
    }

    /// Open a batch, or extend the open one when called again before `end_batch`.
    pub fn begin_batch(&mut self, label: &str) {
        if self.depth == 0 {
            self.open = Some(UndoBatch::new(label));
        }
        self.depth += 1;
        trace!(label, depth = self.depth, "begin undo batch");
    }

    /// Close one nesting level; the outermost close commits the batch.
    ///
    /// Returns true when a non-empty batch was committed.
    pub fn end_batch(&mut self) -> bool {
        if self.depth == 0 {
            return false;
        }
        self.depth -= 1;
        if self.depth > 0 {
            return false;
        }
        match self.open.take() {
            Some(batch) if !batch.records.is_empty() => {
                self.commit(batch);
                true
            }
            _ => false,
        }
    }

    /// Append a record to the open batch, or commit it as its own batch.
    pub fn add(&mut self, record: UndoRecord) {
        if self.replaying.is_some() {
            return;
        }
        match self.open.as_mut() {
            Some(batch) => batch.records.push(record),
            None => {
                let label = format!("set {}", record.key);
                self.commit(UndoBatch {
                    label,
                    records: vec![record],
                });
            }
        }
    }

    fn commit(&mut self, batch: UndoBatch) {
        debug!(label = %batch.label, records = batch.records.len(), "commit undo batch");
        self.redo.clear();
        self.undo.push(batch);
        if self.undo.len() > self.capacity {
            self.undo.remove(0);
        }
    }

    /// Take the newest batch for undoing and enter replay mode.
    ///
    /// Apply its records' `old` values in reverse order, then call
    /// [`UndoLedger::finish_replay`].
    pub fn start_undo(&mut self) -> Option<UndoBatch> {
        if self.is_batch_open() || self.replaying.is_some() {
            return None;
        }
        let batch = self.undo.pop()?;
        self.replaying = Some(Replay::Undo);
        Some(batch)
    }

    /// Take the newest undone batch for redoing and enter replay mode.
    ///
    /// Apply its records' `new` values in forward order, then call
    /// [`UndoLedger::finish_replay`].
    pub fn start_redo(&mut self) -> Option<UndoBatch> {
        if self.is_batch_open() || self.replaying.is_some() {
            return None;
        }
        let batch = self.redo.pop()?;
        self.replaying = Some(Replay::Redo);
        Some(batch)
    }

    /// Leave replay mode, moving `batch` onto the opposite stack.
    pub fn finish_replay(&mut self, batch: UndoBatch) {
        match self.replaying.take() {
            Some(Replay::Undo) => self.redo.push(batch),
            Some(Replay::Redo) => self.undo.push(batch),
            None => {}
        }
    }

    /// Leave replay mode after a failed replay, returning `batch` to the
    /// stack it was taken from.
    pub fn abort_replay(&mut self, batch: UndoBatch) {
        match self.replaying.take() {
            Some(Replay::Undo) => self.undo.push(batch),
            Some(Replay::Redo) => self.redo.push(batch),
            None => {}
        }
    }

    /// Drop every record rejected by `keep`, in closed batches and the open
    /// one. Closed batches left empty are discarded. Returns the number of
    /// records dropped.
    pub fn retain_records(&mut self, mut keep: impl FnMut(&UndoRecord) -> bool) -> usize {
        let mut dropped = 0;
        for stack in [&mut self.undo, &mut self.redo] {
            for batch in stack.iter_mut() {
                let before = batch.records.len();
                batch.records.retain(|record| keep(record));
                dropped += before - batch.records.len();
            }
            stack.retain(|batch| !batch.records.is_empty());
        }
        if let Some(batch) = self.open.as_mut() {
            let before = batch.records.len();
            batch.records.retain(|record| keep(record));
            dropped += before - batch.records.len();
        }
        dropped
    }

    pub fn replaying(&self) -> Option<Replay> {
        self.replaying
    }

    pub fn is_replaying(&self) -> bool {
        self.replaying.is_some()
    }

    pub fn is_batch_open(&self) -> bool {
        self.depth > 0
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_label(&self) -> Option<&str> {
        self.undo.last().map(|batch| batch.label.as_str())
    }

    pub fn redo_label(&self) -> Option<&str> {
        self.redo.last().map(|batch| batch.label.as_str())
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    /// Records collected so far in the open batch.
    pub fn pending(&self) -> &[UndoRecord] {
        self.open
            .as_ref()
            .map(|batch| batch.records.as_slice())
            .unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

impl Default for UndoLedger {
    fn default() -> Self {
        Self::new(tabular_model::DEFAULT_UNDO_DEPTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabular_model::PropertyId;

    fn record(target: usize, old: &str, new: &str) -> UndoRecord {
        UndoRecord {
            target: ObjectId::new(target),
            key: PropertyId::Name.into(),
            old: PropertyValue::text(old),
            new: PropertyValue::text(new),
        }
    }

    #[test]
    fn nested_batches_commit_once() {
        let mut ledger = UndoLedger::default();
        ledger.begin_batch("rename");
        ledger.add(record(1, "a", "b"));
        ledger.begin_batch("fixup");
        ledger.add(record(2, "x", "y"));
        assert!(!ledger.end_batch());
        assert!(ledger.end_batch());
        assert_eq!(ledger.undo_len(), 1);
        assert_eq!(ledger.undo_label(), Some("rename"));
    }

    #[test]
    fn add_outside_batch_commits_single_record() {
        let mut ledger = UndoLedger::default();
        ledger.add(record(1, "a", "b"));
        ledger.add(record(1, "b", "c"));
        assert_eq!(ledger.undo_len(), 2);
        assert_eq!(ledger.undo_label(), Some("set Name"));
    }

    #[test]
    fn empty_batches_are_discarded() {
        let mut ledger = UndoLedger::default();
        ledger.begin_batch("nothing");
        assert!(!ledger.end_batch());
        assert!(!ledger.can_undo());
    }

    #[test]
    fn replay_moves_batches_between_stacks_and_ignores_adds() {
        let mut ledger = UndoLedger::default();
        ledger.add(record(1, "a", "b"));
        let batch = ledger.start_undo().expect("undo batch");
        ledger.add(record(9, "ignored", "ignored"));
        ledger.finish_replay(batch);
        assert!(!ledger.can_undo());
        assert_eq!(ledger.redo_len(), 1);

        let batch = ledger.start_redo().expect("redo batch");
        ledger.finish_replay(batch);
        assert_eq!(ledger.undo_len(), 1);
        assert_eq!(ledger.redo_len(), 0);
    }

    #[test]
    fn aborted_replay_returns_batch_to_its_stack() {
        let mut ledger = UndoLedger::default();
        ledger.add(record(1, "a", "b"));
        let batch = ledger.start_undo().expect("undo batch");
        ledger.abort_replay(batch);
        assert!(!ledger.is_replaying());
        assert_eq!((ledger.undo_len(), ledger.redo_len()), (1, 0));

        let batch = ledger.start_undo().expect("undo batch");
        ledger.finish_replay(batch);
        let batch = ledger.start_redo().expect("redo batch");
        ledger.abort_replay(batch);
        assert_eq!((ledger.undo_len(), ledger.redo_len()), (0, 1));
    }

    #[test]
    fn retain_records_discards_emptied_batches() {
        let mut ledger = UndoLedger::default();
        ledger.begin_batch("mixed");
        ledger.add(record(1, "a", "b"));
        ledger.add(record(2, "x", "y"));
        ledger.end_batch();
        ledger.add(record(2, "y", "z"));

        let dropped = ledger.retain_records(|record| record.target != ObjectId::new(2));
        assert_eq!(dropped, 2);
        assert_eq!(ledger.undo_len(), 1);
        let batch = ledger.start_undo().expect("undo batch");
        assert_eq!(batch.label, "mixed");
        assert_eq!(batch.records, vec![record(1, "a", "b")]);
    }

    #[test]
    fn new_batch_clears_redo() {
        let mut ledger = UndoLedger::default();
        ledger.add(record(1, "a", "b"));
        let batch = ledger.start_undo().expect("undo batch");
        ledger.finish_replay(batch);
        assert!(ledger.can_redo());
        ledger.add(record(1, "a", "c"));
        assert!(!ledger.can_redo());
    }

    #[test]
    fn capacity_drops_oldest() {
        let mut ledger = UndoLedger::new(2);
        for n in 0..3 {
            ledger.begin_batch(&format!("edit {n}"));
            ledger.add(record(n, "a", "b"));
            ledger.end_batch();
        }
        assert_eq!(ledger.undo_len(), 2);
        let newest = ledger.start_undo().expect("undo batch");
        assert_eq!(newest.label, "edit 2");
    }
}
