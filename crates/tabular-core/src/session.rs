//! Editing session for one loaded model.
//!
//! A [`Session`] owns the entity arena together with the dependency index,
//! undo ledger and tree sync that every mutation flows through. Hosts open a
//! [`Transaction`] with [`Session::begin_update`], pass it to mutating calls,
//! and close it with [`Session::end_update`]; nested transactions coalesce
//! into the outermost one.
//!
//! The session is single-threaded: no operation suspends, and "pending"
//! validation is a flag resolved by [`Session::resolve_validation`].

use std::collections::BTreeMap;

use tracing::{debug, info, info_span, warn};

use tabular_model::{Entity, ModelError, ObjectId, ObjectKind, Result, SessionOptions};

use crate::dependency::DependencyIndex;
use crate::expression::{DaxExpressionService, ExpressionService, ValidationStatus};
use crate::governance::{AllowAll, Governance};
use crate::mutation::ChangeListener;
use crate::tree::{TreeSync, ViewTree};
use crate::undo::{UndoBatch, UndoLedger};

/// Handle proving an update is open. Required by every mutating call.
#[must_use = "close the transaction with Session::end_update"]
#[derive(Debug, PartialEq, Eq)]
pub struct Transaction {
    serial: u64,
    level: usize,
}

impl Transaction {
    /// Nesting level, 1 for the outermost transaction.
    pub fn level(&self) -> usize {
        self.level
    }
}

pub struct Session {
    pub(crate) entities: Vec<Entity>,
    pub(crate) tables: Vec<ObjectId>,
    pub(crate) relationships: Vec<ObjectId>,
    pub(crate) roles: Vec<ObjectId>,
    pub(crate) options: SessionOptions,
    pub(crate) dependencies: DependencyIndex,
    /// Last status reported by the expression service, per entity.
    pub(crate) syntax: BTreeMap<ObjectId, ValidationStatus>,
    pub(crate) undo: UndoLedger,
    pub(crate) tree: TreeSync,
    pub(crate) expressions: Box<dyn ExpressionService>,
    pub(crate) governance: Box<dyn Governance>,
    pub(crate) listeners: Vec<Box<dyn ChangeListener>>,
    depth: usize,
    serial: u64,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("entities", &self.entities.len())
            .field("tables", &self.tables)
            .field("options", &self.options)
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            entities: Vec::new(),
            tables: Vec::new(),
            relationships: Vec::new(),
            roles: Vec::new(),
            undo: UndoLedger::new(options.undo_depth),
            options,
            dependencies: DependencyIndex::new(),
            syntax: BTreeMap::new(),
            tree: TreeSync::default(),
            expressions: Box::new(DaxExpressionService),
            governance: Box::new(AllowAll),
            listeners: Vec::new(),
            depth: 0,
            serial: 0,
        }
    }

    pub fn with_expression_service(mut self, service: Box<dyn ExpressionService>) -> Self {
        self.expressions = service;
        self
    }

    pub fn with_governance(mut self, governance: Box<dyn Governance>) -> Self {
        self.governance = governance;
        self
    }

    pub fn with_view_tree(mut self, tree: Box<dyn ViewTree>) -> Self {
        self.tree.set_sink(tree);
        self
    }

    /// Register a pre-change hook that may cancel edits.
    pub fn add_listener(&mut self, listener: Box<dyn ChangeListener>) {
        self.listeners.push(listener);
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn set_auto_fixup(&mut self, enable: bool) {
        self.options.auto_fixup = enable;
    }

    pub fn compatibility_level(&self) -> u32 {
        self.options.compatibility_level
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Open an update. Nested calls extend the outermost update.
    pub fn begin_update(&mut self, label: &str) -> Transaction {
        if self.depth == 0 {
            self.serial += 1;
        }
        self.depth += 1;
        self.undo.begin_batch(label);
        self.tree.begin_update();
        debug!(label, level = self.depth, "begin update");
        Transaction {
            serial: self.serial,
            level: self.depth,
        }
    }

    /// Close an update. Transactions must be closed innermost first; the
    /// outermost close commits the undo batch and flushes the tree.
    ///
    /// Closing an outer transaction while inner ones are open is an error,
    /// but still unwinds every level down to and including `tx`.
    pub fn end_update(&mut self, tx: Transaction) -> Result<()> {
        if tx.serial != self.serial || tx.level == 0 || tx.level > self.depth {
            return Err(ModelError::Transaction(format!(
                "transaction level {} is not open",
                tx.level
            )));
        }
        let open = self.depth;
        while self.depth >= tx.level {
            self.close_level();
        }
        if open != tx.level {
            warn!(closed = tx.level, open, "transaction closed out of order");
            return Err(ModelError::Transaction(format!(
                "transaction level {} closed while level {open} is open",
                tx.level
            )));
        }
        Ok(())
    }

    fn close_level(&mut self) {
        self.depth -= 1;
        let committed = self.undo.end_batch();
        self.tree.end_update();
        if self.depth == 0 && committed {
            info!(label = self.undo.undo_label().unwrap_or_default(), "update committed");
        }
    }

    /// Run `f` inside its own update, closing it even when `f` fails.
    pub fn update<T, F>(&mut self, label: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Session, &Transaction) -> Result<T>,
    {
        let tx = self.begin_update(label);
        let result = f(self, &tx);
        self.end_update(tx)?;
        result
    }

    pub fn in_update(&self) -> bool {
        self.depth > 0
    }

    pub(crate) fn check_transaction(&self, tx: &Transaction) -> Result<()> {
        if self.depth == 0 || tx.serial != self.serial || tx.level > self.depth {
            return Err(ModelError::Transaction(
                "mutation requires an open transaction".to_string(),
            ));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Undo / redo
    // ------------------------------------------------------------------

    /// Undo the newest batch. Returns its label, or `None` when empty.
    pub fn undo(&mut self) -> Result<Option<String>> {
        if self.in_update() {
            return Err(ModelError::Transaction(
                "cannot undo while an update is open".to_string(),
            ));
        }
        let Some(batch) = self.undo.start_undo() else {
            return Ok(None);
        };
        let span = info_span!("undo", label = %batch.label);
        let _guard = span.enter();
        let result = self.replay(&batch, true);
        self.finish_replay(batch, result)
    }

    /// Redo the newest undone batch. Returns its label, or `None` when empty.
    pub fn redo(&mut self) -> Result<Option<String>> {
        if self.in_update() {
            return Err(ModelError::Transaction(
                "cannot redo while an update is open".to_string(),
            ));
        }
        let Some(batch) = self.undo.start_redo() else {
            return Ok(None);
        };
        let span = info_span!("redo", label = %batch.label);
        let _guard = span.enter();
        let result = self.replay(&batch, false);
        self.finish_replay(batch, result)
    }

    /// Apply a batch as one unit. When a record fails, the records already
    /// applied are reverted so the model is left as it was before the replay.
    fn replay(&mut self, batch: &UndoBatch, backwards: bool) -> Result<()> {
        self.tree.begin_update();
        // (target, key, value to apply, value restoring the current state)
        let steps: Vec<_> = if backwards {
            batch
                .records
                .iter()
                .rev()
                .map(|record| {
                    let (apply, restore) = (record.old.clone(), record.new.clone());
                    (record.target, record.key, apply, restore)
                })
                .collect()
        } else {
            batch
                .records
                .iter()
                .map(|record| {
                    let (apply, restore) = (record.new.clone(), record.old.clone());
                    (record.target, record.key, apply, restore)
                })
                .collect()
        };
        let mut result = Ok(());
        for (applied, (target, key, value, _)) in steps.iter().enumerate() {
            if let Err(error) = self.apply_record(*target, *key, value.clone()) {
                warn!(%target, %key, %error, "history replay failed, reverting");
                for (target, key, _, restore) in steps[..applied].iter().rev() {
                    if let Err(error) = self.apply_record(*target, *key, restore.clone()) {
                        warn!(%target, %key, %error, "could not revert replayed record");
                    }
                }
                result = Err(error);
                break;
            }
        }
        self.tree.end_update();
        result
    }

    fn finish_replay(&mut self, batch: UndoBatch, result: Result<()>) -> Result<Option<String>> {
        let label = batch.label.clone();
        match result {
            Ok(()) => {
                self.undo.finish_replay(batch);
                info!(label = %label, "history replayed");
                Ok(Some(label))
            }
            Err(error) => {
                self.undo.abort_replay(batch);
                Err(error)
            }
        }
    }

    pub fn history(&self) -> &UndoLedger {
        &self.undo
    }

    /// Forget every undo and redo batch, e.g. after loading a model.
    pub fn clear_history(&mut self) -> Result<()> {
        if self.in_update() {
            return Err(ModelError::Transaction(
                "cannot clear history while an update is open".to_string(),
            ));
        }
        self.undo.clear();
        Ok(())
    }

    pub fn can_undo(&self) -> bool {
        self.undo.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.undo.can_redo()
    }

    // ------------------------------------------------------------------
    // Arena access
    // ------------------------------------------------------------------

    /// Entity by id, including deleted ones.
    pub fn entity(&self, id: ObjectId) -> Result<&Entity> {
        self.entities
            .get(id.index())
            .ok_or(ModelError::UnknownObject(id))
    }

    /// Entity by id, failing for deleted entities.
    pub fn live(&self, id: ObjectId) -> Result<&Entity> {
        let entity = self.entity(id)?;
        if entity.deleted {
            return Err(ModelError::Deleted(id));
        }
        Ok(entity)
    }

    pub(crate) fn entity_mut(&mut self, id: ObjectId) -> Result<&mut Entity> {
        self.entities
            .get_mut(id.index())
            .ok_or(ModelError::UnknownObject(id))
    }

    pub(crate) fn is_live(&self, id: ObjectId) -> bool {
        self.entities
            .get(id.index())
            .is_some_and(|entity| !entity.deleted)
    }

    pub fn kind(&self, id: ObjectId) -> Result<ObjectKind> {
        Ok(self.entity(id)?.kind())
    }

    pub fn name(&self, id: ObjectId) -> Result<&str> {
        Ok(self.entity(id)?.name.as_str())
    }

    pub fn is_deleted(&self, id: ObjectId) -> bool {
        !self.is_live(id)
    }

    /// Visible error message of an entity.
    pub fn error_message(&self, id: ObjectId) -> Option<&str> {
        self.entities
            .get(id.index())
            .and_then(|entity| entity.error.message())
    }

    pub fn needs_validation(&self, id: ObjectId) -> bool {
        self.entities
            .get(id.index())
            .is_some_and(|entity| entity.error.needs_validation)
    }

    pub(crate) fn expect_table(&self, id: ObjectId) -> Result<&Entity> {
        let entity = self.live(id)?;
        if !entity.kind().is_table() {
            return Err(ModelError::WrongKind {
                id,
                expected: "table",
                actual: entity.kind(),
            });
        }
        Ok(entity)
    }

    pub(crate) fn expect_kind(
        &self,
        id: ObjectId,
        expected: &'static str,
        accept: impl Fn(ObjectKind) -> bool,
    ) -> Result<&Entity> {
        let entity = self.live(id)?;
        if !accept(entity.kind()) {
            return Err(ModelError::WrongKind {
                id,
                expected,
                actual: entity.kind(),
            });
        }
        Ok(entity)
    }

    /// Number of arena slots, deleted entities included.
    pub fn arena_len(&self) -> usize {
        self.entities.len()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionOptions::default())
    }
}
