//! The property-set pipeline every mutation runs through.
//!
//! Hooks fire in a fixed order: pre-change validation and listener veto,
//! value commit, undo-record append, dependency and fix-up update, cascade
//! recompute, tree sync. Membership changes (attach and detach) follow the
//! same order with their own record key.

use tracing::{debug, trace, warn};

use tabular_model::names::validate_name;
use tabular_model::{
    EntityPayload, ModelError, OBJECT_LEVEL_SECURITY_LEVEL, ObjectId, ObjectKind, PropertyId,
    PropertyKey, PropertyValue, Result,
};

use crate::fixup::Rewrite;
use crate::session::{Session, Transaction};
use crate::tree::TreeNode;
use crate::undo::UndoRecord;

/// Which path a property write came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    /// Host edit through `set_property`.
    Edit,
    /// Expression rewrite performed by rename fix-up.
    Fixup,
    /// Initial values set by a factory.
    Factory,
    /// Undo or redo replay.
    History,
}

/// A change about to be committed, offered to listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChange<'a> {
    pub id: ObjectId,
    pub kind: ObjectKind,
    pub property: PropertyId,
    pub old: &'a PropertyValue,
    pub new: &'a PropertyValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeVerdict {
    Proceed,
    Cancel,
}

/// Pre-change hook able to veto host edits.
///
/// Listeners only see edits made through `set_property`; fix-up rewrites and
/// history replay bypass them.
pub trait ChangeListener {
    fn property_changing(&mut self, change: &PendingChange<'_>) -> ChangeVerdict;
}

impl<F> ChangeListener for F
where
    F: FnMut(&PendingChange<'_>) -> ChangeVerdict,
{
    fn property_changing(&mut self, change: &PendingChange<'_>) -> ChangeVerdict {
        self(change)
    }
}

impl Session {
    /// Set a stored property. Returns false when the value was unchanged or a
    /// listener cancelled the edit.
    pub fn set_property(
        &mut self,
        tx: &Transaction,
        id: ObjectId,
        property: PropertyId,
        value: PropertyValue,
    ) -> Result<bool> {
        self.check_transaction(tx)?;
        self.change_property(id, property, value, Origin::Edit)
    }

    pub fn set_name(&mut self, tx: &Transaction, id: ObjectId, name: &str) -> Result<bool> {
        self.set_property(tx, id, PropertyId::Name, PropertyValue::text(name))
    }

    pub fn set_expression(
        &mut self,
        tx: &Transaction,
        id: ObjectId,
        expression: &str,
    ) -> Result<bool> {
        self.set_property(tx, id, PropertyId::Expression, PropertyValue::text(expression))
    }

    pub fn set_description(
        &mut self,
        tx: &Transaction,
        id: ObjectId,
        description: Option<&str>,
    ) -> Result<bool> {
        let value = PropertyValue::Text(description.map(str::to_string));
        self.set_property(tx, id, PropertyId::Description, value)
    }

    pub fn set_display_folder(
        &mut self,
        tx: &Transaction,
        id: ObjectId,
        folder: Option<&str>,
    ) -> Result<bool> {
        let value = PropertyValue::Text(folder.map(str::to_string));
        self.set_property(tx, id, PropertyId::DisplayFolder, value)
    }

    pub fn set_hidden(&mut self, tx: &Transaction, id: ObjectId, hidden: bool) -> Result<bool> {
        self.set_property(tx, id, PropertyId::IsHidden, PropertyValue::Bool(hidden))
    }

    pub fn set_default_detail_rows_expression(
        &mut self,
        tx: &Transaction,
        table: ObjectId,
        expression: Option<&str>,
    ) -> Result<bool> {
        let value = PropertyValue::Text(expression.map(str::to_string));
        self.set_property(tx, table, PropertyId::DefaultDetailRowsExpression, value)
    }

    pub(crate) fn change_property(
        &mut self,
        id: ObjectId,
        property: PropertyId,
        value: PropertyValue,
        origin: Origin,
    ) -> Result<bool> {
        let entity = self.live(id)?;
        let kind = entity.kind();
        let current = entity
            .property(property)
            .ok_or(ModelError::ReadOnly { property, kind })?;
        let value = normalize(property, value);
        if current == value {
            trace!(%id, %property, "value unchanged");
            return Ok(false);
        }

        // Pre-change.
        if origin != Origin::History {
            self.validate_change(id, kind, property, &value)?;
        }
        let rewrites = if property == PropertyId::Name {
            self.rebuild_all();
            if origin == Origin::Edit && self.options.auto_fixup {
                self.planned_fixup(id, kind, &current, &value)?
            } else {
                Vec::new()
            }
        } else {
            Vec::new()
        };
        if origin == Origin::Edit && self.vetoed(id, kind, property, &current, &value) {
            warn!(%id, %property, "change cancelled by listener");
            return Ok(false);
        }

        // Commit.
        let old = self.entity_mut(id)?.write_property(property, value.clone())?;
        debug!(%id, %property, old = %old, new = %value, ?origin, "property committed");

        // Undo record.
        self.undo.add(UndoRecord {
            target: id,
            key: PropertyKey::Property(property),
            old,
            new: value,
        });

        // Dependencies and fix-up.
        if property == PropertyId::Name {
            if !rewrites.is_empty() {
                self.apply_fixup(id, rewrites)?;
            }
            self.rebuild_all();
            self.refresh_relationship_names(id);
        } else if property.is_expression() {
            self.rebuild(id);
            self.revalidate(id, true);
        }

        // Cascade.
        self.cascade_from(id);

        // Tree.
        if property == PropertyId::Name {
            self.tree.node_changed(TreeNode::Object(id));
        }
        Ok(true)
    }

    fn validate_change(
        &self,
        id: ObjectId,
        kind: ObjectKind,
        property: PropertyId,
        value: &PropertyValue,
    ) -> Result<()> {
        if kind.is_table()
            && matches!(
                property,
                PropertyId::DefaultDetailRowsExpression
                    | PropertyId::ShowAsVariationsOnly
                    | PropertyId::IsPrivate
            )
            && self.options.compatibility_level < OBJECT_LEVEL_SECURITY_LEVEL
        {
            return Err(ModelError::Compatibility {
                feature: property.as_str(),
                required: OBJECT_LEVEL_SECURITY_LEVEL,
                actual: self.options.compatibility_level,
            });
        }
        if !self.editable(id, property) {
            return Err(ModelError::ReadOnly { property, kind });
        }
        if property == PropertyId::Name {
            let name = value.as_text().unwrap_or_default();
            validate_name(kind, name)?;
            if self.name_taken(id, name) {
                return Err(ModelError::DuplicateName {
                    kind,
                    name: name.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Plan the fix-up of a rename and validate every rewrite, so a rename
    /// whose dependents cannot be rewritten fails before anything commits.
    fn planned_fixup(
        &self,
        id: ObjectId,
        kind: ObjectKind,
        current: &PropertyValue,
        value: &PropertyValue,
    ) -> Result<Vec<Rewrite>> {
        let old_name = current.as_text().unwrap_or_default();
        let new_name = value.as_text().unwrap_or_default();
        let rewrites = self.plan_fixup(id, kind, old_name, new_name)?;
        for rewrite in &rewrites {
            let source_kind = self.live(rewrite.source)?.kind();
            let text = PropertyValue::text(rewrite.text.as_str());
            self.validate_change(rewrite.source, source_kind, rewrite.property, &text)?;
        }
        Ok(rewrites)
    }

    fn vetoed(
        &mut self,
        id: ObjectId,
        kind: ObjectKind,
        property: PropertyId,
        old: &PropertyValue,
        new: &PropertyValue,
    ) -> bool {
        if self.listeners.is_empty() {
            return false;
        }
        let change = PendingChange {
            id,
            kind,
            property,
            old,
            new,
        };
        let mut listeners = std::mem::take(&mut self.listeners);
        let cancelled = listeners
            .iter_mut()
            .any(|listener| listener.property_changing(&change) == ChangeVerdict::Cancel);
        listeners.append(&mut self.listeners);
        self.listeners = listeners;
        cancelled
    }

    /// Replay one undo record value.
    pub(crate) fn apply_record(
        &mut self,
        target: ObjectId,
        key: PropertyKey,
        value: PropertyValue,
    ) -> Result<()> {
        match (key, value) {
            (PropertyKey::Property(property), value) => {
                self.change_property(target, property, value, Origin::History)?;
            }
            (PropertyKey::Membership, PropertyValue::Membership(Some(index))) => {
                self.attach(target, Some(index))?;
            }
            (PropertyKey::Membership, PropertyValue::Membership(None)) => {
                self.detach(target)?;
            }
            (PropertyKey::RowLevelFilter { role }, PropertyValue::Text(filter)) => {
                self.write_row_filter(target, role, filter)?;
            }
            (PropertyKey::ObjectLevelPermission { role }, PropertyValue::Permission(permission)) => {
                self.write_object_permission(target, role, permission)?;
            }
            (key, value) => {
                return Err(ModelError::InvalidOperation(format!(
                    "cannot replay {} value for {key}",
                    value.type_name()
                )));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    /// Insert a detached entity into its container, at `index` or the end.
    pub(crate) fn attach(&mut self, id: ObjectId, index: Option<usize>) -> Result<usize> {
        if self.is_live(id) {
            return Err(ModelError::InvalidOperation(format!(
                "object {id} is already attached"
            )));
        }
        let collection = self.collection_mut(id)?;
        let position = index.unwrap_or(collection.len()).min(collection.len());
        collection.insert(position, id);
        self.entity_mut(id)?.deleted = false;
        debug!(%id, position, "attached");

        self.undo.add(UndoRecord {
            target: id,
            key: PropertyKey::Membership,
            old: PropertyValue::Membership(None),
            new: PropertyValue::Membership(Some(position)),
        });
        self.structure_changed(id, true)?;
        Ok(position)
    }

    /// Remove a live entity from its container and mark it deleted.
    pub(crate) fn detach(&mut self, id: ObjectId) -> Result<usize> {
        self.live(id)?;
        let collection = self.collection_mut(id)?;
        let position = collection
            .iter()
            .position(|member| *member == id)
            .ok_or_else(|| {
                ModelError::InvalidOperation(format!("object {id} is not in its container"))
            })?;
        collection.remove(position);
        self.entity_mut(id)?.deleted = true;
        debug!(%id, position, "detached");

        self.undo.add(UndoRecord {
            target: id,
            key: PropertyKey::Membership,
            old: PropertyValue::Membership(Some(position)),
            new: PropertyValue::Membership(None),
        });
        self.structure_changed(id, false)?;
        Ok(position)
    }

    fn structure_changed(&mut self, id: ObjectId, added: bool) -> Result<()> {
        let entity = self.entity(id)?;
        let kind = entity.kind();
        let parent = entity.parent;

        if kind.is_table() || kind.is_column() || kind == ObjectKind::Measure {
            self.rebuild_all();
        } else if self.entity(id)?.has_expressions() {
            self.rebuild(id);
            self.revalidate(id, false);
        }

        if let Some(parent) = parent {
            self.cascade_from(parent);
        }

        let node = self.tree_parent(id)?;
        if added {
            self.tree.children_changed(node, &[id], &[]);
        } else {
            self.tree.children_changed(node, &[], &[id]);
        }
        Ok(())
    }

    /// Collection holding `id` inside its container.
    fn collection_mut(&mut self, id: ObjectId) -> Result<&mut Vec<ObjectId>> {
        let entity = self.entity(id)?;
        let kind = entity.kind();
        let parent = entity.parent;
        match kind {
            ObjectKind::Table | ObjectKind::CalculatedTable => return Ok(&mut self.tables),
            ObjectKind::Relationship => return Ok(&mut self.relationships),
            ObjectKind::Role => return Ok(&mut self.roles),
            _ => {}
        }
        let parent = parent.ok_or_else(|| {
            ModelError::InvalidOperation(format!("{kind} {id} has no container"))
        })?;
        let container = self.entity_mut(parent)?;
        match (&mut container.payload, kind) {
            (
                EntityPayload::Table(table),
                ObjectKind::DataColumn
                | ObjectKind::CalculatedColumn
                | ObjectKind::CalculatedTableColumn,
            ) => Ok(&mut table.columns),
            (EntityPayload::Table(table), ObjectKind::Measure) => Ok(&mut table.measures),
            (EntityPayload::Table(table), ObjectKind::Hierarchy) => Ok(&mut table.hierarchies),
            (EntityPayload::Table(table), ObjectKind::Partition) => Ok(&mut table.partitions),
            (EntityPayload::Hierarchy(hierarchy), ObjectKind::Level) => Ok(&mut hierarchy.levels),
            _ => Err(ModelError::InvalidOperation(format!(
                "{kind} {id} cannot live inside {parent}"
            ))),
        }
    }

    /// Tree node a structural change of `id` is reported under.
    pub(crate) fn tree_parent(&self, id: ObjectId) -> Result<TreeNode> {
        let entity = self.entity(id)?;
        let node = match (entity.kind(), entity.parent) {
            (ObjectKind::Table | ObjectKind::CalculatedTable, _) => TreeNode::Model,
            (ObjectKind::Relationship, _) => TreeNode::Relationships,
            (ObjectKind::Role, _) => TreeNode::Roles,
            (ObjectKind::Partition, Some(table)) => TreeNode::PartitionGroup(table),
            (_, Some(parent)) => TreeNode::Object(parent),
            (_, None) => TreeNode::Model,
        };
        Ok(node)
    }

    /// True when another live entity in the namespace of `id` already uses `name`.
    pub(crate) fn name_taken(&self, id: ObjectId, name: &str) -> bool {
        let Ok(entity) = self.entity(id) else {
            return false;
        };
        self.namespace(entity.kind(), entity.parent)
            .into_iter()
            .any(|other| {
                other != id
                    && self
                        .entities
                        .get(other.index())
                        .is_some_and(|e| e.name.eq_ignore_ascii_case(name))
            })
    }

    /// Live entities whose names must differ from a `kind` entity under `parent`.
    pub(crate) fn namespace(&self, kind: ObjectKind, parent: Option<ObjectId>) -> Vec<ObjectId> {
        let live = |ids: &[ObjectId]| -> Vec<ObjectId> {
            ids.iter().copied().filter(|id| self.is_live(*id)).collect()
        };
        let container = parent.and_then(|parent| self.entities.get(parent.index()));
        match kind {
            ObjectKind::Table | ObjectKind::CalculatedTable => live(&self.tables),
            ObjectKind::Role => live(&self.roles),
            ObjectKind::Relationship => Vec::new(),
            ObjectKind::Level => container
                .and_then(|c| c.as_hierarchy())
                .map(|h| live(&h.levels))
                .unwrap_or_default(),
            ObjectKind::Hierarchy => container
                .and_then(|c| c.as_table())
                .map(|t| live(&t.hierarchies))
                .unwrap_or_default(),
            ObjectKind::Partition => container
                .and_then(|c| c.as_table())
                .map(|t| live(&t.partitions))
                .unwrap_or_default(),
            ObjectKind::Measure => {
                let mut ids = container
                    .and_then(|c| c.as_table())
                    .map(|t| live(&t.columns))
                    .unwrap_or_default();
                ids.extend(self.all_measures());
                ids
            }
            _ => container
                .and_then(|c| c.as_table())
                .map(|t| {
                    let mut ids = live(&t.columns);
                    ids.extend(live(&t.measures));
                    ids
                })
                .unwrap_or_default(),
        }
    }

    /// Every live measure in the model, in table order.
    pub(crate) fn all_measures(&self) -> Vec<ObjectId> {
        self.tables
            .iter()
            .filter_map(|table| self.entities.get(table.index()))
            .filter(|table| !table.deleted)
            .filter_map(|table| table.as_table())
            .flat_map(|table| table.measures.iter().copied())
            .filter(|id| self.is_live(*id))
            .collect()
    }
}

/// Canonical form of a value before comparison and commit.
fn normalize(property: PropertyId, value: PropertyValue) -> PropertyValue {
    match (property, value) {
        (PropertyId::DisplayFolder | PropertyId::Description, PropertyValue::Text(Some(text)))
            if text.is_empty() =>
        {
            PropertyValue::Text(None)
        }
        (PropertyId::DefaultDetailRowsExpression, PropertyValue::Text(Some(text)))
            if text.trim().is_empty() =>
        {
            PropertyValue::Text(None)
        }
        (PropertyId::Expression, PropertyValue::Text(None)) => PropertyValue::text(""),
        (_, value) => value,
    }
}
