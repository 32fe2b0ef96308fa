//! Deletion with reference checks and structural cascade.

use std::collections::BTreeSet;

use tracing::{info, warn};

use tabular_model::{ModelError, ObjectId, ObjectKind, Result};

use crate::session::{Session, Transaction};

impl Session {
    /// Why `id` cannot be deleted safely, or `None` when nothing refers to it.
    ///
    /// Reported: expressions outside the deleted subtree that reference the
    /// object or its children, relationships using its columns, and hierarchy
    /// levels built on a column being deleted.
    pub fn can_delete(&self, id: ObjectId) -> Result<Option<String>> {
        let entity = self.live(id)?;
        let kind = entity.kind();
        let subtree = self.subtree(id);
        let mut reasons = Vec::new();

        let dependents: BTreeSet<ObjectId> = subtree
            .iter()
            .flat_map(|member| self.dependencies.referenced_by(*member))
            .filter(|source| !subtree.contains(source) && self.is_live(*source))
            .collect();
        if !dependents.is_empty() {
            let names: Vec<String> = dependents
                .iter()
                .map(|source| self.display_name(*source))
                .collect();
            reasons.push(format!(
                "referenced by {} object(s): {}",
                names.len(),
                names.join(", ")
            ));
        }

        if kind.is_table() || kind.is_column() {
            let relationships = self.used_in_relationships(id);
            if !relationships.is_empty() {
                reasons.push(format!("used in {} relationship(s)", relationships.len()));
            }
        }

        if kind.is_column() {
            let hierarchies: Vec<String> = self
                .levels_using(id)
                .into_iter()
                .filter_map(|level| self.entities.get(level.index())?.parent)
                .filter_map(|hierarchy| Some(self.entities.get(hierarchy.index())?.name.clone()))
                .collect();
            if !hierarchies.is_empty() {
                reasons.push(format!(
                    "used as a level in hierarchy {}",
                    hierarchies.join(", ")
                ));
            }
        }

        Ok((!reasons.is_empty()).then(|| reasons.join("; ")))
    }

    /// Delete `id` and everything it owns. Refused while [`Session::can_delete`]
    /// reports a reason, unless `force` is set.
    pub fn delete(&mut self, tx: &Transaction, id: ObjectId, force: bool) -> Result<()> {
        self.check_transaction(tx)?;
        if let Some(message) = self.can_delete(id)? {
            let name = self.live(id)?.name.clone();
            if !force {
                warn!(%id, name = %name, reason = %message, "delete refused");
                return Err(ModelError::ReferencedBy { name, message });
            }
            warn!(%id, name = %name, reason = %message, "forced delete");
        }
        info!(%id, name = %self.live(id)?.name, "deleting");
        self.remove_object(id)
    }

    fn remove_object(&mut self, id: ObjectId) -> Result<()> {
        let entity = self.live(id)?;
        let kind = entity.kind();
        let mut owned = entity.children();
        if let Some(table) = entity.as_table() {
            owned.extend(&table.partitions);
        }

        if kind.is_table() {
            self.clear_table_security(id)?;
            for relationship in self.used_in_relationships(id) {
                self.remove_object(relationship)?;
            }
        } else if kind.is_column() {
            for level in self.levels_using(id) {
                self.remove_object(level)?;
            }
            for relationship in self.used_in_relationships(id) {
                self.remove_object(relationship)?;
            }
        } else if kind == ObjectKind::Role {
            self.drop_role_entries(id)?;
        }

        // Hierarchies go before the columns their levels point at.
        owned.sort_by_key(|child| {
            self.entities
                .get(child.index())
                .is_some_and(|entity| entity.kind() != ObjectKind::Hierarchy)
        });
        for child in owned {
            if self.is_live(child) {
                self.remove_object(child)?;
            }
        }
        self.detach(id)?;
        Ok(())
    }

    /// `id` plus every object it owns, directly or through hierarchies.
    fn subtree(&self, id: ObjectId) -> BTreeSet<ObjectId> {
        let mut members = BTreeSet::from([id]);
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(entity) = self.entities.get(current.index()) else {
                continue;
            };
            let mut owned = entity.children();
            if let Some(table) = entity.as_table() {
                owned.extend(&table.partitions);
            }
            for child in owned {
                if self.is_live(child) && members.insert(child) {
                    stack.push(child);
                }
            }
        }
        members
    }

    /// Live levels, in any hierarchy of the column's table, built on `column`.
    pub(crate) fn levels_using(&self, column: ObjectId) -> Vec<ObjectId> {
        let Some(table) = self
            .entities
            .get(column.index())
            .and_then(|entity| entity.parent)
            .and_then(|table| self.entities.get(table.index()))
            .and_then(|table| table.as_table())
        else {
            return Vec::new();
        };
        table
            .hierarchies
            .iter()
            .filter_map(|hierarchy| self.entities.get(hierarchy.index()))
            .filter(|hierarchy| !hierarchy.deleted)
            .filter_map(|hierarchy| hierarchy.as_hierarchy())
            .flat_map(|hierarchy| hierarchy.levels.iter().copied())
            .filter(|level| {
                self.entities
                    .get(level.index())
                    .filter(|entity| !entity.deleted)
                    .and_then(|entity| entity.as_level())
                    .is_some_and(|data| data.column == column)
            })
            .collect()
    }
}
