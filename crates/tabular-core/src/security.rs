//! Row-level and object-level security overlays on tables.

use tracing::{debug, info};

use tabular_model::{
    MetadataPermission, ModelError, OBJECT_LEVEL_SECURITY_LEVEL, ObjectId, ObjectKind,
    PropertyKey, PropertyValue, Result, SecurityOverlay,
};

use crate::session::{Session, Transaction};
use crate::tree::TreeNode;
use crate::undo::UndoRecord;

impl Session {
    pub fn row_level_security(&self, table: ObjectId) -> Result<&SecurityOverlay<String>> {
        let entity = self.expect_table(table)?;
        entity
            .as_table()
            .map(|data| &data.row_level_security)
            .ok_or(ModelError::UnknownObject(table))
    }

    /// Object-level overlay; only present at compatibility level 1400 and above.
    pub fn object_level_security(
        &self,
        table: ObjectId,
    ) -> Result<&SecurityOverlay<MetadataPermission>> {
        let entity = self.expect_table(table)?;
        self.require_object_level_security()?;
        entity
            .as_table()
            .and_then(|data| data.object_level_security.as_ref())
            .ok_or(ModelError::UnknownObject(table))
    }

    pub fn row_filter(&self, table: ObjectId, role: ObjectId) -> Result<Option<&str>> {
        self.expect_role(role)?;
        Ok(self.row_level_security(table)?.get(role).map(String::as_str))
    }

    pub fn object_permission(
        &self,
        table: ObjectId,
        role: ObjectId,
    ) -> Result<MetadataPermission> {
        self.expect_role(role)?;
        Ok(self
            .object_level_security(table)?
            .get(role)
            .copied()
            .unwrap_or_default())
    }

    /// Set or clear (`None` or blank) the row filter of `role` on `table`.
    pub fn set_row_filter(
        &mut self,
        tx: &Transaction,
        table: ObjectId,
        role: ObjectId,
        filter: Option<&str>,
    ) -> Result<bool> {
        self.check_transaction(tx)?;
        self.expect_table(table)?;
        self.expect_role(role)?;
        let filter = filter
            .filter(|filter| !filter.trim().is_empty())
            .map(str::to_string);
        self.write_row_filter(table, role, filter)
    }

    /// Set the object permission of `role` on `table`. `Default` removes the entry.
    pub fn set_object_permission(
        &mut self,
        tx: &Transaction,
        table: ObjectId,
        role: ObjectId,
        permission: MetadataPermission,
    ) -> Result<bool> {
        self.check_transaction(tx)?;
        self.object_level_security(table)?;
        self.expect_role(role)?;
        self.write_object_permission(table, role, permission)
    }

    /// Remove every overlay entry of `table`. Idempotent.
    pub fn clear_security(&mut self, tx: &Transaction, table: ObjectId) -> Result<usize> {
        self.check_transaction(tx)?;
        self.expect_table(table)?;
        self.clear_table_security(table)
    }

    pub(crate) fn write_row_filter(
        &mut self,
        table: ObjectId,
        role: ObjectId,
        filter: Option<String>,
    ) -> Result<bool> {
        let overlay = self.table_overlays_mut(table)?;
        if overlay.row_level_security.get(role) == filter.as_ref() {
            return Ok(false);
        }
        let old = overlay.row_level_security.set(role, filter.clone());
        debug!(%table, %role, ?filter, "row filter set");
        self.undo.add(UndoRecord {
            target: table,
            key: PropertyKey::RowLevelFilter { role },
            old: PropertyValue::Text(old),
            new: PropertyValue::Text(filter),
        });
        self.tree.node_changed(TreeNode::Object(table));
        Ok(true)
    }

    pub(crate) fn write_object_permission(
        &mut self,
        table: ObjectId,
        role: ObjectId,
        permission: MetadataPermission,
    ) -> Result<bool> {
        self.require_object_level_security()?;
        let overlay = self.table_overlays_mut(table)?;
        let Some(ols) = overlay.object_level_security.as_mut() else {
            return Err(ModelError::InvalidOperation(format!(
                "table {table} has no object-level security overlay"
            )));
        };
        let stored = (permission != MetadataPermission::Default).then_some(permission);
        if ols.get(role).copied() == stored {
            return Ok(false);
        }
        let old = ols.set(role, stored).unwrap_or_default();
        debug!(%table, %role, ?permission, "object permission set");
        self.undo.add(UndoRecord {
            target: table,
            key: PropertyKey::ObjectLevelPermission { role },
            old: PropertyValue::Permission(old),
            new: PropertyValue::Permission(permission),
        });
        self.tree.node_changed(TreeNode::Object(table));
        Ok(true)
    }

    /// Clear both overlays of `table`, recording every removed entry.
    pub(crate) fn clear_table_security(&mut self, table: ObjectId) -> Result<usize> {
        let overlay = self.table_overlays_mut(table)?;
        let filters = overlay.row_level_security.clear();
        let permissions = overlay
            .object_level_security
            .as_mut()
            .map(SecurityOverlay::clear)
            .unwrap_or_default();
        let removed = filters.len() + permissions.len();
        for (role, filter) in filters {
            self.undo.add(UndoRecord {
                target: table,
                key: PropertyKey::RowLevelFilter { role },
                old: PropertyValue::Text(Some(filter)),
                new: PropertyValue::Text(None),
            });
        }
        for (role, permission) in permissions {
            self.undo.add(UndoRecord {
                target: table,
                key: PropertyKey::ObjectLevelPermission { role },
                old: PropertyValue::Permission(permission),
                new: PropertyValue::Permission(MetadataPermission::Default),
            });
        }
        if removed > 0 {
            debug!(%table, removed, "security cleared");
        }
        Ok(removed)
    }

    /// Remove `role` from the overlays of every table.
    pub(crate) fn drop_role_entries(&mut self, role: ObjectId) -> Result<()> {
        let tables: Vec<ObjectId> = self.tables.clone();
        for table in tables {
            if !self.is_live(table) {
                continue;
            }
            self.write_row_filter(table, role, None)?;
            let has_ols = self
                .entities
                .get(table.index())
                .and_then(|entity| entity.as_table())
                .is_some_and(|data| data.object_level_security.is_some());
            if has_ols && self.options.supports_object_level_security() {
                self.write_object_permission(table, role, MetadataPermission::Default)?;
            }
        }
        Ok(())
    }

    /// Change the compatibility level, creating or dropping object-level
    /// overlays to match. Not undo-recorded. Dropping the overlays also drops
    /// their entries from the undo history.
    pub fn set_compatibility_level(&mut self, level: u32) {
        let before = self.options.supports_object_level_security();
        self.options.compatibility_level = level;
        let after = self.options.supports_object_level_security();
        if before != after {
            for entity in &mut self.entities {
                if let Some(table) = entity.as_table_mut() {
                    table.object_level_security = after.then(SecurityOverlay::new);
                }
            }
        }
        if before && !after {
            let dropped = self.undo.retain_records(|record| {
                !matches!(record.key, PropertyKey::ObjectLevelPermission { .. })
            });
            if dropped > 0 {
                debug!(dropped, "object-level security history discarded");
            }
        }
        info!(level, object_level_security = after, "compatibility level changed");
    }

    fn require_object_level_security(&self) -> Result<()> {
        if !self.options.supports_object_level_security() {
            return Err(ModelError::Compatibility {
                feature: "Object-level security",
                required: OBJECT_LEVEL_SECURITY_LEVEL,
                actual: self.options.compatibility_level,
            });
        }
        Ok(())
    }

    fn expect_role(&self, role: ObjectId) -> Result<()> {
        self.expect_kind(role, "role", |kind| kind == ObjectKind::Role)?;
        Ok(())
    }

    fn table_overlays_mut(&mut self, table: ObjectId) -> Result<&mut tabular_model::TableData> {
        let entity = self.entity_mut(table)?;
        let kind = entity.kind();
        entity.as_table_mut().ok_or(ModelError::WrongKind {
            id: table,
            expected: "table",
            actual: kind,
        })
    }
}
