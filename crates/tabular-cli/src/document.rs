//! JSON model documents.
//!
//! A [`ModelDocument`] is the on-disk form of a model. Opening one replays
//! it through the session factories inside a single update, so names,
//! references and security entries get the same checks as interactive
//! edits. The load itself is not undoable.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use tabular_core::{Session, Transaction};
use tabular_model::{
    DataType, MetadataPermission, ModelError, ModelPermission, ObjectId, ObjectKind,
    PartitionSourceType, PropertyId, PropertyValue, SessionOptions,
};

fn is_false(value: &bool) -> bool {
    !*value
}

fn is_true(value: &bool) -> bool {
    *value
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDocument {
    #[serde(default)]
    pub options: SessionOptions,
    #[serde(default)]
    pub tables: Vec<TableDocument>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<RelationshipDocument>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<RoleDocument>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableDocument {
    pub name: String,
    /// Present for calculated tables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_hidden: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<ColumnDocument>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub measures: Vec<MeasureDocument>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hierarchies: Vec<HierarchyDocument>,
    /// Replaces the default partition when not empty. Ignored for
    /// calculated tables.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub partitions: Vec<PartitionDocument>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnDocument {
    pub name: String,
    /// Present for calculated columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_folder: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_hidden: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasureDocument {
    pub name: String,
    #[serde(default)]
    pub expression: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_folder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_hidden: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HierarchyDocument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_folder: Option<String>,
    /// Column names, top level first.
    #[serde(default)]
    pub levels: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartitionDocument {
    pub name: String,
    /// `M` for Power Query partitions; query partitions leave it out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<PartitionSourceType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

/// A relationship between two columns written as `'Table'[Column]` paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDocument {
    pub from: String,
    pub to: String,
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleDocument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_permission: Option<ModelPermission>,
    /// Row filter expression per table name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub row_filters: BTreeMap<String, String>,
    /// Object permission per table name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub object_permissions: BTreeMap<String, MetadataPermission>,
}

impl ModelDocument {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("parse model document")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("read model document {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("load {}", path.display()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("serialize model document")
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut text = self.to_json()?;
        text.push('\n');
        fs::write(path, text).with_context(|| format!("write model document {}", path.display()))
    }

    /// Build a session holding this model. The history starts empty.
    pub fn open(&self, options: SessionOptions) -> Result<Session> {
        let mut session = Session::new(options);
        session
            .update("load model", |s, tx| self.populate(s, tx))
            .context("build model")?;
        // Expressions may name objects declared further down the document.
        session.rebuild_all();
        session.clear_history()?;
        info!(
            tables = self.tables.len(),
            relationships = self.relationships.len(),
            roles = self.roles.len(),
            "model loaded"
        );
        Ok(session)
    }

    fn populate(&self, session: &mut Session, tx: &Transaction) -> tabular_model::Result<()> {
        let mut tables = Vec::with_capacity(self.tables.len());
        for table in &self.tables {
            tables.push(table.create(session, tx)?);
        }
        for (table, id) in self.tables.iter().zip(tables) {
            table.create_members(session, tx, id)?;
        }
        for relationship in &self.relationships {
            let from = lookup(session, &relationship.from)?;
            let to = lookup(session, &relationship.to)?;
            let id = session.add_relationship(tx, from, to)?;
            if !relationship.is_active {
                session.set_property(tx, id, PropertyId::IsActive, PropertyValue::Bool(false))?;
            }
        }
        for role in &self.roles {
            role.create(session, tx)?;
        }
        Ok(())
    }

    /// Snapshot the live model of `session`.
    pub fn from_session(session: &Session) -> tabular_model::Result<Self> {
        let tables = session
            .tables()
            .into_iter()
            .map(|table| TableDocument::export(session, table))
            .collect::<tabular_model::Result<Vec<_>>>()?;
        let mut relationships = Vec::new();
        for id in session.relationships() {
            let Some(relationship) = session.entity(id)?.as_relationship() else {
                continue;
            };
            relationships.push(RelationshipDocument {
                from: session.dax_object_full_name(relationship.from_column)?,
                to: session.dax_object_full_name(relationship.to_column)?,
                is_active: relationship.is_active,
            });
        }
        let roles = session
            .roles()
            .into_iter()
            .map(|role| RoleDocument::export(session, role))
            .collect::<tabular_model::Result<Vec<_>>>()?;
        Ok(Self {
            options: session.options().clone(),
            tables,
            relationships,
            roles,
        })
    }
}

/// Resolve an object path, failing with the path in the message.
pub fn lookup(session: &Session, path: &str) -> tabular_model::Result<ObjectId> {
    session
        .find_object(path)
        .ok_or_else(|| ModelError::NotFound(path.to_string()))
}

fn text(session: &Session, id: ObjectId, property: PropertyId) -> Option<String> {
    session
        .property(id, property)
        .ok()
        .and_then(|value| value.as_text().map(str::to_string))
}

fn warn_if_renamed(session: &Session, id: ObjectId, requested: &str) {
    if let Ok(actual) = session.name(id)
        && actual != requested
    {
        warn!(requested, actual, "name already taken; object renamed on load");
    }
}

impl TableDocument {
    fn create(&self, session: &mut Session, tx: &Transaction) -> tabular_model::Result<ObjectId> {
        let id = match &self.expression {
            Some(expression) => session.add_calculated_table(tx, Some(&self.name), Some(expression))?,
            None => session.add_table(tx, Some(&self.name))?,
        };
        warn_if_renamed(session, id, &self.name);
        if self.description.is_some() {
            session.set_description(tx, id, self.description.as_deref())?;
        }
        if self.is_hidden {
            session.set_hidden(tx, id, true)?;
        }
        if self.expression.is_none() && !self.partitions.is_empty() {
            for default in session.partitions(id) {
                session.delete(tx, default, false)?;
            }
            for partition in &self.partitions {
                partition.create(session, tx, id)?;
            }
        }
        debug!(table = %self.name, "table created");
        Ok(id)
    }

    fn create_members(
        &self,
        session: &mut Session,
        tx: &Transaction,
        table: ObjectId,
    ) -> tabular_model::Result<()> {
        let calculated_table = self.expression.is_some();
        for column in &self.columns {
            column.create(session, tx, table, calculated_table)?;
        }
        for measure in &self.measures {
            measure.create(session, tx, table)?;
        }
        for hierarchy in &self.hierarchies {
            let levels: Vec<&str> = hierarchy.levels.iter().map(String::as_str).collect();
            session.add_hierarchy_by_names(
                tx,
                table,
                Some(&hierarchy.name),
                hierarchy.display_folder.as_deref(),
                &levels,
            )?;
        }
        Ok(())
    }

    fn export(session: &Session, table: ObjectId) -> tabular_model::Result<Self> {
        let entity = session.live(table)?;
        let calculated = entity.kind() == ObjectKind::CalculatedTable;
        let columns = session
            .columns(table)
            .into_iter()
            .map(|column| ColumnDocument::export(session, column))
            .collect::<tabular_model::Result<Vec<_>>>()?;
        let measures = session
            .measures(table)
            .into_iter()
            .map(|measure| MeasureDocument::export(session, measure))
            .collect::<tabular_model::Result<Vec<_>>>()?;
        let mut hierarchies = Vec::new();
        for hierarchy in session.hierarchies(table) {
            let mut levels = Vec::new();
            for level in session.levels(hierarchy) {
                if let Some(data) = session.entity(level)?.as_level() {
                    levels.push(session.name(data.column)?.to_string());
                }
            }
            hierarchies.push(HierarchyDocument {
                name: session.name(hierarchy)?.to_string(),
                display_folder: text(session, hierarchy, PropertyId::DisplayFolder),
                levels,
            });
        }
        let mut partitions = Vec::new();
        if !calculated {
            for partition in session.partitions(table) {
                let Some(data) = session.entity(partition)?.as_partition() else {
                    continue;
                };
                partitions.push(PartitionDocument {
                    name: session.name(partition)?.to_string(),
                    source_type: (data.source_type == PartitionSourceType::M)
                        .then_some(PartitionSourceType::M),
                    data_source: data.data_source.clone(),
                    query: data.query.clone(),
                });
            }
        }
        Ok(Self {
            name: entity.name.clone(),
            expression: if calculated {
                text(session, table, PropertyId::Expression)
            } else {
                None
            },
            description: entity.description.clone(),
            is_hidden: entity.is_hidden,
            columns,
            measures,
            hierarchies,
            partitions,
        })
    }
}

impl ColumnDocument {
    fn create(
        &self,
        session: &mut Session,
        tx: &Transaction,
        table: ObjectId,
        calculated_table: bool,
    ) -> tabular_model::Result<ObjectId> {
        let folder = self.display_folder.as_deref();
        let id = if calculated_table {
            let data_type = self.data_type.unwrap_or_default();
            session.add_calculated_table_column(tx, table, &self.name, data_type)?
        } else if let Some(expression) = &self.expression {
            session.add_calculated_column(tx, table, Some(&self.name), Some(expression), folder)?
        } else {
            session.add_data_column(
                tx,
                table,
                Some(&self.name),
                self.source_column.as_deref(),
                folder,
            )?
        };
        warn_if_renamed(session, id, &self.name);
        if !calculated_table && let Some(data_type) = self.data_type {
            session.set_property(tx, id, PropertyId::DataType, PropertyValue::DataType(data_type))?;
        }
        if calculated_table && folder.is_some() {
            session.set_display_folder(tx, id, folder)?;
        }
        if self.is_hidden {
            session.set_hidden(tx, id, true)?;
        }
        Ok(id)
    }

    fn export(session: &Session, column: ObjectId) -> tabular_model::Result<Self> {
        let entity = session.live(column)?;
        let Some(data) = entity.as_column() else {
            return Err(ModelError::WrongKind {
                id: column,
                expected: "column",
                actual: entity.kind(),
            });
        };
        let kind = entity.kind();
        Ok(Self {
            name: entity.name.clone(),
            expression: (kind == ObjectKind::CalculatedColumn).then(|| data.expression.clone()),
            data_type: (data.data_type != DataType::Automatic).then_some(data.data_type),
            source_column: data
                .source_column
                .clone()
                .filter(|source| kind == ObjectKind::DataColumn && *source != entity.name),
            display_folder: entity.display_folder.clone(),
            is_hidden: entity.is_hidden,
        })
    }
}

impl MeasureDocument {
    fn create(
        &self,
        session: &mut Session,
        tx: &Transaction,
        table: ObjectId,
    ) -> tabular_model::Result<ObjectId> {
        let id = session.add_measure(
            tx,
            table,
            Some(&self.name),
            Some(&self.expression),
            self.display_folder.as_deref(),
        )?;
        warn_if_renamed(session, id, &self.name);
        if let Some(format) = &self.format_string {
            session.set_property(tx, id, PropertyId::FormatString, PropertyValue::text(format))?;
        }
        if self.description.is_some() {
            session.set_description(tx, id, self.description.as_deref())?;
        }
        if self.is_hidden {
            session.set_hidden(tx, id, true)?;
        }
        Ok(id)
    }

    fn export(session: &Session, measure: ObjectId) -> tabular_model::Result<Self> {
        let entity = session.live(measure)?;
        let (expression, format_string) = entity
            .as_measure()
            .map(|data| (data.expression.clone(), data.format_string.clone()))
            .unwrap_or_default();
        Ok(Self {
            name: entity.name.clone(),
            expression,
            format_string,
            display_folder: entity.display_folder.clone(),
            description: entity.description.clone(),
            is_hidden: entity.is_hidden,
        })
    }
}

impl PartitionDocument {
    fn create(
        &self,
        session: &mut Session,
        tx: &Transaction,
        table: ObjectId,
    ) -> tabular_model::Result<ObjectId> {
        match self.source_type {
            Some(PartitionSourceType::M) => session.add_m_partition(
                tx,
                table,
                Some(&self.name),
                self.query.as_deref().unwrap_or_default(),
            ),
            Some(PartitionSourceType::Query) | None => session.add_partition(
                tx,
                table,
                Some(&self.name),
                self.data_source.as_deref(),
                self.query.as_deref(),
            ),
            Some(other) => Err(ModelError::InvalidOperation(format!(
                "partition {} cannot be sourced from {other}",
                self.name
            ))),
        }
    }
}

impl RoleDocument {
    fn create(&self, session: &mut Session, tx: &Transaction) -> tabular_model::Result<ObjectId> {
        let role = session.add_role(tx, Some(&self.name))?;
        warn_if_renamed(session, role, &self.name);
        if let Some(permission) = self.model_permission {
            session.set_property(
                tx,
                role,
                PropertyId::ModelPermission,
                PropertyValue::ModelPermission(permission),
            )?;
        }
        for (table, filter) in &self.row_filters {
            let table = session
                .find_table(table)
                .ok_or_else(|| ModelError::NotFound(table.clone()))?;
            session.set_row_filter(tx, table, role, Some(filter))?;
        }
        for (table, permission) in &self.object_permissions {
            let table = session
                .find_table(table)
                .ok_or_else(|| ModelError::NotFound(table.clone()))?;
            session.set_object_permission(tx, table, role, *permission)?;
        }
        Ok(role)
    }

    fn export(session: &Session, role: ObjectId) -> tabular_model::Result<Self> {
        let name = session.name(role)?.to_string();
        let model_permission = match session.property(role, PropertyId::ModelPermission)? {
            PropertyValue::ModelPermission(permission) if permission != ModelPermission::default() => {
                Some(permission)
            }
            _ => None,
        };
        let mut row_filters = BTreeMap::new();
        let mut object_permissions = BTreeMap::new();
        for table in session.tables() {
            let table_name = session.name(table)?;
            if let Some(filter) = session.row_filter(table, role)? {
                row_filters.insert(table_name.to_string(), filter.to_string());
            }
            if let Ok(permission) = session.object_permission(table, role)
                && permission != MetadataPermission::Default
            {
                object_permissions.insert(table_name.to_string(), permission);
            }
        }
        Ok(Self {
            name,
            model_permission,
            row_filters,
            object_permissions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sections_default() {
        let document = ModelDocument::from_json(r#"{"tables": [{"name": "Sales"}]}"#)
            .expect("parse");
        assert_eq!(document.tables[0].name, "Sales");
        assert!(document.relationships.is_empty());
        assert!(document.options.auto_fixup);
    }

    #[test]
    fn relationships_default_to_active() {
        let document = ModelDocument::from_json(
            r#"{"relationships": [{"from": "Sales[Key]", "to": "Customer[Key]"}]}"#,
        )
        .expect("parse");
        assert!(document.relationships[0].is_active);
    }
}
