//! Entity records stored in the session arena.
//!
//! An [`Entity`] carries the fields every named node shares plus a
//! kind-specific [`EntityPayload`]. Reads and writes here are raw: no
//! validation, undo or propagation happens at this level.

use serde::{Deserialize, Serialize};

use crate::enums::{
    DataType, MetadataPermission, ModelPermission, ObjectKind, PartitionSourceType,
};
use crate::error::{ModelError, Result};
use crate::ids::ObjectId;
use crate::property::{PropertyId, PropertyValue};
use crate::security::SecurityOverlay;

/// Validation state of an entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorState {
    /// Error raised by the entity's own expressions.
    pub own: Option<String>,
    /// Error aggregated from the first failing child.
    pub cascaded: Option<String>,
    /// Set while the expression service has not resolved validation.
    pub needs_validation: bool,
}

impl ErrorState {
    /// Message presented for the entity: its own error wins over a cascaded one.
    pub fn message(&self) -> Option<&str> {
        self.own.as_deref().or(self.cascaded.as_deref())
    }

    pub fn has_error(&self) -> bool {
        self.message().is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableData {
    pub calculated: bool,
    /// Calculated table expression; empty for regular tables.
    pub expression: String,
    pub columns: Vec<ObjectId>,
    pub measures: Vec<ObjectId>,
    pub hierarchies: Vec<ObjectId>,
    pub partitions: Vec<ObjectId>,
    pub default_detail_rows_expression: Option<String>,
    pub show_as_variations_only: bool,
    pub is_private: bool,
    pub row_level_security: SecurityOverlay<String>,
    /// Present only at compatibility level 1400 and above.
    pub object_level_security: Option<SecurityOverlay<MetadataPermission>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    Data,
    Calculated,
    CalculatedTable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnData {
    pub kind: ColumnKind,
    pub data_type: DataType,
    pub source_column: Option<String>,
    pub expression: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasureData {
    pub expression: String,
    pub format_string: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyData {
    pub levels: Vec<ObjectId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelData {
    pub column: ObjectId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionData {
    pub source_type: PartitionSourceType,
    pub query: Option<String>,
    pub data_source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipData {
    pub from_column: ObjectId,
    pub to_column: ObjectId,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleData {
    pub model_permission: ModelPermission,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityPayload {
    Table(TableData),
    Column(ColumnData),
    Measure(MeasureData),
    Hierarchy(HierarchyData),
    Level(LevelData),
    Partition(PartitionData),
    Relationship(RelationshipData),
    Role(RoleData),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: ObjectId,
    pub name: String,
    /// Containing entity; `None` for model-level objects.
    pub parent: Option<ObjectId>,
    pub deleted: bool,
    pub description: Option<String>,
    pub display_folder: Option<String>,
    pub is_hidden: bool,
    pub error: ErrorState,
    pub payload: EntityPayload,
}

impl Entity {
    pub fn new(
        id: ObjectId,
        name: impl Into<String>,
        parent: Option<ObjectId>,
        payload: EntityPayload,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            parent,
            deleted: false,
            description: None,
            display_folder: None,
            is_hidden: false,
            error: ErrorState::default(),
            payload,
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match &self.payload {
            EntityPayload::Table(table) if table.calculated => ObjectKind::CalculatedTable,
            EntityPayload::Table(_) => ObjectKind::Table,
            EntityPayload::Column(column) => match column.kind {
                ColumnKind::Data => ObjectKind::DataColumn,
                ColumnKind::Calculated => ObjectKind::CalculatedColumn,
                ColumnKind::CalculatedTable => ObjectKind::CalculatedTableColumn,
            },
            EntityPayload::Measure(_) => ObjectKind::Measure,
            EntityPayload::Hierarchy(_) => ObjectKind::Hierarchy,
            EntityPayload::Level(_) => ObjectKind::Level,
            EntityPayload::Partition(_) => ObjectKind::Partition,
            EntityPayload::Relationship(_) => ObjectKind::Relationship,
            EntityPayload::Role(_) => ObjectKind::Role,
        }
    }

    pub fn as_table(&self) -> Option<&TableData> {
        match &self.payload {
            EntityPayload::Table(table) => Some(table),
            _ => None,
        }
    }

    pub fn as_table_mut(&mut self) -> Option<&mut TableData> {
        match &mut self.payload {
            EntityPayload::Table(table) => Some(table),
            _ => None,
        }
    }

    pub fn as_column(&self) -> Option<&ColumnData> {
        match &self.payload {
            EntityPayload::Column(column) => Some(column),
            _ => None,
        }
    }

    pub fn as_measure(&self) -> Option<&MeasureData> {
        match &self.payload {
            EntityPayload::Measure(measure) => Some(measure),
            _ => None,
        }
    }

    pub fn as_hierarchy(&self) -> Option<&HierarchyData> {
        match &self.payload {
            EntityPayload::Hierarchy(hierarchy) => Some(hierarchy),
            _ => None,
        }
    }

    pub fn as_hierarchy_mut(&mut self) -> Option<&mut HierarchyData> {
        match &mut self.payload {
            EntityPayload::Hierarchy(hierarchy) => Some(hierarchy),
            _ => None,
        }
    }

    pub fn as_level(&self) -> Option<&LevelData> {
        match &self.payload {
            EntityPayload::Level(level) => Some(level),
            _ => None,
        }
    }

    pub fn as_partition(&self) -> Option<&PartitionData> {
        match &self.payload {
            EntityPayload::Partition(partition) => Some(partition),
            _ => None,
        }
    }

    pub fn as_relationship(&self) -> Option<&RelationshipData> {
        match &self.payload {
            EntityPayload::Relationship(relationship) => Some(relationship),
            _ => None,
        }
    }

    /// Children that take part in error cascade, in fixed order:
    /// columns, measures, hierarchies for a table; levels for a hierarchy.
    pub fn children(&self) -> Vec<ObjectId> {
        match &self.payload {
            EntityPayload::Table(table) => table
                .columns
                .iter()
                .chain(&table.measures)
                .chain(&table.hierarchies)
                .copied()
                .collect(),
            EntityPayload::Hierarchy(hierarchy) => hierarchy.levels.clone(),
            _ => Vec::new(),
        }
    }

    /// Expression-bearing properties of this entity with their current text.
    pub fn expressions(&self) -> Vec<(PropertyId, &str)> {
        let mut out = Vec::new();
        match &self.payload {
            EntityPayload::Table(table) => {
                if table.calculated {
                    out.push((PropertyId::Expression, table.expression.as_str()));
                }
                if let Some(detail) = &table.default_detail_rows_expression {
                    out.push((PropertyId::DefaultDetailRowsExpression, detail.as_str()));
                }
            }
            EntityPayload::Column(column) if column.kind == ColumnKind::Calculated => {
                out.push((PropertyId::Expression, column.expression.as_str()));
            }
            EntityPayload::Measure(measure) => {
                out.push((PropertyId::Expression, measure.expression.as_str()));
            }
            _ => {}
        }
        out
    }

    pub fn has_expressions(&self) -> bool {
        !self.expressions().is_empty()
    }

    /// Raw read of a stored property. Derived properties return `None`.
    pub fn property(&self, property: PropertyId) -> Option<PropertyValue> {
        let value = match (property, &self.payload) {
            (PropertyId::Name, _) => PropertyValue::text(self.name.clone()),
            (PropertyId::Description, _) => PropertyValue::Text(self.description.clone()),
            (PropertyId::DisplayFolder, _) => PropertyValue::Text(self.display_folder.clone()),
            (PropertyId::IsHidden, _) => PropertyValue::Bool(self.is_hidden),
            (PropertyId::ErrorMessage, _) => {
                PropertyValue::Text(self.error.message().map(str::to_string))
            }
            (PropertyId::Expression, EntityPayload::Table(table)) if table.calculated => {
                PropertyValue::text(table.expression.clone())
            }
            (PropertyId::Expression, EntityPayload::Column(column))
                if column.kind == ColumnKind::Calculated =>
            {
                PropertyValue::text(column.expression.clone())
            }
            (PropertyId::Expression, EntityPayload::Measure(measure)) => {
                PropertyValue::text(measure.expression.clone())
            }
            (PropertyId::DefaultDetailRowsExpression, EntityPayload::Table(table)) => {
                PropertyValue::Text(table.default_detail_rows_expression.clone())
            }
            (PropertyId::ShowAsVariationsOnly, EntityPayload::Table(table)) => {
                PropertyValue::Bool(table.show_as_variations_only)
            }
            (PropertyId::IsPrivate, EntityPayload::Table(table)) => {
                PropertyValue::Bool(table.is_private)
            }
            (PropertyId::DataType, EntityPayload::Column(column)) => {
                PropertyValue::DataType(column.data_type)
            }
            (PropertyId::SourceColumn, EntityPayload::Column(column))
                if column.kind != ColumnKind::Calculated =>
            {
                PropertyValue::Text(column.source_column.clone())
            }
            (PropertyId::FormatString, EntityPayload::Measure(measure)) => {
                PropertyValue::Text(measure.format_string.clone())
            }
            (PropertyId::Query, EntityPayload::Partition(partition)) => {
                PropertyValue::Text(partition.query.clone())
            }
            (PropertyId::DataSource, EntityPayload::Partition(partition)) => {
                PropertyValue::Text(partition.data_source.clone())
            }
            (PropertyId::IsActive, EntityPayload::Relationship(relationship)) => {
                PropertyValue::Bool(relationship.is_active)
            }
            (PropertyId::ModelPermission, EntityPayload::Role(role)) => {
                PropertyValue::ModelPermission(role.model_permission)
            }
            _ => return None,
        };
        Some(value)
    }

    /// Raw write of a stored property, returning the previous value.
    pub fn write_property(
        &mut self,
        property: PropertyId,
        value: PropertyValue,
    ) -> Result<PropertyValue> {
        let old = self.property(property).ok_or(ModelError::ReadOnly {
            property,
            kind: self.kind(),
        })?;
        let mismatch = |value: &PropertyValue| ModelError::InvalidValue {
            property,
            message: format!("unexpected {} value", value.type_name()),
        };
        match (property, value) {
            (PropertyId::Name, PropertyValue::Text(Some(name))) => self.name = name,
            (PropertyId::Description, PropertyValue::Text(text)) => self.description = text,
            (PropertyId::DisplayFolder, PropertyValue::Text(text)) => {
                self.display_folder = text.filter(|folder| !folder.is_empty());
            }
            (PropertyId::IsHidden, PropertyValue::Bool(flag)) => self.is_hidden = flag,
            (PropertyId::Expression, PropertyValue::Text(text)) => {
                let text = text.unwrap_or_default();
                match &mut self.payload {
                    EntityPayload::Table(table) => table.expression = text,
                    EntityPayload::Column(column) => column.expression = text,
                    EntityPayload::Measure(measure) => measure.expression = text,
                    _ => {}
                }
            }
            (PropertyId::DefaultDetailRowsExpression, PropertyValue::Text(text)) => {
                if let EntityPayload::Table(table) = &mut self.payload {
                    table.default_detail_rows_expression =
                        text.filter(|expression| !expression.trim().is_empty());
                }
            }
            (PropertyId::ShowAsVariationsOnly, PropertyValue::Bool(flag)) => {
                if let EntityPayload::Table(table) = &mut self.payload {
                    table.show_as_variations_only = flag;
                }
            }
            (PropertyId::IsPrivate, PropertyValue::Bool(flag)) => {
                if let EntityPayload::Table(table) = &mut self.payload {
                    table.is_private = flag;
                }
            }
            (PropertyId::DataType, PropertyValue::DataType(data_type)) => {
                if let EntityPayload::Column(column) = &mut self.payload {
                    column.data_type = data_type;
                }
            }
            (PropertyId::SourceColumn, PropertyValue::Text(text)) => {
                if let EntityPayload::Column(column) = &mut self.payload {
                    column.source_column = text;
                }
            }
            (PropertyId::FormatString, PropertyValue::Text(text)) => {
                if let EntityPayload::Measure(measure) = &mut self.payload {
                    measure.format_string = text;
                }
            }
            (PropertyId::Query, PropertyValue::Text(text)) => {
                if let EntityPayload::Partition(partition) = &mut self.payload {
                    partition.query = text;
                }
            }
            (PropertyId::DataSource, PropertyValue::Text(text)) => {
                if let EntityPayload::Partition(partition) = &mut self.payload {
                    partition.data_source = text;
                }
            }
            (PropertyId::IsActive, PropertyValue::Bool(flag)) => {
                if let EntityPayload::Relationship(relationship) = &mut self.payload {
                    relationship.is_active = flag;
                }
            }
            (PropertyId::ModelPermission, PropertyValue::ModelPermission(permission)) => {
                if let EntityPayload::Role(role) = &mut self.payload {
                    role.model_permission = permission;
                }
            }
            (_, other) => return Err(mismatch(&other)),
        }
        Ok(old)
    }
}
