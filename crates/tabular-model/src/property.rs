//! Property identifiers and values.
//!
//! Every editable or displayable attribute of an entity is named by a
//! [`PropertyId`]. Mutations and undo records carry a [`PropertyKey`], which
//! extends the property set with collection membership and per-role security
//! entries.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::enums::{DataType, MetadataPermission, ModelPermission};
use crate::ids::ObjectId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PropertyId {
    Name,
    Description,
    DisplayFolder,
    IsHidden,
    /// Expression of a measure, calculated column or calculated table.
    Expression,
    DefaultDetailRowsExpression,
    DataType,
    SourceColumn,
    FormatString,
    Query,
    DataSource,
    IsActive,
    ShowAsVariationsOnly,
    IsPrivate,
    ModelPermission,
    // Read-only / presentation properties.
    Partitions,
    Source,
    SourceType,
    RowLevelSecurity,
    ObjectLevelSecurity,
    ErrorMessage,
    DaxIdentifier,
}

impl PropertyId {
    pub const ALL: [PropertyId; 22] = [
        PropertyId::Name,
        PropertyId::Description,
        PropertyId::DisplayFolder,
        PropertyId::IsHidden,
        PropertyId::Expression,
        PropertyId::DefaultDetailRowsExpression,
        PropertyId::DataType,
        PropertyId::SourceColumn,
        PropertyId::FormatString,
        PropertyId::Query,
        PropertyId::DataSource,
        PropertyId::IsActive,
        PropertyId::ShowAsVariationsOnly,
        PropertyId::IsPrivate,
        PropertyId::ModelPermission,
        PropertyId::Partitions,
        PropertyId::Source,
        PropertyId::SourceType,
        PropertyId::RowLevelSecurity,
        PropertyId::ObjectLevelSecurity,
        PropertyId::ErrorMessage,
        PropertyId::DaxIdentifier,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyId::Name => "Name",
            PropertyId::Description => "Description",
            PropertyId::DisplayFolder => "DisplayFolder",
            PropertyId::IsHidden => "IsHidden",
            PropertyId::Expression => "Expression",
            PropertyId::DefaultDetailRowsExpression => "DefaultDetailRowsExpression",
            PropertyId::DataType => "DataType",
            PropertyId::SourceColumn => "SourceColumn",
            PropertyId::FormatString => "FormatString",
            PropertyId::Query => "Query",
            PropertyId::DataSource => "DataSource",
            PropertyId::IsActive => "IsActive",
            PropertyId::ShowAsVariationsOnly => "ShowAsVariationsOnly",
            PropertyId::IsPrivate => "IsPrivate",
            PropertyId::ModelPermission => "ModelPermission",
            PropertyId::Partitions => "Partitions",
            PropertyId::Source => "Source",
            PropertyId::SourceType => "SourceType",
            PropertyId::RowLevelSecurity => "RowLevelSecurity",
            PropertyId::ObjectLevelSecurity => "ObjectLevelSecurity",
            PropertyId::ErrorMessage => "ErrorMessage",
            PropertyId::DaxIdentifier => "DaxIdentifier",
        }
    }

    /// Properties whose text is an expression scanned for dependencies.
    pub fn is_expression(&self) -> bool {
        matches!(
            self,
            PropertyId::Expression | PropertyId::DefaultDetailRowsExpression
        )
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        PropertyId::ALL
            .iter()
            .copied()
            .find(|property| property.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("Unknown property: {s}"))
    }
}

/// Key of a reversible mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyKey {
    Property(PropertyId),
    /// Position of the entity inside its container's collection.
    Membership,
    RowLevelFilter { role: ObjectId },
    ObjectLevelPermission { role: ObjectId },
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKey::Property(property) => f.write_str(property.as_str()),
            PropertyKey::Membership => f.write_str("Membership"),
            PropertyKey::RowLevelFilter { role } => write!(f, "RowLevelSecurity[{role}]"),
            PropertyKey::ObjectLevelPermission { role } => {
                write!(f, "ObjectLevelSecurity[{role}]")
            }
        }
    }
}

impl From<PropertyId> for PropertyKey {
    fn from(property: PropertyId) -> Self {
        PropertyKey::Property(property)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyValue {
    Text(Option<String>),
    Bool(bool),
    DataType(DataType),
    Permission(MetadataPermission),
    ModelPermission(ModelPermission),
    /// Index inside the container collection; `None` when detached.
    Membership(Option<usize>),
}

impl PropertyValue {
    pub fn text(value: impl Into<String>) -> Self {
        PropertyValue::Text(Some(value.into()))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(value) => value.as_deref(),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Text(_) => "text",
            PropertyValue::Bool(_) => "bool",
            PropertyValue::DataType(_) => "data type",
            PropertyValue::Permission(_) => "permission",
            PropertyValue::ModelPermission(_) => "model permission",
            PropertyValue::Membership(_) => "membership",
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Text(Some(value)) => f.write_str(value),
            PropertyValue::Text(None) => f.write_str("(none)"),
            PropertyValue::Bool(value) => write!(f, "{value}"),
            PropertyValue::DataType(value) => write!(f, "{value}"),
            PropertyValue::Permission(value) => write!(f, "{value:?}"),
            PropertyValue::ModelPermission(value) => write!(f, "{value:?}"),
            PropertyValue::Membership(Some(index)) => write!(f, "attached at {index}"),
            PropertyValue::Membership(None) => f.write_str("detached"),
        }
    }
}
