use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of entity kinds in the metadata graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Table,
    CalculatedTable,
    DataColumn,
    CalculatedColumn,
    /// Column produced by a calculated table's expression.
    CalculatedTableColumn,
    Measure,
    Hierarchy,
    Level,
    Partition,
    Relationship,
    Role,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Table => "Table",
            ObjectKind::CalculatedTable => "Calculated Table",
            ObjectKind::DataColumn => "Data Column",
            ObjectKind::CalculatedColumn => "Calculated Column",
            ObjectKind::CalculatedTableColumn => "Calculated Table Column",
            ObjectKind::Measure => "Measure",
            ObjectKind::Hierarchy => "Hierarchy",
            ObjectKind::Level => "Level",
            ObjectKind::Partition => "Partition",
            ObjectKind::Relationship => "Relationship",
            ObjectKind::Role => "Role",
        }
    }

    /// Base used for generated names (`New Measure`, `New Measure 1`, ...).
    pub fn default_name(&self) -> String {
        match self {
            ObjectKind::CalculatedTableColumn => "New Column".to_string(),
            other => format!("New {}", other.as_str()),
        }
    }

    pub fn is_table(&self) -> bool {
        matches!(self, ObjectKind::Table | ObjectKind::CalculatedTable)
    }

    pub fn is_column(&self) -> bool {
        matches!(
            self,
            ObjectKind::DataColumn | ObjectKind::CalculatedColumn | ObjectKind::CalculatedTableColumn
        )
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DataType {
    #[default]
    Automatic,
    String,
    Int64,
    Double,
    Decimal,
    Boolean,
    DateTime,
    Binary,
    Variant,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Automatic => "Automatic",
            DataType::String => "String",
            DataType::Int64 => "Int64",
            DataType::Double => "Double",
            DataType::Decimal => "Decimal",
            DataType::Boolean => "Boolean",
            DataType::DateTime => "DateTime",
            DataType::Binary => "Binary",
            DataType::Variant => "Variant",
        }
    }

    /// Map a source system type name to a column data type.
    ///
    /// Unknown names map to [`DataType::Automatic`].
    pub fn from_source_type(type_name: &str) -> DataType {
        match type_name.trim().to_ascii_lowercase().as_str() {
            "string" | "char" | "text" | "varchar" | "nvarchar" => DataType::String,
            "byte" | "sbyte" | "short" | "ushort" | "int" | "uint" | "long" | "ulong"
            | "integer" | "int64" | "bigint" => DataType::Int64,
            "float" | "double" | "real" => DataType::Double,
            "decimal" | "money" | "numeric" => DataType::Decimal,
            "bool" | "boolean" | "bit" => DataType::Boolean,
            "datetime" | "date" | "timestamp" => DataType::DateTime,
            "byte[]" | "binary" | "varbinary" => DataType::Binary,
            "object" | "variant" => DataType::Variant,
            _ => DataType::Automatic,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "automatic" => Ok(DataType::Automatic),
            "string" => Ok(DataType::String),
            "int64" => Ok(DataType::Int64),
            "double" => Ok(DataType::Double),
            "decimal" => Ok(DataType::Decimal),
            "boolean" => Ok(DataType::Boolean),
            "datetime" => Ok(DataType::DateTime),
            "binary" => Ok(DataType::Binary),
            "variant" => Ok(DataType::Variant),
            _ => Err(format!("Unknown data type: {s}")),
        }
    }
}

/// How a table's data is sourced, derived from its first partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PartitionSourceType {
    #[default]
    None,
    Query,
    M,
    Calculated,
}

impl PartitionSourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartitionSourceType::None => "None",
            PartitionSourceType::Query => "Query",
            PartitionSourceType::M => "M",
            PartitionSourceType::Calculated => "Calculated",
        }
    }
}

impl fmt::Display for PartitionSourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Object level permission granted to a role on a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MetadataPermission {
    #[default]
    Default,
    None,
    Read,
}

/// Model-wide permission held by a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ModelPermission {
    None,
    #[default]
    Read,
    ReadRefresh,
    Refresh,
    Administrator,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_type_names_map_to_data_types() {
        assert_eq!(DataType::from_source_type("Int"), DataType::Int64);
        assert_eq!(DataType::from_source_type("char"), DataType::String);
        assert_eq!(DataType::from_source_type("decimal"), DataType::Decimal);
        assert_eq!(DataType::from_source_type("byte[]"), DataType::Binary);
        assert_eq!(DataType::from_source_type("geography"), DataType::Automatic);
    }

    #[test]
    fn kind_default_names() {
        assert_eq!(ObjectKind::Measure.default_name(), "New Measure");
        assert_eq!(ObjectKind::CalculatedTable.default_name(), "New Calculated Table");
        assert!(ObjectKind::CalculatedColumn.is_column());
        assert!(!ObjectKind::Measure.is_table());
    }
}
