//! Creating data columns from a partition's source schema.

use tracing::{info, warn};

use tabular_model::names::validate_name;
use tabular_model::{
    DataType, ModelError, ObjectId, ObjectKind, PropertyId, PropertyValue, Result,
};

use crate::mutation::Origin;
use crate::session::{Session, Transaction};

/// Column reported by a schema source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceColumn {
    pub name: String,
    /// Source system type name, mapped with [`DataType::from_source_type`].
    pub type_name: String,
}

impl SourceColumn {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

pub type SchemaError = Box<dyn std::error::Error + Send + Sync>;

/// Describes the columns a query produces without reading its rows.
pub trait SchemaSource {
    fn describe(
        &self,
        data_source: &str,
        query: &str,
    ) -> std::result::Result<Vec<SourceColumn>, SchemaError>;
}

impl Session {
    /// Add a data column for every source column of the table's first
    /// partition that the table does not have yet.
    ///
    /// The source is described before anything is added, so a failing
    /// source leaves the model unchanged. Returns the new columns.
    pub fn refresh_data_columns(
        &mut self,
        tx: &Transaction,
        table: ObjectId,
        source: &dyn SchemaSource,
    ) -> Result<Vec<ObjectId>> {
        self.check_transaction(tx)?;
        self.expect_table(table)?;
        let (data_source, query) = self
            .first_partition(table)
            .and_then(|partition| self.entities.get(partition.index()))
            .and_then(|entity| entity.as_partition())
            .and_then(|data| Some((data.data_source.clone()?, data.query.clone()?)))
            .filter(|(_, query)| !query.trim().is_empty())
            .ok_or_else(|| {
                ModelError::InvalidOperation(
                    "the first partition on this table must have a data source and a query"
                        .to_string(),
                )
            })?;

        let columns = source.describe(&data_source, &query).map_err(|error| {
            warn!(%table, data_source = %data_source, %error, "schema describe failed");
            ModelError::ExternalSource {
                message: format!(
                    "Unable to generate metadata from partition source query: {error}"
                ),
            }
        })?;

        for column in &columns {
            validate_name(ObjectKind::DataColumn, &column.name)?;
        }

        let mut added = Vec::new();
        for column in columns {
            if self.find_table_member(table, &column.name).is_some() {
                continue;
            }
            let id = self.add_data_column(tx, table, Some(&column.name), Some(&column.name), None)?;
            self.change_property(
                id,
                PropertyId::DataType,
                PropertyValue::DataType(DataType::from_source_type(&column.type_name)),
                Origin::Factory,
            )?;
            added.push(id);
        }
        info!(%table, added = added.len(), "data columns refreshed");
        Ok(added)
    }
}
