//! Object factories.
//!
//! Every factory allocates a detached entity and attaches it through the
//! membership pipeline, so creation is undo-recorded and reported to the tree
//! like any other structural change. Names that are omitted, or that clash
//! with a sibling, get a generated unique variant.

use tracing::{debug, warn};

use tabular_model::names::{unique_name, validate_name};
use tabular_model::{
    ColumnData, ColumnKind, DataType, Entity, EntityPayload, HierarchyData, LevelData,
    MeasureData, ModelError, ObjectId, ObjectKind, PartitionData, PartitionSourceType,
    PropertyId, PropertyValue, RelationshipData, Result, RoleData, SecurityOverlay, TableData,
};

use crate::mutation::Origin;
use crate::session::{Session, Transaction};

impl Session {
    /// Add a regular table with a default partition of the same name.
    pub fn add_table(&mut self, tx: &Transaction, name: Option<&str>) -> Result<ObjectId> {
        self.check_transaction(tx)?;
        let table = self.create(ObjectKind::Table, None, name, self.table_payload(false))?;
        let partition_name = self.live(table)?.name.clone();
        self.create(
            ObjectKind::Partition,
            Some(table),
            Some(&partition_name),
            EntityPayload::Partition(PartitionData {
                source_type: PartitionSourceType::Query,
                ..PartitionData::default()
            }),
        )?;
        Ok(table)
    }

    pub fn add_calculated_table(
        &mut self,
        tx: &Transaction,
        name: Option<&str>,
        expression: Option<&str>,
    ) -> Result<ObjectId> {
        self.check_transaction(tx)?;
        let table = self.create(
            ObjectKind::CalculatedTable,
            None,
            name,
            self.table_payload(true),
        )?;
        self.init_expression(table, expression)?;
        Ok(table)
    }

    pub fn add_measure(
        &mut self,
        tx: &Transaction,
        table: ObjectId,
        name: Option<&str>,
        expression: Option<&str>,
        display_folder: Option<&str>,
    ) -> Result<ObjectId> {
        self.check_transaction(tx)?;
        self.expect_table(table)?;
        let measure = self.create(
            ObjectKind::Measure,
            Some(table),
            name,
            EntityPayload::Measure(MeasureData::default()),
        )?;
        self.init_display_folder(measure, display_folder)?;
        self.init_expression(measure, expression)?;
        Ok(measure)
    }

    pub fn add_calculated_column(
        &mut self,
        tx: &Transaction,
        table: ObjectId,
        name: Option<&str>,
        expression: Option<&str>,
        display_folder: Option<&str>,
    ) -> Result<ObjectId> {
        self.check_transaction(tx)?;
        self.expect_table(table)?;
        let column = self.create(
            ObjectKind::CalculatedColumn,
            Some(table),
            name,
            column_payload(ColumnKind::Calculated, DataType::Automatic, None),
        )?;
        self.init_display_folder(column, display_folder)?;
        self.init_expression(column, expression)?;
        Ok(column)
    }

    /// Add a data column. The source column defaults to the column name.
    pub fn add_data_column(
        &mut self,
        tx: &Transaction,
        table: ObjectId,
        name: Option<&str>,
        source_column: Option<&str>,
        display_folder: Option<&str>,
    ) -> Result<ObjectId> {
        self.check_transaction(tx)?;
        let table_kind = self.expect_table(table)?.kind();
        if table_kind == ObjectKind::CalculatedTable {
            return Err(ModelError::InvalidOperation(
                "calculated tables cannot hold data columns".to_string(),
            ));
        }
        let column = self.create(
            ObjectKind::DataColumn,
            Some(table),
            name,
            column_payload(ColumnKind::Data, DataType::String, None),
        )?;
        let source = match source_column {
            Some(source) => source.to_string(),
            None => self.live(column)?.name.clone(),
        };
        self.change_property(
            column,
            PropertyId::SourceColumn,
            PropertyValue::text(source),
            Origin::Factory,
        )?;
        self.init_display_folder(column, display_folder)?;
        Ok(column)
    }

    /// Add a column produced by a calculated table's expression.
    pub fn add_calculated_table_column(
        &mut self,
        tx: &Transaction,
        table: ObjectId,
        name: &str,
        data_type: DataType,
    ) -> Result<ObjectId> {
        self.check_transaction(tx)?;
        self.expect_kind(table, "calculated table", |kind| {
            kind == ObjectKind::CalculatedTable
        })?;
        self.create(
            ObjectKind::CalculatedTableColumn,
            Some(table),
            Some(name),
            column_payload(ColumnKind::CalculatedTable, data_type, Some(name)),
        )
    }

    /// Add a hierarchy with one level per column, in order.
    pub fn add_hierarchy(
        &mut self,
        tx: &Transaction,
        table: ObjectId,
        name: Option<&str>,
        display_folder: Option<&str>,
        levels: &[ObjectId],
    ) -> Result<ObjectId> {
        self.check_transaction(tx)?;
        self.expect_table(table)?;
        for column in levels {
            self.expect_member_column(table, *column)?;
        }
        let hierarchy = self.create(
            ObjectKind::Hierarchy,
            Some(table),
            name,
            EntityPayload::Hierarchy(HierarchyData::default()),
        )?;
        self.init_display_folder(hierarchy, display_folder)?;
        for column in levels {
            self.add_level(tx, hierarchy, *column, None, None)?;
        }
        Ok(hierarchy)
    }

    /// Same as [`Session::add_hierarchy`], naming the level columns.
    pub fn add_hierarchy_by_names(
        &mut self,
        tx: &Transaction,
        table: ObjectId,
        name: Option<&str>,
        display_folder: Option<&str>,
        levels: &[&str],
    ) -> Result<ObjectId> {
        let columns = levels
            .iter()
            .map(|level| {
                self.find_column(table, level).ok_or_else(|| {
                    ModelError::NotFound(format!(
                        "column '{level}' in table '{}'",
                        self.name(table).unwrap_or_default()
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        self.add_hierarchy(tx, table, name, display_folder, &columns)
    }

    /// Add a level for `column`, at `ordinal` or at the end. The level name
    /// defaults to the column name.
    pub fn add_level(
        &mut self,
        tx: &Transaction,
        hierarchy: ObjectId,
        column: ObjectId,
        name: Option<&str>,
        ordinal: Option<usize>,
    ) -> Result<ObjectId> {
        self.check_transaction(tx)?;
        let table = self
            .expect_kind(hierarchy, "hierarchy", |kind| kind == ObjectKind::Hierarchy)?
            .parent
            .ok_or_else(|| ModelError::InvalidOperation(format!("hierarchy {hierarchy} has no table")))?;
        self.expect_member_column(table, column)?;
        let name = match name {
            Some(name) => name.to_string(),
            None => self.live(column)?.name.clone(),
        };
        self.check_governance(ObjectKind::Level)?;
        let name = self.new_name(ObjectKind::Level, Some(hierarchy), Some(&name))?;
        let level = self.allocate(
            ObjectKind::Level,
            Some(hierarchy),
            &name,
            EntityPayload::Level(LevelData { column }),
        );
        self.attach(level, ordinal)?;
        Ok(level)
    }

    /// Add a query partition.
    pub fn add_partition(
        &mut self,
        tx: &Transaction,
        table: ObjectId,
        name: Option<&str>,
        data_source: Option<&str>,
        query: Option<&str>,
    ) -> Result<ObjectId> {
        self.add_partition_of(tx, table, name, PartitionSourceType::Query, data_source, query)
    }

    /// Add a partition whose source is an M expression.
    pub fn add_m_partition(
        &mut self,
        tx: &Transaction,
        table: ObjectId,
        name: Option<&str>,
        expression: &str,
    ) -> Result<ObjectId> {
        self.add_partition_of(tx, table, name, PartitionSourceType::M, None, Some(expression))
    }

    fn add_partition_of(
        &mut self,
        tx: &Transaction,
        table: ObjectId,
        name: Option<&str>,
        source_type: PartitionSourceType,
        data_source: Option<&str>,
        query: Option<&str>,
    ) -> Result<ObjectId> {
        self.check_transaction(tx)?;
        if self.expect_table(table)?.kind() == ObjectKind::CalculatedTable {
            return Err(ModelError::InvalidOperation(
                "calculated tables have no editable partitions".to_string(),
            ));
        }
        self.create(
            ObjectKind::Partition,
            Some(table),
            name,
            EntityPayload::Partition(PartitionData {
                source_type,
                query: query.map(str::to_string),
                data_source: data_source.map(str::to_string),
            }),
        )
    }

    pub fn add_relationship(
        &mut self,
        tx: &Transaction,
        from_column: ObjectId,
        to_column: ObjectId,
    ) -> Result<ObjectId> {
        self.check_transaction(tx)?;
        for column in [from_column, to_column] {
            self.expect_kind(column, "column", |kind| kind.is_column())?;
        }
        if from_column == to_column {
            return Err(ModelError::InvalidOperation(
                "a relationship needs two distinct columns".to_string(),
            ));
        }
        self.check_governance(ObjectKind::Relationship)?;
        let id = self.allocate(
            ObjectKind::Relationship,
            None,
            "",
            EntityPayload::Relationship(RelationshipData {
                from_column,
                to_column,
                is_active: true,
            }),
        );
        if let Some(name) = self.relationship_name(id) {
            self.entity_mut(id)?.name = name;
        }
        self.attach(id, None)?;
        Ok(id)
    }

    pub fn add_role(&mut self, tx: &Transaction, name: Option<&str>) -> Result<ObjectId> {
        self.check_transaction(tx)?;
        self.create(
            ObjectKind::Role,
            None,
            name,
            EntityPayload::Role(RoleData::default()),
        )
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn create(
        &mut self,
        kind: ObjectKind,
        parent: Option<ObjectId>,
        name: Option<&str>,
        payload: EntityPayload,
    ) -> Result<ObjectId> {
        self.check_governance(kind)?;
        let name = self.new_name(kind, parent, name)?;
        let id = self.allocate(kind, parent, &name, payload);
        self.attach(id, None)?;
        Ok(id)
    }

    /// Push a detached entity into the arena.
    fn allocate(
        &mut self,
        kind: ObjectKind,
        parent: Option<ObjectId>,
        name: &str,
        payload: EntityPayload,
    ) -> ObjectId {
        let id = ObjectId::new(self.entities.len());
        let mut entity = Entity::new(id, name, parent, payload);
        entity.deleted = true;
        self.entities.push(entity);
        debug!(%id, %kind, name, "allocated");
        id
    }

    pub(crate) fn check_governance(&self, kind: ObjectKind) -> Result<()> {
        if self.options.use_governance && !self.governance.allow_create(kind) {
            warn!(%kind, "creation denied by governance");
            return Err(ModelError::CreationDenied(kind));
        }
        Ok(())
    }

    fn new_name(
        &self,
        kind: ObjectKind,
        parent: Option<ObjectId>,
        name: Option<&str>,
    ) -> Result<String> {
        let base = match name {
            Some(name) => {
                validate_name(kind, name)?;
                name.to_string()
            }
            None => kind.default_name(),
        };
        let taken: Vec<&str> = self
            .namespace(kind, parent)
            .into_iter()
            .filter_map(|id| self.entities.get(id.index()))
            .map(|entity| entity.name.as_str())
            .collect();
        Ok(unique_name(&base, taken))
    }

    fn table_payload(&self, calculated: bool) -> EntityPayload {
        EntityPayload::Table(TableData {
            calculated,
            row_level_security: SecurityOverlay::new(),
            object_level_security: self
                .options
                .supports_object_level_security()
                .then(SecurityOverlay::new),
            ..TableData::default()
        })
    }

    fn init_expression(&mut self, id: ObjectId, expression: Option<&str>) -> Result<()> {
        if let Some(expression) = expression {
            self.change_property(
                id,
                PropertyId::Expression,
                PropertyValue::text(expression),
                Origin::Factory,
            )?;
        }
        Ok(())
    }

    fn init_display_folder(&mut self, id: ObjectId, folder: Option<&str>) -> Result<()> {
        if let Some(folder) = folder {
            self.change_property(
                id,
                PropertyId::DisplayFolder,
                PropertyValue::text(folder),
                Origin::Factory,
            )?;
        }
        Ok(())
    }

    fn expect_member_column(&self, table: ObjectId, column: ObjectId) -> Result<()> {
        let entity = self.expect_kind(column, "column", |kind| kind.is_column())?;
        if entity.parent != Some(table) {
            return Err(ModelError::InvalidOperation(format!(
                "column '{}' does not belong to table '{}'",
                entity.name,
                self.name(table)?
            )));
        }
        Ok(())
    }
}

fn column_payload(kind: ColumnKind, data_type: DataType, source: Option<&str>) -> EntityPayload {
    EntityPayload::Column(ColumnData {
        kind,
        data_type,
        source_column: source.map(str::to_string),
        expression: String::new(),
    })
}
