//! Read-only queries over the live model.

use std::collections::{BTreeMap, BTreeSet};

use tabular_model::names::{bracket_name, quote_table_name};
use tabular_model::{
    ModelError, ObjectId, ObjectKind, PartitionSourceType, PropertyId, PropertyValue, Result,
};

use crate::capability::carries;
use crate::expression::{ExpressionReference, lex};
use crate::session::Session;

impl Session {
    /// Live tables in model order.
    pub fn tables(&self) -> Vec<ObjectId> {
        self.live_only(&self.tables)
    }

    pub fn relationships(&self) -> Vec<ObjectId> {
        self.live_only(&self.relationships)
    }

    pub fn roles(&self) -> Vec<ObjectId> {
        self.live_only(&self.roles)
    }

    /// Children taking part in error cascade: columns, measures and
    /// hierarchies of a table, levels of a hierarchy.
    pub fn children(&self, id: ObjectId) -> impl Iterator<Item = ObjectId> + '_ {
        self.entities
            .get(id.index())
            .filter(|entity| !entity.deleted)
            .map(|entity| entity.children())
            .unwrap_or_default()
            .into_iter()
            .filter(|child| self.is_live(*child))
    }

    pub fn columns(&self, table: ObjectId) -> Vec<ObjectId> {
        self.table_collection(table, |data| &data.columns)
    }

    pub fn measures(&self, table: ObjectId) -> Vec<ObjectId> {
        self.table_collection(table, |data| &data.measures)
    }

    pub fn hierarchies(&self, table: ObjectId) -> Vec<ObjectId> {
        self.table_collection(table, |data| &data.hierarchies)
    }

    pub fn partitions(&self, table: ObjectId) -> Vec<ObjectId> {
        self.table_collection(table, |data| &data.partitions)
    }

    pub fn levels(&self, hierarchy: ObjectId) -> Vec<ObjectId> {
        self.entities
            .get(hierarchy.index())
            .and_then(|entity| entity.as_hierarchy())
            .map(|data| self.live_only(&data.levels))
            .unwrap_or_default()
    }

    /// Every level of every hierarchy in `table`.
    pub fn all_levels(&self, table: ObjectId) -> Vec<ObjectId> {
        self.hierarchies(table)
            .into_iter()
            .flat_map(|hierarchy| self.levels(hierarchy))
            .collect()
    }

    /// Live relationships with an end on `id`, a table or a column.
    pub fn used_in_relationships(&self, id: ObjectId) -> Vec<ObjectId> {
        self.relationships
            .iter()
            .copied()
            .filter(|relationship| self.relationship_touches(*relationship, id))
            .collect()
    }

    /// Tables at the other end of `table`'s relationships.
    pub fn related_tables(&self, table: ObjectId) -> Vec<ObjectId> {
        let mut related = BTreeSet::new();
        for relationship in self.used_in_relationships(table) {
            let Some(data) = self
                .entities
                .get(relationship.index())
                .and_then(|entity| entity.as_relationship())
            else {
                continue;
            };
            for column in [data.from_column, data.to_column] {
                if let Some(owner) = self.entities.get(column.index()).and_then(|c| c.parent)
                    && owner != table
                {
                    related.insert(owner);
                }
            }
        }
        related.into_iter().collect()
    }

    /// Source type of the table's first partition; `Calculated` for
    /// calculated tables and `None` when there are no partitions.
    pub fn source_type(&self, table: ObjectId) -> PartitionSourceType {
        match self.kind(table) {
            Ok(ObjectKind::CalculatedTable) => PartitionSourceType::Calculated,
            Ok(ObjectKind::Table) => self
                .first_partition(table)
                .and_then(|partition| self.entities.get(partition.index()))
                .and_then(|entity| entity.as_partition())
                .map(|data| data.source_type)
                .unwrap_or_default(),
            _ => PartitionSourceType::None,
        }
    }

    /// Data source name of the table's first partition.
    pub fn source(&self, table: ObjectId) -> Option<String> {
        let partition = self.first_partition(table)?;
        self.entities
            .get(partition.index())?
            .as_partition()?
            .data_source
            .clone()
    }

    pub(crate) fn first_partition(&self, table: ObjectId) -> Option<ObjectId> {
        self.partitions(table).into_iter().next()
    }

    /// Name as written in expressions without a table qualifier.
    pub fn dax_object_name(&self, id: ObjectId) -> Result<String> {
        let entity = self.entity(id)?;
        Ok(if entity.kind().is_table() {
            quote_table_name(&entity.name)
        } else {
            bracket_name(&entity.name)
        })
    }

    /// Quoted name of the table `id` is, or belongs to.
    pub fn dax_table_name(&self, id: ObjectId) -> Result<String> {
        let entity = self.entity(id)?;
        let table = match entity.kind() {
            ObjectKind::Relationship | ObjectKind::Role => {
                return Err(ModelError::InvalidOperation(format!(
                    "{} {id} does not belong to a table",
                    entity.kind()
                )));
            }
            _ => self
                .table_context(id)
                .ok_or_else(|| ModelError::InvalidOperation(format!("{id} has no table")))?,
        };
        Ok(quote_table_name(&self.entity(table)?.name))
    }

    /// Columns, measures and hierarchies of `table` keyed by display folder.
    ///
    /// Folder paths separate levels with `\`. With `recursive` a child is
    /// filed under its full path, otherwise under its top-level folder.
    /// Children outside any folder are keyed by the empty string.
    pub fn children_by_folder(
        &self,
        table: ObjectId,
        recursive: bool,
    ) -> Result<BTreeMap<String, Vec<ObjectId>>> {
        self.expect_table(table)?;
        let mut folders: BTreeMap<String, Vec<ObjectId>> = BTreeMap::new();
        for child in self.children(table) {
            let folder = self
                .entities
                .get(child.index())
                .and_then(|entity| entity.display_folder.as_deref())
                .unwrap_or_default();
            let mut segments = folder
                .split('\\')
                .map(str::trim)
                .filter(|segment| !segment.is_empty());
            let key = if recursive {
                segments.collect::<Vec<_>>().join("\\")
            } else {
                segments.next().unwrap_or_default().to_string()
            };
            folders.entry(key).or_default().push(child);
        }
        Ok(folders)
    }

    /// Fully qualified expression name: `'Sales'[Amount]`, `[Total]`, `'Sales'`.
    pub fn dax_object_full_name(&self, id: ObjectId) -> Result<String> {
        let entity = self.entity(id)?;
        let kind = entity.kind();
        let table_prefix = || -> Result<String> {
            let table = entity
                .parent
                .ok_or_else(|| ModelError::InvalidOperation(format!("{kind} {id} has no table")))?;
            Ok(quote_table_name(&self.entity(table)?.name))
        };
        Ok(match kind {
            ObjectKind::Table | ObjectKind::CalculatedTable => quote_table_name(&entity.name),
            ObjectKind::Measure => bracket_name(&entity.name),
            kind if kind.is_column() => format!("{}{}", table_prefix()?, bracket_name(&entity.name)),
            ObjectKind::Hierarchy => format!("{}{}", table_prefix()?, bracket_name(&entity.name)),
            ObjectKind::Level => {
                let hierarchy = entity.parent.ok_or_else(|| {
                    ModelError::InvalidOperation(format!("level {id} has no hierarchy"))
                })?;
                format!(
                    "{}.{}",
                    self.dax_object_full_name(hierarchy)?,
                    bracket_name(&entity.name)
                )
            }
            _ => entity.name.clone(),
        })
    }

    /// Name used in messages: the qualified expression name when there is one.
    pub fn display_name(&self, id: ObjectId) -> String {
        self.dax_object_full_name(id)
            .unwrap_or_else(|_| id.to_string())
    }

    /// Current value of any property, derived ones included.
    pub fn property(&self, id: ObjectId, property: PropertyId) -> Result<PropertyValue> {
        let entity = self.entity(id)?;
        let kind = entity.kind();
        if !carries(kind, property) {
            return Err(ModelError::InvalidOperation(format!(
                "{kind} has no {property} property"
            )));
        }
        if let Some(value) = entity.property(property) {
            return Ok(value);
        }
        let value = match property {
            PropertyId::Source => PropertyValue::Text(self.source(id)),
            PropertyId::SourceType => PropertyValue::text(self.source_type(id).as_str()),
            PropertyId::DaxIdentifier => PropertyValue::text(self.dax_object_full_name(id)?),
            PropertyId::Partitions => {
                let names: Vec<String> = self
                    .partitions(id)
                    .into_iter()
                    .filter_map(|partition| Some(self.entities.get(partition.index())?.name.clone()))
                    .collect();
                PropertyValue::text(names.join(", "))
            }
            PropertyId::RowLevelSecurity => {
                PropertyValue::text(format!("{} role(s)", self.row_level_security(id)?.len()))
            }
            PropertyId::ObjectLevelSecurity => {
                PropertyValue::text(format!("{} role(s)", self.object_level_security(id)?.len()))
            }
            _ => PropertyValue::Text(None),
        };
        Ok(value)
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    pub fn find_table(&self, name: &str) -> Option<ObjectId> {
        self.tables
            .iter()
            .copied()
            .find(|table| self.live_named(*table, name))
    }

    pub fn find_column(&self, table: ObjectId, name: &str) -> Option<ObjectId> {
        self.columns(table)
            .into_iter()
            .find(|column| self.live_named(*column, name))
    }

    /// Measures are unique model-wide, so no table is needed.
    pub fn find_measure(&self, name: &str) -> Option<ObjectId> {
        self.all_measures()
            .into_iter()
            .find(|measure| self.live_named(*measure, name))
    }

    pub fn find_hierarchy(&self, table: ObjectId, name: &str) -> Option<ObjectId> {
        self.hierarchies(table)
            .into_iter()
            .find(|hierarchy| self.live_named(*hierarchy, name))
    }

    /// Column or measure of `table` named `name`.
    pub fn find_table_member(&self, table: ObjectId, name: &str) -> Option<ObjectId> {
        self.find_column(table, name).or_else(|| {
            self.measures(table)
                .into_iter()
                .find(|measure| self.live_named(*measure, name))
        })
    }

    pub fn find_role(&self, name: &str) -> Option<ObjectId> {
        self.roles
            .iter()
            .copied()
            .find(|role| self.live_named(*role, name))
    }

    /// Resolve a path written like an expression reference: `Sales`,
    /// `'Order Lines'`, `Sales[Amount]`, `'Sales'[Geography]` or `[Total]`.
    pub fn find_object(&self, path: &str) -> Option<ObjectId> {
        let path = path.trim();
        if let Some(table) = self.find_table(path) {
            return Some(table);
        }
        let references = lex(path).references;
        match references.as_slice() {
            [ExpressionReference::Table(table)] => self.find_table(&table.text),
            [ExpressionReference::Object {
                table: Some(table),
                name,
            }] => {
                let table = self.find_table(&table.text)?;
                self.find_table_member(table, &name.text)
                    .or_else(|| self.find_hierarchy(table, &name.text))
            }
            [ExpressionReference::Object { table: None, name }] => self.find_measure(&name.text),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Dependencies
    // ------------------------------------------------------------------

    pub fn depends_on(&self, id: ObjectId) -> BTreeSet<ObjectId> {
        self.dependencies.depends_on(id)
    }

    pub fn referenced_by(&self, id: ObjectId) -> BTreeSet<ObjectId> {
        self.dependencies.referenced_by(id)
    }

    /// Every object depending on `id` through any chain of references.
    pub fn transitive_dependents(&self, id: ObjectId) -> Vec<ObjectId> {
        self.dependencies.transitive_dependents(id)
    }

    pub fn dependencies_symmetric(&self) -> bool {
        self.dependencies.is_symmetric()
    }

    fn live_named(&self, id: ObjectId, name: &str) -> bool {
        self.entities
            .get(id.index())
            .is_some_and(|entity| !entity.deleted && entity.name.eq_ignore_ascii_case(name))
    }

    fn live_only(&self, ids: &[ObjectId]) -> Vec<ObjectId> {
        ids.iter().copied().filter(|id| self.is_live(*id)).collect()
    }

    fn table_collection(
        &self,
        table: ObjectId,
        select: impl Fn(&tabular_model::TableData) -> &Vec<ObjectId>,
    ) -> Vec<ObjectId> {
        self.entities
            .get(table.index())
            .and_then(|entity| entity.as_table())
            .map(|data| self.live_only(select(data)))
            .unwrap_or_default()
    }
}
