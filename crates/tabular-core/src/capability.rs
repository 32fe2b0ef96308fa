//! Which properties an entity exposes and which of those can be edited.
//!
//! A static table says which properties a kind carries at all; the session
//! then narrows it by compatibility level, the role set and the table's
//! partition source. Neither query ever fails: unknown or deleted ids simply
//! expose nothing.

use tabular_model::{
    OBJECT_LEVEL_SECURITY_LEVEL, ObjectId, ObjectKind, PartitionSourceType, PropertyId,
};

use crate::session::Session;

use tabular_model::ObjectKind as K;
use tabular_model::PropertyId as P;

/// Properties carried by `kind`, before any dynamic rule applies.
pub fn carries(kind: ObjectKind, property: PropertyId) -> bool {
    match property {
        P::Name | P::Description | P::ErrorMessage => true,
        P::IsHidden | P::DaxIdentifier => !matches!(kind, K::Partition | K::Relationship | K::Role),
        P::DisplayFolder => kind.is_column() || matches!(kind, K::Measure | K::Hierarchy),
        P::Expression => matches!(kind, K::CalculatedTable | K::CalculatedColumn | K::Measure),
        P::DataType => kind.is_column(),
        P::SourceColumn => matches!(kind, K::DataColumn | K::CalculatedTableColumn),
        P::FormatString => kind == K::Measure,
        P::Query | P::DataSource => kind == K::Partition,
        P::IsActive => kind == K::Relationship,
        P::ModelPermission => kind == K::Role,
        P::DefaultDetailRowsExpression
        | P::ShowAsVariationsOnly
        | P::IsPrivate
        | P::Partitions
        | P::Source
        | P::SourceType
        | P::RowLevelSecurity
        | P::ObjectLevelSecurity => kind.is_table(),
    }
}

impl Session {
    /// Whether `property` is shown for `id`.
    pub fn browsable(&self, id: ObjectId, property: PropertyId) -> bool {
        let Ok(entity) = self.live(id) else {
            return false;
        };
        let kind = entity.kind();
        if !carries(kind, property) {
            return false;
        }
        let level = self.options.compatibility_level;
        let has_roles = self.roles.iter().any(|role| self.is_live(*role));
        match property {
            P::Source | P::Partitions => {
                kind == K::Table
                    && matches!(
                        self.source_type(id),
                        PartitionSourceType::Query | PartitionSourceType::M
                    )
            }
            P::DefaultDetailRowsExpression | P::ShowAsVariationsOnly | P::IsPrivate => {
                level >= OBJECT_LEVEL_SECURITY_LEVEL
            }
            P::ObjectLevelSecurity => level >= OBJECT_LEVEL_SECURITY_LEVEL && has_roles,
            P::RowLevelSecurity => has_roles,
            _ => true,
        }
    }

    /// Whether `property` can be changed through `set_property` on `id`.
    ///
    /// Security overlays and partitions are browsable but edited through
    /// their own operations.
    pub fn editable(&self, id: ObjectId, property: PropertyId) -> bool {
        if !self.browsable(id, property) {
            return false;
        }
        let Ok(kind) = self.kind(id) else {
            return false;
        };
        match property {
            P::Name => !matches!(kind, K::CalculatedTableColumn | K::Relationship),
            P::DataType => matches!(kind, K::DataColumn | K::CalculatedColumn),
            P::SourceColumn => kind == K::DataColumn,
            P::ErrorMessage
            | P::DaxIdentifier
            | P::Source
            | P::SourceType
            | P::Partitions
            | P::RowLevelSecurity
            | P::ObjectLevelSecurity => false,
            _ => true,
        }
    }

    /// Properties shown on the partition group node of `table`.
    pub fn partition_group_browsable(&self, table: ObjectId, property: PropertyId) -> bool {
        let Ok(kind) = self.kind(table) else {
            return false;
        };
        match property {
            P::Partitions => kind == K::Table && self.is_live(table),
            P::Name => self.is_live(table),
            _ => false,
        }
    }

    /// Only the name is editable on a partition group node; it renames the table.
    pub fn partition_group_editable(&self, table: ObjectId, property: PropertyId) -> bool {
        property == P::Name && self.editable(table, P::Name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_table_matches_kinds() {
        assert!(carries(K::Measure, P::FormatString));
        assert!(!carries(K::DataColumn, P::Expression));
        assert!(carries(K::CalculatedColumn, P::Expression));
        assert!(!carries(K::Partition, P::IsHidden));
        assert!(carries(K::CalculatedTable, P::Partitions));
        assert!(!carries(K::Measure, P::RowLevelSecurity));
    }
}
