pub mod entity;
pub mod enums;
pub mod error;
pub mod ids;
pub mod names;
pub mod options;
pub mod property;
pub mod security;

pub use entity::{
    ColumnData, ColumnKind, Entity, EntityPayload, ErrorState, HierarchyData, LevelData,
    MeasureData, PartitionData, RelationshipData, RoleData, TableData,
};
pub use enums::{DataType, MetadataPermission, ModelPermission, ObjectKind, PartitionSourceType};
pub use error::{ModelError, Result};
pub use ids::ObjectId;
pub use options::{
    DEFAULT_COMPATIBILITY_LEVEL, DEFAULT_UNDO_DEPTH, OBJECT_LEVEL_SECURITY_LEVEL, SessionOptions,
};
pub use property::{PropertyId, PropertyKey, PropertyValue};
pub use security::SecurityOverlay;
