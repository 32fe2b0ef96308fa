use thiserror::Error;

use crate::enums::ObjectKind;
use crate::ids::ObjectId;
use crate::property::PropertyId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("invalid {kind} name '{name}': {reason}")]
    InvalidName {
        kind: ObjectKind,
        name: String,
        reason: String,
    },

    #[error("a {kind} named '{name}' already exists")]
    DuplicateName { kind: ObjectKind, name: String },

    #[error("cannot delete '{name}': {message}")]
    ReferencedBy { name: String, message: String },

    #[error("{feature} requires compatibility level {required} or higher (model is at {actual})")]
    Compatibility {
        feature: &'static str,
        required: u32,
        actual: u32,
    },

    #[error("{message}")]
    ExternalSource { message: String },

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("unknown object {0}")]
    UnknownObject(ObjectId),

    #[error("object {0} has been deleted")]
    Deleted(ObjectId),

    #[error("expected {expected}, found {actual} ({id})")]
    WrongKind {
        id: ObjectId,
        expected: &'static str,
        actual: ObjectKind,
    },

    #[error("property {property} is not editable on {kind}")]
    ReadOnly { property: PropertyId, kind: ObjectKind },

    #[error("invalid value for {property}: {message}")]
    InvalidValue { property: PropertyId, message: String },

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("creating a {0} is not allowed by the governance policy")]
    CreationDenied(ObjectKind),

    #[error("{0}")]
    InvalidOperation(String),
}

impl ModelError {
    /// Errors that reject a mutation before any state changes.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ModelError::InvalidName { .. }
                | ModelError::DuplicateName { .. }
                | ModelError::InvalidValue { .. }
                | ModelError::ReadOnly { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ModelError>;
