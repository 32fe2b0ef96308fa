#![deny(unsafe_code)]

use std::fmt;

/// Stable arena index of an entity within one loaded model.
///
/// Ids are never reused: deleting an entity only detaches it from its
/// container, so undo can attach it again under the same id.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct ObjectId(u32);

impl ObjectId {
    pub fn new(index: usize) -> Self {
        Self(u32::try_from(index).unwrap_or(u32::MAX))
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<ObjectId> for usize {
    fn from(id: ObjectId) -> Self {
        id.index()
    }
}
