use std::collections::BTreeSet;

use tabular_model::ObjectKind;

/// Policy gate consulted before an object is created.
pub trait Governance {
    fn allow_create(&self, kind: ObjectKind) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Governance for AllowAll {
    fn allow_create(&self, _kind: ObjectKind) -> bool {
        true
    }
}

/// Denies a fixed set of kinds.
#[derive(Debug, Clone, Default)]
pub struct DenyKinds(pub BTreeSet<ObjectKind>);

impl Governance for DenyKinds {
    fn allow_create(&self, kind: ObjectKind) -> bool {
        !self.0.contains(&kind)
    }
}

impl<F> Governance for F
where
    F: Fn(ObjectKind) -> bool,
{
    fn allow_create(&self, kind: ObjectKind) -> bool {
        self(kind)
    }
}
