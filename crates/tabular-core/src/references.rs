//! Resolution of expression references against the live model, feeding the
//! dependency index.

use std::collections::BTreeSet;

use tracing::{debug, trace};

use tabular_model::{ObjectId, ObjectKind};

use crate::dependency::EdgeDelta;
use crate::expression::ExpressionReference;
use crate::session::Session;

/// Outcome of resolving every reference in one entity's expressions.
#[derive(Debug, Default)]
pub(crate) struct Resolved {
    pub targets: BTreeSet<ObjectId>,
    /// References that did not name a live object, as written.
    pub unresolved: Vec<String>,
}

impl Session {
    /// Re-scan one entity's expressions and apply the edge delta.
    pub fn rebuild(&mut self, id: ObjectId) -> EdgeDelta {
        if !self.is_live(id) {
            self.dependencies.remove_entity(id);
            return EdgeDelta::default();
        }
        let resolved = self.resolve_references(id);
        let delta = self.dependencies.set_outgoing(id, &resolved.targets);
        if !delta.is_empty() {
            trace!(%id, added = delta.added.len(), removed = delta.removed.len(), "edges updated");
        }
        delta
    }

    /// Rebuild every entity's edges and refresh reference errors.
    pub fn rebuild_all(&mut self) {
        for index in 0..self.entities.len() {
            self.rebuild(ObjectId::new(index));
        }
        for index in 0..self.entities.len() {
            let id = ObjectId::new(index);
            if self.is_live(id) && self.revalidate(id, false) {
                self.cascade_from(id);
            }
        }
        debug!(edges = self.dependencies.edge_count(), "dependency graph rebuilt");
    }

    pub(crate) fn resolve_references(&self, id: ObjectId) -> Resolved {
        let mut resolved = Resolved::default();
        let Some(entity) = self.entities.get(id.index()) else {
            return resolved;
        };
        let context = self.table_context(id);
        for (_, text) in entity.expressions() {
            for reference in self.expressions.tokenize(text) {
                match self.resolve(&reference, context) {
                    Some(target) if target != id => {
                        resolved.targets.insert(target);
                    }
                    Some(_) => {}
                    None if is_reportable(&reference) => {
                        resolved.unresolved.push(reference.display());
                    }
                    None => {}
                }
            }
        }
        resolved
    }

    /// Resolve one reference written inside an expression owned by `context`.
    pub(crate) fn resolve(
        &self,
        reference: &ExpressionReference,
        context: Option<ObjectId>,
    ) -> Option<ObjectId> {
        match reference {
            ExpressionReference::Table(ident) => self.find_table(&ident.text),
            ExpressionReference::Object {
                table: Some(table),
                name,
            } => {
                let table = self.find_table(&table.text)?;
                self.find_table_member(table, &name.text)
            }
            ExpressionReference::Object { table: None, name } => self
                .find_measure(&name.text)
                .or_else(|| context.and_then(|table| self.find_column(table, &name.text))),
        }
    }

    /// Table whose columns unqualified references in `id` resolve against.
    pub(crate) fn table_context(&self, id: ObjectId) -> Option<ObjectId> {
        let entity = self.entities.get(id.index())?;
        match entity.kind() {
            ObjectKind::Table | ObjectKind::CalculatedTable => Some(id),
            ObjectKind::Level => entity
                .parent
                .and_then(|hierarchy| self.entities.get(hierarchy.index()))
                .and_then(|hierarchy| hierarchy.parent),
            ObjectKind::Relationship | ObjectKind::Role => None,
            _ => entity.parent,
        }
    }
}

/// Bare words that do not resolve to a table are usually functions or
/// variables, so only delimited references are reported.
fn is_reportable(reference: &ExpressionReference) -> bool {
    match reference {
        ExpressionReference::Table(ident) => ident.quoted,
        ExpressionReference::Object { .. } => true,
    }
}
