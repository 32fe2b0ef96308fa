//! Rename fix-up: rewriting dependent expressions after a rename.

use std::collections::BTreeSet;
use std::ops::Range;

use tracing::{debug, debug_span, info};

use tabular_model::names::{bracket_name, table_reference};
use tabular_model::{ObjectId, ObjectKind, PropertyId, PropertyValue, Result};

use crate::expression::{ExpressionReference, apply_edits};
use crate::mutation::Origin;
use crate::session::Session;
use crate::tree::TreeNode;

/// One expression rewritten by rename fix-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Rewrite {
    pub source: ObjectId,
    pub property: PropertyId,
    pub text: String,
}

/// What a rename changed, as seen by token matching.
struct Renamed<'a> {
    kind: ObjectKind,
    id: ObjectId,
    old: &'a str,
    new: &'a str,
    /// Owning table of a renamed column or measure.
    table: Option<(ObjectId, String)>,
}

impl Session {
    /// Entities whose expressions may spell the name of `id`.
    ///
    /// A table's name also appears as the qualifier of references to its
    /// columns and measures, so their dependents are included.
    pub(crate) fn rename_scope(&self, id: ObjectId) -> BTreeSet<ObjectId> {
        let mut scope = self.dependencies.referenced_by(id);
        if let Some(table) = self.entities.get(id.index()).and_then(|e| e.as_table()) {
            for member in table.columns.iter().chain(&table.measures) {
                scope.extend(self.dependencies.referenced_by(*member));
            }
        }
        scope
    }

    /// Expression rewrites renaming `renamed` from `old_name` to `new_name`
    /// requires. Computed before the rename commits so every rewrite can be
    /// validated up front.
    pub(crate) fn plan_fixup(
        &self,
        renamed: ObjectId,
        kind: ObjectKind,
        old_name: &str,
        new_name: &str,
    ) -> Result<Vec<Rewrite>> {
        let table = if kind.is_column() || kind == ObjectKind::Measure {
            self.live(renamed)?
                .parent
                .and_then(|table| Some((table, self.entities.get(table.index())?.name.clone())))
        } else {
            None
        };
        let target = Renamed {
            kind,
            id: renamed,
            old: old_name,
            new: new_name,
            table,
        };

        let mut rewrites = Vec::new();
        for source in self.rename_scope(renamed) {
            if !self.is_live(source) {
                continue;
            }
            let context = self.table_context(source);
            for (property, text) in self.live(source)?.expressions() {
                let edits = self.fixup_edits(text, &target, context);
                if !edits.is_empty() {
                    rewrites.push(Rewrite {
                        source,
                        property,
                        text: apply_edits(text, edits),
                    });
                }
            }
        }
        Ok(rewrites)
    }

    /// Apply planned rewrites through the property pipeline, so they land in
    /// the open undo batch. Returns the number of expressions rewritten.
    pub(crate) fn apply_fixup(
        &mut self,
        renamed: ObjectId,
        rewrites: Vec<Rewrite>,
    ) -> Result<usize> {
        let span = debug_span!("fixup", object = %renamed);
        let _guard = span.enter();

        let mut rewritten = 0;
        for Rewrite {
            source,
            property,
            text,
        } in rewrites
        {
            debug!(%source, %property, "rewriting expression");
            if self.change_property(source, property, PropertyValue::text(text), Origin::Fixup)? {
                rewritten += 1;
            }
        }
        info!(rewritten, "fixup complete");
        Ok(rewritten)
    }

    fn fixup_edits(
        &self,
        text: &str,
        target: &Renamed<'_>,
        context: Option<ObjectId>,
    ) -> Vec<(Range<usize>, String)> {
        let same = |a: &str, b: &str| a.eq_ignore_ascii_case(b);
        let mut edits = Vec::new();
        for reference in self.expressions.tokenize(text) {
            match reference {
                ExpressionReference::Table(ident)
                    if target.kind.is_table() && same(&ident.text, target.old) =>
                {
                    edits.push((ident.span, table_reference(target.new, ident.quoted)));
                }
                ExpressionReference::Object {
                    table: Some(ident), ..
                } if target.kind.is_table() && same(&ident.text, target.old) => {
                    edits.push((ident.span, table_reference(target.new, ident.quoted)));
                }
                ExpressionReference::Object { table, name }
                    if !target.kind.is_table() && same(&name.text, target.old) =>
                {
                    let Some((owner, owner_name)) = &target.table else {
                        continue;
                    };
                    let matches = match &table {
                        Some(qualifier) => same(&qualifier.text, owner_name),
                        None => {
                            target.kind == ObjectKind::Measure
                                || (context == Some(*owner)
                                    && self
                                        .find_measure(target.old)
                                        .is_none_or(|measure| measure == target.id))
                        }
                    };
                    if matches {
                        edits.push((name.span, bracket_name(target.new)));
                    }
                }
                _ => {}
            }
        }
        edits
    }

    /// Re-derive the names of relationships touching `id` (a table or column).
    pub(crate) fn refresh_relationship_names(&mut self, id: ObjectId) {
        let affected: Vec<ObjectId> = self
            .relationships
            .iter()
            .copied()
            .filter(|relationship| self.relationship_touches(*relationship, id))
            .collect();
        if affected.is_empty() {
            return;
        }
        let bracket = affected.len() > 1;
        if bracket {
            self.tree.begin_update();
        }
        for relationship in affected {
            let Some(name) = self.relationship_name(relationship) else {
                continue;
            };
            if let Some(entity) = self.entities.get_mut(relationship.index())
                && entity.name != name
            {
                debug!(%relationship, name = %name, "relationship renamed");
                entity.name = name;
                self.tree.node_changed(TreeNode::Object(relationship));
            }
        }
        if bracket {
            self.tree.end_update();
        }
    }

    pub(crate) fn relationship_touches(&self, relationship: ObjectId, id: ObjectId) -> bool {
        let Some(data) = self
            .entities
            .get(relationship.index())
            .filter(|e| !e.deleted)
            .and_then(|e| e.as_relationship())
        else {
            return false;
        };
        [data.from_column, data.to_column].into_iter().any(|column| {
            column == id
                || self
                    .entities
                    .get(column.index())
                    .is_some_and(|c| c.parent == Some(id))
        })
    }

    /// `'From'[Column] --> 'To'[Column]`
    pub(crate) fn relationship_name(&self, relationship: ObjectId) -> Option<String> {
        let data = self.entities.get(relationship.index())?.as_relationship()?;
        Some(format!(
            "{} --> {}",
            self.dax_object_full_name(data.from_column).ok()?,
            self.dax_object_full_name(data.to_column).ok()?
        ))
    }
}
