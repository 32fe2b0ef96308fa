//! Error state: own validation errors and their cascade to containers.

use tracing::{debug, trace};

use tabular_model::{ObjectId, Result};

use crate::expression::ValidationStatus;
use crate::session::Session;

impl Session {
    /// Refresh the own error of `id`. The expression service is consulted
    /// only when `expression_changed` or no earlier status is known.
    ///
    /// Returns true when the visible message or pending flag changed.
    pub(crate) fn revalidate(&mut self, id: ObjectId, expression_changed: bool) -> bool {
        let Some(entity) = self.entities.get(id.index()) else {
            return false;
        };
        if !entity.has_expressions() {
            if entity.error.own.is_none() && !entity.error.needs_validation {
                return false;
            }
            self.syntax.remove(&id);
            return self.store_own_error(id, None, false);
        }
        if expression_changed || !self.syntax.contains_key(&id) {
            let status = self.validate_expressions(id);
            self.syntax.insert(id, status);
        }
        let status = self
            .syntax
            .get(&id)
            .cloned()
            .unwrap_or(ValidationStatus::Valid);
        let own = match &status {
            ValidationStatus::Invalid(message) => Some(message.clone()),
            _ => self
                .resolve_references(id)
                .unresolved
                .first()
                .map(|reference| format!("Unresolved reference {reference}")),
        };
        self.store_own_error(id, own, status == ValidationStatus::Pending)
    }

    fn validate_expressions(&self, id: ObjectId) -> ValidationStatus {
        let Some(entity) = self.entities.get(id.index()) else {
            return ValidationStatus::Valid;
        };
        let mut pending = false;
        for (_, text) in entity.expressions() {
            if text.trim().is_empty() {
                continue;
            }
            match self.expressions.validate(text) {
                ValidationStatus::Invalid(message) => return ValidationStatus::Invalid(message),
                ValidationStatus::Pending => pending = true,
                ValidationStatus::Valid => {}
            }
        }
        if pending {
            ValidationStatus::Pending
        } else {
            ValidationStatus::Valid
        }
    }

    fn store_own_error(&mut self, id: ObjectId, own: Option<String>, pending: bool) -> bool {
        let Some(entity) = self.entities.get_mut(id.index()) else {
            return false;
        };
        let before = (entity.error.message().map(str::to_string), entity.error.needs_validation);
        entity.error.own = own;
        entity.error.needs_validation = pending;
        let after = (entity.error.message().map(str::to_string), entity.error.needs_validation);
        if before != after {
            trace!(%id, message = ?after.0, pending, "own error changed");
        }
        before != after
    }

    /// Report the outcome of a validation that was pending, then re-run the
    /// cascade from `id`.
    pub fn resolve_validation(&mut self, id: ObjectId, status: ValidationStatus) -> Result<()> {
        self.live(id)?;
        debug!(%id, ?status, "validation resolved");
        self.syntax.insert(id, status);
        self.revalidate(id, false);
        self.cascade_from(id);
        Ok(())
    }

    /// Recompute the cascaded message of a container from its children.
    ///
    /// Returns true when the container's visible message changed.
    pub fn recompute_errors(&mut self, id: ObjectId) -> bool {
        let Some(container) = self.entities.get(id.index()) else {
            return false;
        };
        if container.deleted || container.error.needs_validation {
            return false;
        }
        let cascaded = container
            .children()
            .into_iter()
            .filter_map(|child| self.entities.get(child.index()))
            .filter(|child| !child.deleted && !child.error.needs_validation)
            .find_map(|child| {
                child
                    .error
                    .message()
                    .map(|message| format!("Error on {}: {message}", child.name))
            });

        let Some(container) = self.entities.get_mut(id.index()) else {
            return false;
        };
        let before = container.error.message().map(str::to_string);
        container.error.cascaded = cascaded;
        let changed = before.as_deref() != container.error.message();
        if changed {
            debug!(%id, message = ?container.error.message(), "cascaded error changed");
        }
        changed
    }

    /// Recompute `id` if it is a container, then walk up its parents while
    /// the visible message keeps changing.
    pub(crate) fn cascade_from(&mut self, id: ObjectId) {
        let is_container = self
            .entities
            .get(id.index())
            .is_some_and(|entity| entity.as_table().is_some() || entity.as_hierarchy().is_some());
        if is_container {
            self.recompute_errors(id);
        }
        let mut current = id;
        while let Some(parent) = self.entities.get(current.index()).and_then(|e| e.parent) {
            if !self.recompute_errors(parent) {
                break;
            }
            current = parent;
        }
    }
}
