//! Model reports rendered as terminal tables or JSON.

use std::collections::BTreeMap;

use comfy_table::modifiers::{UTF8_ROUND_CORNERS, UTF8_SOLID_INNER_BORDERS};
use comfy_table::presets::{UTF8_FULL, UTF8_FULL_CONDENSED};
use comfy_table::{
    Attribute, Cell, CellAlignment, Color, ColumnConstraint, ContentArrangement, Table, Width,
};
use serde::Serialize;

use tabular_core::Session;
use tabular_model::{ObjectId, PropertyId};

/// One object of the model with its dependency edges.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectSummary {
    pub object: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub referenced_by: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelReport {
    pub compatibility_level: u32,
    pub tables: usize,
    pub columns: usize,
    pub measures: usize,
    pub relationships: usize,
    pub roles: usize,
    pub errors: usize,
    pub objects: Vec<ObjectSummary>,
}

/// An expression rewritten by an edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpressionChange {
    pub object: String,
    pub property: String,
    pub before: String,
    pub after: String,
}

fn names(session: &Session, ids: impl IntoIterator<Item = ObjectId>) -> Vec<String> {
    ids.into_iter().map(|id| session.display_name(id)).collect()
}

/// Summary of one object. Edges are listed in creation order.
pub fn summarize_object(session: &Session, id: ObjectId) -> ObjectSummary {
    ObjectSummary {
        object: session.display_name(id),
        kind: session
            .kind(id)
            .map(|kind| kind.as_str().to_string())
            .unwrap_or_default(),
        depends_on: names(session, session.depends_on(id)),
        referenced_by: names(session, session.referenced_by(id)),
        error: session.error_message(id).map(str::to_string),
    }
}

/// Tables with their columns, measures and hierarchies, then relationships.
pub fn model_objects(session: &Session) -> Vec<ObjectId> {
    let mut ids = Vec::new();
    for table in session.tables() {
        ids.push(table);
        ids.extend(session.columns(table));
        ids.extend(session.measures(table));
        ids.extend(session.hierarchies(table));
    }
    ids.extend(session.relationships());
    ids
}

pub fn model_report(session: &Session) -> ModelReport {
    let tables = session.tables();
    let objects: Vec<ObjectSummary> = model_objects(session)
        .into_iter()
        .map(|id| summarize_object(session, id))
        .collect();
    ModelReport {
        compatibility_level: session.compatibility_level(),
        tables: tables.len(),
        columns: tables.iter().map(|table| session.columns(*table).len()).sum(),
        measures: tables.iter().map(|table| session.measures(*table).len()).sum(),
        relationships: session.relationships().len(),
        roles: session.roles().len(),
        errors: objects.iter().filter(|object| object.error.is_some()).count(),
        objects,
    }
}

/// Every expression of every live object, keyed by owner and property.
pub fn expression_snapshot(session: &Session) -> BTreeMap<(ObjectId, PropertyId), String> {
    let mut snapshot = BTreeMap::new();
    for index in 0..session.arena_len() {
        let id = ObjectId::new(index);
        let Ok(entity) = session.live(id) else {
            continue;
        };
        for (property, text) in entity.expressions() {
            snapshot.insert((id, property), text.to_string());
        }
    }
    snapshot
}

/// Expressions that differ from `before`. Objects created or deleted since
/// the snapshot are not reported.
pub fn expression_changes(
    session: &Session,
    before: &BTreeMap<(ObjectId, PropertyId), String>,
) -> Vec<ExpressionChange> {
    expression_snapshot(session)
        .into_iter()
        .filter_map(|((id, property), after)| {
            let old = before.get(&(id, property))?;
            (old != &after).then(|| ExpressionChange {
                object: session.display_name(id),
                property: property.to_string(),
                before: old.clone(),
                after,
            })
        })
        .collect()
}

pub fn objects_table(report: &ModelReport) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Object"),
        header_cell("Kind"),
        header_cell("Uses"),
        header_cell("Used by"),
        header_cell("Error"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 2, CellAlignment::Right);
    align_column(&mut table, 3, CellAlignment::Right);
    for object in &report.objects {
        table.add_row(vec![
            object_cell(object),
            dim_cell(&object.kind),
            count_cell(object.depends_on.len()),
            count_cell(object.referenced_by.len()),
            error_cell(object.error.as_deref()),
        ]);
    }
    table
}

/// Direct and transitive neighbours of one object.
pub fn dependency_table(session: &Session, id: ObjectId) -> Table {
    let mut table = Table::new();
    table.set_header(vec![header_cell("Relation"), header_cell("Object")]);
    apply_table_style(&mut table);
    let direct = session.referenced_by(id);
    let rows = session
        .depends_on(id)
        .into_iter()
        .map(|target| ("uses", target))
        .chain(direct.iter().map(|source| ("used by", *source)))
        .chain(
            session
                .transitive_dependents(id)
                .into_iter()
                .filter(|source| !direct.contains(source))
                .map(|source| ("used by (indirect)", source)),
        );
    for (relation, other) in rows {
        table.add_row(vec![dim_cell(relation), Cell::new(session.display_name(other))]);
    }
    table
}

pub fn changes_table(changes: &[ExpressionChange]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Object"),
        header_cell("Property"),
        header_cell("Before"),
        header_cell("After"),
    ]);
    apply_wide_table_style(&mut table);
    for change in changes {
        table.add_row(vec![
            Cell::new(&change.object).add_attribute(Attribute::Bold),
            dim_cell(&change.property),
            Cell::new(&change.before).fg(Color::DarkGrey),
            Cell::new(&change.after).fg(Color::Green),
        ]);
    }
    table
}

/// Objects currently in error.
pub fn errors_table(objects: &[ObjectSummary]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![header_cell("Object"), header_cell("Error")]);
    apply_wide_table_style(&mut table);
    for object in objects.iter().filter(|object| object.error.is_some()) {
        table.add_row(vec![
            Cell::new(&object.object).add_attribute(Attribute::Bold),
            error_cell(object.error.as_deref()),
        ]);
    }
    table
}

pub fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn apply_wide_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .apply_modifier(UTF8_SOLID_INNER_BORDERS)
        .set_content_arrangement(ContentArrangement::DynamicFullWidth)
        .set_width(160);
    if table.column_count() >= 4 {
        table.set_constraints(vec![
            ColumnConstraint::UpperBoundary(Width::Percentage(25)),
            ColumnConstraint::UpperBoundary(Width::Fixed(12)),
            ColumnConstraint::LowerBoundary(Width::Fixed(10)),
            ColumnConstraint::LowerBoundary(Width::Fixed(10)),
        ]);
    }
}

fn object_cell(object: &ObjectSummary) -> Cell {
    let cell = Cell::new(&object.object);
    if object.kind.ends_with("Table") {
        cell.fg(Color::Cyan).add_attribute(Attribute::Bold)
    } else {
        cell
    }
}

fn error_cell(error: Option<&str>) -> Cell {
    match error {
        Some(message) => Cell::new(message).fg(Color::Red),
        None => dim_cell("-"),
    }
}

fn count_cell(count: usize) -> Cell {
    if count == 0 {
        dim_cell("-")
    } else {
        Cell::new(count)
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}
