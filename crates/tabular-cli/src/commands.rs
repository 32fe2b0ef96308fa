use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use comfy_table::{Cell, Table};
use tracing::{info, info_span};

use tabular_cli::document::{ModelDocument, lookup};
use tabular_cli::report::{
    apply_table_style, changes_table, dependency_table, errors_table, expression_changes,
    expression_snapshot, model_report, objects_table, summarize_object,
};
use tabular_core::Session;
use tabular_ingest::CsvSchemaSource;
use tabular_model::PropertyId;

use crate::cli::{DeleteArgs, DepsArgs, InspectArgs, ModelArgs, RefreshArgs, RenameArgs, SaveArgs};

/// Load the document and open a session with the command line overrides.
fn open_model(args: &ModelArgs) -> Result<(ModelDocument, Session)> {
    let document = ModelDocument::load(&args.model)?;
    let mut options = document.options.clone();
    if args.no_fixup {
        options.auto_fixup = false;
    }
    if let Some(level) = args.compatibility_level {
        options.compatibility_level = level;
    }
    let session = document
        .open(options)
        .with_context(|| format!("open {}", args.model.display()))?;
    Ok((document, session))
}

/// Write the edited model when requested. Overrides given on the command
/// line apply to this run only and are not saved.
fn save_model(
    document: &ModelDocument,
    session: &Session,
    model: &ModelArgs,
    save: &SaveArgs,
) -> Result<Option<PathBuf>> {
    let target = if save.in_place {
        Some(model.model.clone())
    } else {
        save.output.clone()
    };
    let Some(path) = target else {
        return Ok(None);
    };
    let mut edited = ModelDocument::from_session(session).context("export model")?;
    edited.options = document.options.clone();
    edited.save(&path)?;
    info!(path = %path.display(), "model saved");
    println!("Saved: {}", path.display());
    Ok(Some(path))
}

fn error_count(session: &Session) -> usize {
    model_report(session).errors
}

fn print_errors(session: &Session) {
    let report = model_report(session);
    if report.errors > 0 {
        println!("{} object(s) in error:", report.errors);
        println!("{}", errors_table(&report.objects));
    }
}

/// Returns false when the model has objects in error.
pub fn run_inspect(args: &InspectArgs) -> Result<bool> {
    let (_, session) = open_model(&args.model)?;
    let report = model_report(&session);
    if args.json {
        let json = serde_json::to_string_pretty(&report).context("serialize report")?;
        println!("{json}");
    } else {
        println!(
            "Tables: {}  Columns: {}  Measures: {}  Relationships: {}  Roles: {}  Compatibility level: {}",
            report.tables,
            report.columns,
            report.measures,
            report.relationships,
            report.roles,
            report.compatibility_level
        );
        println!("{}", objects_table(&report));
    }
    Ok(report.errors == 0)
}

pub fn run_deps(args: &DepsArgs) -> Result<()> {
    let (_, session) = open_model(&args.model)?;
    let id = lookup(&session, &args.object)?;
    let summary = summarize_object(&session, id);
    println!("{} ({})", summary.object, summary.kind);
    if let Some(error) = &summary.error {
        println!("Error: {error}");
    }
    if session.depends_on(id).is_empty() && session.referenced_by(id).is_empty() {
        println!("No dependencies.");
    } else {
        println!("{}", dependency_table(&session, id));
    }
    Ok(())
}

/// Returns false when the rename left more objects in error than before.
pub fn run_rename(args: &RenameArgs) -> Result<bool> {
    let (document, mut session) = open_model(&args.model)?;
    let id = lookup(&session, &args.object)?;
    let old_name = session.display_name(id);
    let span = info_span!("rename", object = %old_name, new_name = %args.new_name);
    let _guard = span.enter();

    let before = expression_snapshot(&session);
    let errors_before = error_count(&session);
    let changed = session
        .update("rename", |s, tx| s.set_name(tx, id, &args.new_name))
        .with_context(|| format!("rename {old_name}"))?;
    if !changed {
        println!("{old_name} is unchanged.");
        return Ok(true);
    }
    println!("Renamed {old_name} to {}", session.display_name(id));

    let changes = expression_changes(&session, &before);
    if changes.is_empty() {
        println!("No expressions rewritten.");
    } else {
        println!("{} expression(s) rewritten:", changes.len());
        println!("{}", changes_table(&changes));
    }
    print_errors(&session);
    let clean = error_count(&session) <= errors_before;
    save_model(&document, &session, &args.model, &args.save)?;
    Ok(clean)
}

/// Returns false when the deletion was refused.
pub fn run_delete(args: &DeleteArgs) -> Result<bool> {
    let (document, mut session) = open_model(&args.model)?;
    let id = lookup(&session, &args.object)?;
    let name = session.display_name(id);
    let span = info_span!("delete", object = %name, force = args.force);
    let _guard = span.enter();

    if let Some(reason) = session.can_delete(id)? {
        if !args.force {
            println!("Cannot delete {name}: {reason}");
            println!("Use --force to delete anyway.");
            return Ok(false);
        }
        println!("Deleting {name} although it is {reason}");
    }
    session
        .update("delete", |s, tx| s.delete(tx, id, args.force))
        .with_context(|| format!("delete {name}"))?;
    println!("Deleted {name}");
    print_errors(&session);
    save_model(&document, &session, &args.model, &args.save)?;
    Ok(true)
}

pub fn run_refresh(args: &RefreshArgs) -> Result<()> {
    let (document, mut session) = open_model(&args.model)?;
    let table = session
        .find_table(&args.table)
        .ok_or_else(|| anyhow!("table not found: {}", args.table))?;
    let root = args
        .root
        .clone()
        .or_else(|| args.model.model.parent().map(Path::to_path_buf));
    let mut source = CsvSchemaSource::new();
    if let Some(root) = root {
        source = source.with_root(root);
    }
    let added = session
        .update("refresh columns", |s, tx| s.refresh_data_columns(tx, table, &source))
        .with_context(|| format!("refresh {}", args.table))?;
    if added.is_empty() {
        println!("{} is up to date.", args.table);
    } else {
        let mut listing = Table::new();
        listing.set_header(vec!["Column", "Data type"]);
        apply_table_style(&mut listing);
        for column in &added {
            let data_type = session
                .property(*column, PropertyId::DataType)
                .map(|value| format!("{value}"))
                .unwrap_or_default();
            listing.add_row(vec![Cell::new(session.name(*column)?), Cell::new(data_type)]);
        }
        println!("Added {} column(s) to {}:", added.len(), args.table);
        println!("{listing}");
    }
    save_model(&document, &session, &args.model, &args.save)?;
    Ok(())
}
