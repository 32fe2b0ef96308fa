use std::fs;
use std::path::Path;

use tabular_core::{SchemaSource, Session, SourceColumn};
use tabular_ingest::{CsvSchemaSource, IngestError, read_csv_sample};
use tabular_model::{DataType, ModelError, PropertyId, PropertyValue, SessionOptions};
use tempfile::TempDir;

fn write(dir: &Path, name: &str, contents: &str) {
    fs::write(dir.join(name), contents).expect("write file");
}

fn orders_dir() -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    write(
        dir.path(),
        "orders.csv",
        "Order Id,Amount,Shipped,Order Date,Notes\n\
         1,10.5,true,2024-01-31,\n\
         \n\
         2,7,false,2024-02-01,fragile\n",
    );
    dir
}

#[test]
fn sample_skips_blank_rows_and_respects_limit() {
    let dir = orders_dir();
    let sample = read_csv_sample(&dir.path().join("orders.csv"), 1).expect("read sample");
    assert_eq!(
        sample.headers,
        vec!["Order Id", "Amount", "Shipped", "Order Date", "Notes"]
    );
    assert_eq!(sample.rows.len(), 1);
    assert_eq!(sample.rows[0][1], "10.5");
}

#[test]
fn describes_columns_with_inferred_types() {
    let dir = orders_dir();
    let source = CsvSchemaSource::new();
    let columns = source
        .describe(&dir.path().display().to_string(), "orders.csv")
        .expect("describe");
    assert_eq!(
        columns,
        vec![
            SourceColumn::new("Order Id", "int64"),
            SourceColumn::new("Amount", "double"),
            SourceColumn::new("Shipped", "boolean"),
            SourceColumn::new("Order Date", "datetime"),
            SourceColumn::new("Notes", "string"),
        ]
    );
}

#[test]
fn relative_data_sources_resolve_against_root() {
    let root = TempDir::new().expect("temp dir");
    let data = root.path().join("data");
    fs::create_dir(&data).expect("create dir");
    write(&data, "sales.csv", "Amount\n1\n");

    let source = CsvSchemaSource::new().with_root(root.path());
    let path = source.resolve("data", "sales.csv").expect("resolve");
    assert_eq!(path, data.join("sales.csv"));

    assert!(matches!(
        source.resolve("data", "../sales.csv"),
        Err(IngestError::InvalidQuery { .. })
    ));
    assert!(matches!(
        source.resolve("data", "missing.csv"),
        Err(IngestError::FileNotFound { .. })
    ));
    assert!(matches!(
        source.resolve("elsewhere", "sales.csv"),
        Err(IngestError::DirectoryNotFound { .. })
    ));
}

#[test]
fn empty_files_are_reported() {
    let dir = TempDir::new().expect("temp dir");
    write(dir.path(), "empty.csv", "\n\n");
    let error = read_csv_sample(&dir.path().join("empty.csv"), 10).expect_err("empty");
    assert!(matches!(error, IngestError::EmptyCsv { .. }));
}

#[test]
fn session_refresh_creates_typed_columns() {
    let dir = orders_dir();
    let mut session = Session::new(SessionOptions::default());
    let table = session
        .update("load", |s, tx| {
            let table = s.add_table(tx, Some("Orders"))?;
            s.add_data_column(tx, table, Some("Amount"), None, None)?;
            let partition = s.partitions(table)[0];
            s.set_property(
                tx,
                partition,
                PropertyId::DataSource,
                PropertyValue::text(dir.path().display().to_string()),
            )?;
            s.set_property(tx, partition, PropertyId::Query, PropertyValue::text("orders.csv"))?;
            Ok(table)
        })
        .expect("load model");

    let source = CsvSchemaSource::new();
    let added = session
        .update("refresh", |s, tx| s.refresh_data_columns(tx, table, &source))
        .expect("refresh");
    let names: Vec<&str> = added
        .iter()
        .map(|id| session.name(*id).expect("name"))
        .collect();
    assert_eq!(names, vec!["Order Id", "Shipped", "Order Date", "Notes"]);
    assert_eq!(
        session.property(added[0], PropertyId::DataType).expect("type"),
        PropertyValue::DataType(DataType::Int64)
    );

    let partition = session.partitions(table)[0];
    session
        .update("query", |s, tx| {
            s.set_property(tx, partition, PropertyId::Query, PropertyValue::text("gone.csv"))
        })
        .expect("set query");
    let error = session
        .update("refresh", |s, tx| s.refresh_data_columns(tx, table, &source))
        .expect_err("missing file");
    let ModelError::ExternalSource { message } = error else {
        panic!("unexpected error {error:?}");
    };
    assert!(message.starts_with("Unable to generate metadata from partition source query"));
}
