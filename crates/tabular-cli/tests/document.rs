use std::fs;

use tabular_cli::document::{ModelDocument, lookup};
use tabular_cli::report::{
    changes_table, expression_changes, expression_snapshot, model_report, objects_table,
};
use tabular_core::Session;
use tabular_ingest::CsvSchemaSource;
use tabular_model::{MetadataPermission, ModelError, SessionOptions};
use tempfile::TempDir;

const STAR: &str = r##"{
  "tables": [
    {
      "name": "Sales",
      "columns": [
        { "name": "Amount", "data_type": "Double" },
        { "name": "CustomerKey", "data_type": "Int64" }
      ],
      "measures": [
        { "name": "Revenue", "expression": "SUM(Sales[Amount])", "format_string": "#,0" },
        { "name": "Revenue per Customer", "expression": "DIVIDE([Revenue], COUNTROWS(Customer))" }
      ]
    },
    {
      "name": "Customer",
      "columns": [
        { "name": "Key", "data_type": "Int64" },
        { "name": "Region" }
      ],
      "hierarchies": [{ "name": "Geography", "levels": ["Region"] }],
      "partitions": [{ "name": "Customer CSV", "data_source": "data", "query": "customer.csv" }]
    }
  ],
  "relationships": [{ "from": "Sales[CustomerKey]", "to": "Customer[Key]" }]
}"##;

fn open_star() -> (ModelDocument, Session) {
    let document = ModelDocument::from_json(STAR).expect("parse model");
    let session = document.open(document.options.clone()).expect("open model");
    (document, session)
}

fn rename(session: &mut Session, path: &str, name: &str) {
    let id = lookup(session, path).expect("object");
    session
        .update("rename", |s, tx| s.set_name(tx, id, name))
        .expect("rename");
}

#[test]
fn loading_resolves_forward_references_with_empty_history() {
    let (_, session) = open_star();
    let report = model_report(&session);
    assert_eq!(
        (report.tables, report.columns, report.measures, report.relationships),
        (2, 4, 2, 1)
    );
    assert_eq!(report.errors, 0);
    assert!(!session.can_undo());

    let linked: Vec<_> = report
        .objects
        .into_iter()
        .filter(|object| !object.depends_on.is_empty() || !object.referenced_by.is_empty())
        .collect();
    insta::assert_json_snapshot!(linked, @r##"
    [
      {
        "object": "'Sales'[Amount]",
        "kind": "Data Column",
        "referenced_by": [
          "[Revenue]"
        ]
      },
      {
        "object": "[Revenue]",
        "kind": "Measure",
        "depends_on": [
          "'Sales'[Amount]"
        ],
        "referenced_by": [
          "[Revenue per Customer]"
        ]
      },
      {
        "object": "[Revenue per Customer]",
        "kind": "Measure",
        "depends_on": [
          "'Customer'",
          "[Revenue]"
        ]
      },
      {
        "object": "'Customer'",
        "kind": "Table",
        "referenced_by": [
          "[Revenue per Customer]"
        ]
      }
    ]
    "##);
}

#[test]
fn export_after_table_rename() {
    let (_, mut session) = open_star();
    rename(&mut session, "Customer", "Clients");
    let exported = ModelDocument::from_session(&session).expect("export");
    insta::assert_json_snapshot!(exported, @r##"
    {
      "options": {
        "auto_fixup": true,
        "use_governance": false,
        "compatibility_level": 1200,
        "undo_depth": 100
      },
      "tables": [
        {
          "name": "Sales",
          "columns": [
            {
              "name": "Amount",
              "data_type": "Double"
            },
            {
              "name": "CustomerKey",
              "data_type": "Int64"
            }
          ],
          "measures": [
            {
              "name": "Revenue",
              "expression": "SUM(Sales[Amount])",
              "format_string": "#,0"
            },
            {
              "name": "Revenue per Customer",
              "expression": "DIVIDE([Revenue], COUNTROWS(Clients))"
            }
          ],
          "partitions": [
            {
              "name": "Sales"
            }
          ]
        },
        {
          "name": "Clients",
          "columns": [
            {
              "name": "Key",
              "data_type": "Int64"
            },
            {
              "name": "Region",
              "data_type": "String"
            }
          ],
          "hierarchies": [
            {
              "name": "Geography",
              "levels": [
                "Region"
              ]
            }
          ],
          "partitions": [
            {
              "name": "Customer CSV",
              "data_source": "data",
              "query": "customer.csv"
            }
          ]
        }
      ],
      "relationships": [
        {
          "from": "'Sales'[CustomerKey]",
          "to": "'Clients'[Key]"
        }
      ]
    }
    "##);
}

#[test]
fn column_rename_reports_rewritten_expressions() {
    let (_, mut session) = open_star();
    let before = expression_snapshot(&session);
    rename(&mut session, "Sales[Amount]", "Net Amount");

    let changes = expression_changes(&session, &before);
    insta::assert_json_snapshot!(changes, @r##"
    [
      {
        "object": "[Revenue]",
        "property": "Expression",
        "before": "SUM(Sales[Amount])",
        "after": "SUM(Sales[Net Amount])"
      }
    ]
    "##);

    let rendered = changes_table(&changes).to_string();
    assert!(rendered.contains("SUM(Sales[Net Amount])"));
    assert!(rendered.contains("Before"));
}

#[test]
fn rename_without_fixup_leaves_errors_in_report() {
    let document = ModelDocument::from_json(STAR).expect("parse model");
    let mut session = document
        .open(SessionOptions::default().with_auto_fixup(false))
        .expect("open model");
    rename(&mut session, "[Revenue]", "Income");

    let report = model_report(&session);
    let broken: Vec<(&str, &str)> = report
        .objects
        .iter()
        .filter_map(|object| Some((object.object.as_str(), object.error.as_deref()?)))
        .collect();
    assert_eq!(
        broken,
        vec![
            (
                "'Sales'",
                "Error on Revenue per Customer: Unresolved reference [Revenue]"
            ),
            ("[Revenue per Customer]", "Unresolved reference [Revenue]"),
        ]
    );
    assert_eq!(report.errors, 2);

    let rendered = objects_table(&report).to_string();
    assert!(rendered.contains("[Revenue per Customer]"));
    assert!(rendered.contains("Unresolved reference [Revenue]"));
}

#[test]
fn unknown_paths_are_reported() {
    let (_, session) = open_star();
    assert_eq!(
        lookup(&session, "'Sales'[Missing]"),
        Err(ModelError::NotFound("'Sales'[Missing]".to_string()))
    );
}

#[test]
fn broken_relationship_fails_the_load() {
    let text = STAR.replace("Customer[Key]", "Customer[Missing]");
    let document = ModelDocument::from_json(&text).expect("parse model");
    let error = document
        .open(document.options.clone())
        .expect_err("missing column");
    assert_eq!(
        format!("{error:#}"),
        "build model: object not found: Customer[Missing]"
    );
}

#[test]
fn refreshed_model_survives_save_and_load() {
    let dir = TempDir::new().expect("temp dir");
    let data = dir.path().join("data");
    fs::create_dir(&data).expect("create dir");
    fs::write(
        data.join("customer.csv"),
        "Key,Region,Segment\n1,North,Retail\n2,South,Wholesale\n",
    )
    .expect("write csv");

    let (_, mut session) = open_star();
    let customer = session.find_table("Customer").expect("table");
    let source = CsvSchemaSource::new().with_root(dir.path());
    let added = session
        .update("refresh", |s, tx| s.refresh_data_columns(tx, customer, &source))
        .expect("refresh");
    assert_eq!(added.len(), 1);
    assert_eq!(session.name(added[0]).expect("name"), "Segment");

    let exported = ModelDocument::from_session(&session).expect("export");
    let path = dir.path().join("model.json");
    exported.save(&path).expect("save");
    let reloaded = ModelDocument::load(&path).expect("load");
    assert_eq!(reloaded, exported);

    let session = reloaded.open(reloaded.options.clone()).expect("reopen");
    let customer = session.find_table("Customer").expect("table");
    assert_eq!(session.columns(customer).len(), 3);
}

#[test]
fn roles_keep_security_entries() {
    let text = r#"{
      "options": { "compatibility_level": 1400 },
      "tables": [{ "name": "Sales" }, { "name": "Customer" }],
      "roles": [
        {
          "name": "Readers",
          "row_filters": { "Sales": "[Amount] > 0" },
          "object_permissions": { "Customer": "None" }
        }
      ]
    }"#;
    let document = ModelDocument::from_json(text).expect("parse model");
    let session = document.open(document.options.clone()).expect("open model");

    let exported = ModelDocument::from_session(&session).expect("export");
    assert_eq!(exported.roles, document.roles);
    assert_eq!(
        exported.roles[0].object_permissions.get("Customer"),
        Some(&MetadataPermission::None)
    );

    let error = document
        .open(SessionOptions::default())
        .expect_err("object level security needs 1400");
    assert!(format!("{error:#}").contains("1400"));
}
