use std::collections::BTreeSet;

use tabular_core::{DenyKinds, RecordingTree, Session, TreeNode, TreeNotification};
use tabular_model::{
    MetadataPermission, ModelError, ObjectId, ObjectKind, PartitionSourceType, PropertyId,
    PropertyValue, SessionOptions,
};

struct StarModel {
    session: Session,
    tree: RecordingTree,
    sales: ObjectId,
    customer: ObjectId,
    customer_key: ObjectId,
    key: ObjectId,
}

fn star_model(options: SessionOptions) -> StarModel {
    let tree = RecordingTree::new();
    let mut session = Session::new(options).with_view_tree(Box::new(tree.clone()));
    let (sales, customer, customer_key, key) = session
        .update("load", |s, tx| {
            let sales = s.add_table(tx, Some("Sales"))?;
            let customer_key = s.add_data_column(tx, sales, Some("CustomerKey"), None, None)?;
            let customer = s.add_table(tx, Some("Customer"))?;
            let key = s.add_data_column(tx, customer, Some("Key"), None, None)?;
            s.add_relationship(tx, customer_key, key)?;
            Ok((sales, customer, customer_key, key))
        })
        .expect("load model");
    tree.clear();
    StarModel {
        session,
        tree,
        sales,
        customer,
        customer_key,
        key,
    }
}

fn single_relationship(session: &Session) -> ObjectId {
    let relationships = session.relationships();
    assert_eq!(relationships.len(), 1);
    relationships[0]
}

#[test]
fn table_creation_flushes_one_batch() {
    let StarModel {
        mut session, tree, ..
    } = star_model(SessionOptions::default());
    let orders = session
        .update("add table", |s, tx| s.add_table(tx, Some("Orders")))
        .expect("add table");
    let partition = session.partitions(orders)[0];

    assert_eq!(tree.batch_count(), 1);
    assert_eq!(
        tree.last_batch().expect("batch"),
        vec![
            TreeNotification::Inserted {
                parent: TreeNode::Model,
                children: vec![orders],
            },
            TreeNotification::Inserted {
                parent: TreeNode::PartitionGroup(orders),
                children: vec![partition],
            },
        ]
    );
    assert_eq!(session.name(partition).expect("name"), "Orders");
    assert_eq!(session.source_type(orders), PartitionSourceType::Query);
}

#[test]
fn add_then_delete_in_one_update_is_invisible_to_the_tree() {
    let StarModel {
        mut session,
        tree,
        sales,
        ..
    } = star_model(SessionOptions::default());
    session
        .update("scratch", |s, tx| {
            let measure = s.add_measure(tx, sales, Some("Scratch"), Some("1"), None)?;
            s.delete(tx, measure, false)
        })
        .expect("scratch");
    assert_eq!(tree.batch_count(), 0);
    assert!(session.measures(sales).is_empty());
}

#[test]
fn undo_is_reported_as_one_batch() {
    let StarModel {
        mut session,
        tree,
        sales,
        ..
    } = star_model(SessionOptions::default());
    let measure = session
        .update("add", |s, tx| s.add_measure(tx, sales, Some("Total"), None, None))
        .expect("add measure");
    tree.clear();

    session.undo().expect("undo");
    assert_eq!(
        tree.batches(),
        vec![vec![TreeNotification::Removed {
            parent: TreeNode::Object(sales),
            children: vec![measure],
        }]]
    );
}

#[test]
fn relationship_names_follow_table_renames() {
    let StarModel {
        mut session,
        tree,
        customer,
        ..
    } = star_model(SessionOptions::default());
    let relationship = single_relationship(&session);
    assert_eq!(
        session.name(relationship).expect("name"),
        "'Sales'[CustomerKey] --> 'Customer'[Key]"
    );

    session
        .update("rename", |s, tx| s.set_name(tx, customer, "Client"))
        .expect("rename");
    assert_eq!(
        session.name(relationship).expect("name"),
        "'Sales'[CustomerKey] --> 'Client'[Key]"
    );
    let batch = tree.last_batch().expect("batch");
    assert!(batch.contains(&TreeNotification::Changed {
        node: TreeNode::Object(relationship)
    }));
    assert!(batch.contains(&TreeNotification::Changed {
        node: TreeNode::Object(customer)
    }));

    session.undo().expect("undo");
    assert_eq!(
        session.name(relationship).expect("name"),
        "'Sales'[CustomerKey] --> 'Customer'[Key]"
    );
}

#[test]
fn relationship_names_are_read_only() {
    let StarModel { mut session, .. } = star_model(SessionOptions::default());
    let relationship = single_relationship(&session);
    let error = session
        .update("rename", |s, tx| s.set_name(tx, relationship, "Custom"))
        .expect_err("read only");
    assert!(matches!(error, ModelError::ReadOnly { .. }));
}

#[test]
fn columns_in_relationships_need_force_to_delete() {
    let StarModel {
        mut session,
        sales,
        customer,
        customer_key,
        key,
        ..
    } = star_model(SessionOptions::default());
    assert_eq!(session.related_tables(sales), vec![customer]);
    assert_eq!(session.used_in_relationships(key).len(), 1);
    assert_eq!(
        session.can_delete(key).expect("can delete").as_deref(),
        Some("used in 1 relationship(s)")
    );

    session
        .update("delete", |s, tx| s.delete(tx, key, true))
        .expect("forced delete");
    assert!(session.relationships().is_empty());
    assert!(session.related_tables(sales).is_empty());

    session.undo().expect("undo");
    assert_eq!(session.relationships().len(), 1);
    assert_eq!(session.used_in_relationships(customer_key).len(), 1);
}

#[test]
fn relationships_need_two_distinct_columns() {
    let StarModel {
        mut session, key, ..
    } = star_model(SessionOptions::default());
    let error = session
        .update("relate", |s, tx| s.add_relationship(tx, key, key))
        .expect_err("same column");
    assert!(matches!(error, ModelError::InvalidOperation(_)));
}

#[test]
fn hierarchy_levels_block_column_delete() {
    let StarModel {
        mut session,
        customer,
        key,
        ..
    } = star_model(SessionOptions::default());
    let (hierarchy, region) = session
        .update("hierarchy", |s, tx| {
            let region = s.add_data_column(tx, customer, Some("Region"), None, None)?;
            let hierarchy = s.add_hierarchy_by_names(
                tx,
                customer,
                Some("Geography"),
                None,
                &["Region", "Key"],
            )?;
            Ok((hierarchy, region))
        })
        .expect("add hierarchy");
    let levels = session.levels(hierarchy);
    assert_eq!(levels.len(), 2);
    assert_eq!(session.name(levels[0]).expect("name"), "Region");
    assert_eq!(
        session.dax_object_full_name(levels[0]).expect("full name"),
        "'Customer'[Geography].[Region]"
    );

    let message = session
        .can_delete(region)
        .expect("can delete")
        .expect("blocked");
    assert_eq!(message, "used as a level in hierarchy Geography");

    session
        .update("delete", |s, tx| s.delete(tx, region, true))
        .expect("forced delete");
    assert_eq!(session.levels(hierarchy).len(), 1);

    let error = session
        .update("hierarchy", |s, tx| {
            s.add_hierarchy_by_names(tx, customer, None, None, &["Missing"])
        })
        .expect_err("missing column");
    assert!(matches!(error, ModelError::NotFound(_)));
    assert_eq!(session.find_object("'Customer'[Key]"), Some(key));
}

#[test]
fn level_ordinal_inserts_in_place() {
    let StarModel {
        mut session,
        customer,
        key,
        ..
    } = star_model(SessionOptions::default());
    let (hierarchy, top) = session
        .update("hierarchy", |s, tx| {
            let hierarchy = s.add_hierarchy(tx, customer, None, None, &[key])?;
            let top = s.add_level(tx, hierarchy, key, Some("All Keys"), Some(0))?;
            Ok((hierarchy, top))
        })
        .expect("hierarchy");
    assert_eq!(session.name(hierarchy).expect("name"), "New Hierarchy");
    assert_eq!(session.levels(hierarchy)[0], top);
}

#[test]
fn partitions_report_under_their_group() {
    let StarModel {
        mut session,
        tree,
        sales,
        ..
    } = star_model(SessionOptions::default());
    let partition = session
        .update("partition", |s, tx| {
            s.add_m_partition(tx, sales, Some("Recent"), "let Source = 1 in Source")
        })
        .expect("add partition");
    assert_eq!(
        tree.last_batch().expect("batch"),
        vec![TreeNotification::Inserted {
            parent: TreeNode::PartitionGroup(sales),
            children: vec![partition],
        }]
    );
    assert_eq!(
        session
            .property(sales, PropertyId::Partitions)
            .expect("partitions"),
        PropertyValue::text("Sales, Recent")
    );
    assert!(session.partition_group_browsable(sales, PropertyId::Partitions));
    assert!(session.partition_group_editable(sales, PropertyId::Name));
    assert!(!session.partition_group_editable(sales, PropertyId::Partitions));
}

#[test]
fn calculated_tables_hide_source_properties() {
    let StarModel { mut session, .. } = star_model(SessionOptions::default());
    let dates = session
        .update("calc", |s, tx| {
            let dates = s.add_calculated_table(tx, Some("Dates"), Some("CALENDARAUTO()"))?;
            s.add_calculated_table_column(tx, dates, "Date", tabular_model::DataType::DateTime)?;
            Ok(dates)
        })
        .expect("calculated table");
    let column = session.columns(dates)[0];

    assert_eq!(session.source_type(dates), PartitionSourceType::Calculated);
    assert!(!session.browsable(dates, PropertyId::Source));
    assert!(!session.browsable(dates, PropertyId::Partitions));
    assert!(!session.partition_group_browsable(dates, PropertyId::Partitions));
    assert!(session.browsable(column, PropertyId::Name));
    assert!(!session.editable(column, PropertyId::Name));
    assert!(!session.editable(column, PropertyId::DataType));

    let error = session
        .update("data column", |s, tx| s.add_data_column(tx, dates, None, None, None))
        .expect_err("no data columns on calculated tables");
    assert!(matches!(error, ModelError::InvalidOperation(_)));
}

#[test]
fn capability_rules_follow_compatibility_and_roles() {
    let StarModel {
        mut session, sales, ..
    } = star_model(SessionOptions::default());
    assert!(!session.browsable(sales, PropertyId::DefaultDetailRowsExpression));
    assert!(!session.browsable(sales, PropertyId::RowLevelSecurity));
    assert!(session.browsable(sales, PropertyId::Source));
    assert!(!session.editable(sales, PropertyId::SourceType));

    let error = session
        .update("detail rows", |s, tx| {
            s.set_default_detail_rows_expression(tx, sales, Some("Sales"))
        })
        .expect_err("compatibility");
    assert!(matches!(
        error,
        ModelError::Compatibility { required: 1400, .. }
    ));

    session.set_compatibility_level(1400);
    session
        .update("role", |s, tx| s.add_role(tx, Some("Readers")))
        .expect("role");
    assert!(session.browsable(sales, PropertyId::DefaultDetailRowsExpression));
    assert!(session.browsable(sales, PropertyId::ObjectLevelSecurity));
    assert!(session.browsable(sales, PropertyId::RowLevelSecurity));
    assert!(
        session
            .update("detail rows", |s, tx| {
                s.set_default_detail_rows_expression(tx, sales, Some("Sales"))
            })
            .expect("detail rows")
    );
}

#[test]
fn object_level_security_requires_compatibility() {
    let StarModel {
        mut session, sales, ..
    } = star_model(SessionOptions::default());
    let role = session
        .update("role", |s, tx| s.add_role(tx, Some("Readers")))
        .expect("role");
    assert!(matches!(
        session.object_level_security(sales),
        Err(ModelError::Compatibility { .. })
    ));
    assert!(session.object_permission(sales, role).is_err());

    session.set_compatibility_level(1400);
    assert!(session.object_level_security(sales).expect("overlay").is_empty());
    session
        .update("ols", |s, tx| {
            s.set_object_permission(tx, sales, role, MetadataPermission::None)
        })
        .expect("set permission");
    assert_eq!(
        session.object_permission(sales, role).expect("permission"),
        MetadataPermission::None
    );
    assert_eq!(
        session
            .property(sales, PropertyId::ObjectLevelSecurity)
            .expect("ols"),
        PropertyValue::text("1 role(s)")
    );
}

#[test]
fn row_filters_are_undoable_and_cleared_with_the_table() {
    let StarModel {
        mut session,
        tree,
        sales,
        customer,
        ..
    } = star_model(SessionOptions::default().with_compatibility_level(1400));
    let role = session
        .update("role", |s, tx| s.add_role(tx, Some("Readers")))
        .expect("role");
    session
        .update("rls", |s, tx| {
            s.set_row_filter(tx, customer, role, Some("[Key] > 10"))?;
            s.set_object_permission(tx, customer, role, MetadataPermission::Read)
        })
        .expect("security");
    assert_eq!(
        session.row_filter(customer, role).expect("filter"),
        Some("[Key] > 10")
    );
    assert!(
        tree.last_batch()
            .expect("batch")
            .contains(&TreeNotification::Changed {
                node: TreeNode::Object(customer)
            })
    );

    session
        .update("blank", |s, tx| s.set_row_filter(tx, sales, role, Some("  ")))
        .expect("blank filter");
    assert_eq!(session.row_filter(sales, role).expect("filter"), None);

    session
        .update("delete", |s, tx| s.delete(tx, customer, true))
        .expect("delete table");
    assert!(session.is_deleted(customer));
    session.undo().expect("undo");
    assert_eq!(
        session.row_filter(customer, role).expect("filter"),
        Some("[Key] > 10")
    );
    assert_eq!(
        session.object_permission(customer, role).expect("permission"),
        MetadataPermission::Read
    );
    assert_eq!(session.relationships().len(), 1);
}

#[test]
fn deleting_a_role_drops_its_entries() {
    let StarModel {
        mut session, sales, ..
    } = star_model(SessionOptions::default());
    let role = session
        .update("role", |s, tx| {
            let role = s.add_role(tx, Some("Readers"))?;
            s.set_row_filter(tx, sales, role, Some("TRUE()"))?;
            Ok(role)
        })
        .expect("role");
    assert_eq!(session.row_level_security(sales).expect("rls").len(), 1);

    session
        .update("delete role", |s, tx| s.delete(tx, role, false))
        .expect("delete role");
    assert!(session.row_level_security(sales).expect("rls").is_empty());
    assert!(session.roles().is_empty());

    session.undo().expect("undo");
    assert_eq!(session.roles(), vec![role]);
    assert_eq!(
        session.row_filter(sales, role).expect("filter"),
        Some("TRUE()")
    );

    let cleared = session
        .update("clear", |s, tx| s.clear_security(tx, sales))
        .expect("clear");
    assert_eq!(cleared, 1);
    let cleared = session
        .update("clear", |s, tx| s.clear_security(tx, sales))
        .expect("clear again");
    assert_eq!(cleared, 0);
}

#[test]
fn governance_denies_creation_when_enabled() {
    let deny = DenyKinds(BTreeSet::from([ObjectKind::Measure]));
    let mut session = Session::new(SessionOptions::default().with_governance(true))
        .with_governance(Box::new(deny));
    let table = session
        .update("table", |s, tx| s.add_table(tx, Some("Sales")))
        .expect("tables are allowed");
    let error = session
        .update("measure", |s, tx| s.add_measure(tx, table, None, None, None))
        .expect_err("measures are denied");
    assert_eq!(error, ModelError::CreationDenied(ObjectKind::Measure));
    assert!(session.measures(table).is_empty());

    let mut open = Session::new(SessionOptions::default())
        .with_governance(Box::new(|kind: ObjectKind| kind != ObjectKind::Measure));
    let table = open
        .update("table", |s, tx| s.add_table(tx, Some("Sales")))
        .expect("table");
    open.update("measure", |s, tx| s.add_measure(tx, table, None, None, None))
        .expect("governance is off");
}

#[test]
fn find_object_accepts_expression_paths() {
    let StarModel {
        mut session,
        sales,
        customer_key,
        ..
    } = star_model(SessionOptions::default());
    let total = session
        .update("measure", |s, tx| {
            s.add_measure(tx, sales, Some("Total Sales"), None, None)
        })
        .expect("measure");
    assert_eq!(session.find_object("Sales"), Some(sales));
    assert_eq!(session.find_object("'Sales'"), Some(sales));
    assert_eq!(session.find_object("Sales[CustomerKey]"), Some(customer_key));
    assert_eq!(session.find_object("[Total Sales]"), Some(total));
    assert_eq!(session.find_object("[Nope]"), None);
    assert_eq!(
        session
            .property(customer_key, PropertyId::DaxIdentifier)
            .expect("identifier"),
        PropertyValue::text("'Sales'[CustomerKey]")
    );
    assert!(matches!(
        session.property(sales, PropertyId::FormatString),
        Err(ModelError::InvalidOperation(_))
    ));
}

#[test]
fn children_group_by_display_folder() {
    let StarModel {
        mut session,
        sales,
        customer_key,
        ..
    } = star_model(SessionOptions::default());
    let (net, gross, count) = session
        .update("folders", |s, tx| {
            let net = s.add_measure(tx, sales, Some("Net"), Some("1"), Some("Totals\\Net"))?;
            let gross = s.add_measure(tx, sales, Some("Gross"), Some("2"), Some("Totals"))?;
            let count = s.add_measure(tx, sales, Some("Rows"), Some("3"), Some(" Counts "))?;
            Ok((net, gross, count))
        })
        .expect("add measures");

    let top = session.children_by_folder(sales, false).expect("folders");
    let keys: Vec<&str> = top.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["", "Counts", "Totals"]);
    assert_eq!(top[""], vec![customer_key]);
    assert_eq!(top["Totals"], vec![net, gross]);

    let nested = session.children_by_folder(sales, true).expect("folders");
    assert_eq!(nested["Totals\\Net"], vec![net]);
    assert_eq!(nested["Totals"], vec![gross]);
    assert_eq!(nested["Counts"], vec![count]);

    let relationship = single_relationship(&session);
    assert!(session.children_by_folder(customer_key, false).is_err());
    assert!(session.dax_table_name(relationship).is_err());
}

#[test]
fn members_report_their_table_name() {
    let StarModel {
        session,
        sales,
        customer_key,
        ..
    } = star_model(SessionOptions::default());
    let partition = session.partitions(sales)[0];
    for id in [sales, customer_key, partition] {
        assert_eq!(session.dax_table_name(id).expect("table name"), "'Sales'");
    }
}
