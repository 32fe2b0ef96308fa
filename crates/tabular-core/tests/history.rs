use proptest::prelude::*;

use tabular_core::Session;
use tabular_model::{ObjectId, ObjectKind, PropertyId, SessionOptions};

const NAMES: [&str; 6] = ["C0", "C1", "M0", "M1", "Total", "Net"];
const EXPRESSIONS: [&str; 6] = [
    "[M0]",
    "SUM(T0[C0])",
    "'T1'[C1] + [M1]",
    "[Total] * 2",
    "CALC(T0[Net]",
    "1",
];

#[derive(Debug, Clone)]
enum Op {
    AddMeasure { table: usize, name: usize, expression: usize },
    AddColumn { table: usize, name: usize, expression: usize },
    Rename { target: usize, name: usize },
    SetExpression { target: usize, expression: usize },
    Delete { target: usize },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..2usize, 0..NAMES.len(), 0..EXPRESSIONS.len()).prop_map(|(table, name, expression)| {
            Op::AddMeasure {
                table,
                name,
                expression,
            }
        }),
        (0..2usize, 0..NAMES.len(), 0..EXPRESSIONS.len()).prop_map(|(table, name, expression)| {
            Op::AddColumn {
                table,
                name,
                expression,
            }
        }),
        (0..16usize, 0..NAMES.len()).prop_map(|(target, name)| Op::Rename { target, name }),
        (0..16usize, 0..EXPRESSIONS.len())
            .prop_map(|(target, expression)| Op::SetExpression { target, expression }),
        (0..16usize).prop_map(|target| Op::Delete { target }),
    ]
}

fn base_model() -> Session {
    let mut session = Session::new(SessionOptions::default());
    session
        .update("load", |s, tx| {
            for (table, column) in [("T0", "C0"), ("T1", "C1")] {
                let table = s.add_table(tx, Some(table))?;
                s.add_data_column(tx, table, Some(column), None, None)?;
            }
            Ok(())
        })
        .expect("load model");
    session
}

fn members(session: &Session) -> Vec<ObjectId> {
    session
        .tables()
        .into_iter()
        .flat_map(|table| {
            let mut ids = session.columns(table);
            ids.extend(session.measures(table));
            ids
        })
        .collect()
}

fn pick(ids: &[ObjectId], index: usize) -> Option<ObjectId> {
    (!ids.is_empty()).then(|| ids[index % ids.len()])
}

/// Applies `op`, ignoring rejected edits.
fn apply(session: &mut Session, op: &Op) {
    let tables = session.tables();
    let members = members(session);
    let _ = match *op {
        Op::AddMeasure {
            table,
            name,
            expression,
        } => session.update("add measure", |s, tx| {
            s.add_measure(tx, tables[table], Some(NAMES[name]), Some(EXPRESSIONS[expression]), None)
                .map(|_| ())
        }),
        Op::AddColumn {
            table,
            name,
            expression,
        } => session.update("add column", |s, tx| {
            s.add_calculated_column(
                tx,
                tables[table],
                Some(NAMES[name]),
                Some(EXPRESSIONS[expression]),
                None,
            )
            .map(|_| ())
        }),
        Op::Rename { target, name } => {
            let mut candidates = tables.clone();
            candidates.extend(&members);
            match pick(&candidates, target) {
                Some(id) => session
                    .update("rename", |s, tx| s.set_name(tx, id, NAMES[name]).map(|_| ())),
                None => Ok(()),
            }
        }
        Op::SetExpression { target, expression } => {
            let editable: Vec<ObjectId> = members
                .iter()
                .copied()
                .filter(|id| {
                    matches!(
                        session.kind(*id),
                        Ok(ObjectKind::Measure | ObjectKind::CalculatedColumn)
                    )
                })
                .collect();
            match pick(&editable, target) {
                Some(id) => session.update("edit", |s, tx| {
                    s.set_expression(tx, id, EXPRESSIONS[expression]).map(|_| ())
                }),
                None => Ok(()),
            }
        }
        Op::Delete { target } => match pick(&members, target) {
            Some(id) => session.update("delete", |s, tx| s.delete(tx, id, true)),
            None => Ok(()),
        },
    };
}

type Snapshot = Vec<(String, Option<String>, Vec<(String, String, Option<String>)>)>;

fn snapshot(session: &Session) -> Snapshot {
    session
        .tables()
        .into_iter()
        .map(|table| {
            let members = session
                .columns(table)
                .into_iter()
                .chain(session.measures(table))
                .map(|id| {
                    let expression = session
                        .property(id, PropertyId::Expression)
                        .ok()
                        .and_then(|value| value.as_text().map(str::to_string))
                        .unwrap_or_default();
                    (
                        session.name(id).expect("name").to_string(),
                        expression,
                        session.error_message(id).map(str::to_string),
                    )
                })
                .collect();
            (
                session.name(table).expect("name").to_string(),
                session.error_message(table).map(str::to_string),
                members,
            )
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn dependency_index_stays_symmetric(ops in prop::collection::vec(op(), 1..24)) {
        let mut session = base_model();
        for op in &ops {
            apply(&mut session, op);
            prop_assert!(session.dependencies_symmetric(), "asymmetric after {:?}", op);
            prop_assert!(!session.in_update());
        }
    }

    #[test]
    fn undo_all_then_redo_all_round_trips(ops in prop::collection::vec(op(), 1..24)) {
        let mut session = base_model();
        for op in &ops {
            apply(&mut session, op);
        }
        let last = snapshot(&session);

        while session.undo().expect("undo").is_some() {}
        prop_assert!(session.tables().is_empty());
        prop_assert!(session.dependencies_symmetric());

        while session.redo().expect("redo").is_some() {}
        prop_assert_eq!(snapshot(&session), last);
        prop_assert!(session.dependencies_symmetric());
    }
}
