//! Tests for tabular-model types.

use tabular_model::names::{bracket_name, validate_name};
use tabular_model::{
    DataType, ModelError, ObjectKind, PropertyId, PropertyKey, PropertyValue, SessionOptions,
};

#[test]
fn property_ids_parse_case_insensitively() {
    assert_eq!("expression".parse::<PropertyId>(), Ok(PropertyId::Expression));
    assert_eq!(
        "DefaultDetailRowsExpression".parse::<PropertyId>(),
        Ok(PropertyId::DefaultDetailRowsExpression)
    );
    assert!("Colour".parse::<PropertyId>().is_err());
    assert!(PropertyId::DefaultDetailRowsExpression.is_expression());
    assert!(!PropertyId::Name.is_expression());
}

#[test]
fn property_keys_display_their_target() {
    assert_eq!(PropertyKey::from(PropertyId::Name).to_string(), "Name");
    assert_eq!(PropertyKey::Membership.to_string(), "Membership");
}

#[test]
fn property_values_expose_text() {
    assert_eq!(PropertyValue::text("x").as_text(), Some("x"));
    assert_eq!(PropertyValue::Bool(true).as_text(), None);
    assert_eq!(PropertyValue::Membership(None).to_string(), "detached");
}

#[test]
fn table_name_error_lists_reserved_characters() {
    let error = validate_name(ObjectKind::Table, "Sales[2024]").expect_err("invalid table name");
    assert!(error.is_validation());
    let ModelError::InvalidName { reason, .. } = error else {
        panic!("expected InvalidName");
    };
    assert!(reason.contains('['));
}

#[test]
fn bracketed_names_round_trip_through_display() {
    assert_eq!(bracket_name("Sales Amount"), "[Sales Amount]");
    assert_eq!(DataType::Int64.to_string(), "Int64");
    assert_eq!("datetime".parse::<DataType>(), Ok(DataType::DateTime));
}

#[test]
fn options_builder_clamps_undo_depth() {
    let options = SessionOptions::new()
        .with_undo_depth(0)
        .with_compatibility_level(1400);
    assert_eq!(options.undo_depth, 1);
    assert!(options.supports_object_level_security());
}

#[test]
fn options_serialize() {
    let json = serde_json::to_string(&SessionOptions::default()).expect("serialize options");
    let round: SessionOptions = serde_json::from_str(&json).expect("deserialize options");
    assert_eq!(round, SessionOptions::default());
}
