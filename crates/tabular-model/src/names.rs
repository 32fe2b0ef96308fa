//! Name rules and expression identifier formatting.

use crate::enums::ObjectKind;
use crate::error::{ModelError, Result};

/// Characters a table name may never contain.
pub const INVALID_TABLE_NAME_CHARS: [char; 26] = [
    '.', ',', ';', '\'', '`', ':', '/', '\\', '*', '|', '?', '"', '&', '%', '$', '!', '+', '=',
    '(', ')', '[', ']', '{', '}', '<', '>',
];

/// Check a candidate name for `kind` against the character rules.
///
/// Uniqueness is a property of the container and is checked by the session.
pub fn validate_name(kind: ObjectKind, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(ModelError::InvalidName {
            kind,
            name: name.to_string(),
            reason: "name cannot be empty".to_string(),
        });
    }
    if name.chars().any(char::is_control) {
        return Err(ModelError::InvalidName {
            kind,
            name: name.to_string(),
            reason: "name cannot contain control characters".to_string(),
        });
    }
    if kind.is_table() && name.contains(INVALID_TABLE_NAME_CHARS) {
        let listed: Vec<String> = INVALID_TABLE_NAME_CHARS
            .iter()
            .map(char::to_string)
            .collect();
        return Err(ModelError::InvalidName {
            kind,
            name: name.to_string(),
            reason: format!(
                "table name cannot contain any of the following characters: {}",
                listed.join(" ")
            ),
        });
    }
    Ok(())
}

/// Render a table name as a quoted identifier: `'Sales'`, `'Bob''s'`.
pub fn quote_table_name(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}

/// Render an object name inside brackets: `[Amount]`, `[a]]b]`.
pub fn bracket_name(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// True when a table name can appear unquoted in an expression.
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_alphabetic() || first == '_') && chars.all(|ch| ch.is_alphanumeric() || ch == '_')
}

/// Render a table reference, keeping the unquoted form when allowed.
pub fn table_reference(name: &str, prefer_quoted: bool) -> String {
    if prefer_quoted || !is_plain_identifier(name) {
        quote_table_name(name)
    } else {
        name.to_string()
    }
}

/// Pick `base`, `base 1`, `base 2`, ... avoiding every name in `taken`.
pub fn unique_name<'a, I>(base: &str, taken: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let taken: Vec<String> = taken.into_iter().map(str::to_lowercase).collect();
    if !taken.contains(&base.to_lowercase()) {
        return base.to_string();
    }
    let mut suffix = 1usize;
    loop {
        let candidate = format!("{base} {suffix}");
        if !taken.contains(&candidate.to_lowercase()) {
            return candidate;
        }
        suffix += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_reject_reserved_characters() {
        assert!(validate_name(ObjectKind::Table, "Sales").is_ok());
        assert!(validate_name(ObjectKind::Table, "Sales.2024").is_err());
        assert!(validate_name(ObjectKind::Measure, "Sales.2024").is_ok());
        assert!(validate_name(ObjectKind::Measure, "   ").is_err());
    }

    #[test]
    fn identifiers_escape_delimiters() {
        assert_eq!(quote_table_name("Bob's"), "'Bob''s'");
        assert_eq!(bracket_name("a]b"), "[a]]b]");
        assert_eq!(table_reference("Sales", false), "Sales");
        assert_eq!(table_reference("Sales 2024", false), "'Sales 2024'");
    }

    #[test]
    fn unique_names_skip_taken() {
        let taken = ["New Measure", "new measure 1"];
        assert_eq!(unique_name("New Measure", taken), "New Measure 2");
        assert_eq!(unique_name("Total", taken), "Total");
    }
}
