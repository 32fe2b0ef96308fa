//! Expression service contract and the default DAX-style lexer.
//!
//! The engine never evaluates expressions. It only needs two things from the
//! expression language: the identifier references an expression contains
//! (with byte spans, so fix-up can rewrite them in place) and a validation
//! status. [`ExpressionService`] is that contract; [`DaxExpressionService`]
//! is a small lexer good enough for dependency tracking.

use std::collections::BTreeSet;
use std::ops::Range;

use serde::{Deserialize, Serialize};

/// A name as it appears in an expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    /// Unescaped name.
    pub text: String,
    /// Byte range in the expression, delimiters included.
    pub span: Range<usize>,
    /// Written as `'Name'` (tables) rather than bare.
    pub quoted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpressionReference {
    /// `'Sales'` or a bare `Sales` not followed by `[` or `(`.
    Table(Identifier),
    /// `Sales[Amount]`, `'Sales'[Amount]` or `[Amount]`.
    Object {
        table: Option<Identifier>,
        name: Identifier,
    },
}

impl ExpressionReference {
    pub fn table(&self) -> Option<&Identifier> {
        match self {
            ExpressionReference::Table(table) => Some(table),
            ExpressionReference::Object { table, .. } => table.as_ref(),
        }
    }

    /// Text of the reference as written, used in unresolved-reference messages.
    pub fn display(&self) -> String {
        let table = |ident: &Identifier| {
            if ident.quoted {
                format!("'{}'", ident.text)
            } else {
                ident.text.clone()
            }
        };
        match self {
            ExpressionReference::Table(ident) => table(ident),
            ExpressionReference::Object { table: qualifier, name } => format!(
                "{}[{}]",
                qualifier.as_ref().map(table).unwrap_or_default(),
                name.text
            ),
        }
    }
}

/// Outcome of asking the expression service to validate an expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationStatus {
    Valid,
    Invalid(String),
    /// The check has not resolved yet; see `Session::resolve_validation`.
    Pending,
}

/// Tokenization and validation of expressions, supplied by the host.
pub trait ExpressionService {
    fn tokenize(&self, expression: &str) -> Vec<ExpressionReference>;

    fn validate(&self, expression: &str) -> ValidationStatus;
}

/// Default service backed by [`lex`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DaxExpressionService;

impl ExpressionService for DaxExpressionService {
    fn tokenize(&self, expression: &str) -> Vec<ExpressionReference> {
        lex(expression).references
    }

    fn validate(&self, expression: &str) -> ValidationStatus {
        match lex(expression).error {
            Some(message) => ValidationStatus::Invalid(message),
            None => ValidationStatus::Valid,
        }
    }
}

const KEYWORDS: [&str; 14] = [
    "VAR", "RETURN", "TRUE", "FALSE", "IN", "NOT", "AND", "OR", "ASC", "DESC", "DEFINE",
    "MEASURE", "EVALUATE", "BLANK",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lexed {
    pub references: Vec<ExpressionReference>,
    /// First syntax problem found, if any.
    pub error: Option<String>,
}

#[derive(Debug)]
enum Token {
    Quoted(Identifier),
    Bare(Identifier),
    Bracket(Identifier),
    OpenParen,
    Other,
}

/// Scan `expression` for table and object references.
///
/// Strings and comments are skipped. Unterminated delimiters and unbalanced
/// parentheses are reported in [`Lexed::error`]; references found before the
/// problem are still returned.
pub fn lex(expression: &str) -> Lexed {
    let bytes = expression.as_bytes();
    let mut tokens: Vec<(Token, usize)> = Vec::new();
    let mut error = None;
    let mut depth = 0i32;
    let mut pos = 0usize;

    while pos < bytes.len() {
        let ch = bytes[pos];
        match ch {
            b'"' => match scan_delimited(expression, pos, b'"') {
                Some((_, end)) => {
                    tokens.push((Token::Other, pos));
                    pos = end;
                }
                None => {
                    error.get_or_insert_with(|| "unterminated string literal".to_string());
                    break;
                }
            },
            b'/' if bytes.get(pos + 1) == Some(&b'/') => pos = skip_line(bytes, pos),
            b'-' if bytes.get(pos + 1) == Some(&b'-') => pos = skip_line(bytes, pos),
            b'/' if bytes.get(pos + 1) == Some(&b'*') => {
                match expression[pos + 2..].find("*/") {
                    Some(offset) => pos = pos + 2 + offset + 2,
                    None => {
                        error.get_or_insert_with(|| "unterminated comment".to_string());
                        break;
                    }
                }
            }
            b'\'' => match scan_delimited(expression, pos, b'\'') {
                Some((text, end)) => {
                    tokens.push((
                        Token::Quoted(Identifier {
                            text,
                            span: pos..end,
                            quoted: true,
                        }),
                        pos,
                    ));
                    pos = end;
                }
                None => {
                    error.get_or_insert_with(|| "unterminated table name".to_string());
                    break;
                }
            },
            b'[' => match scan_delimited(expression, pos, b']') {
                Some((text, end)) => {
                    tokens.push((
                        Token::Bracket(Identifier {
                            text,
                            span: pos..end,
                            quoted: false,
                        }),
                        pos,
                    ));
                    pos = end;
                }
                None => {
                    error.get_or_insert_with(|| "unterminated object name".to_string());
                    break;
                }
            },
            b']' => {
                error.get_or_insert_with(|| format!("unexpected ']' at position {pos}"));
                tokens.push((Token::Other, pos));
                pos += 1;
            }
            b'(' => {
                depth += 1;
                tokens.push((Token::OpenParen, pos));
                pos += 1;
            }
            b')' => {
                depth -= 1;
                if depth < 0 {
                    error.get_or_insert_with(|| format!("unexpected ')' at position {pos}"));
                    depth = 0;
                }
                tokens.push((Token::Other, pos));
                pos += 1;
            }
            _ if ch.is_ascii_whitespace() => pos += 1,
            _ => {
                let rest = &expression[pos..];
                let Some(first) = rest.chars().next() else {
                    break;
                };
                if first.is_alphabetic() || first == '_' {
                    let len = rest
                        .char_indices()
                        .find(|(_, c)| !(c.is_alphanumeric() || *c == '_' || *c == '.'))
                        .map_or(rest.len(), |(idx, _)| idx);
                    let word = &rest[..len];
                    tokens.push((
                        Token::Bare(Identifier {
                            text: word.to_string(),
                            span: pos..pos + len,
                            quoted: false,
                        }),
                        pos,
                    ));
                    pos += len;
                } else {
                    tokens.push((Token::Other, pos));
                    pos += first.len_utf8();
                }
            }
        }
    }
    if depth > 0 && error.is_none() {
        error = Some("missing closing parenthesis".to_string());
    }

    Lexed {
        references: pair_references(tokens),
        error,
    }
}

/// Pair qualifiers with bracketed names. Bare words that are keywords,
/// function calls or `VAR` names are not table references.
fn pair_references(tokens: Vec<(Token, usize)>) -> Vec<ExpressionReference> {
    let mut references = Vec::new();
    let mut variables: BTreeSet<String> = BTreeSet::new();
    let mut declaring = false;
    let mut iter = tokens.into_iter().peekable();
    while let Some((token, _)) = iter.next() {
        let after_var = std::mem::take(&mut declaring);
        match token {
            Token::Bare(name) if after_var => {
                variables.insert(name.text.to_ascii_lowercase());
            }
            Token::Quoted(table) | Token::Bare(table) => {
                let adjacent_bracket = matches!(
                    iter.peek(),
                    Some((Token::Bracket(name), _)) if name.span.start == table.span.end
                );
                if adjacent_bracket {
                    if let Some((Token::Bracket(name), _)) = iter.next() {
                        references.push(ExpressionReference::Object {
                            table: Some(table),
                            name,
                        });
                    }
                    continue;
                }
                if table.quoted {
                    references.push(ExpressionReference::Table(table));
                    continue;
                }
                if table.text.eq_ignore_ascii_case("VAR") {
                    declaring = true;
                    continue;
                }
                let is_call = matches!(iter.peek(), Some((Token::OpenParen, _)));
                let is_keyword = KEYWORDS
                    .iter()
                    .any(|keyword| keyword.eq_ignore_ascii_case(&table.text));
                let is_variable = variables.contains(&table.text.to_ascii_lowercase());
                if !is_call && !is_keyword && !is_variable {
                    references.push(ExpressionReference::Table(table));
                }
            }
            Token::Bracket(name) => {
                references.push(ExpressionReference::Object { table: None, name });
            }
            Token::OpenParen | Token::Other => {}
        }
    }
    references
}

/// Read a delimited run starting at `start` (which holds the opening
/// delimiter). A doubled closing delimiter is an escaped literal.
fn scan_delimited(expression: &str, start: usize, close: u8) -> Option<(String, usize)> {
    let bytes = expression.as_bytes();
    let mut text = Vec::new();
    let mut pos = start + 1;
    while pos < bytes.len() {
        if bytes[pos] == close {
            if bytes.get(pos + 1) == Some(&close) {
                text.push(close);
                pos += 2;
                continue;
            }
            return Some((String::from_utf8_lossy(&text).into_owned(), pos + 1));
        }
        text.push(bytes[pos]);
        pos += 1;
    }
    None
}

fn skip_line(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|b| *b == b'\n')
        .map_or(bytes.len(), |offset| start + offset + 1)
}

/// Apply `(span, replacement)` edits to `expression`.
///
/// Edits are applied right to left so earlier spans stay valid; overlapping
/// edits keep the rightmost one.
pub fn apply_edits(expression: &str, mut edits: Vec<(Range<usize>, String)>) -> String {
    edits.sort_by(|a, b| b.0.start.cmp(&a.0.start));
    let mut out = expression.to_string();
    let mut floor = usize::MAX;
    for (span, replacement) in edits {
        if span.end > floor || span.end > out.len() {
            continue;
        }
        out.replace_range(span.clone(), &replacement);
        floor = span.start;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(expression: &str) -> Vec<String> {
        lex(expression)
            .references
            .iter()
            .map(ExpressionReference::display)
            .collect()
    }

    #[test]
    fn finds_qualified_and_unqualified_references() {
        assert_eq!(
            names("SUM(Sales[Amount]) + [Margin] - COUNTROWS('Order Lines')"),
            vec!["Sales[Amount]", "[Margin]", "'Order Lines'"]
        );
    }

    #[test]
    fn skips_strings_comments_and_keywords() {
        let expression = "VAR x = \"Sales[Amount]\" // [Ignored]\nRETURN x + [Kept] /* 'No' */";
        assert_eq!(names(expression), vec!["[Kept]"]);
    }

    #[test]
    fn variable_names_are_not_table_references() {
        let expression = "VAR Rate = SUM(Rate[Value]) VAR total = 2 RETURN Rate * TOTAL + Sales";
        assert_eq!(names(expression), vec!["Rate[Value]", "Sales"]);
    }

    #[test]
    fn unescapes_doubled_delimiters() {
        let lexed = lex("'Bob''s'[a]]b]");
        let ExpressionReference::Object { table, name } = &lexed.references[0] else {
            panic!("expected object reference");
        };
        assert_eq!(table.as_ref().map(|t| t.text.as_str()), Some("Bob's"));
        assert_eq!(name.text, "a]b");
        assert_eq!(name.span, 8..14);
    }

    #[test]
    fn reports_unbalanced_input() {
        assert!(lex("SUM(Sales[Amount]").error.is_some());
        assert!(lex("SUM(Sales[Amount)").error.is_some());
        assert!(lex("1)").error.is_some());
        assert!(lex("\"open").error.is_some());
        assert_eq!(lex("SUM(Sales[Amount])").error, None);
    }

    #[test]
    fn service_validates_through_lexer() {
        let service = DaxExpressionService;
        assert_eq!(service.validate("1 + 1"), ValidationStatus::Valid);
        assert!(matches!(
            service.validate("(1 + 1"),
            ValidationStatus::Invalid(_)
        ));
    }

    #[test]
    fn edits_apply_right_to_left() {
        let expression = "SUM(Sales[Amount]) + Sales[Amount]";
        let edits = vec![(9..17, "[Revenue]".to_string()), (26..34, "[Revenue]".to_string())];
        assert_eq!(
            apply_edits(expression, edits),
            "SUM(Sales[Revenue]) + Sales[Revenue]"
        );
    }
}
