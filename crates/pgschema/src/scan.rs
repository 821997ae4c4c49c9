//! Reference scanning over opaque SQL text.
//!
//! Function and view bodies are never parsed. Instead the text is searched
//! for schema-qualified names, which come in two shapes:
//!
//! - a call, `schema.name(` followed by an argument list. The parentheses are
//!   balanced to find the end of the call and the top-level commas counted to
//!   get the number of arguments, skipping single-quoted literals.
//! - anything else, `schema.name` not immediately followed by `(`. These
//!   cover tables, views, sequences and types.
//!
//! Both identifier parts may be double-quoted (`"shop"."Order"`).

use std::sync::LazyLock;

use regex::Regex;

use crate::refs::QualifiedName;

static QUALIFIED_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?x)
        (?: "([^"]+)" | ([A-Za-z_][A-Za-z0-9_$]*) )   # schema
        \.
        (?: "([^"]+)" | ([A-Za-z_][A-Za-z0-9_$]*) )   # name
        "#,
    )
    .expect("qualified name pattern is valid")
});

/// A qualified name found in SQL text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScannedReference {
    /// `schema.name(...)` with the number of arguments passed.
    Call { name: QualifiedName, arity: usize },
    /// `schema.name` used as anything but a call.
    Name(QualifiedName),
}

impl ScannedReference {
    pub fn name(&self) -> &QualifiedName {
        match self {
            ScannedReference::Call { name, .. } | ScannedReference::Name(name) => name,
        }
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

/// Find every qualified reference in `text`, in order of appearance.
pub fn scan_references(text: &str) -> Vec<ScannedReference> {
    let mut references = Vec::new();

    for captures in QUALIFIED_NAME.captures_iter(text) {
        let Some(whole) = captures.get(0) else {
            continue;
        };

        // Part of a longer dotted path or of a longer identifier.
        if text[..whole.start()]
            .chars()
            .next_back()
            .is_some_and(|c| is_identifier_char(c) || c == '.' || c == '"')
        {
            continue;
        }

        let (Some(schema), Some(name)) = (
            captures.get(1).or_else(|| captures.get(2)),
            captures.get(3).or_else(|| captures.get(4)),
        ) else {
            continue;
        };
        let name = QualifiedName::new(schema.as_str(), name.as_str());

        let rest = &text[whole.end()..];
        if let Some(arguments) = rest.strip_prefix('(') {
            references.push(ScannedReference::Call {
                name,
                arity: count_arguments(arguments),
            });
        } else {
            references.push(ScannedReference::Name(name));
        }
    }

    references
}

/// Count the arguments of a call whose opening parenthesis was just consumed.
///
/// An unterminated argument list counts what is there.
fn count_arguments(text: &str) -> usize {
    let mut depth = 1usize;
    let mut commas = 0;
    let mut empty = true;
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                empty = false;
                // A doubled quote inside a literal closes and reopens it.
                for c in chars.by_ref() {
                    if c == '\'' {
                        break;
                    }
                }
            }
            '(' => {
                empty = false;
                depth += 1;
            }
            ')' => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            ',' if depth == 1 => commas += 1,
            c if c.is_whitespace() => {}
            _ => empty = false,
        }
    }

    if empty { 0 } else { commas + 1 }
}
