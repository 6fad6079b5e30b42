//! Identifier and column type validation
//!
//! Table names, column names and column types are the only caller-supplied
//! strings that get interpolated into SQL text. Everything passes through the
//! validators here first; escaping is applied afterwards and never replaces
//! validation.

use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

static IDENTIFIER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap_or_else(|_| unreachable!())
});

static COLUMN_TYPE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z]+(\([0-9,\s]+\))?$").unwrap_or_else(|_| unreachable!())
});

/// SQLite keywords, lower case
///
/// Kept in sync with <https://www.sqlite.org/lang_keywords.html>.
pub const RESERVED_WORDS: &[&str] = &[
    "abort", "action", "add", "after", "all", "alter", "always", "analyze", "and", "as",
    "asc", "attach", "autoincrement", "before", "begin", "between", "by", "cascade", "case",
    "cast", "check", "collate", "column", "commit", "conflict", "constraint", "create",
    "cross", "current", "current_date", "current_time", "current_timestamp", "database",
    "default", "deferrable", "deferred", "delete", "desc", "detach", "distinct", "do", "drop",
    "each", "else", "end", "escape", "except", "exclude", "exclusive", "exists", "explain",
    "fail", "filter", "first", "following", "for", "foreign", "from", "full", "generated",
    "glob", "group", "groups", "having", "if", "ignore", "immediate", "in", "index", "indexed",
    "initially", "inner", "insert", "instead", "intersect", "into", "is", "isnull", "join",
    "key", "last", "left", "like", "limit", "match", "materialized", "natural", "no", "not",
    "nothing", "notnull", "null", "nulls", "of", "offset", "on", "or", "order", "others",
    "outer", "over", "partition", "plan", "pragma", "preceding", "primary", "query", "raise",
    "range", "recursive", "references", "regexp", "reindex", "release", "rename", "replace",
    "restrict", "returning", "right", "rollback", "row", "rows", "savepoint", "select", "set",
    "table", "temp", "temporary", "then", "ties", "to", "transaction", "trigger", "unbounded",
    "union", "unique", "update", "using", "vacuum", "values", "view", "virtual", "when",
    "where", "window", "with", "without",
];

static RESERVED_WORD_SET: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| RESERVED_WORDS.iter().copied().collect());

/// Base column types accepted by [`validate_column_type`]
pub const ALLOWED_COLUMN_TYPES: &[&str] = &[
    "TEXT", "INTEGER", "REAL", "BLOB", "NUMERIC", "VARCHAR", "CHAR", "NVARCHAR", "NCHAR",
    "CLOB", "DATE", "DATETIME", "TIMESTAMP", "BOOLEAN", "DECIMAL", "DOUBLE", "FLOAT", "INT",
    "BIGINT", "SMALLINT", "TINYINT",
];

/// A table or column name proven safe to interpolate once quoted
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValidatedIdentifier(String);

impl ValidatedIdentifier {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identifier wrapped in double quotes, ready for a statement
    pub fn quoted(&self) -> String {
        escape_identifier(self)
    }
}

impl fmt::Display for ValidatedIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ValidatedIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// An upper-cased, allow-listed column type such as `VARCHAR(255)`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValidatedColumnType(String);

impl ValidatedColumnType {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The leading alphabetic part, e.g. `DECIMAL` for `DECIMAL(10,2)`
    pub fn base_type(&self) -> &str {
        let end = self
            .0
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Display for ValidatedColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Check whether `word` is an SQL keyword, ignoring case
pub fn is_reserved_word(word: &str) -> bool {
    RESERVED_WORD_SET.contains(word.to_lowercase().as_str())
}

/// Validate a table or column name
///
/// `kind` labels the identifier in error messages, e.g. `"table name"`.
///
/// # Errors
///
/// - [`Error::EmptyIdentifier`] if `raw` is empty
/// - [`Error::MalformedIdentifier`] if `raw` is not `^[A-Za-z_][A-Za-z0-9_]*$`
/// - [`Error::ReservedWord`] if `raw` is an SQL keyword in any case
pub fn validate_identifier(raw: &str, kind: &str) -> Result<ValidatedIdentifier> {
    if raw.is_empty() {
        return Err(Error::EmptyIdentifier {
            kind: kind.to_string(),
        });
    }
    if !IDENTIFIER_PATTERN.is_match(raw) {
        return Err(Error::MalformedIdentifier {
            kind: kind.to_string(),
            value: raw.to_string(),
        });
    }
    if is_reserved_word(raw) {
        return Err(Error::ReservedWord {
            kind: kind.to_string(),
            value: raw.to_string(),
        });
    }
    Ok(ValidatedIdentifier(raw.to_string()))
}

/// Validate a column type and normalize it to upper case
///
/// # Errors
///
/// - [`Error::UnsupportedType`] if the leading alphabetic run is not allow-listed
/// - [`Error::MalformedType`] if anything other than a parenthesized list of
///   digits, commas and whitespace follows the base type
pub fn validate_column_type(raw: &str) -> Result<ValidatedColumnType> {
    let normalized = raw.trim().to_uppercase();

    let base_end = normalized
        .find(|c: char| !c.is_ascii_uppercase())
        .unwrap_or(normalized.len());
    let base = &normalized[..base_end];
    if base.is_empty() || !ALLOWED_COLUMN_TYPES.contains(&base) {
        let mut allowed = ALLOWED_COLUMN_TYPES.to_vec();
        allowed.sort_unstable();
        return Err(Error::UnsupportedType {
            value: raw.to_string(),
            allowed: allowed.join(", "),
        });
    }

    if !COLUMN_TYPE_PATTERN.is_match(&normalized) {
        return Err(Error::MalformedType {
            value: raw.to_string(),
        });
    }

    Ok(ValidatedColumnType(normalized))
}

/// Wrap a validated identifier in double quotes, doubling embedded quotes
pub fn escape_identifier(identifier: &ValidatedIdentifier) -> String {
    quote_identifier(identifier.as_str())
}

/// Double-quote a name read back from the catalog, doubling embedded quotes
///
/// Only for names SQLite itself reported; caller input goes through
/// [`validate_identifier`] first.
pub(crate) fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
