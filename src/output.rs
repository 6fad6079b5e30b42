//! Output formats for query results
//!
//! The `sldb` binary renders rows as tables; the JSON and pipe-separated
//! renderings live here so library users can produce the same output.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::database::{Row, SqlValue};

/// How the `sldb` binary prints result rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// Bordered table
    #[default]
    Table,
    Markdown,
    /// One JSON array of row objects
    Json,
    JsonPretty,
    /// One JSON object per line
    JsonLine,
    /// Pipe-separated values with a header line
    Psv,
}

/// Canonical names, in the order shown in help text
const FORMAT_NAMES: &[(&str, OutputFormat)] = &[
    ("table", OutputFormat::Table),
    ("markdown", OutputFormat::Markdown),
    ("json", OutputFormat::Json),
    ("json-pretty", OutputFormat::JsonPretty),
    ("json-line", OutputFormat::JsonLine),
    ("psv", OutputFormat::Psv),
];

const FORMAT_ALIASES: &[(&str, OutputFormat)] = &[
    ("md", OutputFormat::Markdown),
    ("jsonl", OutputFormat::JsonLine),
    ("pipe", OutputFormat::Psv),
];

impl OutputFormat {
    pub fn name(self) -> &'static str {
        FORMAT_NAMES
            .iter()
            .find(|(_, format)| *format == self)
            .map(|(name, _)| *name)
            .unwrap_or("table")
    }

    pub fn is_json(self) -> bool {
        matches!(self, Self::Json | Self::JsonPretty | Self::JsonLine)
    }

    pub fn is_table(self) -> bool {
        matches!(self, Self::Table | Self::Markdown)
    }

    pub fn all_names() -> Vec<&'static str> {
        FORMAT_NAMES.iter().map(|(name, _)| *name).collect()
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.to_ascii_lowercase();
        FORMAT_NAMES
            .iter()
            .chain(FORMAT_ALIASES)
            .find(|(name, _)| *name == wanted)
            .map(|(_, format)| *format)
            .ok_or_else(|| {
                format!(
                    "unknown output format '{}', expected one of: {}",
                    s,
                    Self::all_names().join(", ")
                )
            })
    }
}

/// Convert a row to a JSON object keyed by column name
///
/// Blobs become arrays of bytes. Extra values beyond the column list are
/// dropped.
pub fn row_to_json(columns: &[String], row: &Row) -> Value {
    let mut object = Map::with_capacity(columns.len());
    for (column, value) in columns.iter().zip(row) {
        let value = match value {
            SqlValue::Null => Value::Null,
            SqlValue::Integer(i) => json!(i),
            SqlValue::Real(f) => json!(f),
            SqlValue::Text(s) => json!(s),
            SqlValue::Blob(b) => json!(b),
        };
        object.insert(column.clone(), value);
    }
    Value::Object(object)
}

/// Render rows in one of the JSON formats or as pipe-separated values
///
/// Returns `None` for the table formats, which need a table renderer.
pub fn format_rows(columns: &[String], rows: &[Row], format: OutputFormat) -> Option<String> {
    match format {
        OutputFormat::Table | OutputFormat::Markdown => None,
        OutputFormat::Json => {
            let values: Vec<Value> = rows.iter().map(|r| row_to_json(columns, r)).collect();
            Some(Value::Array(values).to_string())
        }
        OutputFormat::JsonPretty => {
            let values: Vec<Value> = rows.iter().map(|r| row_to_json(columns, r)).collect();
            serde_json::to_string_pretty(&values).ok()
        }
        OutputFormat::JsonLine => Some(
            rows.iter()
                .map(|r| row_to_json(columns, r).to_string())
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        OutputFormat::Psv => {
            let mut lines = Vec::with_capacity(rows.len() + 1);
            lines.push(columns.join("|"));
            for row in rows {
                lines.push(
                    row.iter()
                        .map(|v| v.to_string())
                        .collect::<Vec<_>>()
                        .join("|"),
                );
            }
            Some(lines.join("\n"))
        }
    }
}
