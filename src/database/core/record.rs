//! Already-parsed data records
//!
//! Loaders hand over records as a model (table) name, an optional external
//! identifier and a map of field values. Inserting them goes through the same
//! identifier validation as DDL; values are always bound, never interpolated.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::database::core::connection::{Connection, ConnectionState};
use crate::database::core::validate::validate_identifier;
use crate::database::core::value::SqlValue;
use crate::error::{Error, Result};

/// Column receiving [`RecordMetadata::external_id`]
pub const EXTERNAL_ID_COLUMN: &str = "external_id";

const BATCH_SAVEPOINT: &str = "insert_records";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Target table
    pub model: String,
    /// Stable identifier supplied by the data source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
}

/// One record to insert: metadata plus field name to value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub metadata: RecordMetadata,
    #[serde(default)]
    pub values: BTreeMap<String, Option<String>>,
}

impl Record {
    pub fn new(model: &str) -> Self {
        Record {
            metadata: RecordMetadata {
                model: model.to_string(),
                external_id: None,
            },
            values: BTreeMap::new(),
        }
    }

    pub fn with_external_id(mut self, external_id: &str) -> Self {
        self.metadata.external_id = Some(external_id.to_string());
        self
    }

    pub fn with_value(mut self, field: &str, value: Option<&str>) -> Self {
        self.values
            .insert(field.to_string(), value.map(str::to_string));
        self
    }

    /// Build the parameterized INSERT for this record
    fn to_insert(&self) -> Result<(String, Vec<SqlValue>)> {
        if self.metadata.model.is_empty() {
            return Err(Error::EmptyRecordModel);
        }
        let table = validate_identifier(&self.metadata.model, "table name")?;

        let mut columns = Vec::with_capacity(self.values.len() + 1);
        let mut params = Vec::with_capacity(self.values.len() + 1);
        if let Some(external_id) = &self.metadata.external_id {
            columns.push(validate_identifier(EXTERNAL_ID_COLUMN, "column name")?.quoted());
            params.push(SqlValue::Text(external_id.clone()));
        }
        for (field, value) in &self.values {
            columns.push(validate_identifier(field, "column name")?.quoted());
            params.push(SqlValue::from(value.clone()));
        }

        let query = if columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", table.quoted())
        } else {
            let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table.quoted(),
                columns.join(", "),
                placeholders.join(", ")
            )
        };
        Ok((query, params))
    }
}

fn insert_one(state: &mut ConnectionState, record: &Record) -> Result<i64> {
    let (query, params) = record.to_insert()?;
    state.run(&query, &params)?;
    Ok(state.handle()?.last_insert_rowid())
}

impl Connection {
    /// Insert one record, returning its rowid
    ///
    /// Like [`execute`](Connection::execute), the insert is not committed.
    pub fn insert_record(&self, record: &Record) -> Result<i64> {
        let mut state = self.lock();
        insert_one(&mut state, record)
    }

    /// Insert a batch of records atomically
    ///
    /// Either every record is inserted or none is. The batch joins the
    /// pending transaction and is not committed.
    pub fn insert_records(&self, records: &[Record]) -> Result<Vec<i64>> {
        let mut state = self.lock();
        {
            let conn = state.handle()?;
            if conn.is_autocommit() {
                conn.execute_batch("BEGIN")?;
            }
            conn.execute_batch(&format!("SAVEPOINT {}", BATCH_SAVEPOINT))?;
        }

        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            match insert_one(&mut state, record) {
                Ok(id) => ids.push(id),
                Err(e) => {
                    state.handle()?.execute_batch(&format!(
                        "ROLLBACK TO {0}; RELEASE {0}",
                        BATCH_SAVEPOINT
                    ))?;
                    return Err(e);
                }
            }
        }

        state
            .handle()?
            .execute_batch(&format!("RELEASE {}", BATCH_SAVEPOINT))?;
        debug!("inserted {} records on connection {}", ids.len(), self.uid());
        Ok(ids)
    }
}
