//! Core database infrastructure
//!
//! This module provides the foundational database components:
//! - `Connection`: tracked SQLite connection with execute/fetch and DDL helpers
//! - `validate`: identifier and column type validation for dynamic DDL
//! - `SqlValue`: tagged bind parameter / result value
//! - `Record`: already-parsed loader records and their insertion

mod connection;
mod record;
pub(crate) mod registry;
pub mod validate;
mod value;

pub use connection::{Connection, ResultSummary};
pub use record::{Record, RecordMetadata, EXTERNAL_ID_COLUMN};
pub use validate::{
    escape_identifier, is_reserved_word, validate_column_type, validate_identifier,
    ValidatedColumnType, ValidatedIdentifier, ALLOWED_COLUMN_TYPES, RESERVED_WORDS,
};
pub use value::{Row, SqlValue};
