#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! stat-log-db - a thin data-access layer over SQLite
//!
//! stat-log-db tracks the lifecycle of SQLite connections and builds DDL from
//! caller-supplied table names, column names and column types without opening
//! the door to SQL injection.
//!
//! # Feature Flags
//!
//! | Feature | Description | Key Dependencies |
//! |---------|-------------|------------------|
//! | (none) | Library: database, validation, configuration | `rusqlite`, `config` |
//! | `cli` | The `sldb` binary | `clap`, `tabled`, `tracing-subscriber` |
//!
//! # Architecture
//!
//! - **[`database`]**: `Database`, `Connection`, validators, bind values
//! - **[`config`]**: option validation and file/environment configuration
//! - **[`error`]**: the crate's error type and error categories
//! - **[`output`]**: JSON and pipe-separated rendering of result rows
//!
//! # Quick Start
//!
//! ```rust
//! use std::collections::HashMap;
//! use stat_log_db::{Database, Error, OptionValue};
//!
//! let mut options = HashMap::new();
//! options.insert("is_mem".to_string(), OptionValue::Bool(true));
//! let db = Database::new(&options)?;
//!
//! let conn = db.init_db(true)?;
//! conn.create_table("log_level", &[("name", "TEXT")], false, true)?;
//!
//! // Identifiers are validated before anything reaches SQLite
//! let err = conn.create_table("select", &[("name", "TEXT")], false, true);
//! assert!(matches!(err, Err(Error::ReservedWord { .. })));
//!
//! db.close_db()?;
//! # Ok::<(), Error>(())
//! ```

pub mod config;
pub mod database;
pub mod error;
pub mod output;

// =============================================================================
// Configuration
// =============================================================================

pub use crate::config::{DatabaseOptions, OptionValue, StatLogConfig, StorageMode};

// =============================================================================
// Database Module - Re-export commonly used types
// =============================================================================

pub use database::{
    validate_column_type, validate_identifier, Connection, Database, Record, RecordMetadata,
    ResultSummary, Row, SqlValue,
};

// =============================================================================
// Errors
// =============================================================================

pub use error::{Error, ErrorKind, Result};
pub use output::OutputFormat;
