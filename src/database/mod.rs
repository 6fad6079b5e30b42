//! Database module
//!
//! This module provides all database functionality for stat-log-db, organized into:
//!
//! - **core**: connection wrapper, connection registry, identifier/type
//!   validation, bind values and loader records
//! - **db**: the [`Database`] handle that owns configuration and the registry
//!
//! # Architecture
//!
//! ```text
//! database/
//! ├── core/            # Foundation
//! │   ├── connection   # Connection: execute/commit/fetch, create/drop table
//! │   ├── registry     # uid -> Connection map, integrity checks
//! │   ├── validate     # identifier + column type validation, quoting
//! │   ├── value        # SqlValue bind parameters and rows
//! │   └── record       # loader records -> parameterized INSERTs
//! │
//! └── db               # Database: options, init_db, close_db
//! ```
//!
//! # Usage
//!
//! ```rust
//! use stat_log_db::config::DatabaseOptions;
//! use stat_log_db::database::{Database, SqlValue};
//!
//! let db = Database::with_options(DatabaseOptions::memory());
//! let conn = db.init_db(true)?;
//!
//! conn.create_table("orders", &[("notes", "TEXT"), ("qty", "INTEGER")], false, true)?;
//! conn.execute(
//!     "INSERT INTO orders (notes, qty) VALUES (?, ?)",
//!     Some(&[SqlValue::from("hello"), SqlValue::from(3)]),
//! )?;
//! conn.execute("SELECT * FROM orders", None)?;
//! assert_eq!(conn.fetchall()?.len(), 1);
//!
//! db.close_db()?;
//! # Ok::<(), stat_log_db::Error>(())
//! ```

pub mod core;
mod db;

pub use self::core::{
    escape_identifier, is_reserved_word, validate_column_type, validate_identifier, Connection,
    Record, RecordMetadata, ResultSummary, Row, SqlValue, ValidatedColumnType,
    ValidatedIdentifier, ALLOWED_COLUMN_TYPES, EXTERNAL_ID_COLUMN, RESERVED_WORDS,
};
pub use db::Database;
