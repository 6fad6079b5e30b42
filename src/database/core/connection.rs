//! Database connection management
//!
//! A [`Connection`] wraps one SQLite handle owned by a [`Database`]. The
//! handle lives behind a mutex shared with the database's registry, so that
//! closing the database closes every connection the caller still holds.
//!
//! [`Database`]: crate::database::Database

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use rusqlite::params_from_iter;
use tracing::{debug, warn};

use crate::config::StorageMode;
use crate::database::core::validate::{
    quote_identifier, validate_column_type, validate_identifier, ValidatedIdentifier,
};
use crate::database::core::value::{Row, SqlValue};
use crate::database::db::DatabaseShared;
use crate::error::{Error, Result};

const TABLE_EXISTS_SQL: &str = "SELECT name FROM sqlite_master WHERE type='table' AND name=?1 \
     UNION ALL SELECT name FROM sqlite_temp_master WHERE type='table' AND name=?1";

const LIST_TABLES_SQL: &str = "SELECT name FROM sqlite_master \
     WHERE type='table' AND substr(name, 1, 7) <> 'sqlite_' ORDER BY name";

/// Statements that open an implicit transaction when none is active
const WRITE_KEYWORDS: &[&str] = &["INSERT", "UPDATE", "DELETE", "REPLACE"];

/// Lifecycle phase of a connection
enum Phase {
    Created,
    Open(rusqlite::Connection),
    Closed,
}

/// Rows produced by the last `execute`, consumed by `fetchone`/`fetchall`
struct ResultBuffer {
    columns: Vec<String>,
    rows: VecDeque<Row>,
}

/// Summary of one executed statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultSummary {
    /// Column names of the result, empty for statements that return no rows
    pub columns: Vec<String>,
    /// Number of rows buffered for fetching
    pub row_count: usize,
    /// Rows changed, as reported by SQLite (0 for row-returning statements)
    pub changes: usize,
}

pub(crate) struct ConnectionState {
    uid: String,
    phase: Phase,
    last_result: Option<ResultBuffer>,
}

impl ConnectionState {
    pub(crate) fn handle(&self) -> Result<&rusqlite::Connection> {
        match &self.phase {
            Phase::Open(conn) => Ok(conn),
            _ => Err(Error::NotOpen {
                uid: self.uid.clone(),
            }),
        }
    }

    /// Run one statement and buffer its rows as the last result
    pub(crate) fn run(&mut self, query: &str, params: &[SqlValue]) -> Result<ResultSummary> {
        if query.is_empty() {
            return Err(Error::EmptyQuery);
        }

        let (buffer, changes) = {
            let conn = self.handle()?;
            if opens_implicit_transaction(query) && conn.is_autocommit() {
                conn.execute_batch("BEGIN")?;
            }

            let mut stmt = conn.prepare(query)?;
            let columns: Vec<String> = stmt
                .column_names()
                .into_iter()
                .map(String::from)
                .collect();

            if columns.is_empty() {
                let changes = stmt.execute(params_from_iter(params.iter()))?;
                (
                    ResultBuffer {
                        columns,
                        rows: VecDeque::new(),
                    },
                    changes,
                )
            } else {
                let width = columns.len();
                let mut rows = VecDeque::new();
                let mut query_rows = stmt.query(params_from_iter(params.iter()))?;
                while let Some(row) = query_rows.next()? {
                    let values = (0..width)
                        .map(|i| row.get::<_, SqlValue>(i))
                        .collect::<rusqlite::Result<Row>>()?;
                    rows.push_back(values);
                }
                (ResultBuffer { columns, rows }, 0)
            }
        };

        let summary = ResultSummary {
            columns: buffer.columns.clone(),
            row_count: buffer.rows.len(),
            changes,
        };
        self.last_result = Some(buffer);
        Ok(summary)
    }

    pub(crate) fn commit(&self) -> Result<()> {
        let conn = self.handle()?;
        if !conn.is_autocommit() {
            conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    pub(crate) fn table_exists(&self, table: &ValidatedIdentifier) -> Result<bool> {
        let conn = self.handle()?;
        let mut stmt = conn.prepare(TABLE_EXISTS_SQL)?;
        Ok(stmt.exists([table.as_str()])?)
    }

    fn list_tables(&self) -> Result<Vec<String>> {
        let conn = self.handle()?;
        let mut stmt = conn.prepare(LIST_TABLES_SQL)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    /// `quoted` must already be an escaped identifier
    fn count_rows(&self, quoted: &str) -> Result<u64> {
        let count: i64 = self.handle()?.query_row(
            &format!("SELECT COUNT(*) FROM {}", quoted),
            [],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    fn result_buffer(&mut self) -> Result<&mut ResultBuffer> {
        if !matches!(self.phase, Phase::Open(_)) {
            return Err(Error::NotOpen {
                uid: self.uid.clone(),
            });
        }
        let uid = &self.uid;
        self.last_result
            .as_mut()
            .ok_or_else(|| Error::NoResultAvailable { uid: uid.clone() })
    }
}

/// Whether `query` modifies data
///
/// Plain statements are judged by their first keyword. A `WITH` statement
/// counts as a write if any later word is a write keyword.
fn opens_implicit_transaction(query: &str) -> bool {
    let is_write = |word: &str| WRITE_KEYWORDS.iter().any(|w| w.eq_ignore_ascii_case(word));
    let mut words = query
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty());
    match words.next() {
        Some(first) if first.eq_ignore_ascii_case("WITH") => words.any(is_write),
        Some(first) => is_write(first),
        None => false,
    }
}

/// A tracked connection to a [`Database`](crate::database::Database)
///
/// Created (already registered) by `Database::init_db`. All operations block
/// until SQLite responds. Once closed, a connection rejects every operation.
pub struct Connection {
    uid: String,
    state: Arc<Mutex<ConnectionState>>,
    db: Weak<DatabaseShared>,
}

impl Connection {
    pub(crate) fn new(db: Weak<DatabaseShared>) -> Self {
        let uid = uuid::Uuid::new_v4().to_string();
        Connection {
            state: Arc::new(Mutex::new(ConnectionState {
                uid: uid.clone(),
                phase: Phase::Created,
                last_result: None,
            })),
            uid,
            db,
        }
    }

    /// A second handle to the same connection, kept by the registry
    pub(crate) fn share(&self) -> Connection {
        Connection {
            uid: self.uid.clone(),
            state: Arc::clone(&self.state),
            db: Weak::clone(&self.db),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ConnectionState> {
        super::registry::acquire_lock(&self.state)
    }

    fn shared(&self) -> Result<Arc<DatabaseShared>> {
        self.db.upgrade().ok_or_else(|| Error::NotRegistered {
            uid: self.uid.clone(),
        })
    }

    /// Unique identifier, stable for the connection's lifetime
    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn is_open(&self) -> bool {
        matches!(self.lock().phase, Phase::Open(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.lock().phase, Phase::Closed)
    }

    /// Whether the owning database still tracks this connection
    pub fn is_registered(&self) -> bool {
        self.db
            .upgrade()
            .map(|db| db.registry.check_connection(&self.uid).is_ok())
            .unwrap_or(false)
    }

    /// Name of the owning database
    pub fn db_name(&self) -> Result<String> {
        Ok(self.shared()?.options.db_name.clone())
    }

    pub fn db_storage_mode(&self) -> Result<StorageMode> {
        Ok(self.shared()?.options.storage_mode)
    }

    /// Acquire the SQLite handle
    ///
    /// Uses the owning database's location and busy timeout.
    pub fn open(&self) -> Result<()> {
        let mut state = self.lock();
        match state.phase {
            Phase::Open(_) => {
                return Err(Error::AlreadyOpen {
                    uid: self.uid.clone(),
                })
            }
            Phase::Closed => {
                return Err(Error::ConnectionClosed {
                    uid: self.uid.clone(),
                })
            }
            Phase::Created => {}
        }

        let shared = self.shared()?;
        let options = &shared.options;
        let conn = match options.storage_mode {
            StorageMode::Memory => rusqlite::Connection::open_in_memory()?,
            StorageMode::File => rusqlite::Connection::open(options.location())?,
        };
        if let Some(timeout) = options.busy_timeout {
            conn.busy_timeout(timeout)?;
        }

        state.phase = Phase::Open(conn);
        state.last_result = None;
        debug!("opened connection {} to '{}'", self.uid, options.location());
        Ok(())
    }

    /// Enable foreign key enforcement if the database policy asks for it
    pub fn enforce_foreign_key_constraints(&self, commit: bool) -> Result<()> {
        let state = self.lock();
        let conn = state.handle()?;
        if self.shared()?.options.fkey_constraint {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            if commit {
                state.commit()?;
            }
        }
        Ok(())
    }

    /// Execute a SQL statement with positional parameters
    ///
    /// The statement's rows are buffered for [`fetchone`](Self::fetchone) and
    /// [`fetchall`](Self::fetchall). Nothing is committed; data-modifying
    /// statements open a transaction that lasts until [`commit`](Self::commit)
    /// or [`close`](Self::close). That includes `WITH ... INSERT` and other
    /// common table expressions wrapping a write.
    pub fn execute(&self, query: &str, params: Option<&[SqlValue]>) -> Result<ResultSummary> {
        if query.is_empty() {
            return Err(Error::EmptyQuery);
        }
        self.lock().run(query, params.unwrap_or(&[]))
    }

    /// Commit pending writes
    pub fn commit(&self) -> Result<()> {
        self.lock().commit()
    }

    /// Next row of the last result, `None` once exhausted
    pub fn fetchone(&self) -> Result<Option<Row>> {
        let mut state = self.lock();
        Ok(state.result_buffer()?.rows.pop_front())
    }

    /// All remaining rows of the last result
    pub fn fetchall(&self) -> Result<Vec<Row>> {
        let mut state = self.lock();
        Ok(state.result_buffer()?.rows.drain(..).collect())
    }

    /// Column names of the last result
    pub fn columns(&self) -> Result<Vec<String>> {
        let mut state = self.lock();
        Ok(state.result_buffer()?.columns.clone())
    }

    /// Create a table from caller-supplied names and types
    ///
    /// An `id INTEGER PRIMARY KEY AUTOINCREMENT` column is always prepended.
    /// Every identifier and type is validated before any SQL reaches SQLite.
    pub fn create_table(
        &self,
        table_name: &str,
        columns: &[(&str, &str)],
        temp: bool,
        raise_if_exists: bool,
    ) -> Result<()> {
        let table = validate_identifier(table_name, "table name")?;
        let mut column_defs = Vec::with_capacity(columns.len() + 1);
        column_defs.push("id INTEGER PRIMARY KEY AUTOINCREMENT".to_string());
        for (name, col_type) in columns {
            let name = validate_identifier(name, "column name")?;
            let col_type = validate_column_type(col_type)?;
            column_defs.push(format!("{} {}", name.quoted(), col_type));
        }

        let mut state = self.lock();
        if raise_if_exists && state.table_exists(&table)? {
            return Err(Error::TableAlreadyExists {
                table: table.to_string(),
            });
        }

        let query = format!(
            "CREATE{} TABLE IF NOT EXISTS {} ({});",
            if temp { " TEMPORARY" } else { "" },
            table.quoted(),
            column_defs.join(", ")
        );
        state.run(&query, &[])?;
        debug!("created table {} on connection {}", table, self.uid);
        Ok(())
    }

    /// Drop a table by name
    ///
    /// A missing table is only an error when `raise_if_not_exists` is set.
    pub fn drop_table(&self, table_name: &str, raise_if_not_exists: bool) -> Result<()> {
        let table = validate_identifier(table_name, "table name")?;

        let mut state = self.lock();
        if raise_if_not_exists && !state.table_exists(&table)? {
            return Err(Error::TableNotFound {
                table: table.to_string(),
            });
        }

        state.run(&format!("DROP TABLE IF EXISTS {};", table.quoted()), &[])?;
        debug!("dropped table {} on connection {}", table, self.uid);
        Ok(())
    }

    /// Check if a table exists in the main or temp schema
    pub fn table_exists(&self, table_name: &str) -> Result<bool> {
        let table = validate_identifier(table_name, "table name")?;
        self.lock().table_exists(&table)
    }

    /// Get the row count for a table
    pub fn table_count(&self, table_name: &str) -> Result<u64> {
        let table = validate_identifier(table_name, "table name")?;
        self.lock().count_rows(&table.quoted())
    }

    /// Names of all user tables in the main schema
    pub fn list_tables(&self) -> Result<Vec<String>> {
        self.lock().list_tables()
    }

    /// Every user table in the main schema with its row count
    ///
    /// Names come from the catalog, so tables created through raw SQL under
    /// names the validator would reject (e.g. `"order"`) are counted too.
    pub fn table_counts(&self) -> Result<Vec<(String, u64)>> {
        let state = self.lock();
        state
            .list_tables()?
            .into_iter()
            .map(|name| {
                let count = state.count_rows(&quote_identifier(&name))?;
                Ok((name, count))
            })
            .collect()
    }

    /// Commit, release the SQLite handle and move to the closed state
    ///
    /// If the commit fails (e.g. a deferred foreign key violation), the
    /// pending transaction is rolled back and the handle is still released
    /// before the commit error is returned.
    pub fn close(&self) -> Result<()> {
        let mut state = self.lock();
        state.handle()?;
        let committed = state.commit();
        if let Err(e) = &committed {
            warn!("commit on close of connection {} failed, rolling back: {}", self.uid, e);
            let conn = state.handle()?;
            if !conn.is_autocommit() {
                if let Err(e) = conn.execute_batch("ROLLBACK") {
                    warn!("rollback on connection {} failed: {}", self.uid, e);
                }
            }
        }

        let phase = std::mem::replace(&mut state.phase, Phase::Closed);
        state.last_result = None;
        let released = match phase {
            Phase::Open(conn) => conn.close().map_err(|(_, e)| Error::Engine(e)),
            _ => Ok(()),
        };
        debug!("closed connection {}", self.uid);
        committed.and(released)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("uid", &self.uid)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseOptions;
    use crate::database::Database;
    use crate::error::ErrorKind;

    fn mem_db() -> (Database, Connection) {
        let db = Database::with_options(DatabaseOptions::memory());
        let conn = db.init_db(true).unwrap();
        (db, conn)
    }

    #[test]
    fn test_implicit_transaction_keywords() {
        assert!(opens_implicit_transaction("INSERT INTO t VALUES (1)"));
        assert!(opens_implicit_transaction("  update t set a = 1"));
        assert!(!opens_implicit_transaction("SELECT 1"));
        assert!(!opens_implicit_transaction("CREATE TABLE t (a)"));
        assert!(!opens_implicit_transaction("PRAGMA foreign_keys = ON"));
        assert!(!opens_implicit_transaction(""));
    }

    #[test]
    fn test_implicit_transaction_with_clause() {
        assert!(opens_implicit_transaction(
            "WITH src AS (SELECT 1 AS n) INSERT INTO t (n) SELECT n FROM src"
        ));
        assert!(opens_implicit_transaction(
            "with stale(id) as (select id from t) delete from t where id in stale"
        ));
        assert!(!opens_implicit_transaction(
            "WITH src AS (SELECT 1 AS n) SELECT n FROM src"
        ));
    }

    #[test]
    fn test_with_insert_stays_pending() {
        let (_db, conn) = mem_db();
        conn.create_table("counter", &[("n", "INTEGER")], false, true)
            .unwrap();
        conn.execute(
            "WITH src AS (SELECT 7 AS n) INSERT INTO counter (n) SELECT n FROM src",
            None,
        )
        .unwrap();
        assert!(!conn.lock().handle().unwrap().is_autocommit());
        conn.commit().unwrap();
        assert!(conn.lock().handle().unwrap().is_autocommit());
        assert_eq!(conn.table_count("counter").unwrap(), 1);
    }

    #[test]
    fn test_close_releases_handle_on_failed_commit() {
        let (db, conn) = mem_db();
        conn.execute("CREATE TABLE parent (id INTEGER PRIMARY KEY)", None)
            .unwrap();
        conn.execute(
            "CREATE TABLE child (parent_id INTEGER REFERENCES parent(id) \
             DEFERRABLE INITIALLY DEFERRED)",
            None,
        )
        .unwrap();
        conn.execute("INSERT INTO child (parent_id) VALUES (99)", None)
            .unwrap();

        assert_eq!(conn.close().unwrap_err().kind(), ErrorKind::Engine);
        assert!(conn.is_closed());
        assert!(matches!(
            conn.execute("SELECT 1", None).unwrap_err(),
            Error::NotOpen { .. }
        ));
        db.close_db().unwrap();
    }

    #[test]
    fn test_execute() {
        let (_db, conn) = mem_db();
        let summary = conn
            .execute("CREATE TABLE test (id INTEGER PRIMARY KEY)", None)
            .unwrap();
        assert!(summary.columns.is_empty());
        assert_eq!(summary.row_count, 0);
    }

    #[test]
    fn test_empty_query() {
        let (_db, conn) = mem_db();
        let err = conn.execute("", None).unwrap_err();
        assert!(matches!(err, Error::EmptyQuery));
    }

    #[test]
    fn test_fetch_before_execute() {
        let (_db, conn) = mem_db();
        let err = conn.fetchone().unwrap_err();
        assert!(matches!(err, Error::NoResultAvailable { .. }));
        assert_eq!(conn.fetchall().unwrap_err().kind(), ErrorKind::ConnectionState);
    }

    #[test]
    fn test_fetchone_then_fetchall() {
        let (_db, conn) = mem_db();
        conn.execute("SELECT 1 AS a UNION ALL SELECT 2 UNION ALL SELECT 3", None)
            .unwrap();
        assert_eq!(conn.columns().unwrap(), vec!["a".to_string()]);
        assert_eq!(conn.fetchone().unwrap(), Some(vec![SqlValue::Integer(1)]));
        assert_eq!(
            conn.fetchall().unwrap(),
            vec![vec![SqlValue::Integer(2)], vec![SqlValue::Integer(3)]]
        );
        assert_eq!(conn.fetchone().unwrap(), None);
        assert!(conn.fetchall().unwrap().is_empty());
    }

    #[test]
    fn test_positional_params() {
        let (_db, conn) = mem_db();
        conn.execute(
            "SELECT ?1 + ?2, ?3",
            Some(&[SqlValue::from(2), SqlValue::from(3), SqlValue::Null]),
        )
        .unwrap();
        assert_eq!(
            conn.fetchall().unwrap(),
            vec![vec![SqlValue::Integer(5), SqlValue::Null]]
        );
    }

    #[test]
    fn test_open_twice() {
        let (_db, conn) = mem_db();
        let err = conn.open().unwrap_err();
        assert!(matches!(err, Error::AlreadyOpen { .. }));
    }

    #[test]
    fn test_close_then_operations_fail() {
        let (db, conn) = mem_db();
        conn.close().unwrap();
        assert!(conn.is_closed());
        assert!(matches!(
            conn.execute("SELECT 1", None).unwrap_err(),
            Error::NotOpen { .. }
        ));
        assert!(matches!(conn.fetchall().unwrap_err(), Error::NotOpen { .. }));
        assert!(matches!(conn.close().unwrap_err(), Error::NotOpen { .. }));
        assert!(matches!(
            conn.open().unwrap_err(),
            Error::ConnectionClosed { .. }
        ));
        db.close_db().unwrap();
    }

    #[test]
    fn test_foreign_keys_enforced() {
        let (_db, conn) = mem_db();
        conn.execute("PRAGMA foreign_keys", None).unwrap();
        assert_eq!(conn.fetchone().unwrap(), Some(vec![SqlValue::Integer(1)]));
    }

    #[test]
    fn test_foreign_keys_policy_disabled() {
        let db = Database::with_options(DatabaseOptions::memory().with_fkey_constraint(false));
        let conn = db.init_db(true).unwrap();
        conn.execute("PRAGMA foreign_keys", None).unwrap();
        assert_eq!(conn.fetchone().unwrap(), Some(vec![SqlValue::Integer(0)]));
    }

    #[test]
    fn test_table_exists() {
        let (_db, conn) = mem_db();
        conn.create_table("test_table", &[("notes", "TEXT")], false, true)
            .unwrap();

        assert!(conn.table_exists("test_table").unwrap());
        assert!(!conn.table_exists("nonexistent_table").unwrap());
    }

    #[test]
    fn test_table_count() {
        let (_db, conn) = mem_db();
        conn.create_table("test_table", &[("n", "INTEGER")], false, true)
            .unwrap();
        conn.execute("INSERT INTO test_table (n) VALUES (1), (2), (3)", None)
            .unwrap();

        assert_eq!(conn.table_count("test_table").unwrap(), 3);
        assert!(conn.table_count("test_table; DROP TABLE x").is_err());
    }

    #[test]
    fn test_temp_table_existence() {
        let (_db, conn) = mem_db();
        conn.create_table("scratch", &[("v", "REAL")], true, true)
            .unwrap();
        assert!(conn.table_exists("scratch").unwrap());
        let err = conn
            .create_table("scratch", &[("v", "REAL")], true, true)
            .unwrap_err();
        assert!(matches!(err, Error::TableAlreadyExists { .. }));
        assert!(conn.list_tables().unwrap().is_empty());
    }

    #[test]
    fn test_column_named_id_rejected_by_engine() {
        let (_db, conn) = mem_db();
        let err = conn
            .create_table("dup", &[("id", "INTEGER")], false, false)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Engine);
    }

    #[test]
    fn test_list_tables_keeps_sqlite_like_names() {
        let (_db, conn) = mem_db();
        conn.execute("CREATE TABLE sqlitefoo (a)", None).unwrap();
        conn.execute("CREATE TABLE sqlite1 (a)", None).unwrap();
        conn.create_table("plain", &[("v", "TEXT")], false, true)
            .unwrap();
        assert_eq!(
            conn.list_tables().unwrap(),
            vec![
                "plain".to_string(),
                "sqlite1".to_string(),
                "sqlitefoo".to_string()
            ]
        );
    }

    #[test]
    fn test_table_counts_include_unvalidated_names() {
        let (_db, conn) = mem_db();
        conn.execute("CREATE TABLE \"order\" (a)", None).unwrap();
        conn.execute("INSERT INTO \"order\" (a) VALUES (1), (2)", None)
            .unwrap();
        conn.execute("CREATE TABLE \"odd\"\"name\" (a)", None).unwrap();
        conn.create_table("events", &[("v", "TEXT")], false, true)
            .unwrap();

        assert!(conn.table_count("order").is_err());
        assert_eq!(
            conn.table_counts().unwrap(),
            vec![
                ("events".to_string(), 0),
                ("odd\"name".to_string(), 0),
                ("order".to_string(), 2),
            ]
        );
    }

    #[test]
    fn test_list_tables() {
        let (_db, conn) = mem_db();
        conn.create_table("beta", &[("v", "TEXT")], false, true).unwrap();
        conn.create_table("alpha", &[("v", "TEXT")], false, true).unwrap();
        assert_eq!(
            conn.list_tables().unwrap(),
            vec!["alpha".to_string(), "beta".to_string()]
        );
    }
}
