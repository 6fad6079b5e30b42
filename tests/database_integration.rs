#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::HashMap;

use stat_log_db::{
    Database, DatabaseOptions, Error, ErrorKind, OptionValue, Record, SqlValue,
};

fn memory_db() -> Database {
    let mut options = HashMap::new();
    options.insert("is_mem".to_string(), OptionValue::Bool(true));
    Database::new(&options).expect("in-memory database")
}

#[test]
fn orders_table_round_trip() {
    let db = memory_db();
    let conn = db.init_db(true).unwrap();

    conn.create_table(
        "orders",
        &[("notes", "TEXT"), ("qty", "INTEGER")],
        false,
        true,
    )
    .unwrap();
    conn.execute(
        "INSERT INTO orders (notes, qty) VALUES (?, ?)",
        Some(&[SqlValue::from("hello"), SqlValue::from(3)]),
    )
    .unwrap();
    conn.commit().unwrap();

    let summary = conn.execute("SELECT * FROM orders", None).unwrap();
    assert_eq!(summary.columns, vec!["id", "notes", "qty"]);
    assert_eq!(
        conn.fetchall().unwrap(),
        vec![vec![
            SqlValue::Integer(1),
            SqlValue::Text("hello".to_string()),
            SqlValue::Integer(3),
        ]]
    );

    db.close_db().unwrap();
    assert_eq!(db.connection_count(), 0);
}

#[test]
fn reserved_table_name_never_reaches_sqlite() {
    let db = memory_db();
    let conn = db.init_db(true).unwrap();

    for name in ["select", "SELECT", "Select"] {
        let err = conn
            .create_table(name, &[("a", "TEXT")], false, true)
            .unwrap_err();
        assert!(matches!(err, Error::ReservedWord { .. }), "{name}: {err}");
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
    assert!(conn.list_tables().unwrap().is_empty());
}

#[test]
fn hostile_column_and_type_rejected() {
    let db = memory_db();
    let conn = db.init_db(true).unwrap();

    let err = conn
        .create_table("t", &[("a); DROP TABLE t; --", "TEXT")], false, true)
        .unwrap_err();
    assert!(matches!(err, Error::MalformedIdentifier { .. }));

    let err = conn
        .create_table("t", &[("a", "TEXT); DROP TABLE t; --")], false, true)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = conn
        .create_table("t", &[("a", "BOGUS")], false, true)
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedType { .. }));

    assert!(!conn.table_exists("t").unwrap());
}

#[test]
fn create_and_drop_conflicts() {
    let db = memory_db();
    let conn = db.init_db(true).unwrap();

    conn.create_table("events", &[("name", "TEXT")], false, true)
        .unwrap();
    let err = conn
        .create_table("events", &[("name", "TEXT")], false, true)
        .unwrap_err();
    assert!(matches!(err, Error::TableAlreadyExists { .. }));
    assert_eq!(err.kind(), ErrorKind::ExistenceConflict);
    conn.create_table("events", &[("name", "TEXT")], false, false)
        .unwrap();

    conn.drop_table("events", true).unwrap();
    let err = conn.drop_table("events", true).unwrap_err();
    assert!(matches!(err, Error::TableNotFound { .. }));
    assert_eq!(err.kind(), ErrorKind::ExistenceConflict);
    conn.drop_table("events", false).unwrap();
}

#[test]
fn drop_nonexistent_table() {
    let db = memory_db();
    let conn = db.init_db(true).unwrap();
    let summary = conn.execute("SELECT 1", None).unwrap();
    assert_eq!(summary.row_count, 1);
    conn.drop_table("nonexistent", false).unwrap();
    assert_eq!(conn.columns().unwrap(), Vec::<String>::new());
    assert!(conn.list_tables().unwrap().is_empty());
    assert!(matches!(
        conn.drop_table("nonexistent", true).unwrap_err(),
        Error::TableNotFound { .. }
    ));
}

#[test]
fn temporary_table_is_visible() {
    let db = memory_db();
    let conn = db.init_db(true).unwrap();
    conn.create_table("scratch", &[("v", "REAL")], true, true)
        .unwrap();
    assert!(conn.table_exists("scratch").unwrap());
    assert!(matches!(
        conn.create_table("scratch", &[("v", "REAL")], true, true)
            .unwrap_err(),
        Error::TableAlreadyExists { .. }
    ));
    conn.drop_table("scratch", true).unwrap();
}

#[test]
fn in_memory_allows_single_connection() {
    let db = memory_db();
    let _conn = db.init_db(true).unwrap();
    let err = db.init_db(true).unwrap_err();
    assert!(matches!(err, Error::TooManyConnections { .. }));
    assert_eq!(db.connection_count(), 1);
    db.check_registry_integrity().unwrap();
}

#[test]
fn close_db_releases_file_connections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stat_log.db");
    let db = Database::with_options(DatabaseOptions::file(path.to_str().unwrap()));

    let first = db.init_db(true).unwrap();
    first
        .create_table("log", &[("message", "TEXT")], false, true)
        .unwrap();
    first.commit().unwrap();

    let others: Vec<_> = (0..4).map(|_| db.init_db(true).unwrap()).collect();
    others[0].close().unwrap();
    assert_eq!(db.connection_count(), 5);

    db.close_db().unwrap();
    assert_eq!(db.connection_count(), 0);
    assert!(first.is_closed());
    assert!(others.iter().all(|c| c.is_closed() && !c.is_registered()));

    let conn = db.init_db(true).unwrap();
    assert!(conn.table_exists("log").unwrap());
    db.close_db().unwrap();
}

#[test]
fn uncommitted_writes_survive_close() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pending.db");
    let db = Database::with_options(DatabaseOptions::file(path.to_str().unwrap()));

    let conn = db.init_db(true).unwrap();
    conn.create_table("log", &[("message", "TEXT")], false, true)
        .unwrap();
    conn.execute("INSERT INTO log (message) VALUES ('pending')", None)
        .unwrap();
    db.close_connection(&conn).unwrap();

    let count = db.with_connection(|c| c.table_count("log")).unwrap();
    assert_eq!(count, 1);
}

#[test]
fn connection_state_errors() {
    let db = memory_db();
    let conn = db.init_db(true).unwrap();

    assert!(matches!(conn.open().unwrap_err(), Error::AlreadyOpen { .. }));
    assert!(matches!(
        conn.fetchone().unwrap_err(),
        Error::NoResultAvailable { .. }
    ));
    assert!(matches!(
        conn.execute("", None).unwrap_err(),
        Error::EmptyQuery
    ));

    conn.close().unwrap();
    assert!(matches!(conn.close().unwrap_err(), Error::NotOpen { .. }));
    assert_eq!(
        conn.execute("SELECT 1", None).unwrap_err().kind(),
        ErrorKind::ConnectionState
    );
    db.close_db().unwrap();
}

#[test]
fn foreign_keys_enforced_by_default() {
    let db = memory_db();
    let conn = db.init_db(true).unwrap();
    conn.execute("PRAGMA foreign_keys", None).unwrap();
    assert_eq!(conn.fetchone().unwrap(), Some(vec![SqlValue::Integer(1)]));

    conn.execute(
        "CREATE TABLE parent (id INTEGER PRIMARY KEY)",
        None,
    )
    .unwrap();
    conn.execute(
        "CREATE TABLE child (id INTEGER PRIMARY KEY, parent_id INTEGER REFERENCES parent(id))",
        None,
    )
    .unwrap();
    let err = conn
        .execute("INSERT INTO child (parent_id) VALUES (42)", None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Engine);
}

#[test]
fn foreign_keys_can_be_disabled() {
    let mut options = HashMap::new();
    options.insert("is_mem".to_string(), OptionValue::Bool(true));
    options.insert("fkey_constraint".to_string(), OptionValue::Bool(false));
    let db = Database::new(&options).unwrap();
    let conn = db.init_db(true).unwrap();
    conn.execute("PRAGMA foreign_keys", None).unwrap();
    assert_eq!(conn.fetchone().unwrap(), Some(vec![SqlValue::Integer(0)]));
}

#[test]
fn invalid_options_rejected() {
    let mut options = HashMap::new();
    options.insert("is_mem".to_string(), OptionValue::Text("yes".to_string()));
    let err = Database::new(&options).unwrap_err();
    assert!(matches!(err, Error::OptionTypeMismatch { .. }));
    assert_eq!(err.kind(), ErrorKind::Configuration);

    let mut options = HashMap::new();
    options.insert("path".to_string(), OptionValue::Text("x.db".to_string()));
    assert!(matches!(
        Database::new(&options).unwrap_err(),
        Error::InvalidOption { .. }
    ));
}

#[test]
fn records_load_as_one_batch() {
    let db = memory_db();
    let conn = db.init_db(true).unwrap();
    conn.create_table(
        "tag",
        &[("external_id", "TEXT"), ("name", "VARCHAR(64)")],
        false,
        true,
    )
    .unwrap();

    let records: Vec<Record> = serde_json::from_str(
        r#"[
            {"metadata": {"model": "tag", "external_id": "tag_error"}, "values": {"name": "error"}},
            {"metadata": {"model": "tag", "external_id": "tag_retry"}, "values": {"name": null}}
        ]"#,
    )
    .unwrap();
    assert_eq!(conn.insert_records(&records).unwrap(), vec![1, 2]);
    conn.commit().unwrap();

    conn.execute("SELECT name FROM tag ORDER BY id", None).unwrap();
    assert_eq!(
        conn.fetchall().unwrap(),
        vec![vec![SqlValue::Text("error".into())], vec![SqlValue::Null]]
    );
}

#[test]
fn concurrent_connections_share_one_registry() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("threads.db");
    let db = Database::with_options(
        DatabaseOptions::file(path.to_str().unwrap())
            .with_busy_timeout(std::time::Duration::from_secs(5)),
    );
    db.init_db_auto_close().unwrap();

    let kept: Vec<_> = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(|| {
                    for _ in 0..10 {
                        let conn = db.init_db(true).unwrap();
                        conn.execute("SELECT 1", None).unwrap();
                        db.check_connection_integrity(conn.uid()).unwrap();
                        db.close_connection(&conn).unwrap();
                    }
                    db.init_db(true).unwrap()
                })
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    assert_eq!(db.connection_count(), 8);
    db.check_registry_integrity().unwrap();
    assert!(kept.iter().all(|c| c.is_open() && c.is_registered()));

    db.close_db().unwrap();
    assert_eq!(db.connection_count(), 0);
    assert!(kept.iter().all(|c| c.is_closed()));
}

#[test]
fn failed_close_never_leaves_two_memory_connections() {
    let db = memory_db();
    let first = db.init_db(true).unwrap();
    first
        .execute("CREATE TABLE parent (id INTEGER PRIMARY KEY)", None)
        .unwrap();
    first
        .execute(
            "CREATE TABLE child (parent_id INTEGER REFERENCES parent(id) \
             DEFERRABLE INITIALLY DEFERRED)",
            None,
        )
        .unwrap();
    first
        .execute("INSERT INTO child (parent_id) VALUES (42)", None)
        .unwrap();

    let err = db.close_db().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Engine);
    assert!(!first.is_open());
    assert!(!first.is_registered());
    assert_eq!(db.connection_count(), 0);
    assert_eq!(
        first.execute("SELECT 1", None).unwrap_err().kind(),
        ErrorKind::ConnectionState
    );

    let _second = db.init_db(true).unwrap();
    assert_eq!(db.connection_count(), 1);
    db.check_registry_integrity().unwrap();
}

#[test]
fn table_counts_cover_every_catalog_name() {
    let db = memory_db();
    let conn = db.init_db(true).unwrap();
    conn.execute("CREATE TABLE \"order\" (a)", None).unwrap();
    conn.execute("CREATE TABLE sqlitefoo (a)", None).unwrap();
    conn.execute("INSERT INTO sqlitefoo (a) VALUES (1)", None)
        .unwrap();
    conn.commit().unwrap();

    assert_eq!(conn.list_tables().unwrap(), vec!["order", "sqlitefoo"]);
    assert_eq!(
        conn.table_counts().unwrap(),
        vec![("order".to_string(), 0), ("sqlitefoo".to_string(), 1)]
    );
}
