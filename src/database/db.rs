//! Database handle
//!
//! A [`Database`] holds configuration and is the factory for
//! [`Connection`]s. Every connection it creates stays in its registry until
//! explicitly unregistered, so nothing can be left open by accident.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{DatabaseOptions, OptionValue, StorageMode};
use crate::database::core::registry::Registry;
use crate::database::core::Connection;
use crate::error::{Error, Result};

/// State shared between a database and its connections' back references
pub(crate) struct DatabaseShared {
    pub(crate) options: DatabaseOptions,
    pub(crate) registry: Registry,
}

pub struct Database {
    shared: Arc<DatabaseShared>,
}

impl Database {
    /// Create a database from a caller-supplied option map
    ///
    /// Recognized keys are `db_name` (str), `is_mem` (bool),
    /// `fkey_constraint` (bool) and `busy_timeout_ms` (int).
    pub fn new(options: &HashMap<String, OptionValue>) -> Result<Self> {
        Ok(Self::with_options(DatabaseOptions::from_map(options)?))
    }

    /// Create a database from already-validated options
    pub fn with_options(options: DatabaseOptions) -> Self {
        let registry = Registry::new(options.storage_mode);
        Database {
            shared: Arc::new(DatabaseShared { options, registry }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.options.db_name
    }

    /// `:memory:` or the file name the database is stored in
    pub fn location(&self) -> String {
        self.shared.options.location()
    }

    pub fn storage_mode(&self) -> StorageMode {
        self.shared.options.storage_mode
    }

    pub fn in_memory(&self) -> bool {
        self.shared.options.is_memory()
    }

    pub fn is_file(&self) -> bool {
        !self.in_memory()
    }

    pub fn fkey_constraint(&self) -> bool {
        self.shared.options.fkey_constraint
    }

    pub fn options(&self) -> &DatabaseOptions {
        &self.shared.options
    }

    /// Number of currently registered connections
    pub fn connection_count(&self) -> usize {
        self.shared.registry.len()
    }

    /// Create and register a connection without opening it
    fn register_connection(&self) -> Result<Connection> {
        let connection = Connection::new(Arc::downgrade(&self.shared));
        self.shared.registry.register(&connection)?;
        self.shared.registry.check_connection(connection.uid())?;
        Ok(connection)
    }

    fn unregister_connection(&self, uid: &str) -> Result<()> {
        self.shared.registry.unregister(uid)?;
        Ok(())
    }

    /// Open a new registered connection
    ///
    /// Foreign key enforcement is applied per the database policy and,
    /// with `commit_fkey`, committed immediately. If opening fails the
    /// connection is unregistered again before the error is returned.
    pub fn init_db(&self, commit_fkey: bool) -> Result<Connection> {
        let connection = self.register_connection()?;
        let opened = connection
            .open()
            .and_then(|_| connection.enforce_foreign_key_constraints(commit_fkey));
        if let Err(e) = opened {
            if connection.is_open() {
                if let Err(close_err) = connection.close() {
                    warn!(
                        "failed to close connection {} after failed init: {}",
                        connection.uid(),
                        close_err
                    );
                }
            }
            self.unregister_connection(connection.uid())?;
            return Err(e);
        }
        Ok(connection)
    }

    /// Open, close and unregister a connection in one step
    ///
    /// Creates the database file if needed. Forbidden for in-memory
    /// databases, which would be destroyed immediately.
    pub fn init_db_auto_close(&self) -> Result<()> {
        if self.in_memory() {
            return Err(Error::InMemoryCannotAutoClose);
        }
        // close() commits, so the foreign key pragma needs no separate commit
        let connection = self.init_db(false)?;
        connection.close()?;
        self.unregister_connection(connection.uid())
    }

    /// Run `f` on a fresh connection that is closed and unregistered on
    /// every exit path
    ///
    /// `f`'s error wins over a close error. Forbidden for in-memory databases.
    pub fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        if self.in_memory() {
            return Err(Error::InMemoryCannotAutoClose);
        }
        let connection = self.init_db(true)?;
        let result = f(&connection);
        let released = self.close_connection(&connection);
        match (result, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), _) => Err(e),
        }
    }

    /// Close a connection if it is still open and unregister it
    ///
    /// A connection whose handle could not be released stays registered.
    pub fn close_connection(&self, connection: &Connection) -> Result<()> {
        self.shared.registry.check_connection(connection.uid())?;
        let closed = if connection.is_open() {
            connection.close()
        } else {
            Ok(())
        };
        if !connection.is_open() {
            self.unregister_connection(connection.uid())?;
        }
        closed
    }

    /// Check that a connection is registered under its own uid
    pub fn check_connection_integrity(&self, uid: &str) -> Result<()> {
        self.shared.registry.check_connection(uid)
    }

    /// Check every registry entry
    ///
    /// Fails with `RegistryKeyMismatch` for an entry stored under the wrong
    /// key, and with `TooManyConnections` if an in-memory database tracks
    /// more than one connection.
    pub fn check_registry_integrity(&self) -> Result<()> {
        self.shared.registry.check_integrity()
    }

    /// Close and unregister every registered connection
    ///
    /// Connections the caller already closed are only unregistered. All
    /// connections are released even if one fails to close; the first
    /// close error is returned afterwards. A connection still holding its
    /// handle stays registered and the call fails with `IncompleteClosure`.
    pub fn close_db(&self) -> Result<()> {
        self.check_registry_integrity()?;

        let connections = self.shared.registry.snapshot();
        let mut first_error = None;
        for connection in &connections {
            if connection.is_open() {
                if let Err(e) = connection.close() {
                    warn!("failed to close connection {}: {}", connection.uid(), e);
                    first_error.get_or_insert(e);
                }
            }
        }
        for connection in connections.iter().filter(|c| !c.is_open()) {
            self.unregister_connection(connection.uid())?;
        }

        let remaining = self.connection_count();
        if remaining != 0 {
            if let Some(e) = first_error {
                warn!("close_db left {} connections open: {}", remaining, e);
            }
            return Err(Error::IncompleteClosure { remaining });
        }
        info!(
            "closed database '{}' ({} connections released)",
            self.name(),
            connections.len()
        );

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        let remaining = self.connection_count();
        if remaining == 0 {
            return;
        }
        warn!(
            "database '{}' dropped with {} registered connections, closing them",
            self.name(),
            remaining
        );
        if let Err(e) = self.close_db() {
            debug!("close on drop failed: {}", e);
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name())
            .field("storage_mode", &self.storage_mode())
            .field("connections", &self.connection_count())
            .finish()
    }
}
