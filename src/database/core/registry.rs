//! Connection registry
//!
//! Tracks every [`Connection`] a database has handed out, keyed by uid. The
//! registry is the only state shared between threads using one database, so
//! every access goes through its mutex.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::config::StorageMode;
use crate::database::core::connection::Connection;
use crate::error::{Error, Result};

/// Acquire a mutex, recovering the inner value if a previous holder panicked
pub(crate) fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("stat-log-db mutex was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

pub(crate) struct Registry {
    storage_mode: StorageMode,
    entries: Mutex<HashMap<String, Connection>>,
}

impl Registry {
    pub(crate) fn new(storage_mode: StorageMode) -> Self {
        Registry {
            storage_mode,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn len(&self) -> usize {
        acquire_lock(&self.entries).len()
    }

    /// Track a new connection
    ///
    /// In-memory databases accept a single entry at a time.
    pub(crate) fn register(&self, connection: &Connection) -> Result<()> {
        let mut entries = acquire_lock(&self.entries);
        if entries.contains_key(connection.uid()) {
            return Err(Error::DuplicateRegistration {
                uid: connection.uid().to_string(),
            });
        }
        if self.storage_mode == StorageMode::Memory && !entries.is_empty() {
            return Err(Error::TooManyConnections {
                count: entries.len() + 1,
            });
        }
        entries.insert(connection.uid().to_string(), connection.share());
        debug!(
            "registered connection {} ({} active)",
            connection.uid(),
            entries.len()
        );
        Ok(())
    }

    /// Stop tracking a connection; it is not closed here
    pub(crate) fn unregister(&self, uid: &str) -> Result<Connection> {
        let mut entries = acquire_lock(&self.entries);
        check_entry(&entries, uid)?;
        let removed = entries.remove(uid).ok_or_else(|| Error::NotRegistered {
            uid: uid.to_string(),
        })?;
        debug!("unregistered connection {} ({} active)", uid, entries.len());
        Ok(removed)
    }

    /// Check that `uid` is registered under its own uid
    pub(crate) fn check_connection(&self, uid: &str) -> Result<()> {
        check_entry(&acquire_lock(&self.entries), uid)
    }

    /// Check every entry's key against its connection's uid
    pub(crate) fn check_integrity(&self) -> Result<()> {
        let entries = acquire_lock(&self.entries);
        if self.storage_mode == StorageMode::Memory && entries.len() > 1 {
            return Err(Error::TooManyConnections {
                count: entries.len(),
            });
        }
        for (key, connection) in entries.iter() {
            if key != connection.uid() {
                return Err(Error::RegistryKeyMismatch {
                    key: key.clone(),
                    uid: connection.uid().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Handles to every registered connection
    pub(crate) fn snapshot(&self) -> Vec<Connection> {
        acquire_lock(&self.entries)
            .values()
            .map(Connection::share)
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn insert_raw(&self, key: &str, connection: &Connection) {
        acquire_lock(&self.entries).insert(key.to_string(), connection.share());
    }
}

fn check_entry(entries: &HashMap<String, Connection>, uid: &str) -> Result<()> {
    if uid.is_empty() {
        return Err(Error::NotRegistered {
            uid: uid.to_string(),
        });
    }
    match entries.get(uid) {
        None => Err(Error::NotRegistered {
            uid: uid.to_string(),
        }),
        Some(found) if found.uid() != uid => Err(Error::RegistryKeyMismatch {
            key: uid.to_string(),
            uid: found.uid().to_string(),
        }),
        Some(_) => Ok(()),
    }
}
