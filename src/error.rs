//! Error types
//!
//! Every failure the library can report is a variant of [`Error`]. Callers that
//! only care about the broad category can match on [`Error::kind`].

use std::fmt;

use thiserror::Error;

/// Broad category of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unknown or mistyped option, or a storage mode that forbids the request
    Configuration,
    /// Duplicate registration, missing registry entry, too many connections
    Registration,
    /// Operation attempted in the wrong connection state
    ConnectionState,
    /// Rejected identifier, column type, or query text
    Validation,
    /// Table exists / does not exist when policy demands the opposite
    ExistenceConflict,
    /// Registry left inconsistent
    IntegrityViolation,
    /// Failure reported by SQLite itself
    Engine,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Configuration => write!(f, "configuration error"),
            ErrorKind::Registration => write!(f, "registration error"),
            ErrorKind::ConnectionState => write!(f, "connection state error"),
            ErrorKind::Validation => write!(f, "validation error"),
            ErrorKind::ExistenceConflict => write!(f, "existence conflict"),
            ErrorKind::IntegrityViolation => write!(f, "integrity violation"),
            ErrorKind::Engine => write!(f, "engine error"),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid option provided: '{option}'. Must be one of {allowed:?}.")]
    InvalidOption {
        option: String,
        allowed: &'static [&'static str],
    },
    #[error("Option '{option}' must be of type {expected}, got {found}.")]
    OptionTypeMismatch {
        option: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Connection '{uid}' is already registered.")]
    DuplicateRegistration { uid: String },
    #[error("Connection '{uid}' is not registered.")]
    NotRegistered { uid: String },
    #[error("In-memory databases can only have one active connection. Found {count}.")]
    TooManyConnections { count: usize },
    #[error("In-memory databases cease to exist upon closure.")]
    InMemoryCannotAutoClose,

    #[error("Connection '{uid}' is already open.")]
    AlreadyOpen { uid: String },
    #[error("Connection '{uid}' is not open.")]
    NotOpen { uid: String },
    #[error("Connection '{uid}' has been closed and cannot be reopened.")]
    ConnectionClosed { uid: String },
    #[error("No result available on connection '{uid}': nothing has been executed since it was opened.")]
    NoResultAvailable { uid: String },

    #[error("Query cannot be an empty string.")]
    EmptyQuery,
    #[error("SQL {kind} cannot be empty.")]
    EmptyIdentifier { kind: String },
    #[error("Invalid SQL {kind}: '{value}'. Must start with letter or underscore and contain only letters, numbers, and underscores.")]
    MalformedIdentifier { kind: String, value: String },
    #[error("SQL {kind} '{value}' is a reserved word and cannot be used.")]
    ReservedWord { kind: String, value: String },
    #[error("Unsupported column type: '{value}'. Must be one of: {allowed}.")]
    UnsupportedType { value: String, allowed: String },
    #[error("Invalid column type format: '{value}'.")]
    MalformedType { value: String },
    #[error("Record has no model name.")]
    EmptyRecordModel,

    #[error("Table '{table}' already exists.")]
    TableAlreadyExists { table: String },
    #[error("Table '{table}' does not exist.")]
    TableNotFound { table: String },

    #[error("Not all connections were closed properly: {remaining} still registered.")]
    IncompleteClosure { remaining: usize },
    #[error("Connection '{key}' is registered under non-matching uid: {uid}")]
    RegistryKeyMismatch { key: String, uid: String },

    #[error(transparent)]
    Engine(#[from] rusqlite::Error),
}

impl Error {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidOption { .. }
            | Error::OptionTypeMismatch { .. }
            | Error::InMemoryCannotAutoClose => ErrorKind::Configuration,
            Error::DuplicateRegistration { .. }
            | Error::NotRegistered { .. }
            | Error::TooManyConnections { .. } => ErrorKind::Registration,
            Error::AlreadyOpen { .. }
            | Error::NotOpen { .. }
            | Error::ConnectionClosed { .. }
            | Error::NoResultAvailable { .. } => ErrorKind::ConnectionState,
            Error::EmptyQuery
            | Error::EmptyIdentifier { .. }
            | Error::MalformedIdentifier { .. }
            | Error::ReservedWord { .. }
            | Error::UnsupportedType { .. }
            | Error::MalformedType { .. }
            | Error::EmptyRecordModel => ErrorKind::Validation,
            Error::TableAlreadyExists { .. } | Error::TableNotFound { .. } => {
                ErrorKind::ExistenceConflict
            }
            Error::IncompleteClosure { .. } | Error::RegistryKeyMismatch { .. } => {
                ErrorKind::IntegrityViolation
            }
            Error::Engine(_) => ErrorKind::Engine,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
