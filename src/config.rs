use anyhow::{anyhow, Result};
use config::Config;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::error::Error;

/// Location string SQLite understands as "in-memory database"
pub const MEMORY_LOCATION: &str = ":memory:";

pub const OPT_DB_NAME: &str = "db_name";
pub const OPT_IS_MEM: &str = "is_mem";
pub const OPT_FKEY_CONSTRAINT: &str = "fkey_constraint";
pub const OPT_BUSY_TIMEOUT_MS: &str = "busy_timeout_ms";

/// Option keys accepted by [`DatabaseOptions::from_map`]
pub const VALID_OPTIONS: &[&str] = &[
    OPT_DB_NAME,
    OPT_IS_MEM,
    OPT_FKEY_CONSTRAINT,
    OPT_BUSY_TIMEOUT_MS,
];

/// A raw option value as supplied by a caller or a configuration source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Integer(i64),
    Text(String),
}

impl OptionValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            OptionValue::Bool(_) => "bool",
            OptionValue::Integer(_) => "int",
            OptionValue::Text(_) => "str",
        }
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Bool(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        OptionValue::Integer(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::Text(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::Text(value)
    }
}

/// Where a database keeps its data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// Lives as long as its single connection
    Memory,
    /// Persisted to a file named after the database
    File,
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageMode::Memory => write!(f, "in-memory"),
            StorageMode::File => write!(f, "file"),
        }
    }
}

/// Validated database configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseOptions {
    /// Database name; a random UUID when not supplied
    pub db_name: String,
    pub storage_mode: StorageMode,
    /// Whether `PRAGMA foreign_keys = ON` is issued on open (default: true)
    pub fkey_constraint: bool,
    /// Passed through to SQLite's busy handler; engine default when `None`
    pub busy_timeout: Option<Duration>,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            db_name: uuid::Uuid::new_v4().to_string(),
            storage_mode: StorageMode::File,
            fkey_constraint: true,
            busy_timeout: None,
        }
    }
}

impl DatabaseOptions {
    /// Options for a named file-backed database
    pub fn file(db_name: &str) -> Self {
        Self {
            db_name: db_name.to_string(),
            ..Default::default()
        }
    }

    /// Options for an in-memory database with a generated name
    pub fn memory() -> Self {
        Self {
            storage_mode: StorageMode::Memory,
            ..Default::default()
        }
    }

    pub fn with_fkey_constraint(mut self, enabled: bool) -> Self {
        self.fkey_constraint = enabled;
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = Some(timeout);
        self
    }

    /// Validate a caller-supplied option map
    ///
    /// Every key must be one of [`VALID_OPTIONS`] and carry a value of the
    /// expected type. Missing keys take their defaults.
    pub fn from_map(options: &HashMap<String, OptionValue>) -> Result<Self, Error> {
        let mut opts = DatabaseOptions::default();

        for (key, value) in options {
            match (key.as_str(), value) {
                (OPT_DB_NAME, OptionValue::Text(name)) => opts.db_name = name.clone(),
                (OPT_IS_MEM, OptionValue::Bool(is_mem)) => {
                    opts.storage_mode = if *is_mem {
                        StorageMode::Memory
                    } else {
                        StorageMode::File
                    }
                }
                (OPT_FKEY_CONSTRAINT, OptionValue::Bool(enabled)) => {
                    opts.fkey_constraint = *enabled
                }
                (OPT_BUSY_TIMEOUT_MS, OptionValue::Integer(ms)) => {
                    let ms = u64::try_from(*ms).map_err(|_| Error::OptionTypeMismatch {
                        option: key.clone(),
                        expected: "non-negative int",
                        found: "negative int",
                    })?;
                    opts.busy_timeout = Some(Duration::from_millis(ms));
                }
                (OPT_DB_NAME, other) => return Err(mismatch(key, "str", other)),
                (OPT_IS_MEM | OPT_FKEY_CONSTRAINT, other) => {
                    return Err(mismatch(key, "bool", other))
                }
                (OPT_BUSY_TIMEOUT_MS, other) => return Err(mismatch(key, "int", other)),
                _ => {
                    return Err(Error::InvalidOption {
                        option: key.clone(),
                        allowed: VALID_OPTIONS,
                    })
                }
            }
        }

        Ok(opts)
    }

    pub fn is_memory(&self) -> bool {
        self.storage_mode == StorageMode::Memory
    }

    /// The string handed to SQLite when opening a connection
    ///
    /// In-memory databases resolve to `:memory:`; file databases use their
    /// name with spaces replaced by underscores.
    pub fn location(&self) -> String {
        match self.storage_mode {
            StorageMode::Memory => MEMORY_LOCATION.to_string(),
            StorageMode::File => self.db_name.replace(' ', "_"),
        }
    }
}

fn mismatch(key: &str, expected: &'static str, found: &OptionValue) -> Error {
    Error::OptionTypeMismatch {
        option: key.to_string(),
        expected,
        found: found.type_name(),
    }
}

pub struct StatLogConfig {
    /// Path of the configuration file that was read (or created)
    pub config_path: String,

    /// Raw database options collected from file and environment
    pub options: HashMap<String, OptionValue>,
}

const EMPTY_CONFIG: &str = r#"### stat-log-db configuration file

### name of the database; file-backed databases are stored as <db_name> in
### the working directory (spaces replaced by underscores)
# db_name = "stat_log"

### keep the database in memory instead of on disk
# is_mem = false

### issue `PRAGMA foreign_keys = ON` on every new connection
# fkey_constraint = true

### SQLite busy timeout in milliseconds
# busy_timeout_ms = 5000
"#;

impl StatLogConfig {
    /// Function to create and initialize a new configuration
    pub fn new(path: &Option<String>) -> Result<StatLogConfig> {
        let mut builder = Config::builder();

        let config_path = match path {
            Some(p) => p.clone(),
            None => {
                let dir = Self::config_dir()?;
                std::fs::create_dir_all(dir.as_str())
                    .map_err(|e| anyhow!("Unable to create config directory: {}", e))?;
                format!("{}/stat_log_db.toml", dir)
            }
        };

        // Add in toml configuration file
        if Path::new(config_path.as_str()).exists() {
            builder = builder.add_source(
                config::File::with_name(config_path.as_str()).format(config::FileFormat::Toml),
            );
        } else {
            std::fs::write(config_path.as_str(), EMPTY_CONFIG).map_err(|e| {
                anyhow!("Unable to create config file {}: {}", config_path.as_str(), e)
            })?;
        }

        // Add in settings from the environment (with a prefix of SLDB)
        // E.g., `SLDB_IS_MEM=true ./sldb tables` would use an in-memory database
        builder = builder.add_source(config::Environment::with_prefix("SLDB").try_parsing(true));

        let settings = builder
            .build()
            .map_err(|e| anyhow!("Failed to build configuration: {}", e))?;

        let options = settings
            .try_deserialize::<HashMap<String, OptionValue>>()
            .map_err(|e| anyhow!("Failed to deserialize configuration: {}", e))?;

        Ok(StatLogConfig {
            config_path,
            options,
        })
    }

    /// Validate the collected options
    pub fn database_options(&self) -> Result<DatabaseOptions> {
        Ok(DatabaseOptions::from_map(&self.options)?)
    }

    /// Display configuration summary
    pub fn summary(&self) -> String {
        let mut lines = vec![format!("Config File:        {}", self.config_path)];
        match self.database_options() {
            Ok(opts) => {
                lines.push(format!("Database Name:      {}", opts.db_name));
                lines.push(format!("Storage Mode:       {}", opts.storage_mode));
                lines.push(format!("Location:           {}", opts.location()));
                lines.push(format!("Foreign Keys:       {}", opts.fkey_constraint));
                if let Some(timeout) = opts.busy_timeout {
                    lines.push(format!("Busy Timeout:       {} ms", timeout.as_millis()));
                }
            }
            Err(e) => lines.push(format!("Invalid Options:    {}", e)),
        }
        lines.join("\n")
    }

    /// Default directory holding the configuration file
    pub fn config_dir() -> Result<String> {
        let base = dirs::config_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| anyhow!("Could not find configuration or home directory"))?;
        let base = base
            .to_str()
            .ok_or_else(|| anyhow!("Could not convert config directory path to string"))?;
        Ok(format!("{}/stat_log_db", base.trim_end_matches('/')))
    }
}
