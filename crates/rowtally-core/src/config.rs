//! Run configuration, loaded from YAML and overridable from the environment.
//!
//! ```yaml
//! database:
//!   database_user: scott
//!   database_password: tiger
//!   host_name: db.internal
//!   port: 5432
//!   service_name: inventory
//!   exclude_owner: "'pg_catalog', 'information_schema'"
//! logger:
//!   log_file_name: logs/rowtally.log
//! software:
//!   output_file: out/rowcount.csv
//!   worker_threads: 8
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logger: LoggerConfig,
    #[serde(default)]
    pub software: SoftwareConfig,
}

/// How workers reach the database.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionMode {
    /// One pool opened once and shared by every worker.
    #[default]
    SharedPool,
    /// Every worker opens and owns a private connection.
    PerWorker,
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionMode::SharedPool => f.write_str("shared_pool"),
            ConnectionMode::PerWorker => f.write_str("per_worker"),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub database_user: String,
    #[serde(default)]
    pub database_password: String,
    pub host_name: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Database (service) name on the server.
    pub service_name: String,
    /// Comma-separated, possibly quoted, list of schemas to skip.
    #[serde(default)]
    pub exclude_owner: String,
    #[serde(default)]
    pub connection_mode: ConnectionMode,
    /// Optional ceiling on open connections in shared-pool mode.
    #[serde(default)]
    pub max_open_connections: Option<u32>,
}

// Hand-written so the password never reaches a log line.
impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("database_user", &self.database_user)
            .field("database_password", &"<redacted>")
            .field("host_name", &self.host_name)
            .field("port", &self.port)
            .field("service_name", &self.service_name)
            .field("exclude_owner", &self.exclude_owner)
            .field("connection_mode", &self.connection_mode)
            .field("max_open_connections", &self.max_open_connections)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub log_file_name: PathBuf,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            log_file_name: PathBuf::from("rowtally.log"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftwareConfig {
    pub output_file: PathBuf,
    pub worker_threads: usize,
    /// `owner,tableName,rowCount` when true, `tableName,rowCount` otherwise.
    pub include_owner_column: bool,
}

impl Default for SoftwareConfig {
    fn default() -> Self {
        Self {
            output_file: PathBuf::from("rowcount.csv"),
            worker_threads: 4,
            include_owner_column: true,
        }
    }
}

fn default_port() -> u16 {
    5432
}

impl Config {
    pub fn from_yaml_str(src: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(src)?)
    }

    /// Read and parse a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let src = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&src)
    }

    /// Apply environment overrides on top of the file values.
    ///
    /// Environment variables:
    /// - `ROWTALLY_DB_HOST`, `ROWTALLY_DB_PORT`, `ROWTALLY_DB_PASSWORD`
    /// - `ROWTALLY_EXCLUDE_OWNER`: raw exclusion list
    /// - `ROWTALLY_WORKER_THREADS`: worker count
    /// - `ROWTALLY_OUTPUT_FILE`, `ROWTALLY_LOG_FILE`: paths
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(s) = lookup("ROWTALLY_DB_HOST") {
            self.database.host_name = s;
        }

        if let Some(s) = lookup("ROWTALLY_DB_PORT") {
            if let Ok(v) = s.parse::<u16>() {
                self.database.port = v;
            }
        }

        if let Some(s) = lookup("ROWTALLY_DB_PASSWORD") {
            self.database.database_password = s;
        }

        if let Some(s) = lookup("ROWTALLY_EXCLUDE_OWNER") {
            self.database.exclude_owner = s;
        }

        if let Some(s) = lookup("ROWTALLY_WORKER_THREADS") {
            if let Ok(v) = s.parse::<usize>() {
                self.software.worker_threads = v;
            }
        }

        if let Some(s) = lookup("ROWTALLY_OUTPUT_FILE") {
            self.software.output_file = PathBuf::from(s);
        }

        if let Some(s) = lookup("ROWTALLY_LOG_FILE") {
            self.logger.log_file_name = PathBuf::from(s);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.software.worker_threads == 0 {
            return Err(Error::Config("software.worker_threads must be at least 1".into()));
        }
        if self.database.host_name.trim().is_empty() {
            return Err(Error::Config("database.host_name is empty".into()));
        }
        if self.database.service_name.trim().is_empty() {
            return Err(Error::Config("database.service_name is empty".into()));
        }
        if self.software.output_file.as_os_str().is_empty() {
            return Err(Error::Config("software.output_file is empty".into()));
        }
        Ok(())
    }
}
