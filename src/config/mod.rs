//! TOML-based configuration.
//!
//! Supports a config file (tally.toml) with environment variable expansion
//! in the store path.
//!
//! Example configuration:
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 3200
//!
//! [store]
//! path = "${TALLY_DATA_DIR}/reports.db"
//! pool_capacity = 10
//! query_timeout_secs = 30
//!
//! [[catalog.tables]]
//! id = "products"
//! display_name = "Products"
//! fields = [
//!   { id = "id", display_name = "ID", data_type = "number", key = true },
//!   { id = "name", display_name = "Name", data_type = "text", display = true },
//! ]
//!
//! [catalog.picklists]
//! order_statuses = [
//!   { id = "pending", value = "Pending" },
//! ]
//! ```

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::{demo_registry, PicklistOption, Registry, Schema};

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub store: StoreSettings,
    pub catalog: CatalogSettings,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3200,
        }
    }
}

/// Relational store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Path to the SQLite database (supports `${ENV_VAR}` expansion).
    pub path: String,

    /// Maximum number of pooled connections.
    pub pool_capacity: usize,

    /// Per-query timeout in seconds; 0 disables the timeout.
    pub query_timeout_secs: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: "tally.db".to_string(),
            pool_capacity: 10,
            query_timeout_secs: 0,
        }
    }
}

impl StoreSettings {
    /// The database path with environment variables expanded.
    pub fn resolved_path(&self) -> Result<PathBuf, SettingsError> {
        expand_env_vars(&self.path).map(PathBuf::from)
    }

    /// The configured query timeout, if any.
    pub fn query_timeout(&self) -> Option<Duration> {
        (self.query_timeout_secs > 0).then(|| Duration::from_secs(self.query_timeout_secs))
    }
}

/// Catalog configuration: the schemas and picklists the registry is built
/// from.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CatalogSettings {
    pub tables: Vec<Schema>,
    pub picklists: BTreeMap<String, Vec<PicklistOption>>,
}

impl CatalogSettings {
    /// Build the registry. An unconfigured catalog falls back to the
    /// built-in demo data set so a bare `tally serve` has something to
    /// answer with.
    pub fn registry(&self) -> Registry {
        if self.tables.is_empty() {
            demo_registry()
        } else {
            Registry::new(self.tables.clone(), self.picklists.clone())
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `TALLY_CONFIG`
    /// 2. `./tally.toml`
    /// 3. `~/.config/tally/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("TALLY_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("tally.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("tally").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let mut var_name = String::new();
        if chars.peek() == Some(&'{') {
            chars.next();
            while let Some(&ch) = chars.peek() {
                chars.next();
                if ch == '}' {
                    break;
                }
                var_name.push(ch);
            }
        } else {
            while let Some(&ch) = chars.peek() {
                if ch.is_alphanumeric() || ch == '_' {
                    var_name.push(ch);
                    chars.next();
                } else {
                    break;
                }
            }
            if var_name.is_empty() {
                // A lone $, keep it.
                result.push('$');
                continue;
            }
        }

        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}
