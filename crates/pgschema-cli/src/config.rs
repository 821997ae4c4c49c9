//! Configuration file handling for pgschema.
//!
//! Looks for `.config/pgschema.json` in the current directory or any parent directory.

use std::path::{Path, PathBuf};

use pgschema::Options;
use serde::Deserialize;

const CONFIG_FILE: &str = ".config/pgschema.json";

/// Project settings. Every field is optional; missing ones keep the library
/// defaults.
///
/// ```json
/// {
///   "default_schema": "app",
///   "excluded_schemas": ["pg_catalog", "information_schema", "audit"],
///   "log": "pgschema=debug"
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub default_schema: Option<String>,
    pub silent_schemas: Option<Vec<String>>,
    pub excluded_schemas: Option<Vec<String>>,
    /// Log filter directive, used when `RUST_LOG` is not set.
    pub log: Option<String>,
}

impl Config {
    pub fn options(&self) -> Options {
        let defaults = Options::default();
        Options {
            default_schema: self
                .default_schema
                .clone()
                .unwrap_or(defaults.default_schema),
            silent_schemas: self
                .silent_schemas
                .clone()
                .unwrap_or(defaults.silent_schemas),
            excluded_schemas: self
                .excluded_schemas
                .clone()
                .unwrap_or(defaults.excluded_schemas),
        }
    }
}

/// Load configuration from `.config/pgschema.json`, searching up the directory tree.
pub fn load() -> Result<(Config, PathBuf), ConfigError> {
    let cwd = std::env::current_dir().map_err(|e| ConfigError::Io(e.to_string()))?;
    load_from(&cwd)
}

/// Load configuration starting from a specific directory.
pub fn load_from(start: &Path) -> Result<(Config, PathBuf), ConfigError> {
    let config_path = find_config_file(start)?;
    let content =
        std::fs::read_to_string(&config_path).map_err(|e| ConfigError::Io(e.to_string()))?;

    let config: Config =
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

    Ok((config, config_path))
}

fn find_config_file(start: &Path) -> Result<PathBuf, ConfigError> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_FILE);
        if config_path.exists() {
            return Ok(config_path);
        }

        if !current.pop() {
            return Err(ConfigError::NotFound);
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No `.config/pgschema.json` in any parent directory
    #[error("No {CONFIG_FILE} found in current directory or any parent")]
    NotFound,
    #[error("Failed to read {CONFIG_FILE}: {0}")]
    Io(String),
    #[error("Failed to parse {CONFIG_FILE}: {0}")]
    Parse(String),
}
