//! Configuration loading and database path resolution

use crate::{Error, QcParams, Result, SolveParams};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level TOML configuration file contents.
///
/// Every section and field is optional; missing values fall back to the
/// reference defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub qc: QcParams,
    pub solver: SolveParams,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Explicit database file path; overrides the platform default.
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from an explicit path, or from the platform
    /// config directory if none is given. A missing file is not an error;
    /// defaults apply.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(p) => {
                if !p.exists() {
                    return Err(Error::Config(format!(
                        "Config file not found: {}",
                        p.display()
                    )));
                }
                p.to_path_buf()
            }
            None => match default_config_file() {
                Some(p) if p.exists() => p,
                _ => return Ok(Self::default()),
            },
        };

        let text = std::fs::read_to_string(&path)?;
        toml::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }
}

/// Resolve the database file path, priority order:
/// 1. Command-line argument
/// 2. `DLWP_DB` environment variable
/// 3. Config file `[database] path`
/// 4. Platform data directory default
pub fn resolve_db_path(cli_arg: Option<&Path>, config: &Config) -> PathBuf {
    if let Some(p) = cli_arg {
        return p.to_path_buf();
    }
    if let Ok(p) = std::env::var("DLWP_DB") {
        return PathBuf::from(p);
    }
    if let Some(p) = &config.database.path {
        return p.clone();
    }
    default_db_path()
}

/// Default configuration file location for the platform
fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("dlwp").join("config.toml"))
}

/// OS-dependent default database location
fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("dlwp").join("dlwp.db"))
        .unwrap_or_else(|| PathBuf::from("./dlwp.db"))
}
