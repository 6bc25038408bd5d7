//! Configuration loading
//!
//! Each service reads an optional TOML bootstrap file. Priority order:
//! 1. Command-line argument / environment variable (applied by the service)
//! 2. TOML config file
//! 3. Compiled defaults
//!
//! A missing file is never fatal: a warning is logged and defaults are used.
//! A file that exists but does not parse is a configuration error.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Logging configuration shared by every service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default tracing directive when `RUST_LOG` is unset (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Default TOML path for a service: `<config dir>/smartbin/<module>.toml`
pub fn default_config_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("smartbin").join(format!("{}.toml", module_name)))
}

/// Load a TOML config file, falling back to `T::default()` when absent
///
/// `explicit` is the path given on the command line; when `None` the
/// platform default for `module_name` is tried.
pub fn load_toml_config<T>(explicit: Option<&Path>, module_name: &str) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => match default_config_path(module_name) {
            Some(p) => p,
            None => {
                warn!("Could not determine config directory, using built-in defaults");
                return Ok(T::default());
            }
        },
    };

    if !path.exists() {
        if explicit.is_some() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        warn!(
            "Config file {} not found, using built-in defaults",
            path.display()
        );
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(&path)?;
    let config = toml::from_str(&content)?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Validate a tracing level string
pub fn validate_log_level(level: &str) -> Result<()> {
    match level.to_ascii_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        other => Err(Error::Config(format!("Invalid log level '{}'", other))),
    }
}
