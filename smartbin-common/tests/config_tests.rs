//! Tests for TOML bootstrap loading and graceful degradation
//!
//! Missing files must fall back to defaults; explicit-but-missing and
//! malformed files must surface as configuration errors.

use serde::Deserialize;
use serial_test::serial;
use smartbin_common::config::{load_toml_config, LoggingConfig};
use smartbin_common::Error;
use std::io::Write;

#[derive(Debug, Deserialize, PartialEq)]
struct SampleConfig {
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default)]
    logging: LoggingConfig,
}

fn default_port() -> u16 {
    5000
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            logging: LoggingConfig::default(),
        }
    }
}

#[test]
fn test_explicit_file_is_parsed() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "port = 6123\n[logging]\nlevel = \"debug\"").unwrap();

    let config: SampleConfig = load_toml_config(Some(file.path()), "sample").unwrap();
    assert_eq!(config.port, 6123);
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_partial_file_keeps_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "port = 7000").unwrap();

    let config: SampleConfig = load_toml_config(Some(file.path()), "sample").unwrap();
    assert_eq!(config.port, 7000);
    assert_eq!(config.logging, LoggingConfig::default());
}

#[test]
fn test_explicit_missing_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.toml");

    let result: smartbin_common::Result<SampleConfig> = load_toml_config(Some(&missing), "sample");
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_malformed_file_is_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "port = \"not a number\"").unwrap();

    let result: smartbin_common::Result<SampleConfig> = load_toml_config(Some(file.path()), "sample");
    assert!(matches!(result, Err(Error::Toml(_))));
}

#[test]
#[serial]
fn test_missing_default_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    // dirs::config_dir() honours XDG_CONFIG_HOME on Linux
    std::env::set_var("XDG_CONFIG_HOME", dir.path());

    let config: SampleConfig = load_toml_config(None, "smartbin-nonexistent-module").unwrap();
    assert_eq!(config, SampleConfig::default());

    std::env::remove_var("XDG_CONFIG_HOME");
}
