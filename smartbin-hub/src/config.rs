//! smartbin-hub configuration
//!
//! TOML bootstrap (`~/.config/smartbin/smartbin-hub.toml`), overridden by
//! command-line arguments in `main`.

use crate::hub::DEFAULT_SUBSCRIBER_BUFFER;
use serde::Deserialize;
use smartbin_common::config::LoggingConfig;
use std::net::SocketAddr;

use crate::error::{Error, Result};

/// Hub bootstrap configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    /// Listen address for the ingestion, latest-state and subscription surfaces
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Items buffered per subscriber before it is considered stalled
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_bind() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_subscriber_buffer() -> usize {
    DEFAULT_SUBSCRIBER_BUFFER
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            subscriber_buffer: default_subscriber_buffer(),
            logging: LoggingConfig::default(),
        }
    }
}

impl HubConfig {
    /// Parse the bind address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.bind
            .parse()
            .map_err(|e| Error::Config(format!("Invalid bind address '{}': {}", self.bind, e)))
    }
}
