//! Error types for smartbin-hub

use thiserror::Error;

/// Main error type for the hub service
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// Socket I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from shared library code
    #[error(transparent)]
    Common(#[from] smartbin_common::Error),
}

/// Convenience Result type using the hub Error
pub type Result<T> = std::result::Result<T, Error>;
