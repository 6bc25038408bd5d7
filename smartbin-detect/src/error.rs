//! Error types for smartbin-detect
//!
//! Failures are split by how the detection loop treats them:
//! - `SourceError`: frame acquisition cannot continue, fatal to the loop
//! - `ClassifyError` / `EnrichError`: one cycle produced nothing, loop continues
//! - `SinkError`: one item could not be handed to the hub, reported only
//! - `ModelError`: the model artifact could not be loaded at startup
//!
//! `SourceError::Device` covers live capture: the device would not open, or
//! stopped delivering frames mid-stream.

use std::path::PathBuf;
use thiserror::Error;

/// Frame acquisition failures
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to open frame source {path:?}: {reason}")]
    Open { path: PathBuf, reason: String },

    #[error("failed to decode frame {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to scan frame source: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("capture device {device} failed: {reason}")]
    Device { device: String, reason: String },
}

/// A single classification could not be computed
#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("frame has no pixels")]
    EmptyFrame,

    #[error("inference failed: {0}")]
    Inference(String),
}

/// Model artifact could not be loaded
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("failed to read model file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse model file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid model shape: {0}")]
    Shape(String),

    #[error("inference runtime error: {0}")]
    Runtime(String),
}

/// Enrichment could not produce an item
#[derive(Error, Debug)]
pub enum EnrichError {
    #[error("class id {0} is not in the taxonomy")]
    UnknownClass(u32),

    #[error("failed to encode frame: {0}")]
    Encode(#[from] image::ImageError),
}

/// Item could not be handed to the ingestion endpoint
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("could not reach hub: {0}")]
    Http(#[from] reqwest::Error),

    #[error("hub returned status {0}")]
    Status(u16),

    #[error("hub rejected item: {0}")]
    Rejected(String),
}

/// Top-level error type for the detector
#[derive(Error, Debug)]
pub enum Error {
    #[error("Frame source error: {0}")]
    Source(#[from] SourceError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Common(#[from] smartbin_common::Error),
}

/// Convenience Result type using the detector Error
pub type Result<T> = std::result::Result<T, Error>;
