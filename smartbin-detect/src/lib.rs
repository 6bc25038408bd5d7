//! smartbin-detect library - camera-side detection pipeline
//!
//! Pulls frames, classifies them on operator request or on a fixed cadence,
//! turns classifications into items and hands them to a hub, either over
//! HTTP or in-process.

pub mod capture;
pub mod classifier;
pub mod config;
pub mod control;
pub mod detection;
pub mod enrich;
pub mod error;
pub mod frame;
pub mod sink;
pub mod taxonomy;

pub use capture::ThreadedSource;
pub use classifier::{
    load_classifier, ChannelOrder, ClassificationResult, Classifier, InputSpec, LinearModel,
    OnnxModel,
};
pub use detection::{Command, DetectionLoop, LoopExit, LoopReport, LoopStats, Mode};
pub use enrich::{EnrichOptions, Enricher, WeightRange};
pub use error::{Error, Result};
pub use frame::{open_source, Frame, FrameSource, ImageDirSource, PlaybackOptions};
pub use sink::{forward_items, HttpSink, ItemSink, LocalSink};
pub use taxonomy::{Category, Taxonomy, TaxonomyEntry};
