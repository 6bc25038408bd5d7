//! smartbin-detect configuration
//!
//! TOML bootstrap (`~/.config/smartbin/smartbin-detect.toml`), overridden by
//! command-line arguments in `main`. Every key is optional.

use crate::classifier::{ChannelOrder, InputSpec};
use crate::detection::DEFAULT_DETECTION_INTERVAL;
use crate::enrich::{EnrichOptions, WeightRange};
use crate::error::{Error, Result};
use crate::frame::PlaybackOptions;
use crate::sink::DEFAULT_HUB_URL;
use crate::taxonomy::{Taxonomy, TaxonomyEntry};
use serde::Deserialize;
use smartbin_common::config::LoggingConfig;
use smartbin_hub::hub::DEFAULT_SUBSCRIBER_BUFFER;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct DetectConfig {
    /// Capture device index (`0`, `/dev/video0`) or a directory of stills
    #[serde(default = "default_source")]
    pub source: String,

    /// Model artifact: ONNX network, or a `.json` linear model
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    #[serde(default = "default_model_input_width")]
    pub model_input_width: u32,

    #[serde(default = "default_model_input_height")]
    pub model_input_height: u32,

    /// Channel order the network was trained on
    #[serde(default = "default_model_channel_order")]
    pub model_channel_order: ChannelOrder,

    /// Multiplier applied to raw 0-255 pixel values
    #[serde(default = "default_model_input_scale")]
    pub model_input_scale: f32,

    /// Remote hub ingestion URL, used unless `serve` is set
    #[serde(default = "default_hub_url")]
    pub hub_url: String,

    /// Host the hub in this process on the given address instead of posting
    #[serde(default)]
    pub serve: Option<String>,

    /// Frames between continuous detections
    #[serde(default = "default_detection_interval")]
    pub detection_interval: u32,

    #[serde(default = "default_bin_id")]
    pub bin_id: String,

    #[serde(default = "default_weight_min_kg")]
    pub weight_min_kg: f64,

    #[serde(default = "default_weight_max_kg")]
    pub weight_max_kg: f64,

    /// Flip frames horizontally before classification
    #[serde(default = "default_true")]
    pub mirror: bool,

    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,

    /// Restart an image directory when it runs out
    #[serde(default)]
    pub loop_source: bool,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Items waiting for the forwarder before new ones are dropped
    #[serde(default = "default_outbound_capacity")]
    pub outbound_capacity: usize,

    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Class table override; empty means the built-in two-class table
    #[serde(default)]
    pub taxonomy: Vec<TaxonomyEntry>,

    /// Per-subscriber buffer of the in-process hub
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_source() -> String {
    "0".to_string()
}

fn default_model_path() -> PathBuf {
    PathBuf::from("model5.onnx")
}

fn default_model_input_width() -> u32 {
    InputSpec::default().width
}

fn default_model_input_height() -> u32 {
    InputSpec::default().height
}

fn default_model_channel_order() -> ChannelOrder {
    InputSpec::default().channel_order
}

fn default_model_input_scale() -> f32 {
    InputSpec::default().scale
}

fn default_hub_url() -> String {
    DEFAULT_HUB_URL.to_string()
}

fn default_detection_interval() -> u32 {
    DEFAULT_DETECTION_INTERVAL
}

fn default_bin_id() -> String {
    "BIN-001".to_string()
}

fn default_weight_min_kg() -> f64 {
    0.1
}

fn default_weight_max_kg() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_frame_interval_ms() -> u64 {
    33
}

fn default_request_timeout_ms() -> u64 {
    2000
}

fn default_outbound_capacity() -> usize {
    16
}

fn default_jpeg_quality() -> u8 {
    80
}

fn default_subscriber_buffer() -> usize {
    DEFAULT_SUBSCRIBER_BUFFER
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            model_path: default_model_path(),
            model_input_width: default_model_input_width(),
            model_input_height: default_model_input_height(),
            model_channel_order: default_model_channel_order(),
            model_input_scale: default_model_input_scale(),
            hub_url: default_hub_url(),
            serve: None,
            detection_interval: default_detection_interval(),
            bin_id: default_bin_id(),
            weight_min_kg: default_weight_min_kg(),
            weight_max_kg: default_weight_max_kg(),
            mirror: true,
            frame_interval_ms: default_frame_interval_ms(),
            loop_source: false,
            request_timeout_ms: default_request_timeout_ms(),
            outbound_capacity: default_outbound_capacity(),
            jpeg_quality: default_jpeg_quality(),
            taxonomy: Vec::new(),
            subscriber_buffer: default_subscriber_buffer(),
            logging: LoggingConfig::default(),
        }
    }
}

impl DetectConfig {
    /// Check cross-field constraints once all overrides are applied
    pub fn validate(&self) -> Result<()> {
        if self.source.trim().is_empty() {
            return Err(Error::Config("source must not be empty".to_string()));
        }
        if self.model_path.as_os_str().is_empty() {
            return Err(Error::Config("model_path must not be empty".to_string()));
        }
        self.input_spec().validate()?;
        if self.detection_interval == 0 {
            return Err(Error::Config("detection_interval must be at least 1".to_string()));
        }
        if self.bin_id.trim().is_empty() {
            return Err(Error::Config("bin_id must not be empty".to_string()));
        }
        if self.outbound_capacity == 0 {
            return Err(Error::Config("outbound_capacity must be at least 1".to_string()));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(Error::Config(format!(
                "jpeg_quality {} outside 1-100",
                self.jpeg_quality
            )));
        }
        self.weight_range()?;
        self.serve_addr()?;
        Ok(())
    }

    /// Network input geometry
    pub fn input_spec(&self) -> InputSpec {
        InputSpec {
            width: self.model_input_width,
            height: self.model_input_height,
            channel_order: self.model_channel_order,
            scale: self.model_input_scale,
        }
    }

    pub fn weight_range(&self) -> Result<WeightRange> {
        WeightRange::new(self.weight_min_kg, self.weight_max_kg)
    }

    pub fn enrich_options(&self) -> Result<EnrichOptions> {
        Ok(EnrichOptions {
            bin_id: self.bin_id.clone(),
            weight: self.weight_range()?,
            jpeg_quality: self.jpeg_quality,
        })
    }

    pub fn playback_options(&self) -> PlaybackOptions {
        PlaybackOptions {
            mirror: self.mirror,
            frame_interval: Duration::from_millis(self.frame_interval_ms),
            looping: self.loop_source,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Configured taxonomy, or the built-in one when none is given
    pub fn build_taxonomy(&self) -> Result<Taxonomy> {
        if self.taxonomy.is_empty() {
            Ok(Taxonomy::builtin())
        } else {
            Taxonomy::from_entries(self.taxonomy.clone())
        }
    }

    /// Parsed in-process hub address, if hosting one
    pub fn serve_addr(&self) -> Result<Option<SocketAddr>> {
        self.serve
            .as_deref()
            .map(|addr| {
                addr.parse()
                    .map_err(|e| Error::Config(format!("Invalid serve address '{}': {}", addr, e)))
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runnable() -> DetectConfig {
        DetectConfig {
            source: "/tmp/frames".to_string(),
            model_path: PathBuf::from("/tmp/model.json"),
            ..DetectConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = DetectConfig::default();
        assert_eq!(config.hub_url, "http://localhost:5000/api/item");
        assert_eq!(config.detection_interval, 30);
        assert_eq!(config.bin_id, "BIN-001");
        assert!(config.mirror);
        assert_eq!(config.request_timeout(), Duration::from_secs(2));
        assert_eq!(config.weight_range().unwrap(), WeightRange::default());
        assert_eq!(config.build_taxonomy().unwrap().len(), 2);

        // camera 0 and the trained network, 30 wide by 60 high, BGR
        assert_eq!(config.source, "0");
        assert_eq!(config.model_path, PathBuf::from("model5.onnx"));
        assert_eq!(config.input_spec(), InputSpec::default());
        assert_eq!(config.input_spec().width, 30);
        assert_eq!(config.input_spec().height, 60);
        assert_eq!(config.input_spec().channel_order, ChannelOrder::Bgr);
    }

    #[test]
    fn test_validate_requires_source_and_model() {
        assert!(DetectConfig::default().validate().is_ok());
        assert!(runnable().validate().is_ok());

        let mut config = runnable();
        config.source = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = runnable();
        config.model_path = PathBuf::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_oversized_model_input() {
        let mut config = runnable();
        config.model_input_width = 65536;
        config.model_input_height = 65536;
        assert!(matches!(config.validate(), Err(Error::Model(_))));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = runnable();
        config.detection_interval = 0;
        assert!(config.validate().is_err());

        let mut config = runnable();
        config.weight_min_kg = 3.0;
        assert!(config.validate().is_err());

        let mut config = runnable();
        config.serve = Some("not-an-address".to_string());
        assert!(config.validate().is_err());

        let mut config = runnable();
        config.jpeg_quality = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_with_taxonomy_override() {
        let config: DetectConfig = toml::from_str(
            r#"
            source = "/data/frames"
            model_path = "/data/model.json"
            serve = "127.0.0.1:5000"
            model_channel_order = "rgb"
            model_input_scale = 0.00392156
            detection_interval = 10
            mirror = false

            [[taxonomy]]
            class_id = 0
            category = "Recyclable"
            default_type = "Recyclable Item"
            default_class = "Glass"

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        config.validate().unwrap();
        assert_eq!(config.detection_interval, 10);
        assert!(!config.playback_options().mirror);
        assert_eq!(config.serve_addr().unwrap().unwrap().port(), 5000);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.input_spec().channel_order, ChannelOrder::Rgb);
        assert_eq!(config.input_spec().height, 60);

        let taxonomy = config.build_taxonomy().unwrap();
        assert_eq!(taxonomy.len(), 1);
        assert!(taxonomy.lookup(0).unwrap().category.is_recyclable());
    }
}
