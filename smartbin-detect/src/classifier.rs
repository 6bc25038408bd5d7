//! Classifier adapter
//!
//! `Classifier` maps one frame to a `(class id, confidence)` pair.
//!
//! `OnnxModel` runs the trained waste network exported to ONNX. The frame is
//! resized to the network input (30x60 for the stock model), laid out NHWC
//! as `[1, height, width, 3]` in the channel order and scale the network was
//! trained on, and the class with the highest score wins.
//!
//! `LinearModel` is a dependency-free softmax-linear classifier read from a
//! small JSON file. It stands in for the network in tests and demos.

use crate::error::{ClassifyError, ModelError};
use crate::frame::Frame;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::{Array, Array4, IxDyn};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// Largest accepted model input side, in pixels
pub const MAX_INPUT_SIDE: u32 = 4096;

/// Raw model output for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassificationResult {
    pub class_id: u32,
    /// Winning class probability, in [0, 1]
    pub confidence: f32,
}

/// Maps a frame to a classification
///
/// Implementations must be free of observable side effects: the same frame
/// against the same model always yields the same result.
pub trait Classifier: Send {
    fn classify(&self, frame: &Frame) -> Result<ClassificationResult, ClassifyError>;

    /// Model name for logs
    fn name(&self) -> &str;
}

impl<C: Classifier + ?Sized> Classifier for Box<C> {
    fn classify(&self, frame: &Frame) -> Result<ClassificationResult, ClassifyError> {
        (**self).classify(frame)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Channel order of the network input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    Rgb,
    /// OpenCV order; the stock waste network was trained on BGR frames
    Bgr,
}

/// Network input geometry and pixel encoding
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputSpec {
    pub width: u32,
    pub height: u32,
    pub channel_order: ChannelOrder,
    /// Multiplier applied to raw 0-255 channel values
    pub scale: f32,
}

impl Default for InputSpec {
    fn default() -> Self {
        Self {
            width: 30,
            height: 60,
            channel_order: ChannelOrder::Bgr,
            scale: 1.0,
        }
    }
}

impl InputSpec {
    /// Reject zero, oversized, or non-finite parameters
    pub fn validate(&self) -> Result<(), ModelError> {
        feature_count(self.width, self.height)?;
        if !self.scale.is_finite() {
            return Err(ModelError::Shape("non-finite input scale".into()));
        }
        Ok(())
    }
}

/// Number of RGB features for a `width` x `height` input
fn feature_count(width: u32, height: u32) -> Result<usize, ModelError> {
    if width == 0 || height == 0 {
        return Err(ModelError::Shape("input size must be non-zero".into()));
    }
    if width > MAX_INPUT_SIDE || height > MAX_INPUT_SIDE {
        return Err(ModelError::Shape(format!(
            "input size {}x{} exceeds {}",
            width, height, MAX_INPUT_SIDE
        )));
    }
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(3))
        .ok_or_else(|| ModelError::Shape(format!("input size {}x{} overflows", width, height)))
}

fn resize_to(frame: &Frame, width: u32, height: u32) -> RgbImage {
    if frame.image.dimensions() == (width, height) {
        frame.image.clone()
    } else {
        imageops::resize(&frame.image, width, height, FilterType::Triangle)
    }
}

/// NHWC input tensor `[1, height, width, 3]` for one frame
pub fn input_tensor(frame: &Frame, spec: &InputSpec) -> Array4<f32> {
    let resized = resize_to(frame, spec.width, spec.height);
    let mut tensor = Array4::<f32>::zeros((1, spec.height as usize, spec.width as usize, 3));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let ordered = match spec.channel_order {
            ChannelOrder::Rgb => [r, g, b],
            ChannelOrder::Bgr => [b, g, r],
        };
        for (c, value) in ordered.into_iter().enumerate() {
            tensor[[0, y as usize, x as usize, c]] = value as f32 * spec.scale;
        }
    }
    tensor
}

/// Pick the winning class from raw network scores
///
/// Scores that already form a probability distribution (softmax head) are
/// used as-is; anything else is treated as logits.
pub fn pick_class(scores: &[f32]) -> Result<ClassificationResult, ClassifyError> {
    if scores.is_empty() {
        return Err(ClassifyError::Inference("model produced no scores".to_string()));
    }
    let sum: f32 = scores.iter().sum();
    let is_distribution =
        scores.iter().all(|s| (0.0..=1.0).contains(s)) && (sum - 1.0).abs() < 1e-3;
    let probabilities = if is_distribution {
        scores.to_vec()
    } else {
        softmax(scores).ok_or_else(|| ClassifyError::Inference("non-finite scores".to_string()))?
    };

    let (class_id, confidence) = probabilities
        .iter()
        .copied()
        .enumerate()
        .fold((0usize, f32::MIN), |best, (i, p)| if p > best.1 { (i, p) } else { best });

    Ok(ClassificationResult {
        class_id: class_id as u32,
        confidence,
    })
}

/// Trained network run through ONNX Runtime
pub struct OnnxModel {
    name: String,
    // `Session::run` needs exclusive access
    session: Mutex<Session>,
    input: InputSpec,
}

impl OnnxModel {
    /// Load an `.onnx` artifact
    pub fn load(path: &Path, input: InputSpec) -> Result<Self, ModelError> {
        input.validate()?;
        if !path.is_file() {
            return Err(ModelError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "model file not found"),
            });
        }

        info!("Initializing ONNX Runtime classifier");
        let session = Session::builder()
            .map_err(|e| ModelError::Runtime(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| ModelError::Runtime(e.to_string()))?
            .commit_from_file(path)
            .map_err(|e| ModelError::Runtime(format!("Failed to load model: {}", e)))?;

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("onnx")
            .to_string();
        info!(
            "Loaded model '{}' from {} (input {}x{}, {:?})",
            name,
            path.display(),
            input.width,
            input.height,
            input.channel_order
        );

        Ok(Self {
            name,
            session: Mutex::new(session),
            input,
        })
    }

    pub fn input_spec(&self) -> &InputSpec {
        &self.input
    }
}

impl Classifier for OnnxModel {
    fn classify(&self, frame: &Frame) -> Result<ClassificationResult, ClassifyError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(ClassifyError::EmptyFrame);
        }

        let tensor: Array<f32, IxDyn> = input_tensor(frame, &self.input).into_dyn();
        let tensor_ref = TensorRef::from_array_view(&tensor)
            .map_err(|e| ClassifyError::Inference(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| ClassifyError::Inference("model session poisoned".to_string()))?;
        let outputs = session
            .run(ort::inputs![tensor_ref])
            .map_err(|e| ClassifyError::Inference(e.to_string()))?;
        let scores: Vec<f32> = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| ClassifyError::Inference(e.to_string()))?
            .iter()
            .copied()
            .collect();
        drop(outputs);
        drop(session);

        let result = pick_class(&scores)?;
        debug!(
            "Frame {} -> class {} ({:.3})",
            frame.sequence, result.class_id, result.confidence
        );
        Ok(result)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// On-disk linear model artifact
#[derive(Debug, Deserialize)]
struct ModelFile {
    #[serde(default = "default_name")]
    name: String,
    input_width: u32,
    input_height: u32,
    #[serde(default = "default_scale")]
    scale: f32,
    /// One row per class, `input_width * input_height * 3` features each
    weights: Vec<Vec<f32>>,
    bias: Vec<f32>,
}

fn default_name() -> String {
    "linear".to_string()
}

fn default_scale() -> f32 {
    1.0 / 255.0
}

/// Softmax-linear classifier over resized RGB pixels
#[derive(Debug, Clone)]
pub struct LinearModel {
    name: String,
    input_width: u32,
    input_height: u32,
    scale: f32,
    weights: Vec<Vec<f32>>,
    bias: Vec<f32>,
}

impl LinearModel {
    /// Load a JSON model artifact
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let content = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ModelFile = serde_json::from_str(&content)?;
        let model = Self::new(
            file.name,
            file.input_width,
            file.input_height,
            file.scale,
            file.weights,
            file.bias,
        )?;
        info!(
            "Loaded model '{}' from {} ({} classes, input {}x{})",
            model.name,
            path.display(),
            model.class_count(),
            model.input_width,
            model.input_height
        );
        Ok(model)
    }

    /// Build a model from parts, checking every dimension
    pub fn new(
        name: String,
        input_width: u32,
        input_height: u32,
        scale: f32,
        weights: Vec<Vec<f32>>,
        bias: Vec<f32>,
    ) -> Result<Self, ModelError> {
        let features = feature_count(input_width, input_height)?;
        if weights.is_empty() {
            return Err(ModelError::Shape("model has no classes".into()));
        }
        if weights.len() != bias.len() {
            return Err(ModelError::Shape(format!(
                "{} weight rows but {} biases",
                weights.len(),
                bias.len()
            )));
        }
        if let Some((class, row)) = weights.iter().enumerate().find(|(_, r)| r.len() != features) {
            return Err(ModelError::Shape(format!(
                "class {} has {} weights, expected {}",
                class,
                row.len(),
                features
            )));
        }
        let all_finite = scale.is_finite()
            && bias.iter().all(|b| b.is_finite())
            && weights.iter().flatten().all(|w| w.is_finite());
        if !all_finite {
            return Err(ModelError::Shape("non-finite parameter".into()));
        }

        Ok(Self {
            name,
            input_width,
            input_height,
            scale,
            weights,
            bias,
        })
    }

    pub fn class_count(&self) -> usize {
        self.weights.len()
    }

    pub fn input_size(&self) -> (u32, u32) {
        (self.input_width, self.input_height)
    }
}

impl Classifier for LinearModel {
    fn classify(&self, frame: &Frame) -> Result<ClassificationResult, ClassifyError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(ClassifyError::EmptyFrame);
        }

        let x: Vec<f32> = resize_to(frame, self.input_width, self.input_height)
            .into_raw()
            .into_iter()
            .map(|v| v as f32 * self.scale)
            .collect();
        let logits: Vec<f32> = self
            .weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| row.iter().zip(&x).map(|(w, v)| w * v).sum::<f32>() + b)
            .collect();

        let probabilities = softmax(&logits)
            .ok_or_else(|| ClassifyError::Inference("non-finite logits".to_string()))?;
        pick_class(&probabilities)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Load a classifier by artifact type: `.json` is a linear model, anything
/// else goes to ONNX Runtime
pub fn load_classifier(path: &Path, input: InputSpec) -> Result<Box<dyn Classifier>, ModelError> {
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if is_json {
        Ok(Box::new(LinearModel::load(path)?))
    } else {
        Ok(Box::new(OnnxModel::load(path, input)?))
    }
}

/// Numerically stable softmax; `None` if any logit is not finite
fn softmax(logits: &[f32]) -> Option<Vec<f32>> {
    if logits.iter().any(|l| !l.is_finite()) {
        return None;
    }
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    Some(exps.into_iter().map(|e| e / sum).collect())
}
