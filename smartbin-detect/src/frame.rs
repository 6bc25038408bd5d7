//! Frame source adapter
//!
//! The capture device is abstracted as `FrameSource`: each call blocks until
//! the next frame is available, or reports end-of-stream (`Ok(None)`) or a
//! failure. The detection loop polls it once per iteration from its own
//! thread, so a blocking read is acceptable here.
//!
//! `ImageDirSource` plays back a directory of stills at a fixed frame
//! interval, which is how the detector is fed on machines without a camera
//! and in tests. `open_source` picks between it and a live device.

use crate::capture::{open_device, parse_device_index};
use crate::error::SourceError;
use image::{imageops, RgbImage};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use walkdir::WalkDir;

/// One captured still
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    /// Monotonic capture counter, starting at 0
    pub sequence: u64,
}

impl Frame {
    pub fn new(image: RgbImage, sequence: u64) -> Self {
        Self { image, sequence }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Anything that yields frames on demand
pub trait FrameSource: Send {
    /// Next frame, `Ok(None)` at end of stream
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError>;

    /// Human-readable identifier for logs
    fn describe(&self) -> String;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        (**self).next_frame()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Open the configured source
///
/// An existing directory is played back; otherwise a device index (`0`,
/// `/dev/video0`) opens that capture device. Anything else is reported as a
/// missing directory.
pub fn open_source(
    source: &str,
    options: PlaybackOptions,
) -> Result<Box<dyn FrameSource>, SourceError> {
    let path = Path::new(source);
    if !path.is_dir() {
        if let Some(index) = parse_device_index(source) {
            return Ok(Box::new(open_device(index, options.mirror)?));
        }
    }
    Ok(Box::new(ImageDirSource::open(path, options)?))
}

/// Playback options for `ImageDirSource`
#[derive(Debug, Clone)]
pub struct PlaybackOptions {
    /// Flip each frame horizontally, as a webcam preview would
    pub mirror: bool,
    /// Minimum spacing between frames; zero for as-fast-as-possible
    pub frame_interval: Duration,
    /// Restart from the first image instead of ending the stream
    pub looping: bool,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            mirror: true,
            frame_interval: Duration::from_millis(33),
            looping: false,
        }
    }
}

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// Frame source backed by the still images in one directory, in name order
pub struct ImageDirSource {
    root: PathBuf,
    files: Vec<PathBuf>,
    position: usize,
    sequence: u64,
    options: PlaybackOptions,
    last_emit: Option<Instant>,
}

impl ImageDirSource {
    /// Scan `dir` for images; fails if there are none
    pub fn open(dir: &Path, options: PlaybackOptions) -> Result<Self, SourceError> {
        if !dir.is_dir() {
            return Err(SourceError::Open {
                path: dir.to_path_buf(),
                reason: "not a directory".to_string(),
            });
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = entry?;
            if entry.file_type().is_file() && is_image(entry.path()) {
                files.push(entry.into_path());
            }
        }
        files.sort();

        if files.is_empty() {
            return Err(SourceError::Open {
                path: dir.to_path_buf(),
                reason: "no images found".to_string(),
            });
        }

        info!(
            "Frame source {}: {} images (mirror={}, loop={})",
            dir.display(),
            files.len(),
            options.mirror,
            options.looping
        );

        Ok(Self {
            root: dir.to_path_buf(),
            files,
            position: 0,
            sequence: 0,
            options,
            last_emit: None,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn pace(&mut self) {
        if let Some(last) = self.last_emit {
            let elapsed = last.elapsed();
            if elapsed < self.options.frame_interval {
                std::thread::sleep(self.options.frame_interval - elapsed);
            }
        }
        self.last_emit = Some(Instant::now());
    }
}

impl FrameSource for ImageDirSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        if self.position >= self.files.len() {
            if !self.options.looping {
                debug!("Frame source {} exhausted", self.root.display());
                return Ok(None);
            }
            self.position = 0;
        }

        self.pace();

        let path = &self.files[self.position];
        let decoded = image::open(path).map_err(|source| SourceError::Decode {
            path: path.clone(),
            source,
        })?;
        self.position += 1;

        let mut image = decoded.to_rgb8();
        if self.options.mirror {
            imageops::flip_horizontal_in_place(&mut image);
        }

        let frame = Frame::new(image, self.sequence);
        self.sequence += 1;
        Ok(Some(frame))
    }

    fn describe(&self) -> String {
        format!("image directory {}", self.root.display())
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
