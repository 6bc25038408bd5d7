//! Live capture
//!
//! Capture devices block on every read, so they run on a dedicated thread
//! and hand frames over a small bounded channel. A slow detection loop
//! backpressures the capture thread instead of queueing stale frames.
//!
//! `ThreadedSource` owns that thread for any producer. With the `camera`
//! feature, `open_device` drives an OpenCV `VideoCapture`; without it, a
//! device source reports that support was not built in.

use crate::error::SourceError;
use crate::frame::{Frame, FrameSource};
use crossbeam_channel::{bounded, Receiver};
use image::{imageops, RgbImage};
use std::thread;
use tracing::{debug, info, warn};

/// Frames buffered between the capture thread and the detection loop
const FRAME_BUFFER: usize = 2;

/// Frame source fed by a producer running on its own thread
///
/// The producer returns `Ok(None)` at end of stream. An error ends the
/// stream after it has been delivered to the reader.
pub struct ThreadedSource {
    name: String,
    frames: Receiver<Result<RgbImage, SourceError>>,
    mirror: bool,
    sequence: u64,
}

impl ThreadedSource {
    /// Start the capture thread
    ///
    /// `open` runs on the capture thread (device handles need not be `Send`);
    /// this call waits for it so open failures surface here.
    pub fn spawn<O, P>(name: impl Into<String>, mirror: bool, open: O) -> Result<Self, SourceError>
    where
        O: FnOnce() -> Result<P, SourceError> + Send + 'static,
        P: FnMut() -> Result<Option<RgbImage>, SourceError>,
    {
        let name = name.into();
        let (ready_tx, ready_rx) = bounded::<Result<(), SourceError>>(1);
        let (tx, rx) = bounded(FRAME_BUFFER);

        let thread_name = name.clone();
        thread::Builder::new()
            .name("frame-capture".to_string())
            .spawn(move || {
                let mut produce = match open() {
                    Ok(produce) => {
                        let _ = ready_tx.send(Ok(()));
                        produce
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                loop {
                    match produce() {
                        Ok(Some(image)) => {
                            if tx.send(Ok(image)).is_err() {
                                debug!("Capture {} reader gone", thread_name);
                                break;
                            }
                        }
                        Ok(None) => {
                            info!("Capture {} ended", thread_name);
                            break;
                        }
                        Err(e) => {
                            warn!("Capture {} failed: {}", thread_name, e);
                            let _ = tx.send(Err(e));
                            break;
                        }
                    }
                }
            })
            .map_err(|e| SourceError::Device {
                device: name.clone(),
                reason: format!("failed to start capture thread: {}", e),
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(SourceError::Device {
                    device: name,
                    reason: "capture thread exited while opening".to_string(),
                })
            }
        }

        info!("Frame source {} (mirror={})", name, mirror);
        Ok(Self {
            name,
            frames: rx,
            mirror,
            sequence: 0,
        })
    }
}

impl FrameSource for ThreadedSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        let mut image = match self.frames.recv() {
            Ok(Ok(image)) => image,
            Ok(Err(e)) => return Err(e),
            // Capture thread finished
            Err(_) => return Ok(None),
        };
        if self.mirror {
            imageops::flip_horizontal_in_place(&mut image);
        }

        let frame = Frame::new(image, self.sequence);
        self.sequence += 1;
        Ok(Some(frame))
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

/// Device index from `"0"` or `"/dev/video0"` style names
pub fn parse_device_index(source: &str) -> Option<i32> {
    if let Ok(index) = source.parse::<i32>() {
        return (index >= 0).then_some(index);
    }
    let digits = source.strip_prefix("/dev/video")?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Repack a packed BGR8 buffer as RGB
#[cfg_attr(not(feature = "camera"), allow(dead_code))]
pub(crate) fn bgr_to_rgb(width: u32, height: u32, bgr: &[u8]) -> Option<RgbImage> {
    let mut data = bgr.to_vec();
    for pixel in data.chunks_exact_mut(3) {
        pixel.swap(0, 2);
    }
    RgbImage::from_raw(width, height, data)
}

/// Open capture device `index`
#[cfg(feature = "camera")]
pub fn open_device(index: i32, mirror: bool) -> Result<ThreadedSource, SourceError> {
    ThreadedSource::spawn(format!("camera #{}", index), mirror, move || {
        device::open(index)
    })
}

/// Open capture device `index`
#[cfg(not(feature = "camera"))]
pub fn open_device(index: i32, _mirror: bool) -> Result<ThreadedSource, SourceError> {
    Err(SourceError::Device {
        device: format!("#{}", index),
        reason: "built without camera support (enable the `camera` feature)".to_string(),
    })
}

#[cfg(feature = "camera")]
mod device {
    use super::bgr_to_rgb;
    use crate::error::SourceError;
    use image::RgbImage;
    use opencv::{
        core::{Mat, MatTraitConstManual},
        prelude::*,
        videoio::{self, VideoCapture},
    };
    use tracing::warn;

    fn device_error(index: i32, e: impl std::fmt::Display) -> SourceError {
        SourceError::Device {
            device: format!("#{}", index),
            reason: e.to_string(),
        }
    }

    fn open_capture(index: i32) -> Result<VideoCapture, SourceError> {
        for backend in [videoio::CAP_V4L, videoio::CAP_ANY] {
            match VideoCapture::new(index, backend) {
                Ok(cap) => {
                    if cap.is_opened().map_err(|e| device_error(index, e))? {
                        return Ok(cap);
                    }
                }
                Err(e) => warn!("Device #{} backend {} failed: {}", index, backend, e),
            }
        }
        Err(device_error(index, "no backend could open the device"))
    }

    /// Open device `index` and return its frame producer
    pub(super) fn open(
        index: i32,
    ) -> Result<impl FnMut() -> Result<Option<RgbImage>, SourceError>, SourceError> {
        let mut cap = open_capture(index)?;
        let mut mat = Mat::default();

        Ok(move || loop {
            // A failed grab means the device went away
            if !cap.read(&mut mat).map_err(|e| device_error(index, e))? {
                return Ok(None);
            }
            let size = mat.size().map_err(|e| device_error(index, e))?;
            if size.width <= 0 || size.height <= 0 {
                continue;
            }
            let bytes = mat.data_bytes().map_err(|e| device_error(index, e))?;
            return bgr_to_rgb(size.width as u32, size.height as u32, bytes)
                .map(Some)
                .ok_or_else(|| device_error(index, "frame is not packed BGR8"));
        })
    }
}
