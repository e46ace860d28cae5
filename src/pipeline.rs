use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use image::codecs::jpeg::JpegEncoder;
use log::info;
use std::path::Path;

use crate::attendance::AttendanceLogger;
use crate::camera::CameraSource;
use crate::gallery::Gallery;
use crate::recognizer::FrameRecognizer;
use crate::types::{Frame, Label};

/// One pass of the live loop.
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    pub frame: Frame,
    /// Known names found by this pass (empty on skipped frames).
    pub names: Vec<String>,
    /// Names that produced a new attendance row.
    pub logged: Vec<String>,
}

/// Camera -> recognizer -> attendance logger.
pub struct PipelineDriver {
    camera: CameraSource,
    recognizer: FrameRecognizer,
    logger: AttendanceLogger,
}

impl PipelineDriver {
    pub fn new(camera: CameraSource, recognizer: FrameRecognizer, logger: AttendanceLogger) -> Self {
        Self {
            camera,
            recognizer,
            logger,
        }
    }

    pub fn recognizer(&self) -> &FrameRecognizer {
        &self.recognizer
    }

    pub fn step_now(&mut self) -> Option<ProcessedFrame> {
        self.step(Local::now().naive_local())
    }

    /// Processes the newest camera frame. `None` until the camera has
    /// produced one.
    pub fn step(&mut self, now: NaiveDateTime) -> Option<ProcessedFrame> {
        let frame = self.camera.get_frame()?;
        let (annotated, names) = self.recognizer.process_at(&frame, now);
        let logged = names
            .iter()
            .filter(|name| self.logger.log(&Label::Known(name.to_string()), now))
            .cloned()
            .collect();
        Some(ProcessedFrame {
            frame: annotated,
            names,
            logged,
        })
    }

    /// Reloads the gallery from disk. A missing or corrupt store gives an
    /// empty gallery. Returns the new entry count.
    pub fn reload_gallery(&mut self, path: &Path) -> usize {
        let gallery = Gallery::load_or_empty(path);
        let n = gallery.len();
        self.recognizer.reload(gallery);
        info!("Reloaded gallery with {} known faces", n);
        n
    }

    pub fn stop(&mut self) {
        self.camera.stop();
    }
}

pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100))
        .encode_image(frame)
        .context("Failed to encode frame as JPEG")?;
    Ok(bytes)
}
