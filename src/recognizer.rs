//! Live recognition: cadence-gated detection, cached results and overlays.

use anyhow::{ensure, Result};
use chrono::{Local, NaiveDateTime};
use image::imageops::FilterType;
use log::{debug, warn};

use crate::analyzer::FaceAnalyzer;
use crate::config::RecognitionConfig;
use crate::gallery::Gallery;
use crate::overlay::{Overlay, PanelInfo};
use crate::types::{Detection, Frame, Label, Rect};

/// Matches faces in live frames against the gallery.
///
/// Detection runs on every `cadence`-th call; the calls in between redraw
/// the cached result of the last detection pass.
pub struct FrameRecognizer {
    analyzer: Box<dyn FaceAnalyzer>,
    gallery: Gallery,
    settings: RecognitionConfig,
    overlay: Overlay,
    frame_count: u64,
    detections: Vec<Detection>,
}

impl FrameRecognizer {
    pub fn new(
        analyzer: Box<dyn FaceAnalyzer>,
        gallery: Gallery,
        settings: RecognitionConfig,
        overlay: Overlay,
    ) -> Self {
        Self {
            analyzer,
            gallery,
            settings: RecognitionConfig {
                cadence: settings.cadence.max(1),
                ..settings
            },
            overlay,
            frame_count: 0,
            detections: Vec::new(),
        }
    }

    pub fn name(&self) -> String {
        self.analyzer.name()
    }

    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    /// Swaps in a freshly trained gallery. The cached detections keep their
    /// old labels until the next detection pass.
    pub fn reload(&mut self, gallery: Gallery) {
        self.gallery = gallery;
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Result of the last detection pass.
    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn process(&mut self, frame: &Frame) -> (Frame, Vec<String>) {
        self.process_at(frame, Local::now().naive_local())
    }

    /// Returns the annotated frame and the names recognised by this call.
    /// The name list is empty on calls that reuse the cached result.
    pub fn process_at(&mut self, frame: &Frame, now: NaiveDateTime) -> (Frame, Vec<String>) {
        self.frame_count += 1;

        let mut detected_names = Vec::new();
        if self.frame_count % self.settings.cadence as u64 == 0 {
            match self.detect(frame) {
                Ok(detections) => {
                    detected_names = detections
                        .iter()
                        .filter_map(|d| match &d.label {
                            Label::Known(name) => Some(name.clone()),
                            Label::Unknown => None,
                        })
                        .collect();
                    self.detections = detections;
                }
                Err(e) => warn!("Face analysis failed on frame {}: {:#}", self.frame_count, e),
            }
        }

        let mut annotated = frame.clone();
        self.overlay.draw_detections(&mut annotated, &self.detections, now);
        self.overlay.draw_info_panel(
            &mut annotated,
            PanelInfo {
                known_faces: self.gallery.len(),
                frame_count: self.frame_count,
            },
            now,
        );

        (annotated, detected_names)
    }

    /// Labels a single embedding. The distance is 1.0 when the gallery is
    /// empty.
    pub fn recognize(&self, embedding: &[f32]) -> (Label, f32) {
        let m = self.gallery.identify(embedding, self.settings.tolerance);
        (m.label, m.distance.unwrap_or(1.0))
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let small = downscale(frame, self.settings.downscale);
        let faces = self.analyzer.locate(&small)?;
        if faces.is_empty() {
            return Ok(Vec::new());
        }
        let encodings = self.analyzer.encode(&small, &faces)?;
        ensure!(
            encodings.len() == faces.len(),
            "encoder returned {} embeddings for {} faces",
            encodings.len(),
            faces.len()
        );

        let sx = frame.width() as f32 / small.width() as f32;
        let sy = frame.height() as f32 / small.height() as f32;

        let detections = faces
            .iter()
            .zip(encodings.iter())
            .map(|(face, encoding)| {
                let (label, distance) = self.recognize(encoding);
                debug!("Face at {:?}: {} (distance {:.3})", face, label, distance);
                Detection {
                    rect: Rect::new(face.x * sx, face.y * sy, face.width * sx, face.height * sy)
                        .clamp_to(frame.width(), frame.height()),
                    label,
                }
            })
            .collect();
        Ok(detections)
    }
}

fn downscale(frame: &Frame, factor: f32) -> Frame {
    if factor >= 1.0 {
        return frame.clone();
    }
    let w = ((frame.width() as f32 * factor).round() as u32).max(1);
    let h = ((frame.height() as f32 * factor).round() as u32).max(1);
    image::imageops::resize(frame, w, h, FilterType::Triangle)
}
