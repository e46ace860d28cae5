use anyhow::Result;
use log::info;

use crate::config::ModelConfig;
use crate::detector::FaceDetector;
use crate::encoder::FaceEncoder;
use crate::types::{Embedding, Frame, Rect};

/// Face localization and embedding, the two calls the recognizer and the
/// trainer make into the face model.
pub trait FaceAnalyzer {
    fn name(&self) -> String;

    /// Bounding boxes of every face in `image`.
    fn locate(&mut self, image: &Frame) -> Result<Vec<Rect>>;

    /// One embedding per box in `faces`, in the same order.
    fn encode(&mut self, image: &Frame, faces: &[Rect]) -> Result<Vec<Embedding>>;
}

/// UltraFace detector + ArcFace encoder, both through ONNX Runtime.
pub struct OnnxFaceAnalyzer {
    detector: FaceDetector,
    encoder: FaceEncoder,
}

impl OnnxFaceAnalyzer {
    pub fn new(models: &ModelConfig) -> Result<Self> {
        info!("Loading face detector from {}...", models.detector.display());
        let detector = FaceDetector::new(
            &models.detector,
            models.detector_score,
            models.nms_iou,
            models.intra_threads,
        )?;
        info!("Loading face encoder from {}...", models.encoder.display());
        let encoder = FaceEncoder::new(&models.encoder, models.encoder_input, models.intra_threads)?;
        Ok(Self { detector, encoder })
    }
}

impl FaceAnalyzer for OnnxFaceAnalyzer {
    fn name(&self) -> String {
        "UltraFace + ArcFace (ONNX)".to_string()
    }

    fn locate(&mut self, image: &Frame) -> Result<Vec<Rect>> {
        self.detector.detect(image)
    }

    fn encode(&mut self, image: &Frame, faces: &[Rect]) -> Result<Vec<Embedding>> {
        faces
            .iter()
            .map(|face| self.encoder.encode(image, face))
            .collect()
    }
}
