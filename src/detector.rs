use crate::types::{Frame, Rect};
use anyhow::{Context, Result};
use image::imageops::FilterType;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::Path;

const INPUT_WIDTH: u32 = 320;
const INPUT_HEIGHT: u32 = 240;

/// UltraFace (RFB-320) face localizer.
pub struct FaceDetector {
    session: Session,
    anchors: Vec<(f32, f32, f32, f32)>, // cx, cy, w, h
    score_threshold: f32,
    iou_threshold: f32,
}

impl FaceDetector {
    pub fn new(
        model_path: &Path,
        score_threshold: f32,
        iou_threshold: f32,
        intra_threads: usize,
    ) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads)?
            .commit_from_file(model_path)
            .with_context(|| format!("Failed to load face detector {}", model_path.display()))?;

        let anchors = generate_anchors(INPUT_WIDTH as usize, INPUT_HEIGHT as usize);
        Ok(Self {
            session,
            anchors,
            score_threshold,
            iou_threshold,
        })
    }

    /// Every face in `frame`, in frame coordinates, highest score first.
    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<Rect>> {
        if frame.width() == 0 || frame.height() == 0 {
            return Ok(Vec::new());
        }
        let resized = image::imageops::resize(frame, INPUT_WIDTH, INPUT_HEIGHT, FilterType::Triangle);

        // NCHW [1, 3, 240, 320], (pixel - 127) / 128
        let plane = (INPUT_WIDTH * INPUT_HEIGHT) as usize;
        let mut input_data = vec![0.0f32; 3 * plane];
        for (x, y, pixel) in resized.enumerate_pixels() {
            let i = (y * INPUT_WIDTH + x) as usize;
            for c in 0..3 {
                input_data[c * plane + i] = (pixel[c] as f32 - 127.0) / 128.0;
            }
        }

        let input_tensor = Tensor::from_array((
            vec![1i64, 3, INPUT_HEIGHT as i64, INPUT_WIDTH as i64],
            input_data,
        ))?;
        let outputs = self.session.run(ort::inputs![input_tensor])?;

        let (_scores_shape, scores_data) = outputs["scores"].try_extract_tensor::<f32>()?;
        let (_boxes_shape, boxes_data) = outputs["boxes"].try_extract_tensor::<f32>()?;

        let candidates = decode_boxes(&self.anchors, scores_data, boxes_data, self.score_threshold);
        let kept = non_max_suppression(candidates, self.iou_threshold);

        let sx = frame.width() as f32 / INPUT_WIDTH as f32;
        let sy = frame.height() as f32 / INPUT_HEIGHT as f32;
        Ok(kept
            .into_iter()
            .map(|(rect, _)| {
                Rect::new(rect.x * sx, rect.y * sy, rect.width * sx, rect.height * sy)
                    .clamp_to(frame.width(), frame.height())
            })
            .filter(|r| r.area() > 0.0)
            .collect())
    }
}

/// Decodes anchor offsets into boxes in model-input pixels.
fn decode_boxes(
    anchors: &[(f32, f32, f32, f32)],
    scores_raw: &[f32],
    boxes_raw: &[f32],
    threshold: f32,
) -> Vec<(Rect, f32)> {
    let center_variance = 0.1;
    let size_variance = 0.2;

    let n = anchors
        .len()
        .min(scores_raw.len() / 2)
        .min(boxes_raw.len() / 4);

    let mut out = Vec::new();
    for i in 0..n {
        let score = scores_raw[i * 2 + 1];
        if score <= threshold {
            continue;
        }
        let (ax, ay, aw, ah) = anchors[i];
        let cx = boxes_raw[i * 4] * center_variance * aw + ax;
        let cy = boxes_raw[i * 4 + 1] * center_variance * ah + ay;
        let w = (boxes_raw[i * 4 + 2] * size_variance).exp() * aw;
        let h = (boxes_raw[i * 4 + 3] * size_variance).exp() * ah;

        let x = cx - w / 2.0;
        let y = cy - h / 2.0;
        out.push((
            Rect::new(
                x * INPUT_WIDTH as f32,
                y * INPUT_HEIGHT as f32,
                w * INPUT_WIDTH as f32,
                h * INPUT_HEIGHT as f32,
            ),
            score,
        ));
    }
    out
}

fn non_max_suppression(mut boxes: Vec<(Rect, f32)>, iou_threshold: f32) -> Vec<(Rect, f32)> {
    boxes.sort_by(|a, b| b.1.total_cmp(&a.1));
    let mut keep: Vec<(Rect, f32)> = Vec::new();
    for candidate in boxes {
        if keep.iter().all(|(k, _)| k.iou(&candidate.0) < iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

fn generate_anchors(width: usize, height: usize) -> Vec<(f32, f32, f32, f32)> {
    let shrinkage_list = [8, 16, 32, 64];
    let min_boxes: [&[f32]; 4] = [
        &[10.0, 16.0, 24.0],
        &[32.0, 48.0],
        &[64.0, 96.0],
        &[128.0, 192.0, 256.0],
    ];
    let mut anchors = Vec::new();

    let w = width as f32;
    let h = height as f32;

    for (i, &shrinkage) in shrinkage_list.iter().enumerate() {
        let feature_h = (height as f32 / shrinkage as f32).ceil() as usize;
        let feature_w = (width as f32 / shrinkage as f32).ceil() as usize;

        for v in 0..feature_h {
            for u in 0..feature_w {
                let cx = (u as f32 * shrinkage as f32 + shrinkage as f32 / 2.0) / w;
                let cy = (v as f32 * shrinkage as f32 + shrinkage as f32 / 2.0) / h;

                for &min_box in min_boxes[i] {
                    anchors.push((cx, cy, min_box / w, min_box / h));
                }
            }
        }
    }
    anchors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anchor_count_matches_rfb320() {
        assert_eq!(generate_anchors(320, 240).len(), 4420);
    }

    #[test]
    fn test_decode_filters_by_score() {
        let anchors = vec![(0.5, 0.5, 0.1, 0.1), (0.25, 0.25, 0.2, 0.2)];
        let scores = vec![0.2, 0.8, 0.9, 0.1];
        let boxes = vec![0.0; 8];
        let decoded = decode_boxes(&anchors, &scores, &boxes, 0.7);
        assert_eq!(decoded.len(), 1);
        let (rect, score) = decoded[0];
        assert_eq!(score, 0.8);
        assert!((rect.x - (0.45 * 320.0)).abs() < 1e-3);
        assert!((rect.width - 32.0).abs() < 1e-3);
    }

    #[test]
    fn test_nms_keeps_distinct_faces() {
        let boxes = vec![
            (Rect::new(0.0, 0.0, 10.0, 10.0), 0.8),
            (Rect::new(1.0, 1.0, 10.0, 10.0), 0.9),
            (Rect::new(50.0, 50.0, 10.0, 10.0), 0.75),
        ];
        let kept = non_max_suppression(boxes, 0.3);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].1, 0.9);
        assert_eq!(kept[1].1, 0.75);
    }
}
