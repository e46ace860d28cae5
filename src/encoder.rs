use crate::types::{Embedding, Frame, Rect};
use anyhow::{bail, Context, Result};
use image::imageops::FilterType;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::Path;

/// ArcFace-style embedding network: square RGB crop in, L2-normalised
/// vector out.
pub struct FaceEncoder {
    session: Session,
    input_size: u32,
}

impl FaceEncoder {
    pub fn new(model_path: &Path, input_size: u32, intra_threads: usize) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads)?
            .commit_from_file(model_path)
            .with_context(|| format!("Failed to load face encoder {}", model_path.display()))?;
        Ok(Self { session, input_size })
    }

    pub fn encode(&mut self, frame: &Frame, face: &Rect) -> Result<Embedding> {
        let crop = square_crop(frame, face)?;
        let size = self.input_size;
        let resized = image::imageops::resize(&crop, size, size, FilterType::Triangle);

        // NCHW, scaled to [-1, 1]
        let plane = (size * size) as usize;
        let mut input_data = vec![0.0f32; 3 * plane];
        for (x, y, pixel) in resized.enumerate_pixels() {
            let i = (y * size + x) as usize;
            for c in 0..3 {
                input_data[c * plane + i] = (pixel[c] as f32 / 127.5) - 1.0;
            }
        }

        let input = Tensor::from_array((vec![1i64, 3, size as i64, size as i64], input_data))?;
        let outputs = self.session.run(ort::inputs![input])?;
        let (_shape, data) = outputs[0].try_extract_tensor::<f32>()?;

        let mut embedding = data.to_vec();
        l2_normalize(&mut embedding);
        Ok(embedding)
    }
}

/// Crops the square around `face`'s centre with side `max(w, h)`, clipped
/// to the frame.
fn square_crop(frame: &Frame, face: &Rect) -> Result<Frame> {
    let side = face.width.max(face.height);
    let cx = face.x + face.width / 2.0;
    let cy = face.y + face.height / 2.0;
    let square = Rect::new(cx - side / 2.0, cy - side / 2.0, side, side)
        .clamp_to(frame.width(), frame.height());
    if square.width < 1.0 || square.height < 1.0 {
        bail!("face region {:?} lies outside the frame", face);
    }
    Ok(image::imageops::crop_imm(
        frame,
        square.x as u32,
        square.y as u32,
        square.width as u32,
        square.height as u32,
    )
    .to_image())
}

pub(crate) fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        l2_normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn test_square_crop_is_clipped() {
        let frame = Frame::new(100, 80);
        let crop = square_crop(&frame, &Rect::new(80.0, 10.0, 20.0, 40.0)).unwrap();
        // 40x40 square centred on (90, 30), clipped at the right edge.
        assert_eq!(crop.width(), 30);
        assert_eq!(crop.height(), 40);

        assert!(square_crop(&frame, &Rect::new(200.0, 200.0, 10.0, 10.0)).is_err());
    }
}
