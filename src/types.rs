use std::fmt;

use image::{ImageBuffer, Rgb};

/// A captured RGB frame.
pub type Frame = ImageBuffer<Rgb<u8>, Vec<u8>>;

/// Face embedding produced by the encoder model.
pub type Embedding = Vec<f32>;

/// Label drawn for faces that matched nothing in the gallery.
pub const UNKNOWN_LABEL: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Clips the rectangle to a `width` x `height` image.
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let x = self.x.clamp(0.0, width as f32);
        let y = self.y.clamp(0.0, height as f32);
        let right = self.right().clamp(0.0, width as f32);
        let bottom = self.bottom().clamp(0.0, height as f32);
        Self::new(x, y, right - x, bottom - y)
    }

    pub fn iou(&self, other: &Rect) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());

        let intersection = if x2 > x1 && y2 > y1 {
            (x2 - x1) * (y2 - y1)
        } else {
            0.0
        };
        let union = self.area() + other.area() - intersection;
        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

/// Identity assigned to a located face.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Label {
    Known(String),
    Unknown,
}

impl Label {
    pub fn is_known(&self) -> bool {
        matches!(self, Label::Known(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Label::Known(name) => name,
            Label::Unknown => UNKNOWN_LABEL,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub rect: Rect,
    pub label: Label,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_edges_and_clamp() {
        let r = Rect::new(10.0, 20.0, 30.0, 40.0);
        assert_eq!((r.right(), r.bottom(), r.area()), (40.0, 60.0, 1200.0));

        let clipped = Rect::new(-5.0, 10.0, 20.0, 100.0).clamp_to(50, 50);
        assert_eq!(clipped, Rect::new(0.0, 10.0, 15.0, 40.0));
    }

    #[test]
    fn test_iou() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        let b = Rect::new(5.0, 0.0, 10.0, 10.0);
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);
        let c = Rect::new(20.0, 20.0, 5.0, 5.0);
        assert_eq!(a.iou(&c), 0.0);
    }

    #[test]
    fn test_label_display() {
        assert_eq!(Label::Unknown.to_string(), "Unknown");
        assert_eq!(Label::Known("Ada Lovelace".into()).to_string(), "Ada Lovelace");
        assert!(!Label::Unknown.is_known());
    }
}
