use image::Rgb;
use log::{debug, info};
use rusttype::{point, Font, Scale};
use std::fs;
use std::path::Path;

use crate::types::Frame;

/// TrueType text renderer for overlay labels.
pub struct FontRenderer {
    font: Font<'static>,
    size_pt: f32,
}

impl FontRenderer {
    /// Looks for `<family>.ttf` in the usual Linux and macOS font folders
    /// and the working directory.
    pub fn try_load(family: &str, size_pt: u32) -> Option<Self> {
        let paths = [
            format!("/usr/share/fonts/truetype/dejavu/{}.ttf", family),
            format!("/usr/share/fonts/truetype/{}.ttf", family),
            format!("/usr/share/fonts/TTF/{}.ttf", family),
            format!("/Library/Fonts/{}.ttf", family),
            format!("/System/Library/Fonts/Supplemental/{}.ttf", family),
            format!("{}.ttf", family),
        ];

        for p in paths.iter() {
            if !Path::new(p).exists() {
                continue;
            }
            if let Ok(data) = fs::read(p) {
                if let Some(font) = Font::try_from_vec(data) {
                    info!("Loaded font from {}", p);
                    return Some(Self {
                        font,
                        size_pt: size_pt as f32,
                    });
                }
            }
        }

        debug!("Could not find font family '{}'. Falling back to bitmap.", family);
        None
    }

    pub fn draw_text(&self, frame: &mut Frame, x: i32, y: i32, text: &str, color: Rgb<u8>) {
        let scale = Scale::uniform(self.size_pt);
        let v_metrics = self.font.v_metrics(scale);
        let start = point(x as f32, y as f32 + v_metrics.ascent);
        let (width, height) = (frame.width() as i32, frame.height() as i32);

        for glyph in self.font.layout(text, scale, start) {
            if let Some(bb) = glyph.pixel_bounding_box() {
                glyph.draw(|gx, gy, v| {
                    if v < 0.2 {
                        return;
                    }
                    let px = bb.min.x + gx as i32;
                    let py = bb.min.y + gy as i32;
                    if px >= 0 && py >= 0 && px < width && py < height {
                        frame.put_pixel(px as u32, py as u32, color);
                    }
                });
            }
        }
    }

    pub fn line_height(&self) -> u32 {
        let v_metrics = self.font.v_metrics(Scale::uniform(self.size_pt));
        (v_metrics.ascent - v_metrics.descent + v_metrics.line_gap).ceil() as u32
    }

    pub fn measure_width(&self, text: &str) -> u32 {
        let scale = Scale::uniform(self.size_pt);
        self.font
            .layout(text, scale, point(0.0, 0.0))
            .filter_map(|g| g.pixel_bounding_box())
            .map(|bb| bb.max.x)
            .max()
            .unwrap_or(0)
            .max(0) as u32
    }
}
