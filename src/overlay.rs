use chrono::NaiveDateTime;
use image::Rgb;

use crate::config::OverlayConfig;
use crate::font;
use crate::ttf::FontRenderer;
use crate::types::{Detection, Frame};

const KNOWN_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const UNKNOWN_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const TITLE_COLOR: Rgb<u8> = Rgb([255, 255, 0]);

const BOX_THICKNESS: i32 = 2;
const LABEL_STRIP_HEIGHT: i32 = 35;
const BITMAP_SCALE: u32 = 2;

// Info panel, in frame pixels.
const PANEL: (i32, i32, i32, i32) = (10, 10, 400, 100);
const PANEL_SHADE: f32 = 0.7;

/// Counters shown in the info panel.
#[derive(Debug, Clone, Copy)]
pub struct PanelInfo {
    pub known_faces: usize,
    pub frame_count: u64,
}

/// Draws recognition results and the status panel onto frames.
pub struct Overlay {
    font: Option<FontRenderer>,
    title: String,
}

impl Overlay {
    /// Uses the configured TrueType font when it can be found, else the
    /// bitmap font.
    pub fn new(config: &OverlayConfig) -> Self {
        Self {
            font: FontRenderer::try_load(&config.font_family, config.font_size_pt),
            title: config.title.clone(),
        }
    }

    pub fn bitmap(title: impl Into<String>) -> Self {
        Self {
            font: None,
            title: title.into(),
        }
    }

    pub fn draw_detections(&self, frame: &mut Frame, detections: &[Detection], now: NaiveDateTime) {
        for det in detections {
            let color = if det.label.is_known() {
                KNOWN_COLOR
            } else {
                UNKNOWN_COLOR
            };
            let r = det.rect;
            let (left, top) = (r.x as i32, r.y as i32);
            let (right, bottom) = (r.right() as i32, r.bottom() as i32);

            draw_rect_outline(frame, left, top, right, bottom, color, BOX_THICKNESS);

            // Name strip along the bottom edge of the box, widened for long names.
            let name = det.label.as_str();
            let strip_right = right.max(left + 12 + self.text_width(name) as i32);
            fill_rect(frame, left, bottom - LABEL_STRIP_HEIGHT, strip_right, bottom, color);
            let text_y = bottom - LABEL_STRIP_HEIGHT / 2 - self.text_height() as i32 / 2;
            self.text(frame, left + 6, text_y, name, TEXT_COLOR);

            if det.label.is_known() {
                let stamp = now.format("%H:%M:%S").to_string();
                self.text(frame, left + 6, top - 10 - self.text_height() as i32, &stamp, color);
            }
        }
    }

    pub fn draw_info_panel(&self, frame: &mut Frame, info: PanelInfo, now: NaiveDateTime) {
        let (x0, y0, x1, y1) = PANEL;
        shade_rect(frame, x0, y0, x1, y1, PANEL_SHADE);

        let line = self.text_height() as i32 + 8;
        let mut y = y0 + 8;
        self.text(frame, x0 + 10, y, &self.title, TITLE_COLOR);
        y += line;
        self.text(frame, x0 + 10, y, &format!("Known Faces: {}", info.known_faces), TEXT_COLOR);
        y += line;
        self.text(frame, x0 + 10, y, &format!("Frame: {}", info.frame_count), TEXT_COLOR);
        y += line;
        let stamp = now.format("%Y-%m-%d %H:%M:%S").to_string();
        self.text(frame, x0 + 10, y, &stamp, TEXT_COLOR);
    }

    fn text(&self, frame: &mut Frame, x: i32, y: i32, text: &str, color: Rgb<u8>) {
        match &self.font {
            Some(fr) => fr.draw_text(frame, x, y, text, color),
            None => font::draw_text_line(frame, x, y, text, color, BITMAP_SCALE),
        }
    }

    fn text_width(&self, text: &str) -> u32 {
        match &self.font {
            Some(fr) => fr.measure_width(text),
            None => font::measure_text_width(text, BITMAP_SCALE),
        }
    }

    fn text_height(&self) -> u32 {
        match &self.font {
            Some(fr) => fr.line_height(),
            None => font::text_height(BITMAP_SCALE),
        }
    }
}

/// Clips the half-open span `[x0, x1) x [y0, y1)` to the frame.
fn clip(frame: &Frame, x0: i32, y0: i32, x1: i32, y1: i32) -> Option<(u32, u32, u32, u32)> {
    let x0 = x0.max(0);
    let y0 = y0.max(0);
    let x1 = x1.min(frame.width() as i32);
    let y1 = y1.min(frame.height() as i32);
    if x0 >= x1 || y0 >= y1 {
        None
    } else {
        Some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
    }
}

fn fill_rect(frame: &mut Frame, x0: i32, y0: i32, x1: i32, y1: i32, color: Rgb<u8>) {
    if let Some((x0, y0, x1, y1)) = clip(frame, x0, y0, x1, y1) {
        for y in y0..y1 {
            for x in x0..x1 {
                frame.put_pixel(x, y, color);
            }
        }
    }
}

fn draw_rect_outline(
    frame: &mut Frame,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
    color: Rgb<u8>,
    thickness: i32,
) {
    fill_rect(frame, left, top, right, top + thickness, color);
    fill_rect(frame, left, bottom - thickness, right, bottom, color);
    fill_rect(frame, left, top, left + thickness, bottom, color);
    fill_rect(frame, right - thickness, top, right, bottom, color);
}

/// Darkens the area by `amount` (0 = unchanged, 1 = black).
fn shade_rect(frame: &mut Frame, x0: i32, y0: i32, x1: i32, y1: i32, amount: f32) {
    let keep = (1.0 - amount).clamp(0.0, 1.0);
    if let Some((x0, y0, x1, y1)) = clip(frame, x0, y0, x1, y1) {
        for y in y0..y1 {
            for x in x0..x1 {
                let p = frame.get_pixel_mut(x, y);
                for c in p.0.iter_mut() {
                    *c = (*c as f32 * keep).round() as u8;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Label, Rect};
    use chrono::NaiveDate;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_box_colors() {
        let mut frame = Frame::from_pixel(640, 480, Rgb([10, 10, 10]));
        let overlay = Overlay::bitmap("Test");
        let detections = vec![
            Detection {
                rect: Rect::new(100.0, 150.0, 100.0, 100.0),
                label: Label::Known("Alice".into()),
            },
            Detection {
                rect: Rect::new(400.0, 150.0, 100.0, 100.0),
                label: Label::Unknown,
            },
        ];
        overlay.draw_detections(&mut frame, &detections, noon());

        assert_eq!(*frame.get_pixel(100, 160), KNOWN_COLOR);
        assert_eq!(*frame.get_pixel(400, 160), UNKNOWN_COLOR);
        // Interior above the label strip is untouched.
        assert_eq!(*frame.get_pixel(150, 170), Rgb([10, 10, 10]));
    }

    #[test]
    fn test_info_panel_shades_corner() {
        let mut frame = Frame::from_pixel(640, 480, Rgb([100, 100, 100]));
        let overlay = Overlay::bitmap("Test");
        overlay.draw_info_panel(&mut frame, PanelInfo { known_faces: 2, frame_count: 9 }, noon());

        assert_eq!(*frame.get_pixel(395, 95), Rgb([30, 30, 30]));
        assert_eq!(*frame.get_pixel(500, 300), Rgb([100, 100, 100]));
    }

    #[test]
    fn test_drawing_clips_to_small_frames() {
        let mut frame = Frame::new(32, 24);
        let overlay = Overlay::bitmap("Test");
        let detections = vec![Detection {
            rect: Rect::new(20.0, 5.0, 40.0, 40.0),
            label: Label::Known("Bob".into()),
        }];
        overlay.draw_detections(&mut frame, &detections, noon());
        overlay.draw_info_panel(&mut frame, PanelInfo { known_faces: 0, frame_count: 1 }, noon());
    }
}
