//! Built-in 3x5 bitmap font, used when no TrueType font is available.

use crate::types::Frame;
use image::Rgb;

pub const GLYPH_WIDTH: u32 = 3;
pub const GLYPH_HEIGHT: u32 = 5;

/// Draws `text` with its top-left corner at (`x`, `y`). Pixels outside the
/// frame are dropped.
pub fn draw_text_line(frame: &mut Frame, x: i32, y: i32, text: &str, color: Rgb<u8>, scale: u32) {
    let mut cx = x;
    for c in text.chars() {
        draw_char(frame, cx, y, c, color, scale);
        cx += advance(scale) as i32;
    }
}

pub fn measure_text_width(text: &str, scale: u32) -> u32 {
    text.chars().count() as u32 * advance(scale)
}

pub fn text_height(scale: u32) -> u32 {
    GLYPH_HEIGHT * scale
}

// 3 columns plus 1 column of spacing.
fn advance(scale: u32) -> u32 {
    (GLYPH_WIDTH + 1) * scale
}

fn glyph(c: char) -> [u8; 5] {
    // Each row is 3 bits, leftmost column in bit 2.
    match c.to_ascii_uppercase() {
        '0' => [0x7, 0x5, 0x5, 0x5, 0x7],
        '1' => [0x2, 0x6, 0x2, 0x2, 0x7],
        '2' => [0x7, 0x1, 0x7, 0x4, 0x7],
        '3' => [0x7, 0x1, 0x7, 0x1, 0x7],
        '4' => [0x5, 0x5, 0x7, 0x1, 0x1],
        '5' => [0x7, 0x4, 0x7, 0x1, 0x7],
        '6' => [0x7, 0x4, 0x7, 0x5, 0x7],
        '7' => [0x7, 0x1, 0x2, 0x4, 0x4],
        '8' => [0x7, 0x5, 0x7, 0x5, 0x7],
        '9' => [0x7, 0x5, 0x7, 0x1, 0x7],
        'A' => [0x2, 0x5, 0x7, 0x5, 0x5],
        'B' => [0x6, 0x5, 0x6, 0x5, 0x6],
        'C' => [0x7, 0x4, 0x4, 0x4, 0x7],
        'D' => [0x6, 0x5, 0x5, 0x5, 0x6],
        'E' => [0x7, 0x4, 0x6, 0x4, 0x7],
        'F' => [0x7, 0x4, 0x6, 0x4, 0x4],
        'G' => [0x7, 0x4, 0x5, 0x5, 0x7],
        'H' => [0x5, 0x5, 0x7, 0x5, 0x5],
        'I' => [0x7, 0x2, 0x2, 0x2, 0x7],
        'J' => [0x1, 0x1, 0x1, 0x5, 0x7],
        'K' => [0x5, 0x5, 0x6, 0x5, 0x5],
        'L' => [0x4, 0x4, 0x4, 0x4, 0x7],
        'M' => [0x5, 0x7, 0x7, 0x5, 0x5],
        'N' => [0x6, 0x5, 0x5, 0x5, 0x5],
        'O' => [0x7, 0x5, 0x5, 0x5, 0x7],
        'P' => [0x7, 0x5, 0x7, 0x4, 0x4],
        'Q' => [0x7, 0x5, 0x5, 0x7, 0x1],
        'R' => [0x6, 0x5, 0x6, 0x5, 0x5],
        'S' => [0x3, 0x4, 0x2, 0x1, 0x6],
        'T' => [0x7, 0x2, 0x2, 0x2, 0x2],
        'U' => [0x5, 0x5, 0x5, 0x5, 0x7],
        'V' => [0x5, 0x5, 0x5, 0x5, 0x2],
        'W' => [0x5, 0x5, 0x7, 0x7, 0x5],
        'X' => [0x5, 0x5, 0x2, 0x5, 0x5],
        'Y' => [0x5, 0x5, 0x2, 0x2, 0x2],
        'Z' => [0x7, 0x1, 0x2, 0x4, 0x7],
        ' ' => [0x0, 0x0, 0x0, 0x0, 0x0],
        ':' => [0x0, 0x2, 0x0, 0x2, 0x0],
        '-' => [0x0, 0x0, 0x7, 0x0, 0x0],
        '+' => [0x0, 0x2, 0x7, 0x2, 0x0],
        '.' => [0x0, 0x0, 0x0, 0x0, 0x2],
        ',' => [0x0, 0x0, 0x0, 0x2, 0x4],
        '_' => [0x0, 0x0, 0x0, 0x0, 0x7],
        '/' => [0x1, 0x1, 0x2, 0x4, 0x4],
        '%' => [0x5, 0x1, 0x2, 0x4, 0x5],
        '\'' => [0x2, 0x2, 0x0, 0x0, 0x0],
        '!' => [0x2, 0x2, 0x2, 0x0, 0x2],
        '?' => [0x7, 0x1, 0x2, 0x0, 0x2],
        '(' => [0x2, 0x4, 0x4, 0x4, 0x2],
        ')' => [0x2, 0x1, 0x1, 0x1, 0x2],
        '[' => [0x7, 0x4, 0x4, 0x4, 0x7],
        ']' => [0x7, 0x1, 0x1, 0x1, 0x7],
        _ => [0x7, 0x7, 0x7, 0x7, 0x7],
    }
}

fn draw_char(frame: &mut Frame, x: i32, y: i32, c: char, color: Rgb<u8>, scale: u32) {
    let (width, height) = (frame.width() as i32, frame.height() as i32);
    let scale = scale as i32;
    for (row, bits) in glyph(c).iter().enumerate() {
        for col in 0..GLYPH_WIDTH as i32 {
            if (bits >> (2 - col)) & 1 == 0 {
                continue;
            }
            for dy in 0..scale {
                for dx in 0..scale {
                    let px = x + col * scale + dx;
                    let py = y + row as i32 * scale + dy;
                    if px >= 0 && py >= 0 && px < width && py < height {
                        frame.put_pixel(px as u32, py as u32, color);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measure() {
        assert_eq!(measure_text_width("ABC", 2), 24);
        assert_eq!(measure_text_width("", 2), 0);
        assert_eq!(text_height(3), 15);
    }

    #[test]
    fn test_draws_inside_and_clips_outside() {
        let mut frame = Frame::new(20, 10);
        let red = Rgb([255, 0, 0]);
        draw_text_line(&mut frame, 0, 0, "1", red, 1);
        // '1' top row is 010
        assert_eq!(*frame.get_pixel(1, 0), red);
        assert_eq!(*frame.get_pixel(0, 0), Rgb([0, 0, 0]));

        // Entirely off-frame text must not panic.
        draw_text_line(&mut frame, -50, -50, "HELLO", red, 2);
        draw_text_line(&mut frame, 18, 8, "WORLD", red, 2);
    }
}
