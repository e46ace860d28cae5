use anyhow::{anyhow, Result};

use crate::types::Frame;

/// Desktop preview window for annotated frames.
pub struct WindowOutput {
    window: minifb::Window,
    buffer: Vec<u32>,
    width: usize,
    height: usize,
}

impl WindowOutput {
    pub fn new(title: &str, width: usize, height: usize) -> Result<Self> {
        let mut window = minifb::Window::new(
            title,
            width,
            height,
            minifb::WindowOptions {
                resize: true,
                ..minifb::WindowOptions::default()
            },
        )
        .map_err(|e| anyhow!("Failed to create window: {}", e))?;

        window.limit_update_rate(Some(std::time::Duration::from_micros(16600))); // ~60 FPS

        Ok(Self {
            window,
            buffer: vec![0; width * height],
            width,
            height,
        })
    }

    pub fn is_open(&self) -> bool {
        self.window.is_open()
    }

    pub fn is_key_down(&self, key: minifb::Key) -> bool {
        self.window.is_key_down(key)
    }

    pub fn is_key_pressed(&self, key: minifb::Key) -> bool {
        self.window.is_key_pressed(key, minifb::KeyRepeat::No)
    }

    /// Shows `frame`, following its size if the camera changed resolution.
    pub fn show(&mut self, frame: &Frame) -> Result<()> {
        let (w, h) = (frame.width() as usize, frame.height() as usize);
        if w != self.width || h != self.height {
            self.width = w;
            self.height = h;
        }
        self.buffer.resize(self.width * self.height, 0);
        pack_argb(frame, &mut self.buffer);

        self.window
            .update_with_buffer(&self.buffer, self.width, self.height)
            .map_err(|e| anyhow!("Window update failed: {}", e))
    }

    /// Keeps the window responsive when there is no new frame.
    pub fn idle(&mut self) {
        self.window.update();
    }
}

fn pack_argb(frame: &Frame, buffer: &mut [u32]) {
    for (dst, pixel) in buffer.iter_mut().zip(frame.pixels()) {
        *dst = ((pixel[0] as u32) << 16) | ((pixel[1] as u32) << 8) | pixel[2] as u32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_pack_argb() {
        let mut frame = Frame::new(2, 1);
        frame.put_pixel(0, 0, Rgb([0x12, 0x34, 0x56]));
        frame.put_pixel(1, 0, Rgb([255, 0, 0]));
        let mut buffer = vec![0u32; 2];
        pack_argb(&frame, &mut buffer);
        assert_eq!(buffer, vec![0x123456, 0xFF0000]);
    }
}
