// SPDX-License-Identifier: MPL-2.0
//! The reusable pixel surface handed to the host.

use image_rs::{Rgba, RgbaImage};

use crate::decoder::VideoFrame;

const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// One RGBA image at the video's native resolution, overwritten in place.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    image: RgbaImage,
    on_black: bool,
}

impl FrameBuffer {
    /// Creates a black buffer.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::from_pixel(width, height, BLACK),
            on_black: true,
        }
    }

    #[must_use]
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Whether the buffer holds the blanking frame.
    #[must_use]
    pub fn is_black(&self) -> bool {
        self.on_black
    }

    /// Copies `frame` into the buffer, or blanks it for `None`.
    ///
    /// Frames whose size doesn't match the buffer are skipped.
    pub fn copy_frame(&mut self, frame: Option<&VideoFrame>) {
        let Some(frame) = frame else {
            self.fill_black();
            return;
        };

        let (width, height) = self.image.dimensions();
        if frame.width != width || frame.height != height || frame.rgba.len() != self.image.len()
        {
            tracing::warn!(
                frame_width = frame.width,
                frame_height = frame.height,
                width,
                height,
                "skipping frame with unexpected size"
            );
            return;
        }

        self.image.copy_from_slice(&frame.rgba);
        self.on_black = false;
    }

    fn fill_black(&mut self) {
        if self.on_black {
            return;
        }
        for pixel in self.image.pixels_mut() {
            *pixel = BLACK;
        }
        self.on_black = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32, value: u8) -> VideoFrame {
        VideoFrame {
            rgba: vec![value; (width * height * 4) as usize],
            width,
            height,
            time_secs: 0.0,
        }
    }

    #[test]
    fn starts_black_and_opaque() {
        let buffer = FrameBuffer::new(3, 2);
        assert!(buffer.is_black());
        assert_eq!(buffer.image().dimensions(), (3, 2));
        assert!(buffer.image().pixels().all(|p| *p == BLACK));
    }

    #[test]
    fn copy_frame_overwrites_pixels() {
        let mut buffer = FrameBuffer::new(2, 2);
        buffer.copy_frame(Some(&frame(2, 2, 7)));
        assert!(!buffer.is_black());
        assert!(buffer.image().iter().all(|b| *b == 7));
    }

    #[test]
    fn none_blanks_the_buffer() {
        let mut buffer = FrameBuffer::new(2, 2);
        buffer.copy_frame(Some(&frame(2, 2, 7)));
        buffer.copy_frame(None);
        assert!(buffer.is_black());
        assert!(buffer.image().pixels().all(|p| *p == BLACK));
    }

    #[test]
    fn mismatched_frame_is_skipped() {
        let mut buffer = FrameBuffer::new(2, 2);
        buffer.copy_frame(Some(&frame(2, 2, 7)));
        buffer.copy_frame(Some(&frame(4, 4, 9)));
        assert!(buffer.image().iter().all(|b| *b == 7));
    }
}
