// SPDX-License-Identifier: MPL-2.0
//! Fitting a frame into a host viewport.
//!
//! Hosts draw the frame buffer themselves; this only computes where.

/// An axis-aligned rectangle in host coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    #[must_use]
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Where and how large to draw a frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Placement {
    /// Uniform scale applied to the frame.
    pub scale: f32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Scales `frame` to fit inside `viewport`, preserving its aspect ratio, and
/// centres it.
///
/// An empty frame or viewport yields an empty placement at the viewport's
/// centre.
///
/// # Examples
///
/// ```
/// use vidclock::layout::{fit_frame, Rect};
///
/// let placement = fit_frame((640, 480), Rect::new(0.0, 0.0, 1280.0, 720.0));
/// assert_eq!(placement.scale, 1.5);
/// assert_eq!((placement.width, placement.height), (960.0, 720.0));
/// assert_eq!((placement.x, placement.y), (160.0, 0.0));
/// ```
#[must_use]
// Allow cast_precision_loss: f32 is exact for frame dimensions up to 2^24.
#[allow(clippy::cast_precision_loss)]
pub fn fit_frame(frame: (u32, u32), viewport: Rect) -> Placement {
    let (frame_width, frame_height) = frame;
    let centre_x = viewport.x + viewport.width.max(0.0) / 2.0;
    let centre_y = viewport.y + viewport.height.max(0.0) / 2.0;

    if frame_width == 0 || frame_height == 0 || viewport.width <= 0.0 || viewport.height <= 0.0 {
        return Placement {
            scale: 0.0,
            x: centre_x,
            y: centre_y,
            width: 0.0,
            height: 0.0,
        };
    }

    let scale_x = viewport.width / frame_width as f32;
    let scale_y = viewport.height / frame_height as f32;
    let scale = scale_x.min(scale_y);

    let width = frame_width as f32 * scale;
    let height = frame_height as f32 * scale;

    Placement {
        scale,
        x: centre_x - width / 2.0,
        y: centre_y - height / 2.0,
        width,
        height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn wide_viewport_letterboxes_horizontally() {
        let placement = fit_frame((100, 100), Rect::new(0.0, 0.0, 400.0, 200.0));
        assert_relative_eq!(placement.scale, 2.0);
        assert_relative_eq!(placement.width, 200.0);
        assert_relative_eq!(placement.height, 200.0);
        assert_relative_eq!(placement.x, 100.0);
        assert_relative_eq!(placement.y, 0.0);
    }

    #[test]
    fn tall_viewport_letterboxes_vertically() {
        let placement = fit_frame((320, 240), Rect::new(10.0, 20.0, 160.0, 400.0));
        assert_relative_eq!(placement.scale, 0.5);
        assert_relative_eq!(placement.width, 160.0);
        assert_relative_eq!(placement.height, 120.0);
        assert_relative_eq!(placement.x, 10.0);
        assert_relative_eq!(placement.y, 20.0 + 140.0);
    }

    #[test]
    fn empty_inputs_collapse_to_centre() {
        let placement = fit_frame((0, 240), Rect::new(0.0, 0.0, 100.0, 50.0));
        assert_relative_eq!(placement.scale, 0.0);
        assert_relative_eq!(placement.x, 50.0);
        assert_relative_eq!(placement.y, 25.0);

        let placement = fit_frame((320, 240), Rect::new(0.0, 0.0, -5.0, 50.0));
        assert_relative_eq!(placement.width, 0.0);
    }
}
