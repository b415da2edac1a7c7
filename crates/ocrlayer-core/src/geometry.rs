//! Conversion between pixel space (top-left origin) and PDF point space
//! (bottom-left origin).

use crate::models::{PixelBox, PointBox};

/// Points per inch in PDF user space.
pub const POINTS_PER_INCH: f64 = 72.0;

/// Size in pixels of a page dimension rendered at `dpi`.
pub fn pixels_for(points: f64, dpi: u32) -> u32 {
    (points * dpi as f64 / POINTS_PER_INCH).ceil().max(1.0) as u32
}

/// Map a pixel box to page point space, flipping the vertical axis.
///
/// The result is relative to the visible box origin and clamped to
/// `[0, width_pt] x [0, height_pt]`.
pub fn map_box(pixel: &PixelBox, width_pt: f64, height_pt: f64, dpi: u32) -> PointBox {
    let to_points = |px: f64| px * POINTS_PER_INCH / dpi as f64;

    let x0 = to_points(pixel.x);
    let x1 = to_points(pixel.x + pixel.width);
    let y0 = height_pt - to_points(pixel.y + pixel.height);
    let y1 = height_pt - to_points(pixel.y);

    PointBox {
        x0: x0.clamp(0.0, width_pt),
        y0: y0.clamp(0.0, height_pt),
        x1: x1.clamp(0.0, width_pt),
        y1: y1.clamp(0.0, height_pt),
    }
}
