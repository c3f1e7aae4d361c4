//! Shared helpers for rendering synthetic frames in unit tests.

use image::Luma;

use crate::extract::FloatImage;

/// Render a quiet frame (intensity 1.0) with one hard-edged dark disk:
/// intensity 0.0 inside `radius` of `center` (row, col).
pub(crate) fn draw_disk_frame(width: u32, height: u32, center: [f64; 2], radius: f64) -> FloatImage {
    let mut img = FloatImage::from_pixel(width, height, Luma([1.0]));
    for y in 0..height {
        for x in 0..width {
            let dr = y as f64 - center[0];
            let dc = x as f64 - center[1];
            if (dr * dr + dc * dc).sqrt() <= radius {
                img.put_pixel(x, y, Luma([0.0]));
            }
        }
    }
    img
}

/// Render a quiet-sun frame (intensity 1.0) with dark Gaussian spots.
///
/// Each spot is `(center_rc, sigma, depth)`; intensity drops by `depth *
/// exp(-d^2 / (2 sigma^2))`. At depth 0.9 the iso-contours at levels
/// 0.9 / 0.65 / 0.5 sit at roughly 2.1, 1.4 and 1.1 sigma from the center.
/// Overlapping spots keep the darker value.
pub(crate) fn draw_sun_frame(width: u32, height: u32, spots: &[([f64; 2], f64, f64)]) -> FloatImage {
    let mut img = FloatImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let mut v: f32 = 1.0;
            for &(center, sigma, depth) in spots {
                let dr = y as f64 - center[0];
                let dc = x as f64 - center[1];
                let spot = 1.0 - depth * (-(dr * dr + dc * dc) / (2.0 * sigma * sigma)).exp();
                v = v.min(spot as f32);
            }
            img.put_pixel(x, y, Luma([v]));
        }
    }
    img
}

/// Render a quiet-background frame with reproducible granulation texture and
/// a dark spot, for exercising the registration tiers.
pub(crate) fn draw_textured_frame(width: u32, height: u32, shift: [f64; 2]) -> FloatImage {
    let mut img = FloatImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let r = y as f64 - shift[0];
            let c = x as f64 - shift[1];
            // Deterministic pseudo-granulation: incommensurate sinusoid
            // gratings at varied orientations, aperiodic over the frame.
            let texture = 0.5
                + 0.12 * (0.55 * r + 0.21 * c).sin()
                + 0.12 * (0.73 * c - 0.17 * r + 1.3).sin()
                + 0.10 * (0.31 * (r + c) + 0.7).sin()
                + 0.08 * (0.91 * r - 0.43 * c + 2.1).sin()
                + 0.08 * (0.13 * r + 0.67 * c + 0.4).sin();
            let dr = r - height as f64 * 0.5;
            let dc = c - width as f64 * 0.5;
            let spot = if (dr * dr + dc * dc).sqrt() < 6.0 { -0.35 } else { 0.0 };
            img.put_pixel(x, y, Luma([(texture + spot) as f32]));
        }
    }
    img
}
