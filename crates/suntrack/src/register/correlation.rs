//! Masked cross-correlation translation estimation, the second registration
//! tier. Exhaustive spatial search over a bounded shift range with half-pixel
//! refinement; frames are registered once per pair and cached upstream, so
//! the exhaustive scan is acceptable for offline batch runs.

use crate::extract::FloatImage;
use crate::raster::Mask;

use super::MaskDirection;

/// Minimum number of jointly valid pixels for a shift to be scored.
const MIN_OVERLAP: usize = 16;

/// Binarize `|pixel|` against `threshold`: `Below` keeps the quiet
/// background, `Above` keeps active regions.
pub(crate) fn threshold_mask(image: &FloatImage, threshold: f32, direction: MaskDirection) -> Mask {
    let (width, height) = image.dimensions();
    let mut mask = Mask::zeros((height as usize, width as usize));
    for y in 0..height {
        for x in 0..width {
            let v = image.get_pixel(x, y)[0].abs();
            let keep = match direction {
                MaskDirection::Below => v < threshold,
                MaskDirection::Above => v > threshold,
            };
            mask.set(y as usize, x as usize, keep);
        }
    }
    mask
}

/// Pearson correlation between `target` and `source` shifted by
/// `(dy, dx)` (possibly fractional), over pixels valid in both masks.
/// `None` when the overlap is too small or the variance degenerates.
fn shifted_correlation(
    target: &FloatImage,
    source: &FloatImage,
    target_mask: &Mask,
    source_mask: &Mask,
    dy: f64,
    dx: f64,
) -> Option<f64> {
    let (width, height) = target.dimensions();
    let (mut n, mut sa, mut sb, mut saa, mut sbb, mut sab) = (0usize, 0.0, 0.0, 0.0, 0.0, 0.0);

    for y in 0..height as i64 {
        for x in 0..width as i64 {
            if !target_mask.get(y as usize, x as usize) {
                continue;
            }
            let sy = y as f64 - dy;
            let sx = x as f64 - dx;
            let Some(b) = sample_masked(source, source_mask, sy, sx) else {
                continue;
            };
            let a = target.get_pixel(x as u32, y as u32)[0] as f64;
            n += 1;
            sa += a;
            sb += b;
            saa += a * a;
            sbb += b * b;
            sab += a * b;
        }
    }

    if n < MIN_OVERLAP {
        return None;
    }
    let nf = n as f64;
    let var_a = saa - sa * sa / nf;
    let var_b = sbb - sb * sb / nf;
    if var_a <= 1e-12 || var_b <= 1e-12 {
        return None;
    }
    Some((sab - sa * sb / nf) / (var_a * var_b).sqrt())
}

/// Bilinear sample of `image` at fractional (row, col); `None` when any of
/// the four neighbors is out of bounds or masked out.
fn sample_masked(image: &FloatImage, mask: &Mask, row: f64, col: f64) -> Option<f64> {
    let (width, height) = image.dimensions();
    let r0 = row.floor();
    let c0 = col.floor();
    if r0 < 0.0 || c0 < 0.0 || r0 + 1.0 > (height - 1) as f64 || c0 + 1.0 > (width - 1) as f64 {
        // Integer positions on the last row/col are still fine.
        if row >= 0.0
            && col >= 0.0
            && row == r0
            && col == c0
            && (row as u32) < height
            && (col as u32) < width
        {
            let (r, c) = (row as usize, col as usize);
            return mask.get(r, c).then(|| image.get_pixel(c as u32, r as u32)[0] as f64);
        }
        return None;
    }

    let (r, c) = (r0 as usize, c0 as usize);
    let fr = row - r0;
    let fc = col - c0;
    for (rr, cc) in [(r, c), (r, c + 1), (r + 1, c), (r + 1, c + 1)] {
        if !mask.get(rr, cc) {
            return None;
        }
    }
    let v = |rr: usize, cc: usize| image.get_pixel(cc as u32, rr as u32)[0] as f64;
    Some(
        v(r, c) * (1.0 - fr) * (1.0 - fc)
            + v(r, c + 1) * (1.0 - fr) * fc
            + v(r + 1, c) * fr * (1.0 - fc)
            + v(r + 1, c + 1) * fr * fc,
    )
}

/// Estimate the (dy, dx) translation aligning `source` onto `target` using
/// masked cross-correlation: integer-shift search within `max_shift`, then
/// half-pixel refinement of the peak (2× upsampling equivalent).
///
/// Returns `None` when no shift reaches the minimum mask overlap.
pub(crate) fn estimate_masked_shift(
    target: &FloatImage,
    source: &FloatImage,
    target_mask: &Mask,
    source_mask: &Mask,
    max_shift: i32,
) -> Option<[f64; 2]> {
    let mut best: Option<([f64; 2], f64)> = None;
    for dy in -max_shift..=max_shift {
        for dx in -max_shift..=max_shift {
            let Some(corr) =
                shifted_correlation(target, source, target_mask, source_mask, dy as f64, dx as f64)
            else {
                continue;
            };
            if best.map_or(true, |(_, b)| corr > b) {
                best = Some(([dy as f64, dx as f64], corr));
            }
        }
    }
    let ([dy, dx], mut best_corr) = best?;

    let mut refined = [dy, dx];
    for ry in [-0.5, 0.0, 0.5] {
        for rx in [-0.5, 0.0, 0.5] {
            if ry == 0.0 && rx == 0.0 {
                continue;
            }
            if let Some(corr) =
                shifted_correlation(target, source, target_mask, source_mask, dy + ry, dx + rx)
            {
                if corr > best_corr {
                    best_corr = corr;
                    refined = [dy + ry, dx + rx];
                }
            }
        }
    }
    Some(refined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::draw_textured_frame;

    #[test]
    fn recovers_integer_shift() {
        let target = draw_textured_frame(48, 48, [0.0, 0.0]);
        let source = draw_textured_frame(48, 48, [-3.0, 2.0]);
        let tm = threshold_mask(&target, 10.0, MaskDirection::Below);
        let sm = threshold_mask(&source, 10.0, MaskDirection::Below);

        let [dy, dx] = estimate_masked_shift(&target, &source, &tm, &sm, 6).unwrap();
        assert!((dy - 3.0).abs() <= 0.5, "dy = {dy}");
        assert!((dx + 2.0).abs() <= 0.5, "dx = {dx}");
    }

    #[test]
    fn refines_to_half_pixel() {
        let target = draw_textured_frame(48, 48, [0.0, 0.0]);
        let source = draw_textured_frame(48, 48, [-1.5, 0.0]);
        let tm = threshold_mask(&target, 10.0, MaskDirection::Below);
        let sm = threshold_mask(&source, 10.0, MaskDirection::Below);

        let [dy, _] = estimate_masked_shift(&target, &source, &tm, &sm, 4).unwrap();
        assert!((dy - 1.5).abs() <= 0.5, "dy = {dy}");
    }

    #[test]
    fn empty_masks_yield_none() {
        let target = draw_textured_frame(32, 32, [0.0, 0.0]);
        let source = draw_textured_frame(32, 32, [0.0, 0.0]);
        let empty = threshold_mask(&target, 0.0, MaskDirection::Below);
        assert!(estimate_masked_shift(&target, &source, &empty, &empty, 4).is_none());
    }

    #[test]
    fn mask_directions_partition_pixels() {
        let img = draw_textured_frame(24, 24, [0.0, 0.0]);
        let below = threshold_mask(&img, 0.5, MaskDirection::Below);
        let above = threshold_mask(&img, 0.5, MaskDirection::Above);
        // Pixels exactly at the threshold belong to neither side.
        assert!(below.count() + above.count() <= 24 * 24);
        assert!(below.count() > 0 && above.count() > 0);
    }
}
