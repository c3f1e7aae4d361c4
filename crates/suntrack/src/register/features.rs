//! Feature detection and matching for the feature-based registration tier:
//! FAST-9 corners, steered BRIEF binary descriptors, and mutual-nearest
//! Hamming matching with cross-check.

use imageproc::filter::gaussian_blur_f32;

use crate::extract::FloatImage;

/// Bresenham circle of radius 3: 16 (dx, dy) offsets, clockwise from
/// 12 o'clock.
#[rustfmt::skip]
const CIRCLE_OFFSETS: [(i32, i32); 16] = [
    ( 0, -3), ( 1, -3), ( 2, -2), ( 3, -1),
    ( 3,  0), ( 3,  1), ( 2,  2), ( 1,  3),
    ( 0,  3), (-1,  3), (-2,  2), (-3,  1),
    (-3,  0), (-3, -1), (-2, -2), (-1, -3),
];

/// Minimum contiguous arc length for FAST-9.
const FAST_ARC: usize = 9;

/// Half-width of the descriptor sampling patch; keypoints closer than this to
/// the border are dropped (allows for pattern rotation: 15·√2 < 22).
const PATCH_MARGIN: i32 = 22;

/// Number of BRIEF test pairs (one bit each).
const DESCRIPTOR_BITS: usize = 256;

/// A detected corner with response score, in (x, y) = (col, row) pixels.
#[derive(Debug, Clone, Copy)]
pub struct Keypoint {
    pub x: f64,
    pub y: f64,
    pub score: f32,
}

/// 256-bit binary descriptor.
pub type Descriptor = [u64; 4];

/// Detect FAST-9 corners and keep the strongest `max_keypoints` after 3×3
/// non-maximum suppression.
pub fn detect_fast_keypoints(
    image: &FloatImage,
    threshold: f32,
    max_keypoints: usize,
) -> Vec<Keypoint> {
    let (width, height) = image.dimensions();
    if width < 7 || height < 7 {
        return Vec::new();
    }
    let w = width as i32;
    let h = height as i32;
    let value = |x: i32, y: i32| -> f32 { image.get_pixel(x as u32, y as u32)[0] };

    let mut scores = vec![0.0f32; (w * h) as usize];
    for y in 3..h - 3 {
        for x in 3..w - 3 {
            if let Some(score) = fast_score(&value, x, y, threshold) {
                scores[(y * w + x) as usize] = score;
            }
        }
    }

    // 3×3 non-maximum suppression over the response map.
    let mut keypoints = Vec::new();
    for y in 3..h - 3 {
        for x in 3..w - 3 {
            let s = scores[(y * w + x) as usize];
            if s <= 0.0 {
                continue;
            }
            let mut is_max = true;
            'nms: for dy in -1..=1 {
                for dx in -1..=1 {
                    if (dx, dy) == (0, 0) {
                        continue;
                    }
                    let n = scores[((y + dy) * w + x + dx) as usize];
                    if n > s || (n == s && (dy < 0 || (dy == 0 && dx < 0))) {
                        is_max = false;
                        break 'nms;
                    }
                }
            }
            if is_max {
                keypoints.push(Keypoint {
                    x: x as f64,
                    y: y as f64,
                    score: s,
                });
            }
        }
    }

    keypoints.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
    keypoints.truncate(max_keypoints);
    keypoints
}

/// Segment test at one pixel. Returns the corner response when at least
/// `FAST_ARC` contiguous circle pixels are all brighter or all darker than
/// the center by more than `threshold`.
fn fast_score(value: &impl Fn(i32, i32) -> f32, x: i32, y: i32, threshold: f32) -> Option<f32> {
    let center = value(x, y);
    let mut brighter = [false; 32];
    let mut darker = [false; 32];
    let mut diffs = [0.0f32; 16];
    for (i, &(dx, dy)) in CIRCLE_OFFSETS.iter().enumerate() {
        let d = value(x + dx, y + dy) - center;
        diffs[i] = d;
        let b = d > threshold;
        let k = d < -threshold;
        brighter[i] = b;
        brighter[i + 16] = b;
        darker[i] = k;
        darker[i + 16] = k;
    }

    // Doubled arrays make the wrap-around contiguity scan a plain run search.
    for flags in [&brighter, &darker] {
        let mut run = 0usize;
        for &f in flags.iter() {
            if f {
                run += 1;
                if run >= FAST_ARC {
                    let score: f32 = diffs
                        .iter()
                        .map(|d| (d.abs() - threshold).max(0.0))
                        .sum();
                    return Some(score);
                }
            } else {
                run = 0;
            }
        }
    }
    None
}

/// Fixed set of BRIEF test-point pairs, drawn once per run from a seeded RNG
/// so descriptors are reproducible across frames and runs.
#[derive(Debug, Clone)]
pub struct BriefPattern {
    pairs: Vec<([i32; 2], [i32; 2])>,
}

impl BriefPattern {
    /// Draw `DESCRIPTOR_BITS` offset pairs uniformly from a 31×31 patch.
    pub fn seeded(seed: u64) -> Self {
        use rand::prelude::*;
        let mut rng = StdRng::seed_from_u64(seed);
        let mut draw = |rng: &mut StdRng| -> [i32; 2] {
            [rng.gen_range(-15..=15), rng.gen_range(-15..=15)]
        };
        let pairs = (0..DESCRIPTOR_BITS)
            .map(|_| (draw(&mut rng), draw(&mut rng)))
            .collect();
        Self { pairs }
    }
}

/// Compute steered BRIEF descriptors on a smoothed copy of `image`.
///
/// Keypoints too close to the border for the rotated patch are dropped;
/// the surviving keypoints are returned alongside their descriptors.
pub fn compute_descriptors(
    image: &FloatImage,
    keypoints: &[Keypoint],
    pattern: &BriefPattern,
) -> (Vec<Keypoint>, Vec<Descriptor>) {
    let smoothed = gaussian_blur_f32(image, 2.0);
    let (width, height) = smoothed.dimensions();
    let w = width as i32;
    let h = height as i32;
    let value = |x: i32, y: i32| -> f32 { smoothed.get_pixel(x as u32, y as u32)[0] };

    let mut kept = Vec::new();
    let mut descriptors = Vec::new();
    for &kp in keypoints {
        let cx = kp.x.round() as i32;
        let cy = kp.y.round() as i32;
        if cx < PATCH_MARGIN || cy < PATCH_MARGIN || cx >= w - PATCH_MARGIN || cy >= h - PATCH_MARGIN
        {
            continue;
        }

        // Orientation by intensity centroid, for in-plane rotation tolerance.
        let mut m10 = 0.0f64;
        let mut m01 = 0.0f64;
        for dy in -15i32..=15 {
            for dx in -15i32..=15 {
                if dx * dx + dy * dy > 15 * 15 {
                    continue;
                }
                let v = value(cx + dx, cy + dy) as f64;
                m10 += dx as f64 * v;
                m01 += dy as f64 * v;
            }
        }
        let theta = m01.atan2(m10);
        let (sin, cos) = theta.sin_cos();
        let rotate = |p: [i32; 2]| -> (i32, i32) {
            let x = p[0] as f64;
            let y = p[1] as f64;
            ((cos * x - sin * y).round() as i32, (sin * x + cos * y).round() as i32)
        };

        let mut desc: Descriptor = [0; 4];
        for (bit, &(p, q)) in pattern.pairs.iter().enumerate() {
            let (px, py) = rotate(p);
            let (qx, qy) = rotate(q);
            if value(cx + px, cy + py) < value(cx + qx, cy + qy) {
                desc[bit / 64] |= 1u64 << (bit % 64);
            }
        }
        kept.push(kp);
        descriptors.push(desc);
    }
    (kept, descriptors)
}

fn hamming(a: &Descriptor, b: &Descriptor) -> u32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x ^ y).count_ones())
        .sum()
}

/// Mutual-nearest-neighbor matching with cross-check: a pair (i, j) is kept
/// only when j is i's best target and i is j's best query.
pub fn match_mutual(queries: &[Descriptor], targets: &[Descriptor]) -> Vec<(usize, usize)> {
    if queries.is_empty() || targets.is_empty() {
        return Vec::new();
    }

    let nearest = |from: &[Descriptor], to: &[Descriptor]| -> Vec<usize> {
        from.iter()
            .map(|d| {
                let mut best = 0usize;
                let mut best_dist = u32::MAX;
                for (j, t) in to.iter().enumerate() {
                    let dist = hamming(d, t);
                    if dist < best_dist {
                        best_dist = dist;
                        best = j;
                    }
                }
                best
            })
            .collect()
    };

    let fwd = nearest(queries, targets);
    let bwd = nearest(targets, queries);
    fwd.iter()
        .enumerate()
        .filter(|&(i, &j)| bwd[j] == i)
        .map(|(i, &j)| (i, j))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::draw_textured_frame;

    #[test]
    fn detects_corners_on_textured_frame() {
        let img = draw_textured_frame(96, 96, [0.0, 0.0]);
        let kps = detect_fast_keypoints(&img, 0.08, 2000);
        assert!(!kps.is_empty(), "textured frame should yield corners");
        // Sorted by descending score.
        for pair in kps.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn flat_image_has_no_corners() {
        let img = FloatImage::from_pixel(32, 32, image::Luma([0.5]));
        assert!(detect_fast_keypoints(&img, 0.08, 2000).is_empty());
    }

    #[test]
    fn descriptors_match_across_identical_frames() {
        let img = draw_textured_frame(96, 96, [0.0, 0.0]);
        let kps = detect_fast_keypoints(&img, 0.08, 500);
        let pattern = BriefPattern::seeded(9);
        let (kept, descs) = compute_descriptors(&img, &kps, &pattern);
        assert_eq!(kept.len(), descs.len());
        assert!(!descs.is_empty());

        // Self-matching keeps only identity pairs (duplicate descriptors lose
        // the cross-check, so the count may be slightly below the input size).
        let matches = match_mutual(&descs, &descs);
        assert!(matches.len() * 2 >= descs.len());
        assert!(matches.iter().all(|&(i, j)| i == j));
    }

    #[test]
    fn pattern_is_reproducible() {
        let a = BriefPattern::seeded(9);
        let b = BriefPattern::seeded(9);
        assert_eq!(a.pairs, b.pairs);
    }
}
