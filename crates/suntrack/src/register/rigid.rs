//! Rigid (rotation + translation) 2-D transforms: Kabsch estimation from
//! point correspondences and a seeded RANSAC wrapper with escalating inlier
//! threshold.

use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};

use crate::contour::Contour;

/// Rotation + translation in (x, y) = (col, row) coordinates:
/// `p' = R·p + t`. Three degrees of freedom; only the forward direction is
/// needed by the tracking core.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RigidTransform {
    /// Rotation angle in radians.
    pub angle: f64,
    /// Translation (tx, ty) in pixels.
    pub translation: [f64; 2],
}

impl RigidTransform {
    /// Identity transform (no correction).
    pub fn identity() -> Self {
        Self {
            angle: 0.0,
            translation: [0.0, 0.0],
        }
    }

    /// Pure translation.
    pub fn from_translation(tx: f64, ty: f64) -> Self {
        Self {
            angle: 0.0,
            translation: [tx, ty],
        }
    }

    /// True when angle and translation are all finite.
    pub fn is_finite(&self) -> bool {
        self.angle.is_finite()
            && self.translation[0].is_finite()
            && self.translation[1].is_finite()
    }

    /// True for the identity transform.
    pub fn is_identity(&self) -> bool {
        self.angle == 0.0 && self.translation == [0.0, 0.0]
    }

    fn rotation_matrix(&self) -> Matrix2<f64> {
        let (s, c) = self.angle.sin_cos();
        Matrix2::new(c, -s, s, c)
    }

    /// Apply to one (x, y) point.
    pub fn apply_xy(&self, p: [f64; 2]) -> [f64; 2] {
        let q = self.rotation_matrix() * Vector2::new(p[0], p[1])
            + Vector2::new(self.translation[0], self.translation[1]);
        [q.x, q.y]
    }

    /// Residual `||apply(src) − dst||` for one correspondence.
    pub fn residual(&self, src: [f64; 2], dst: [f64; 2]) -> f64 {
        let p = self.apply_xy(src);
        ((p[0] - dst[0]).powi(2) + (p[1] - dst[1]).powi(2)).sqrt()
    }
}

/// Warp a (row, col) contour. The transform operates in (x, y) = (col, row),
/// so coordinates are swapped on the way in and out.
pub fn warp_contour(contour: &Contour, transform: &RigidTransform) -> Contour {
    let points = contour
        .points()
        .iter()
        .map(|&[r, c]| {
            let [x, y] = transform.apply_xy([c, r]);
            [y, x]
        })
        .collect();
    Contour::new(points)
}

/// Least-squares rigid fit from ≥2 correspondences via 2-D Kabsch: SVD of the
/// centered covariance, reflection corrected, translation from centroids.
///
/// Returns `None` for degenerate input (too few points or collapsed
/// geometry).
pub fn estimate_rigid(src: &[[f64; 2]], dst: &[[f64; 2]]) -> Option<RigidTransform> {
    let n = src.len();
    if n < 2 || dst.len() != n {
        return None;
    }

    let nf = n as f64;
    let centroid = |pts: &[[f64; 2]]| -> Vector2<f64> {
        let mut acc = Vector2::zeros();
        for p in pts {
            acc += Vector2::new(p[0], p[1]);
        }
        acc / nf
    };
    let cs = centroid(src);
    let cd = centroid(dst);

    let mut cov = Matrix2::zeros();
    for (s, d) in src.iter().zip(dst.iter()) {
        let sc = Vector2::new(s[0], s[1]) - cs;
        let dc = Vector2::new(d[0], d[1]) - cd;
        cov += dc * sc.transpose();
    }

    let svd = cov.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    // Keep a proper rotation (det +1), never a reflection.
    let d = (u * v_t).determinant().signum();
    let r = u * Matrix2::new(1.0, 0.0, 0.0, d) * v_t;

    let angle = r[(1, 0)].atan2(r[(0, 0)]);
    let t = cd - r * cs;
    let out = RigidTransform {
        angle,
        translation: [t.x, t.y],
    };
    out.is_finite().then_some(out)
}

/// Random-consensus rigid fit: 3-point minimal samples, up to `max_trials`
/// trials per threshold, escalating the inlier residual threshold from 1.0 in
/// steps of 0.25 up to `residual_threshold_max` until a finite model with ≥3
/// inliers is found. The final model is re-fit to the inliers of the best
/// sample. Deterministic for a fixed `seed`.
pub fn fit_rigid_ransac(
    src: &[[f64; 2]],
    dst: &[[f64; 2]],
    residual_threshold_max: f64,
    max_trials: usize,
    seed: u64,
) -> Option<RigidTransform> {
    use rand::prelude::*;

    let n = src.len();
    if n < 3 || dst.len() != n {
        return None;
    }

    let mut residual_threshold = 1.0;
    while residual_threshold <= residual_threshold_max {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut best_inliers: Vec<usize> = Vec::new();

        for _ in 0..max_trials {
            let sample = sample_indices(&mut rng, n, 3);
            let sample_src: Vec<[f64; 2]> = sample.iter().map(|&i| src[i]).collect();
            let sample_dst: Vec<[f64; 2]> = sample.iter().map(|&i| dst[i]).collect();

            let Some(model) = estimate_rigid(&sample_src, &sample_dst) else {
                continue;
            };

            let inliers: Vec<usize> = (0..n)
                .filter(|&i| model.residual(src[i], dst[i]) < residual_threshold)
                .collect();
            if inliers.len() > best_inliers.len() {
                best_inliers = inliers;
                // Early exit once almost everything agrees.
                if best_inliers.len() * 10 > n * 9 {
                    break;
                }
            }
        }

        if best_inliers.len() >= 3 {
            let inlier_src: Vec<[f64; 2]> = best_inliers.iter().map(|&i| src[i]).collect();
            let inlier_dst: Vec<[f64; 2]> = best_inliers.iter().map(|&i| dst[i]).collect();
            if let Some(model) = estimate_rigid(&inlier_src, &inlier_dst) {
                if model.is_finite() {
                    return Some(model);
                }
            }
        }

        residual_threshold += 0.25;
    }

    None
}

/// Sample `k` distinct indices from `0..n` using Fisher–Yates partial shuffle.
fn sample_indices(rng: &mut impl rand::Rng, n: usize, k: usize) -> Vec<usize> {
    debug_assert!(k <= n);
    let mut indices: Vec<usize> = (0..n).collect();
    for i in 0..k {
        let j = rng.gen_range(i..n);
        indices.swap(i, j);
    }
    indices.truncate(k);
    indices
}
