//! Frame-to-frame image registration.
//!
//! Estimates a rigid transform aligning a source frame onto a target frame
//! through a three-tier fallback chain:
//!
//! 1. **Feature tier** — FAST corners + steered BRIEF descriptors, mutual
//!    cross-checked matching, spatial outlier gate, rigid RANSAC with an
//!    escalating residual threshold.
//! 2. **Correlation tier** — masked cross-correlation translation between
//!    thresholded quiet-background (or active-region) masks.
//! 3. **Identity** — no correction.
//!
//! Failure of one tier never aborts the call; each transition is reported
//! with a non-fatal `tracing::warn!`. Registration is the expensive step of
//! tracking, so callers cache the result per frame pair.

mod correlation;
mod features;
mod rigid;

pub use rigid::{estimate_rigid, fit_rigid_ransac, warp_contour, RigidTransform};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::extract::FloatImage;

use correlation::{estimate_masked_shift, threshold_mask};
use features::{compute_descriptors, detect_fast_keypoints, match_mutual, BriefPattern};

/// Which side of the intensity threshold the correlation masks keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskDirection {
    /// Keep `|pixel| < threshold` — the quiet background.
    #[default]
    Below,
    /// Keep `|pixel| > threshold` — active regions.
    Above,
}

/// Tuning for the registration fallback chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Upper bound of the escalating RANSAC inlier residual threshold (px).
    pub residual_threshold_max: f64,
    /// Intensity threshold separating quiet background from active regions
    /// for the correlation-tier masks.
    pub qs_threshold: f32,
    /// Side of `qs_threshold` the correlation masks keep.
    pub qs_mask_direction: MaskDirection,
    /// Maximum residual displacement (px) of a feature match after the mean
    /// bulk shift is removed.
    pub match_spatial_tolerance: f64,
    /// Number of strongest corners kept per frame.
    pub n_keypoints: usize,
    /// FAST segment-test intensity threshold.
    pub fast_threshold: f32,
    /// Maximum RANSAC trials per residual-threshold step.
    pub max_trials: usize,
    /// RANSAC sampling seed.
    pub seed: u64,
    /// Seed of the BRIEF test-pair pattern.
    pub descriptor_seed: u64,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            residual_threshold_max: 3.5,
            qs_threshold: 0.7,
            qs_mask_direction: MaskDirection::Below,
            match_spatial_tolerance: 50.0,
            n_keypoints: 2000,
            fast_threshold: 0.08,
            max_trials: 1000,
            seed: 42,
            descriptor_seed: 9,
        }
    }
}

/// Why one registration tier gave up. Internal to the fallback chain; never
/// surfaced past [`register_frames`].
#[derive(Debug, Clone, PartialEq)]
pub enum RegisterError {
    /// One or both frames yielded no usable keypoints.
    NoFeatures {
        /// Keypoints surviving descriptor extraction on the target frame.
        target: usize,
        /// Keypoints surviving descriptor extraction on the source frame.
        source: usize,
    },
    /// Too few matches before or after the spatial gate.
    TooFewMatches {
        /// Required minimum number of matches.
        needed: usize,
        /// Matches available.
        got: usize,
    },
    /// RANSAC exhausted the threshold escalation without a finite model.
    NoValidModel,
    /// The correlation masks never overlapped enough to score a shift.
    NoOverlap,
    /// The correlation shift was non-finite or implausibly large.
    UnreasonableShift {
        /// Magnitude of the rejected shift in pixels.
        norm: f64,
    },
}

impl std::fmt::Display for RegisterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoFeatures { target, source } => {
                write!(f, "no features found (target: {}, source: {})", target, source)
            }
            Self::TooFewMatches { needed, got } => {
                write!(f, "too few matches: need {}, got {}", needed, got)
            }
            Self::NoValidModel => write!(f, "consensus fit found no valid model"),
            Self::NoOverlap => write!(f, "masks never overlapped"),
            Self::UnreasonableShift { norm } => {
                write!(f, "unreasonable shift detected ({:.1} px)", norm)
            }
        }
    }
}

impl std::error::Error for RegisterError {}

/// Estimate the rigid transform mapping `source` frame coordinates onto
/// `target` frame coordinates.
///
/// Always returns a transform: each tier's failure falls through to the
/// next with a warning, ending at the identity transform.
pub fn register_frames(
    target: &FloatImage,
    source: &FloatImage,
    config: &RegistrationConfig,
) -> RigidTransform {
    match try_feature_registration(target, source, config) {
        Ok(transform) => transform,
        Err(e) => {
            warn!("feature registration failed ({e}); falling back to masked correlation");
            match try_masked_correlation(target, source, config) {
                Ok(transform) => transform,
                Err(e) => {
                    warn!("masked correlation also failed ({e}); using identity transform");
                    RigidTransform::identity()
                }
            }
        }
    }
}

fn try_feature_registration(
    target: &FloatImage,
    source: &FloatImage,
    config: &RegistrationConfig,
) -> Result<RigidTransform, RegisterError> {
    let pattern = BriefPattern::seeded(config.descriptor_seed);

    let kp_target = detect_fast_keypoints(target, config.fast_threshold, config.n_keypoints);
    let kp_source = detect_fast_keypoints(source, config.fast_threshold, config.n_keypoints);
    let (kp_target, desc_target) = compute_descriptors(target, &kp_target, &pattern);
    let (kp_source, desc_source) = compute_descriptors(source, &kp_source, &pattern);
    if kp_target.is_empty() || kp_source.is_empty() {
        return Err(RegisterError::NoFeatures {
            target: kp_target.len(),
            source: kp_source.len(),
        });
    }

    let matches = match_mutual(&desc_target, &desc_source);
    if matches.len() < 3 {
        return Err(RegisterError::TooFewMatches {
            needed: 3,
            got: matches.len(),
        });
    }

    let src: Vec<[f64; 2]> = matches
        .iter()
        .map(|&(_, si)| [kp_source[si].x, kp_source[si].y])
        .collect();
    let dst: Vec<[f64; 2]> = matches
        .iter()
        .map(|&(ti, _)| [kp_target[ti].x, kp_target[ti].y])
        .collect();

    // Remove the mean bulk shift before gating, so a large global drift does
    // not disqualify consistent matches.
    let n = src.len() as f64;
    let mean = src.iter().zip(dst.iter()).fold([0.0, 0.0], |acc, (s, d)| {
        [acc[0] + (d[0] - s[0]) / n, acc[1] + (d[1] - s[1]) / n]
    });
    let (src, dst): (Vec<[f64; 2]>, Vec<[f64; 2]>) = src
        .into_iter()
        .zip(dst)
        .filter(|(s, d)| {
            let rx = d[0] - s[0] - mean[0];
            let ry = d[1] - s[1] - mean[1];
            (rx * rx + ry * ry).sqrt() < config.match_spatial_tolerance
        })
        .unzip();
    if src.len() < 3 {
        return Err(RegisterError::TooFewMatches {
            needed: 3,
            got: src.len(),
        });
    }

    fit_rigid_ransac(
        &src,
        &dst,
        config.residual_threshold_max,
        config.max_trials,
        config.seed,
    )
    .ok_or(RegisterError::NoValidModel)
}

fn try_masked_correlation(
    target: &FloatImage,
    source: &FloatImage,
    config: &RegistrationConfig,
) -> Result<RigidTransform, RegisterError> {
    let target_mask = threshold_mask(target, config.qs_threshold, config.qs_mask_direction);
    let source_mask = threshold_mask(source, config.qs_threshold, config.qs_mask_direction);

    let (width, height) = target.dimensions();
    let max_dim = width.max(height) as f64;
    // Search slightly past the acceptance bound so a just-too-large true
    // shift is rejected rather than replaced by a spurious in-bound peak.
    let max_shift = (max_dim * 0.25).ceil() as i32;

    let [dy, dx] = estimate_masked_shift(target, source, &target_mask, &source_mask, max_shift)
        .ok_or(RegisterError::NoOverlap)?;

    let norm = (dy * dy + dx * dx).sqrt();
    if !norm.is_finite() || norm > max_dim * 0.2 {
        return Err(RegisterError::UnreasonableShift { norm });
    }
    Ok(RigidTransform::from_translation(dx, dy))
}
