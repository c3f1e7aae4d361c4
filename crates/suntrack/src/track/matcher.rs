//! Frame-to-frame contour matcher.
//!
//! Each frame's contours are matched against existing tracks by warping the
//! track's most recent contours into the current frame and scoring mask IoU.
//! Tracks may bridge short gaps: a track silent for up to `max_gap` frames is
//! still matched, nearest prior frame first. Leftover contours seed new
//! tracks. Rigid transforms between frame pairs are estimated once and
//! cached for the run.

use std::collections::HashMap;

use tracing::debug;

use crate::contour::{filter_contours_by_area, sort_by_area_desc, Contour};
use crate::extract::{find_level_contours, FloatImage};
use crate::raster::{contour_to_mask, iou, Mask};
use crate::register::{register_frames, warp_contour, RegistrationConfig, RigidTransform};
use crate::track::{Track, TrackError, TrackId, Tracks};

/// Matcher tuning. All thresholds are validated up front by
/// [`TrackParams::validate`].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TrackParams {
    /// Minimum contour area (px^2); smaller contours are discarded before
    /// matching.
    pub min_area: f64,
    /// How many frames back a silent track is still matched. Zero disables
    /// matching entirely, so every contour starts a new track.
    pub max_gap: usize,
    /// Minimum mask IoU for a prior contour to claim a candidate.
    pub iou_threshold: f64,
    /// Minimum lifetime (frames) a track must reach to survive the run.
    pub min_frames: usize,
    /// Estimate rigid transforms between frames; when false every frame pair
    /// uses the identity transform.
    pub registration: bool,
    /// Allowed (min, max) ratio of candidate area to warped prior area.
    pub area_ratio_bounds: (f64, f64),
    /// Registration tuning, used when `registration` is true.
    pub register: RegistrationConfig,
}

impl Default for TrackParams {
    fn default() -> Self {
        Self {
            min_area: 5.0,
            max_gap: 3,
            iou_threshold: 0.3,
            min_frames: 3,
            registration: true,
            area_ratio_bounds: (0.5, 2.0),
            register: RegistrationConfig::default(),
        }
    }
}

impl TrackParams {
    /// Reject contradictory or out-of-range thresholds.
    pub fn validate(&self) -> Result<(), TrackError> {
        let (lo, hi) = self.area_ratio_bounds;
        if !lo.is_finite() || !hi.is_finite() || lo > hi {
            return Err(TrackError::InvalidAreaRatioBounds { min: lo, max: hi });
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(TrackError::InvalidThreshold {
                name: "iou_threshold",
                value: self.iou_threshold,
            });
        }
        if !self.min_area.is_finite() || self.min_area < 0.0 {
            return Err(TrackError::InvalidThreshold {
                name: "min_area",
                value: self.min_area,
            });
        }
        Ok(())
    }
}

/// Candidate contour of the current frame with its lazily rasterized mask.
struct Candidate {
    contour: Contour,
    mask: Option<Mask>,
    assigned: bool,
}

impl Candidate {
    fn mask(&mut self, shape: (usize, usize)) -> &Mask {
        if self.mask.is_none() {
            self.mask = Some(contour_to_mask(&self.contour, shape));
        }
        self.mask.as_ref().unwrap()
    }
}

/// Transforms between frame pairs, estimated at most once per `(source,
/// target)` pair and reused across tracks.
struct TransformCache<'a> {
    images: &'a [FloatImage],
    config: &'a RegistrationConfig,
    enabled: bool,
    cache: HashMap<(usize, usize), RigidTransform>,
}

impl<'a> TransformCache<'a> {
    fn new(images: &'a [FloatImage], config: &'a RegistrationConfig, enabled: bool) -> Self {
        Self {
            images,
            config,
            enabled,
            cache: HashMap::new(),
        }
    }

    fn get(&mut self, source: usize, target: usize) -> RigidTransform {
        if !self.enabled {
            return RigidTransform::identity();
        }
        *self.cache.entry((source, target)).or_insert_with(|| {
            register_frames(&self.images[target], &self.images[source], self.config)
        })
    }
}

/// Extract contours at `level` in every frame and link them into tracks.
///
/// Matching is greedy and deterministic: tracks are visited in ascending id
/// order, their prior contours largest first, and the first candidate
/// passing the area-ratio and IoU gates wins. Each track pulls from its
/// nearest prior frame with data; once it claims anything at the current
/// frame it stops looking further back. The result is filtered to tracks
/// living at least `min_frames` and relabeled by descending lifetime.
pub fn track_contours(
    images: &[FloatImage],
    level: f32,
    params: &TrackParams,
) -> Result<Tracks, TrackError> {
    params.validate()?;

    let mut tracks = Tracks::new();
    let mut next_id: TrackId = 0;
    let mut transforms = TransformCache::new(images, &params.register, params.registration);
    let (ratio_min, ratio_max) = params.area_ratio_bounds;

    for (frame, image) in images.iter().enumerate() {
        let shape = (image.height() as usize, image.width() as usize);
        let mut contours = filter_contours_by_area(
            find_level_contours(image, level),
            params.min_area,
            f64::INFINITY,
        );
        sort_by_area_desc(&mut contours);
        debug!(frame, level, n_contours = contours.len(), "matching frame");

        let mut candidates: Vec<Candidate> = contours
            .into_iter()
            .map(|contour| Candidate {
                contour,
                mask: None,
                assigned: false,
            })
            .collect();

        // Snapshot before matching: tracks created this frame must not
        // compete for this frame's contours.
        let ids = tracks.ids();
        for id in ids {
            let mut claimed = false;
            for dt in 1..=params.max_gap {
                let Some(prior_frame) = frame.checked_sub(dt) else {
                    break;
                };
                let Some(priors) = tracks.get(id).and_then(|t| t.contours_at(prior_frame)) else {
                    continue;
                };
                let mut priors: Vec<Contour> = priors.to_vec();
                sort_by_area_desc(&mut priors);
                let transform = transforms.get(prior_frame, frame);

                for prior in &priors {
                    let warped = warp_contour(prior, &transform);
                    let warped_area = warped.area();
                    if warped_area <= 0.0 {
                        continue;
                    }
                    let warped_mask = contour_to_mask(&warped, shape);

                    for candidate in candidates.iter_mut() {
                        if candidate.assigned {
                            continue;
                        }
                        let ratio = candidate.contour.area() / warped_area;
                        if ratio < ratio_min || ratio > ratio_max {
                            continue;
                        }
                        if iou(candidate.mask(shape), &warped_mask) < params.iou_threshold {
                            continue;
                        }
                        candidate.assigned = true;
                        let contour = candidate.contour.clone();
                        if let Some(track) = tracks.get_mut(id) {
                            track.push_contour(frame, contour);
                        }
                        claimed = true;
                        break;
                    }
                }
                if claimed {
                    break;
                }
            }
        }

        for candidate in candidates {
            if !candidate.assigned {
                tracks.insert(next_id, Track::single(frame, candidate.contour));
                next_id += 1;
            }
        }
    }

    Ok(tracks
        .filter_by_lifetime(params.min_frames, None)
        .relabel_by_lifetime())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::draw_disk_frame;

    fn plain_params() -> TrackParams {
        TrackParams {
            min_frames: 1,
            registration: false,
            ..TrackParams::default()
        }
    }

    #[test]
    fn rejects_contradictory_area_ratio_bounds() {
        let params = TrackParams {
            area_ratio_bounds: (2.0, 0.5),
            ..TrackParams::default()
        };
        assert!(matches!(
            params.validate(),
            Err(TrackError::InvalidAreaRatioBounds { .. })
        ));
    }

    #[test]
    fn rejects_out_of_range_iou_threshold() {
        let params = TrackParams {
            iou_threshold: 1.5,
            ..TrackParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn drifting_disk_yields_one_track() {
        let images = vec![
            draw_disk_frame(48, 48, [20.0, 20.0], 8.0),
            draw_disk_frame(48, 48, [22.0, 21.0], 8.0),
        ];
        let tracks = track_contours(&images, 0.5, &plain_params()).unwrap();
        assert_eq!(tracks.len(), 1);
        let track = tracks.get(0).unwrap();
        assert_eq!(track.frame_ids().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(track.contours_at(0).unwrap().len(), 1);
        assert_eq!(track.contours_at(1).unwrap().len(), 1);
    }

    #[test]
    fn distant_disks_become_separate_tracks() {
        let images = vec![
            draw_disk_frame(64, 64, [16.0, 16.0], 6.0),
            draw_disk_frame(64, 64, [48.0, 48.0], 6.0),
        ];
        let tracks = track_contours(&images, 0.5, &plain_params()).unwrap();
        assert_eq!(tracks.len(), 2);
        for (_, track) in tracks.iter() {
            assert_eq!(track.lifetime(), 1);
        }
    }

    #[test]
    fn gap_is_bridged_up_to_max_gap() {
        // Disk present at frames 0 and 2, absent at 1.
        let images = vec![
            draw_disk_frame(48, 48, [20.0, 20.0], 8.0),
            draw_disk_frame(48, 48, [20.0, 20.0], 0.0),
            draw_disk_frame(48, 48, [21.0, 20.0], 8.0),
        ];
        let tracks = track_contours(&images, 0.5, &plain_params()).unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(
            tracks.get(0).unwrap().frame_ids().collect::<Vec<_>>(),
            vec![0, 2]
        );
    }

    #[test]
    fn zero_max_gap_disables_matching() {
        let images = vec![
            draw_disk_frame(48, 48, [20.0, 20.0], 8.0),
            draw_disk_frame(48, 48, [20.0, 20.0], 8.0),
        ];
        let params = TrackParams {
            max_gap: 0,
            ..plain_params()
        };
        let tracks = track_contours(&images, 0.5, &params).unwrap();
        assert_eq!(tracks.len(), 2);
    }

    #[test]
    fn min_frames_drops_short_tracks() {
        // One persistent spot, one single-frame spot.
        let mut first = draw_disk_frame(64, 64, [20.0, 20.0], 8.0);
        let blip = draw_disk_frame(64, 64, [48.0, 48.0], 6.0);
        for (a, b) in first.pixels_mut().zip(blip.pixels()) {
            a.0[0] = a.0[0].min(b.0[0]);
        }
        let images = vec![
            first,
            draw_disk_frame(64, 64, [20.0, 20.0], 8.0),
            draw_disk_frame(64, 64, [20.0, 20.0], 8.0),
        ];
        let params = TrackParams {
            min_frames: 2,
            ..plain_params()
        };
        let tracks = track_contours(&images, 0.5, &params).unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks.get(0).unwrap().lifetime(), 3);
    }

    #[test]
    fn two_frame_drift_builds_a_single_two_frame_track() {
        let images = vec![
            draw_disk_frame(21, 21, [10.0, 10.0], 5.0),
            draw_disk_frame(21, 21, [11.0, 10.0], 5.0),
        ];
        let params = TrackParams {
            min_area: 5.0,
            max_gap: 1,
            iou_threshold: 0.3,
            min_frames: 2,
            registration: false,
            ..TrackParams::default()
        };
        let tracks = track_contours(&images, 0.5, &params).unwrap();
        assert_eq!(tracks.ids(), vec![0]);
        let track = tracks.get(0).unwrap();
        assert_eq!(track.frame_ids().collect::<Vec<_>>(), vec![0, 1]);
        for (_, contours) in track.frames() {
            assert_eq!(contours.len(), 1);
            // Iso-line sits half a pixel outside the dark disk.
            let expected = std::f64::consts::PI * 5.5 * 5.5;
            assert!((contours[0].area() - expected).abs() < 0.1 * expected);
        }
    }

    #[test]
    fn runs_are_deterministic() {
        let images = vec![
            draw_disk_frame(48, 48, [20.0, 20.0], 8.0),
            draw_disk_frame(48, 48, [22.0, 21.0], 8.0),
            draw_disk_frame(48, 48, [24.0, 22.0], 8.0),
        ];
        let a = track_contours(&images, 0.5, &plain_params()).unwrap();
        let b = track_contours(&images, 0.5, &plain_params()).unwrap();
        assert_eq!(a, b);
        // Byte-identical serialized output as well.
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn tiny_contours_are_ignored() {
        let images = vec![draw_disk_frame(48, 48, [20.0, 20.0], 1.0)];
        let tracks = track_contours(&images, 0.5, &plain_params()).unwrap();
        assert!(tracks.is_empty());
    }
}
