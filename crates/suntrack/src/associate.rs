//! Containment association between two independently tracked threshold
//! levels: inner (umbra-level) contours are attached to the outer
//! (penumbra-level) track whose contour contains them, frame by frame.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::raster::{containment_ratio, contour_to_mask};
use crate::track::{Track, TrackId, Tracks};

/// One combined region: an outer boundary track and the inner contours
/// found inside it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sunspot {
    /// The outer-level track, carried over unchanged.
    pub outer: Track,
    /// Inner-level contours contained in the outer contours, per frame.
    /// Empty at frames where nothing qualified.
    pub inner: Track,
}

/// Associated regions, keyed by the outer track's id. One entry per outer
/// track, whether or not any inner contour attached to it.
pub type Sunspots = BTreeMap<TrackId, Sunspot>;

/// Attach inner-level contours to the outer tracks containing them.
///
/// For each outer track and each of its frames, every inner contour present
/// at the same frame is tested for containment in the outer contours, scored
/// as intersection over the inner mask's pixel count. The first outer
/// contour reaching `min_containment` claims the inner contour for that
/// frame. Inputs are read only; the outer track is cloned into the result
/// unchanged.
///
/// `shapes` gives the (height, width) of each frame.
pub fn associate_inner_outer(
    outer_tracks: &Tracks,
    inner_tracks: &Tracks,
    shapes: &[(usize, usize)],
    min_containment: f64,
) -> Sunspots {
    let mut sunspots = Sunspots::new();
    for (outer_id, outer_track) in outer_tracks.iter() {
        let mut inner = Track::new();
        for (frame, outer_contours) in outer_track.frames() {
            let shape = shapes[frame];
            let outer_masks: Vec<_> = outer_contours
                .iter()
                .map(|c| contour_to_mask(c, shape))
                .collect();

            for (inner_id, inner_track) in inner_tracks.iter() {
                let Some(inner_contours) = inner_track.contours_at(frame) else {
                    continue;
                };
                for contour in inner_contours {
                    let mask = contour_to_mask(contour, shape);
                    let contained = outer_masks
                        .iter()
                        .any(|outer_mask| containment_ratio(&mask, outer_mask) >= min_containment);
                    if contained {
                        debug!(outer = outer_id, inner = inner_id, frame, "contour associated");
                        inner.push_contour(frame, contour.clone());
                    }
                }
            }
        }
        sunspots.insert(
            outer_id,
            Sunspot {
                outer: outer_track.clone(),
                inner,
            },
        );
    }
    sunspots
}
