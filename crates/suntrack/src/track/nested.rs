//! Resolution of tracks nested inside other tracks at the same threshold
//! level. A contour sitting almost entirely inside a larger contour of
//! another track is a duplicate detection of the same region; the smaller
//! track loses that frame.

use std::collections::BTreeSet;

use tracing::debug;

use crate::raster::{containment_ratio, contour_to_mask, Mask};
use crate::track::{FrameId, TrackId, Tracks};

/// Find (track, frame) entries where a track's contour lies inside a larger
/// contour of another track.
///
/// Frames are visited in ascending order and track pairs in ascending id
/// order. For each contour pair sharing a frame, the smaller mask's
/// containment in the larger one is scored; at or above `min_containment`
/// the smaller contour's track is flagged for that frame. Equal-sized masks
/// flag the higher id.
///
/// `shapes` gives the (height, width) of each frame, indexed by [`FrameId`].
pub fn find_nested_tracks(
    tracks: &Tracks,
    shapes: &[(usize, usize)],
    min_containment: f64,
) -> BTreeSet<(TrackId, FrameId)> {
    let mut flagged = BTreeSet::new();
    for frame in tracks.all_frames() {
        let shape = shapes[frame];
        // Rasterize every contour present at this frame once.
        let masks: Vec<(TrackId, Vec<Mask>)> = tracks
            .iter()
            .filter_map(|(id, track)| {
                track.contours_at(frame).map(|contours| {
                    let masks = contours.iter().map(|c| contour_to_mask(c, shape)).collect();
                    (id, masks)
                })
            })
            .collect();

        for (i, (id_a, masks_a)) in masks.iter().enumerate() {
            for (id_b, masks_b) in masks.iter().skip(i + 1) {
                for mask_a in masks_a {
                    for mask_b in masks_b {
                        let (small_id, small, large) = if mask_a.count() < mask_b.count() {
                            (*id_a, mask_a, mask_b)
                        } else {
                            (*id_b, mask_b, mask_a)
                        };
                        if containment_ratio(small, large) >= min_containment {
                            debug!(track = small_id, frame, "nested contour flagged");
                            flagged.insert((small_id, frame));
                        }
                    }
                }
            }
        }
    }
    flagged
}

/// Remove nested (track, frame) entries and relabel the survivors by
/// descending lifetime. Idempotent: once the nested entries are gone, a
/// second pass flags nothing.
pub fn remove_nested_tracks(
    tracks: Tracks,
    shapes: &[(usize, usize)],
    min_containment: f64,
) -> Tracks {
    let flagged = find_nested_tracks(&tracks, shapes, min_containment);
    tracks.remove_frames(&flagged).relabel_by_lifetime()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contour::Contour;
    use crate::track::Track;

    fn rect(top: f64, left: f64, bottom: f64, right: f64) -> Contour {
        // Counter-clockwise in (row, col) with the crate's area convention.
        Contour::new(vec![
            [top, left],
            [bottom, left],
            [bottom, right],
            [top, right],
        ])
    }

    fn shapes(n: usize) -> Vec<(usize, usize)> {
        vec![(64, 64); n]
    }

    #[test]
    fn inner_track_is_flagged_at_shared_frames() {
        let mut tracks = Tracks::new();
        let mut outer = Track::new();
        let mut inner = Track::new();
        for frame in 0..3 {
            outer.push_contour(frame, rect(10.0, 10.0, 40.0, 40.0));
            inner.push_contour(frame, rect(18.0, 18.0, 26.0, 26.0));
        }
        tracks.insert(0, outer);
        tracks.insert(1, inner);

        let flagged = find_nested_tracks(&tracks, &shapes(3), 0.8);
        assert_eq!(flagged, [(1, 0), (1, 1), (1, 2)].into());
    }

    #[test]
    fn disjoint_tracks_are_not_flagged() {
        let mut tracks = Tracks::new();
        tracks.insert(0, Track::single(0, rect(5.0, 5.0, 15.0, 15.0)));
        tracks.insert(1, Track::single(0, rect(30.0, 30.0, 45.0, 45.0)));

        assert!(find_nested_tracks(&tracks, &shapes(1), 0.8).is_empty());
    }

    #[test]
    fn partial_overlap_below_threshold_survives() {
        let mut tracks = Tracks::new();
        // Half of the smaller rectangle sticks out of the larger one.
        tracks.insert(0, Track::single(0, rect(10.0, 10.0, 40.0, 40.0)));
        tracks.insert(1, Track::single(0, rect(20.0, 35.0, 30.0, 55.0)));

        assert!(find_nested_tracks(&tracks, &shapes(1), 0.8).is_empty());
    }

    #[test]
    fn removal_is_idempotent() {
        let mut tracks = Tracks::new();
        let mut outer = Track::new();
        let mut inner = Track::new();
        for frame in 0..2 {
            outer.push_contour(frame, rect(10.0, 10.0, 40.0, 40.0));
            inner.push_contour(frame, rect(18.0, 18.0, 26.0, 26.0));
        }
        tracks.insert(0, outer);
        tracks.insert(1, inner);

        let once = remove_nested_tracks(tracks, &shapes(2), 0.8);
        let twice = remove_nested_tracks(once.clone(), &shapes(2), 0.8);
        assert_eq!(once, twice);
        assert_eq!(once.len(), 1);
    }

    #[test]
    fn nested_track_vanishes_entirely() {
        let mut tracks = Tracks::new();
        let mut outer = Track::new();
        let mut inner = Track::new();
        for frame in 0..3 {
            outer.push_contour(frame, rect(10.0, 10.0, 50.0, 50.0));
            inner.push_contour(frame, rect(20.0, 20.0, 30.0, 30.0));
        }
        tracks.insert(0, outer);
        tracks.insert(1, inner);

        let cleaned = remove_nested_tracks(tracks, &shapes(3), 0.8);
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned.get(0).unwrap().lifetime(), 3);
    }
}
