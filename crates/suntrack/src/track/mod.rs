//! Track containers and the structural operations shared by the matcher,
//! the nested-track resolver, and the orchestrator: lifetime filtering,
//! clockwise-contour removal, frame removal, and lifetime relabeling.

mod matcher;
mod nested;

pub use matcher::{track_contours, TrackParams};
pub use nested::{find_nested_tracks, remove_nested_tracks};

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::contour::Contour;

/// Dense, zero-based track identifier. Reassigned by descending lifetime
/// after every structural change, so id 0 is always a longest-lived track.
pub type TrackId = usize;

/// Frame index into the input image sequence.
pub type FrameId = usize;

/// Parameter validation errors, raised at the call boundary before any
/// expensive work begins.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackError {
    /// `area_ratio_bounds` with min above max.
    InvalidAreaRatioBounds {
        /// Lower bound supplied.
        min: f64,
        /// Upper bound supplied.
        max: f64,
    },
    /// A threshold outside its valid range or non-finite.
    InvalidThreshold {
        /// Which parameter was rejected.
        name: &'static str,
        /// The rejected value.
        value: f64,
    },
}

impl std::fmt::Display for TrackError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidAreaRatioBounds { min, max } => {
                write!(f, "contradictory area ratio bounds: ({}, {})", min, max)
            }
            Self::InvalidThreshold { name, value } => {
                write!(f, "invalid {}: {}", name, value)
            }
        }
    }
}

impl std::error::Error for TrackError {}

/// Frame-indexed history of contours believed to be one physical region.
///
/// Invariant: every stored frame maps to a non-empty contour list; emptied
/// frames are deleted, not kept as empty lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    frames: BTreeMap<FrameId, Vec<Contour>>,
}

impl Track {
    /// Empty track.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track holding one contour at one frame.
    pub fn single(frame: FrameId, contour: Contour) -> Self {
        let mut track = Self::new();
        track.push_contour(frame, contour);
        track
    }

    /// Number of distinct frames with data.
    pub fn lifetime(&self) -> usize {
        self.frames.len()
    }

    /// True when no frame has data.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frames and their contours, in ascending frame order.
    pub fn frames(&self) -> impl Iterator<Item = (FrameId, &[Contour])> {
        self.frames.iter().map(|(&f, c)| (f, c.as_slice()))
    }

    /// Frame indices with data, ascending.
    pub fn frame_ids(&self) -> impl Iterator<Item = FrameId> + '_ {
        self.frames.keys().copied()
    }

    /// Contours observed at `frame`, if any.
    pub fn contours_at(&self, frame: FrameId) -> Option<&[Contour]> {
        self.frames.get(&frame).map(|c| c.as_slice())
    }

    /// Append one contour to `frame`.
    pub fn push_contour(&mut self, frame: FrameId, contour: Contour) {
        self.frames.entry(frame).or_default().push(contour);
    }

    /// Replace the contours of `frame`; an empty list removes the frame.
    pub fn set_frame(&mut self, frame: FrameId, contours: Vec<Contour>) {
        if contours.is_empty() {
            self.frames.remove(&frame);
        } else {
            self.frames.insert(frame, contours);
        }
    }

    /// Delete `frame` from the history.
    pub fn remove_frame(&mut self, frame: FrameId) {
        self.frames.remove(&frame);
    }
}

/// All tracks of one matcher run, keyed by [`TrackId`]. BTreeMap-backed so
/// iteration is ascending by id — matching order is deterministic, which the
/// first-match tie-breaks downstream rely on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tracks {
    map: BTreeMap<TrackId, Track>,
}

impl Tracks {
    /// Empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracks.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// True when there are no tracks.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Track ids in ascending order.
    pub fn ids(&self) -> Vec<TrackId> {
        self.map.keys().copied().collect()
    }

    /// Lookup one track.
    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.map.get(&id)
    }

    /// Mutable lookup.
    pub fn get_mut(&mut self, id: TrackId) -> Option<&mut Track> {
        self.map.get_mut(&id)
    }

    /// Insert or replace a track under `id`.
    pub fn insert(&mut self, id: TrackId, track: Track) {
        self.map.insert(id, track);
    }

    /// Tracks in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (TrackId, &Track)> {
        self.map.iter().map(|(&id, t)| (id, t))
    }

    /// Union of all frames any track has data for, ascending.
    pub fn all_frames(&self) -> BTreeSet<FrameId> {
        self.map
            .values()
            .flat_map(|t| t.frame_ids())
            .collect()
    }

    /// Reassign ids by descending lifetime. Stable: equal lifetimes keep
    /// their relative (ascending old-id) order. Ids come out dense and
    /// zero-based.
    pub fn relabel_by_lifetime(self) -> Self {
        let mut items: Vec<(TrackId, Track)> = self.map.into_iter().collect();
        items.sort_by(|a, b| b.1.lifetime().cmp(&a.1.lifetime()));
        Self {
            map: items
                .into_iter()
                .enumerate()
                .map(|(new_id, (_, track))| (new_id, track))
                .collect(),
        }
    }

    /// Keep tracks whose lifetime is within `[min_lifetime, max_lifetime]`.
    pub fn filter_by_lifetime(self, min_lifetime: usize, max_lifetime: Option<usize>) -> Self {
        let max = max_lifetime.unwrap_or(usize::MAX);
        Self {
            map: self
                .map
                .into_iter()
                .filter(|(_, t)| (min_lifetime..=max).contains(&t.lifetime()))
                .collect(),
        }
    }

    /// Delete specific (track, frame) entries. Tracks emptied by the removal
    /// are dropped entirely.
    pub fn remove_frames(self, to_remove: &BTreeSet<(TrackId, FrameId)>) -> Self {
        let mut map = self.map;
        for &(id, frame) in to_remove {
            if let Some(track) = map.get_mut(&id) {
                track.remove_frame(frame);
                if track.is_empty() {
                    map.remove(&id);
                }
            }
        }
        Self { map }
    }

    /// Drop every clockwise (negative signed area) contour, frame-wise.
    /// Frames left without contours are deleted, as are tracks left without
    /// frames. Purely orientation-based, no geometric checks.
    pub fn remove_clockwise_contours(self) -> Self {
        let map = self
            .map
            .into_iter()
            .filter_map(|(id, track)| {
                let mut cleaned = Track::new();
                for (frame, contours) in track.frames() {
                    let kept: Vec<Contour> =
                        contours.iter().filter(|c| c.is_ccw()).cloned().collect();
                    cleaned.set_frame(frame, kept);
                }
                (!cleaned.is_empty()).then_some((id, cleaned))
            })
            .collect();
        Self { map }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ccw_square(size: f64) -> Contour {
        Contour::new(vec![[0.0, 0.0], [size, 0.0], [size, size], [0.0, size]])
    }

    fn cw_square(size: f64) -> Contour {
        let c = ccw_square(size);
        Contour::new(c.points().iter().rev().copied().collect())
    }

    fn track_with_frames(frames: &[FrameId]) -> Track {
        let mut t = Track::new();
        for &f in frames {
            t.push_contour(f, ccw_square(4.0));
        }
        t
    }

    #[test]
    fn relabel_orders_by_descending_lifetime() {
        let mut tracks = Tracks::new();
        tracks.insert(0, track_with_frames(&[0]));
        tracks.insert(1, track_with_frames(&[0, 1, 2]));
        tracks.insert(2, track_with_frames(&[1, 2]));

        let relabeled = tracks.relabel_by_lifetime();
        let lifetimes: Vec<usize> = relabeled.iter().map(|(_, t)| t.lifetime()).collect();
        assert_eq!(lifetimes, vec![3, 2, 1]);
        // Monotone over every id pair.
        for pair in lifetimes.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
    }

    #[test]
    fn relabel_ties_keep_old_id_order() {
        let mut tracks = Tracks::new();
        tracks.insert(3, track_with_frames(&[4, 5]));
        tracks.insert(7, track_with_frames(&[0, 1]));

        let relabeled = tracks.relabel_by_lifetime();
        // Old id 3 came first, so it takes new id 0.
        assert_eq!(relabeled.get(0).unwrap().frame_ids().next(), Some(4));
        assert_eq!(relabeled.get(1).unwrap().frame_ids().next(), Some(0));
    }

    #[test]
    fn lifetime_filter_bounds() {
        let mut tracks = Tracks::new();
        tracks.insert(0, track_with_frames(&[0]));
        tracks.insert(1, track_with_frames(&[0, 1]));
        tracks.insert(2, track_with_frames(&[0, 1, 2, 3]));

        let kept = tracks.clone().filter_by_lifetime(2, None);
        assert_eq!(kept.ids(), vec![1, 2]);

        let bounded = tracks.filter_by_lifetime(1, Some(2));
        assert_eq!(bounded.ids(), vec![0, 1]);
    }

    #[test]
    fn remove_frames_drops_emptied_tracks() {
        let mut tracks = Tracks::new();
        tracks.insert(0, track_with_frames(&[0, 1]));
        tracks.insert(1, track_with_frames(&[0]));

        let to_remove: BTreeSet<(TrackId, FrameId)> = [(0, 1), (1, 0)].into();
        let cleaned = tracks.remove_frames(&to_remove);
        assert_eq!(cleaned.ids(), vec![0]);
        assert_eq!(cleaned.get(0).unwrap().lifetime(), 1);
    }

    #[test]
    fn clockwise_removal_cleans_empty_frames_and_tracks() {
        let mut mixed = Track::new();
        mixed.push_contour(0, ccw_square(4.0));
        mixed.push_contour(0, cw_square(2.0));
        mixed.push_contour(1, cw_square(2.0));

        let mut tracks = Tracks::new();
        tracks.insert(0, mixed);
        tracks.insert(1, Track::single(0, cw_square(3.0)));

        let cleaned = tracks.remove_clockwise_contours();
        assert_eq!(cleaned.ids(), vec![0]);
        let track = cleaned.get(0).unwrap();
        // Frame 1 lost its only (clockwise) contour and was deleted.
        assert_eq!(track.lifetime(), 1);
        assert_eq!(track.contours_at(0).unwrap().len(), 1);
        assert!(track.contours_at(0).unwrap()[0].is_ccw());
    }

    #[test]
    fn empty_contour_lists_are_not_stored() {
        let mut track = Track::new();
        track.set_frame(3, Vec::new());
        assert!(track.is_empty());
    }
}
