//! suntrack — contour tracking and region association for solar image
//! sequences.
//!
//! Frames are continuum images normalized to quiet-sun intensity; dark
//! features (sunspots, pores) are extracted as iso-contours and followed
//! through time. The pipeline stages are:
//!
//! 1. **Extract** – marching-squares iso-contours at a fixed intensity level.
//! 2. **Register** – rigid frame-to-frame alignment: feature matching with
//!    consensus fitting, masked-correlation shift fallback, identity last.
//! 3. **Match** – frame-to-frame IoU matching of contours into tracks, with
//!    bounded gap bridging and lifetime-based relabeling.
//! 4. **Resolve** – removal of clockwise contours and of tracks nested
//!    inside a larger track at the same level.
//! 5. **Associate** – containment pairing of umbra- and pore-level contours
//!    with the cleaned penumbra-level tracks.
//!
//! # Public API
//! - [`Tracker`] and [`TrackingConfig`] as primary entry points
//! - [`track_contours`] and [`TrackParams`] for single-level tracking
//! - [`Tracks`], [`Track`] and [`Sunspots`] result structures

mod associate;
mod contour;
mod extract;
mod pipeline;
mod raster;
mod register;
#[cfg(test)]
mod test_utils;
mod track;

pub use associate::{associate_inner_outer, Sunspot, Sunspots};
pub use contour::{
    classify_contours, filter_candidate_contours, filter_contours_by_area, sort_by_area_desc,
    Contour,
};
pub use extract::{find_level_contours, FloatImage};
pub use pipeline::{track_and_merge_sunspots, SunspotTrackingResult, Tracker, TrackingConfig};
pub use raster::{containment_ratio, contour_to_mask, contours_to_mask, iou, Mask};
pub use register::{register_frames, MaskDirection, RegistrationConfig, RigidTransform};
pub use track::{
    find_nested_tracks, remove_nested_tracks, track_contours, FrameId, Track, TrackError, TrackId,
    TrackParams, Tracks,
};
