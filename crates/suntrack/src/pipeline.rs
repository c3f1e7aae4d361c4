//! Top-level tracking pipeline: three independent matcher runs at the
//! outer / middle / inner intensity levels, clockwise-contour and
//! nested-track cleanup of the outer set, and containment association of
//! the umbra and pore levels to the cleaned outer tracks.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::associate::{associate_inner_outer, Sunspots};
use crate::extract::FloatImage;
use crate::track::{remove_nested_tracks, track_contours, TrackError, TrackParams, Tracks};

/// Pipeline configuration: the three contour levels (fractions of the
/// quiet-sun intensity), the containment threshold shared by nested-track
/// removal and inner/outer association, and the matcher tuning applied to
/// every level.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Penumbra boundary level.
    pub outer_level: f32,
    /// Pore-discriminating intermediate level.
    pub middle_level: f32,
    /// Umbra boundary level.
    pub inner_level: f32,
    /// Minimum containment ratio for nested removal and association.
    pub min_containment: f64,
    /// Matcher tuning, shared by all three level runs.
    pub track: TrackParams,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            outer_level: 0.9,
            middle_level: 0.65,
            inner_level: 0.5,
            min_containment: 0.8,
            track: TrackParams::default(),
        }
    }
}

/// Everything one pipeline run produces. The intermediate track sets are
/// kept for diagnostics alongside the associated structures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SunspotTrackingResult {
    /// Cleaned outer tracks with umbra-level contours attached.
    pub sunspots: Sunspots,
    /// Cleaned outer tracks with middle-level contours attached.
    pub pores: Sunspots,
    /// Outer-level tracks as the matcher produced them.
    pub outer_tracks: Tracks,
    /// Outer-level tracks after clockwise-contour and nested-track removal.
    pub outer_tracks_filtered: Tracks,
    /// Middle-level tracks as the matcher produced them.
    pub middle_tracks: Tracks,
    /// Inner-level tracks as the matcher produced them.
    pub inner_tracks: Tracks,
}

/// Run the full tracking pipeline over an in-memory frame sequence.
///
/// The three level runs are independent; cleanup applies to the outer set
/// only. Clockwise contours are dropped first (holes extracted at the outer
/// level would otherwise pass as region boundaries), then tracks nested in
/// a larger track at the same level lose the shared frames. The cleaned
/// outer tracks are finally paired with the inner run (sunspots) and the
/// middle run (pores).
pub fn track_and_merge_sunspots(
    images: &[FloatImage],
    config: &TrackingConfig,
) -> Result<SunspotTrackingResult, TrackError> {
    let shapes: Vec<(usize, usize)> = images
        .iter()
        .map(|img| (img.height() as usize, img.width() as usize))
        .collect();

    let outer_tracks = track_contours(images, config.outer_level, &config.track)?;
    let middle_tracks = track_contours(images, config.middle_level, &config.track)?;
    let inner_tracks = track_contours(images, config.inner_level, &config.track)?;
    info!(
        outer = outer_tracks.len(),
        middle = middle_tracks.len(),
        inner = inner_tracks.len(),
        "level runs complete"
    );

    let outer_tracks_filtered = outer_tracks
        .clone()
        .remove_clockwise_contours()
        .relabel_by_lifetime();
    let outer_tracks_filtered =
        remove_nested_tracks(outer_tracks_filtered, &shapes, config.min_containment);
    info!(kept = outer_tracks_filtered.len(), "outer tracks cleaned");

    let sunspots = associate_inner_outer(
        &outer_tracks_filtered,
        &inner_tracks,
        &shapes,
        config.min_containment,
    );
    let pores = associate_inner_outer(
        &outer_tracks_filtered,
        &middle_tracks,
        &shapes,
        config.min_containment,
    );

    Ok(SunspotTrackingResult {
        sunspots,
        pores,
        outer_tracks,
        outer_tracks_filtered,
        middle_tracks,
        inner_tracks,
    })
}

/// Configured pipeline entry point.
///
/// # Examples
///
/// ```no_run
/// use suntrack::{FloatImage, Tracker};
///
/// let frames: Vec<FloatImage> = Vec::new();
/// let tracker = Tracker::new();
/// let result = tracker.run(&frames).unwrap();
/// println!("found {} sunspots", result.sunspots.len());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Tracker {
    config: TrackingConfig,
}

impl Tracker {
    /// Create a tracker with default levels and matcher tuning.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with full config control.
    pub fn with_config(config: TrackingConfig) -> Self {
        Self { config }
    }

    /// Access the current configuration.
    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    /// Mutable access to configuration for post-construction tuning.
    pub fn config_mut(&mut self) -> &mut TrackingConfig {
        &mut self.config
    }

    /// Run the pipeline over an ordered frame sequence.
    pub fn run(&self, images: &[FloatImage]) -> Result<SunspotTrackingResult, TrackError> {
        track_and_merge_sunspots(images, &self.config)
    }
}
