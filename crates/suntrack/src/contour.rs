//! Contour value type and planar geometry helpers.
//!
//! A contour is an ordered polyline of (row, col) points extracted from an
//! image at a fixed intensity level. Orientation carries meaning: positive
//! signed area (counter-clockwise) marks an outer boundary, negative marks a
//! hole.

use serde::{Deserialize, Serialize};

/// Ordered boundary polyline in (row, col) image coordinates.
///
/// Not required to be closed; consumers that need a closed polygon call
/// [`Contour::closed`] or rely on implicit closing during rasterization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contour {
    points: Vec<[f64; 2]>,
}

impl Contour {
    /// Create from (row, col) points.
    pub fn new(points: Vec<[f64; 2]>) -> Self {
        Self { points }
    }

    /// Access the (row, col) points.
    pub fn points(&self) -> &[[f64; 2]] {
        &self.points
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True when the contour has no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Signed shoelace area with `x = col`, `y = row`, pairing each point
    /// with its predecessor around the closed cycle:
    /// `0.5 * Σ (x_i·y_{i−1} − y_i·x_{i−1})`.
    ///
    /// Positive for counter-clockwise (outer) boundaries under the extraction
    /// convention used by [`crate::extract::find_level_contours`].
    pub fn signed_area(&self) -> f64 {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }
        let mut acc = 0.0;
        for i in 0..n {
            let [y, x] = self.points[i];
            let [yp, xp] = self.points[(i + n - 1) % n];
            acc += x * yp - y * xp;
        }
        0.5 * acc
    }

    /// Absolute enclosed area.
    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }

    /// True when the contour is counter-clockwise (positive signed area).
    pub fn is_ccw(&self) -> bool {
        self.signed_area() > 0.0
    }

    /// Return a closed copy: the first point is appended when the last point
    /// differs from it.
    pub fn closed(&self) -> Contour {
        let mut points = self.points.clone();
        if let (Some(first), Some(last)) = (points.first().copied(), points.last().copied()) {
            if first != last {
                points.push(first);
            }
        }
        Contour::new(points)
    }

    /// Minimum Euclidean distance between any point of `self` and any point
    /// of `other`. Infinite when either contour is empty.
    pub fn min_distance_to(&self, other: &Contour) -> f64 {
        let mut best = f64::INFINITY;
        for &[r1, c1] in &self.points {
            for &[r2, c2] in &other.points {
                let d = ((r1 - r2).powi(2) + (c1 - c2).powi(2)).sqrt();
                if d < best {
                    best = d;
                }
            }
        }
        best
    }
}

/// Keep contours whose absolute area lies in `[threshold_min, threshold_max]`.
pub fn filter_contours_by_area(
    contours: Vec<Contour>,
    threshold_min: f64,
    threshold_max: f64,
) -> Vec<Contour> {
    contours
        .into_iter()
        .filter(|c| {
            let a = c.area();
            a >= threshold_min && a <= threshold_max
        })
        .collect()
}

/// Sort contours by descending absolute area. Stable, so equal-area contours
/// keep their extraction order.
pub fn sort_by_area_desc(contours: &mut [Contour]) {
    contours.sort_by(|a, b| b.area().partial_cmp(&a.area()).unwrap());
}

/// Split contours into (outer, holes) by orientation.
pub fn classify_contours(contours: Vec<Contour>) -> (Vec<Contour>, Vec<Contour>) {
    let mut outer = Vec::new();
    let mut holes = Vec::new();
    for c in contours {
        if c.is_ccw() {
            outer.push(c);
        } else {
            holes.push(c);
        }
    }
    (outer, holes)
}

/// Keep candidates within `max_distance` of `input`.
pub fn filter_candidate_contours(
    input: &Contour,
    candidates: Vec<Contour>,
    max_distance: f64,
) -> Vec<Contour> {
    candidates
        .into_iter()
        .filter(|c| input.min_distance_to(c) <= max_distance)
        .collect()
}
