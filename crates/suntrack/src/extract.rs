//! Level-contour extraction via marching squares.
//!
//! Produces iso-contours of a [`FloatImage`] at a fixed intensity level, as
//! (row, col) polylines with linear sub-pixel interpolation. Contours around
//! below-level regions (dark features on a bright quiet background) come out
//! counter-clockwise (positive signed area); above-level islands inside them
//! come out clockwise, so orientation classification downstream can separate
//! region boundaries from holes. Regions touching the image border yield
//! open polylines.

use std::collections::{HashMap, HashSet};

use image::{ImageBuffer, Luma};

use crate::contour::Contour;

/// Single-channel f32 frame buffer, the working image type of the crate.
pub type FloatImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Identity of a grid edge between two adjacent samples.
///
/// `H(r, c)` joins samples (r, c)–(r, c+1); `V(r, c)` joins (r, c)–(r+1, c).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Edge {
    H(u32, u32),
    V(u32, u32),
}

struct SegmentSet {
    /// Directed segments: start edge → end edge.
    next: HashMap<Edge, Edge>,
    /// End edge → start edge, for walking open chains back to their head.
    prev: HashMap<Edge, Edge>,
    /// Start edges in cell-scan order, for deterministic output.
    order: Vec<Edge>,
    /// Interpolated crossing point per edge.
    point: HashMap<Edge, [f64; 2]>,
}

impl SegmentSet {
    fn new() -> Self {
        Self {
            next: HashMap::new(),
            prev: HashMap::new(),
            order: Vec::new(),
            point: HashMap::new(),
        }
    }

    fn push(&mut self, from: Edge, from_pt: [f64; 2], to: Edge, to_pt: [f64; 2]) {
        self.next.insert(from, to);
        self.prev.insert(to, from);
        self.order.push(from);
        self.point.insert(from, from_pt);
        self.point.insert(to, to_pt);
    }
}

/// Extract iso-contours of `image` at `level`.
///
/// Equivalent in role to a marching-squares `find_contours(image, level)`:
/// each returned contour is an ordered (row, col) polyline; closed loops
/// repeat their first point at the end.
pub fn find_level_contours(image: &FloatImage, level: f32) -> Vec<Contour> {
    let (width, height) = image.dimensions();
    if width < 2 || height < 2 {
        return Vec::new();
    }

    let level = level as f64;
    let value = |r: u32, c: u32| -> f64 { image.get_pixel(c, r)[0] as f64 };
    let below = |v: f64| -> bool { v < level };
    // Crossing position along an edge from value `va` (at offset 0) to `vb`.
    let frac = |va: f64, vb: f64| -> f64 { (level - va) / (vb - va) };

    let mut segments = SegmentSet::new();

    for r in 0..height - 1 {
        for c in 0..width - 1 {
            let tl = value(r, c);
            let tr = value(r, c + 1);
            let br = value(r + 1, c + 1);
            let bl = value(r + 1, c);

            let case = (below(tl) as u8)
                | (below(tr) as u8) << 1
                | (below(br) as u8) << 2
                | (below(bl) as u8) << 3;
            if case == 0 || case == 15 {
                continue;
            }

            let rf = r as f64;
            let cf = c as f64;
            let top = (Edge::H(r, c), [rf, cf + frac(tl, tr)]);
            let right = (Edge::V(r, c + 1), [rf + frac(tr, br), cf + 1.0]);
            let bottom = (Edge::H(r + 1, c), [rf + 1.0, cf + frac(bl, br)]);
            let left = (Edge::V(r, c), [rf + frac(tl, bl), cf]);

            let mut emit = |from: &(Edge, [f64; 2]), to: &(Edge, [f64; 2])| {
                segments.push(from.0, from.1, to.0, to.1);
            };

            // Segment directions keep the below-level region oriented so its
            // boundary has positive signed area under Contour::signed_area.
            match case {
                1 => emit(&left, &top),
                2 => emit(&top, &right),
                4 => emit(&right, &bottom),
                8 => emit(&bottom, &left),
                3 => emit(&left, &right),
                6 => emit(&top, &bottom),
                12 => emit(&right, &left),
                9 => emit(&bottom, &top),
                7 => emit(&left, &bottom),
                14 => emit(&top, &left),
                13 => emit(&right, &top),
                11 => emit(&bottom, &right),
                5 => {
                    // Saddle: resolve connectivity with the cell-center mean.
                    if below(0.25 * (tl + tr + br + bl)) {
                        emit(&right, &top);
                        emit(&left, &bottom);
                    } else {
                        emit(&left, &top);
                        emit(&right, &bottom);
                    }
                }
                10 => {
                    if below(0.25 * (tl + tr + br + bl)) {
                        emit(&top, &left);
                        emit(&bottom, &right);
                    } else {
                        emit(&top, &right);
                        emit(&bottom, &left);
                    }
                }
                _ => unreachable!(),
            }
        }
    }

    assemble_chains(&segments)
}

/// Chain directed segments into polylines. Open chains (hitting the image
/// border) are emitted first from their head; remaining segments form closed
/// loops, emitted with the first point repeated at the end.
fn assemble_chains(segments: &SegmentSet) -> Vec<Contour> {
    let mut contours = Vec::new();
    let mut visited: HashSet<Edge> = HashSet::new();

    let mut walk = |head: Edge, visited: &mut HashSet<Edge>| -> Vec<[f64; 2]> {
        let mut points = vec![segments.point[&head]];
        let mut cur = head;
        while let Some(&next) = segments.next.get(&cur) {
            visited.insert(cur);
            points.push(segments.point[&next]);
            if next == head || visited.contains(&next) {
                break;
            }
            cur = next;
        }
        points
    };

    // Open chains: start edges that are not the end of any segment.
    for &edge in &segments.order {
        if visited.contains(&edge) || segments.prev.contains_key(&edge) {
            continue;
        }
        contours.push(Contour::new(walk(edge, &mut visited)));
    }

    // Closed loops.
    for &edge in &segments.order {
        if visited.contains(&edge) {
            continue;
        }
        contours.push(Contour::new(walk(edge, &mut visited)));
    }

    contours
}
