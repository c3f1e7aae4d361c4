//! Rasterization of contours to boolean masks, plus the overlap metrics
//! (IoU, containment ratio) that drive matching and nesting decisions.

use crate::contour::Contour;

/// Boolean raster with (rows, cols) shape, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    height: usize,
    width: usize,
    data: Vec<bool>,
}

impl Mask {
    /// All-false mask with the given (rows, cols) shape.
    pub fn zeros(shape: (usize, usize)) -> Self {
        Self {
            height: shape.0,
            width: shape.1,
            data: vec![false; shape.0 * shape.1],
        }
    }

    /// (rows, cols) shape.
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Pixel lookup; out-of-range coordinates read as false.
    pub fn get(&self, row: usize, col: usize) -> bool {
        if row < self.height && col < self.width {
            self.data[row * self.width + col]
        } else {
            false
        }
    }

    /// Set a pixel. Out-of-range coordinates are ignored (clip semantics).
    pub fn set(&mut self, row: usize, col: usize, value: bool) {
        if row < self.height && col < self.width {
            self.data[row * self.width + col] = value;
        }
    }

    /// Number of true pixels.
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }

    /// Number of pixels true in both masks. Panics on shape mismatch.
    pub fn intersection_count(&self, other: &Mask) -> usize {
        assert_eq!(self.shape(), other.shape(), "mask shape mismatch");
        self.data
            .iter()
            .zip(other.data.iter())
            .filter(|(&a, &b)| a && b)
            .count()
    }

    /// Number of pixels true in either mask. Panics on shape mismatch.
    pub fn union_count(&self, other: &Mask) -> usize {
        assert_eq!(self.shape(), other.shape(), "mask shape mismatch");
        self.data
            .iter()
            .zip(other.data.iter())
            .filter(|(&a, &b)| a || b)
            .count()
    }
}

/// Fill the interior of one closed contour into `mask` using even-odd
/// scanline crossings against pixel centers at integer (row, col), then stamp
/// the perimeter so boundary pixels are included (the half-open crossing rule
/// alone would drop the max-row edge).
fn fill_contour(mask: &mut Mask, contour: &Contour) {
    let pts = contour.closed();
    let pts = pts.points();
    if pts.len() < 4 {
        return;
    }
    let (height, width) = mask.shape();

    let mut crossings: Vec<f64> = Vec::new();
    for row in 0..height {
        let y = row as f64;
        crossings.clear();
        for w in pts.windows(2) {
            let [y1, x1] = w[0];
            let [y2, x2] = w[1];
            // Half-open rule so shared vertices count once.
            if (y1 <= y && y < y2) || (y2 <= y && y < y1) {
                crossings.push(x1 + (y - y1) * (x2 - x1) / (y2 - y1));
            }
        }
        crossings.sort_by(|a, b| a.partial_cmp(b).unwrap());
        for pair in crossings.chunks_exact(2) {
            let start = pair[0].ceil().max(0.0) as usize;
            let end = pair[1].floor().min(width.saturating_sub(1) as f64);
            if end < 0.0 {
                continue;
            }
            for col in start..=end as usize {
                mask.set(row, col, true);
            }
        }
    }

    for w in pts.windows(2) {
        stamp_segment(mask, w[0], w[1]);
    }
}

/// Mark the pixels nearest to the segment from `a` to `b`.
fn stamp_segment(mask: &mut Mask, a: [f64; 2], b: [f64; 2]) {
    let steps = ((b[0] - a[0]).abs().max((b[1] - a[1]).abs()).ceil() as usize).max(1) * 2;
    for s in 0..=steps {
        let t = s as f64 / steps as f64;
        let r = a[0] + t * (b[0] - a[0]);
        let c = a[1] + t * (b[1] - a[1]);
        if r >= -0.5 && c >= -0.5 {
            mask.set(r.round() as usize, c.round() as usize, true);
        }
    }
}

/// Rasterize contours into a combined filled mask of the given (rows, cols)
/// shape. Open contours are closed implicitly; coordinates outside the shape
/// are clipped.
pub fn contours_to_mask(contours: &[Contour], shape: (usize, usize)) -> Mask {
    let mut mask = Mask::zeros(shape);
    for contour in contours {
        fill_contour(&mut mask, contour);
    }
    mask
}

/// Rasterize a single contour.
pub fn contour_to_mask(contour: &Contour, shape: (usize, usize)) -> Mask {
    contours_to_mask(std::slice::from_ref(contour), shape)
}

/// Intersection-over-Union between two masks. Defined as 0 when the union is
/// empty.
pub fn iou(a: &Mask, b: &Mask) -> f64 {
    let union = a.union_count(b);
    if union == 0 {
        return 0.0;
    }
    a.intersection_count(b) as f64 / union as f64
}

/// Fraction of `small` covered by `large`. Defined as 0 when `small` is
/// empty. Asymmetric subset test; the caller decides which side is "small".
pub fn containment_ratio(small: &Mask, large: &Mask) -> f64 {
    let area_small = small.count();
    if area_small == 0 {
        return 0.0;
    }
    small.intersection_count(large) as f64 / area_small as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square(r0: f64, c0: f64, r1: f64, c1: f64) -> Contour {
        Contour::new(vec![[r0, c0], [r1, c0], [r1, c1], [r0, c1]])
    }

    #[test]
    fn fills_axis_aligned_square() {
        let mask = contour_to_mask(&square(0.0, 0.0, 20.0, 20.0), (21, 21));
        assert_eq!(mask.count(), 21 * 21);
        let small = contour_to_mask(&square(5.0, 5.0, 10.0, 10.0), (21, 21));
        assert_eq!(small.count(), 36);
        assert!(small.get(5, 5) && small.get(10, 10));
        assert!(!small.get(4, 5) && !small.get(11, 10));
    }

    #[test]
    fn clips_out_of_range_coordinates() {
        let mask = contour_to_mask(&square(-5.0, -5.0, 4.0, 4.0), (10, 10));
        assert_eq!(mask.count(), 25);
        assert!(mask.get(0, 0) && mask.get(4, 4));
    }

    #[test]
    fn iou_of_disjoint_and_identical() {
        let shape = (21, 21);
        let a = contour_to_mask(&square(0.0, 0.0, 5.0, 5.0), shape);
        let b = contour_to_mask(&square(10.0, 10.0, 15.0, 15.0), shape);
        assert_eq!(iou(&a, &b), 0.0);
        assert_relative_eq!(iou(&a, &a), 1.0);
        let empty = Mask::zeros(shape);
        assert_eq!(iou(&empty, &empty), 0.0);
    }

    #[test]
    fn containment_ratio_bounds() {
        let shape = (21, 21);
        let outer = contour_to_mask(&square(0.0, 0.0, 20.0, 20.0), shape);
        let inner = contour_to_mask(&square(5.0, 5.0, 10.0, 10.0), shape);
        let offset = contour_to_mask(&square(15.0, 15.0, 25.0, 25.0), shape);

        // Subset: exactly 1. Empty small: exactly 0.
        assert_relative_eq!(containment_ratio(&inner, &outer), 1.0);
        assert_eq!(containment_ratio(&Mask::zeros(shape), &outer), 0.0);

        let partial = containment_ratio(&offset, &inner);
        assert!((0.0..=1.0).contains(&partial));
    }

    #[test]
    fn overlapping_squares_half_shift() {
        let shape = (30, 30);
        let a = contour_to_mask(&square(0.0, 0.0, 9.0, 9.0), shape);
        let b = contour_to_mask(&square(0.0, 5.0, 9.0, 14.0), shape);
        // 10x10 squares shifted by 5 columns: overlap 10x5.
        assert_eq!(a.intersection_count(&b), 50);
        assert_eq!(a.union_count(&b), 150);
        assert_relative_eq!(iou(&a, &b), 50.0 / 150.0);
    }
}
