//! Uniform spatial hash over triangle bounding boxes.

use std::collections::HashMap;

use crate::coord::Point2D;

/// Default grid cell edge length in meters.
pub const DEFAULT_CELL_SIZE: f64 = 10.0;

/// Buckets triangle indices by the grid cells their bounds overlap.
///
/// Candidate lookups may return indices whose triangles do not actually
/// touch the query; callers run the exact test afterwards.
#[derive(Debug, Clone)]
pub struct SpatialGrid {
    cell_size: f64,
    cells: HashMap<(i64, i64), Vec<usize>>,
}

impl SpatialGrid {
    /// Create an empty grid. Non-positive or non-finite sizes fall back to
    /// [`DEFAULT_CELL_SIZE`].
    pub fn new(cell_size: f64) -> Self {
        let cell_size = if cell_size.is_finite() && cell_size > 0.0 {
            cell_size
        } else {
            DEFAULT_CELL_SIZE
        };
        Self {
            cell_size,
            cells: HashMap::new(),
        }
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    fn cell_of(&self, point: &Point2D) -> (i64, i64) {
        (
            (point.easting / self.cell_size).floor() as i64,
            (point.northing / self.cell_size).floor() as i64,
        )
    }

    /// Number of cells the bounds overlap.
    pub fn cell_span(&self, bounds: (Point2D, Point2D)) -> u128 {
        let (lo, hi) = (self.cell_of(&bounds.0), self.cell_of(&bounds.1));
        let width = (i128::from(hi.0) - i128::from(lo.0) + 1).max(0) as u128;
        let height = (i128::from(hi.1) - i128::from(lo.1) + 1).max(0) as u128;
        width.saturating_mul(height)
    }

    /// Register `index` in every cell overlapped by the bounds.
    pub fn insert(&mut self, index: usize, bounds: (Point2D, Point2D)) {
        let (lo, hi) = (self.cell_of(&bounds.0), self.cell_of(&bounds.1));
        for x in lo.0..=hi.0 {
            for y in lo.1..=hi.1 {
                self.cells.entry((x, y)).or_default().push(index);
            }
        }
    }

    /// Indices whose bounds share a cell with the query bounds, sorted and deduplicated.
    pub fn candidates(&self, bounds: (Point2D, Point2D)) -> Vec<usize> {
        let (lo, hi) = (self.cell_of(&bounds.0), self.cell_of(&bounds.1));
        let mut found = Vec::new();
        for x in lo.0..=hi.0 {
            for y in lo.1..=hi.1 {
                if let Some(bucket) = self.cells.get(&(x, y)) {
                    found.extend_from_slice(bucket);
                }
            }
        }
        found.sort_unstable();
        found.dedup();
        found
    }

    /// Indices registered in the cell containing `point`.
    pub fn at_point(&self, point: &Point2D) -> &[usize] {
        self.cells
            .get(&self.cell_of(point))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
