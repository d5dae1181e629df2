//! Coverage map: every triangle of ground a section has treated.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::coord::Point2D;

use super::grid::{SpatialGrid, DEFAULT_CELL_SIZE};
use super::triangle::{CoverageTriangle, DEGENERATE_AREA};

/// Capacity of the coverage-update broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Triangles whose bounds cover more grid cells than this are rejected.
pub const MAX_CELLS_PER_TRIANGLE: u128 = 65_536;

/// Published after a batch of triangles is stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverageUpdated {
    /// Triangles stored from the batch (degenerate ones are skipped).
    pub added_count: usize,
    /// Total covered area after the batch, in m².
    pub total_area: f64,
}

/// Area in m² per overlap count.
///
/// Each stored triangle is counted once, under its current overlap count,
/// so ground covered twice shows up only under 2 (both passes' area).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OverlapStatistics {
    areas: BTreeMap<u32, f64>,
}

impl OverlapStatistics {
    /// Area of triangles currently carrying exactly `overlap_count` passes.
    pub fn area_for(&self, overlap_count: u32) -> f64 {
        self.areas.get(&overlap_count).copied().unwrap_or(0.0)
    }

    /// Area of ground no later pass has intersected.
    pub fn single_pass_area(&self) -> f64 {
        self.area_for(1)
    }

    /// Area of triangles carrying two or more passes.
    pub fn overlapped_area(&self) -> f64 {
        self.areas.range(2..).map(|(_, area)| area).sum()
    }

    /// Sum over every overlap count.
    pub fn total_area(&self) -> f64 {
        self.areas.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    /// Iterate `(overlap_count, area)` in ascending count order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.areas.iter().map(|(&count, &area)| (count, area))
    }

    fn add(&mut self, overlap_count: u32, area: f64) {
        *self.areas.entry(overlap_count).or_insert(0.0) += area;
    }

    fn remove(&mut self, overlap_count: u32, area: f64) {
        if let Some(total) = self.areas.get_mut(&overlap_count) {
            *total -= area;
            // Rounding residue once every triangle has moved out
            if *total < DEGENERATE_AREA {
                self.areas.remove(&overlap_count);
            }
        }
    }
}

#[derive(Debug)]
struct CoverageInner {
    triangles: Vec<CoverageTriangle>,
    grid: SpatialGrid,
    total_area: f64,
    stats: OverlapStatistics,
}

impl CoverageInner {
    fn new(cell_size: f64) -> Self {
        Self {
            triangles: Vec::new(),
            grid: SpatialGrid::new(cell_size),
            total_area: 0.0,
            stats: OverlapStatistics::default(),
        }
    }

    /// Store `triangle` and raise every stored triangle it intersects to its count.
    fn insert(&mut self, mut triangle: CoverageTriangle, tolerance: f64) {
        let bounds = triangle.bounds();
        let overlapping: Vec<usize> = self
            .grid
            .candidates(bounds)
            .into_iter()
            .filter(|&i| self.triangles[i].intersects(&triangle, tolerance))
            .collect();
        let count = overlapping
            .iter()
            .map(|&i| self.triangles[i].overlap_count())
            .max()
            .unwrap_or(0)
            + 1;
        triangle.set_overlap_count(count);

        for i in overlapping {
            let existing = &mut self.triangles[i];
            let (previous, area) = (existing.overlap_count(), existing.area());
            existing.set_overlap_count(count);
            self.stats.remove(previous, area);
            self.stats.add(count, area);
        }

        let area = triangle.area();
        self.total_area += area;
        self.stats.add(count, area);

        let index = self.triangles.len();
        self.grid.insert(index, bounds);
        self.triangles.push(triangle);
    }
}

/// Thread-safe store of coverage triangles with overlap tracking.
///
/// Each incoming triangle is compared against stored triangles that share
/// a grid cell. Its overlap count becomes one more than the highest count
/// among the stored triangles it intersects, or 1 over fresh ground, and
/// those stored triangles are raised to the same count. Vertices never change.
#[derive(Debug)]
pub struct CoverageMapService {
    inner: Mutex<CoverageInner>,
    overlap_tolerance: f64,
    events: broadcast::Sender<CoverageUpdated>,
}

impl Default for CoverageMapService {
    fn default() -> Self {
        Self::new(DEFAULT_CELL_SIZE, 0.1)
    }
}

impl CoverageMapService {
    /// Create an empty map.
    ///
    /// `overlap_tolerance` is the interpenetration, in meters, below which
    /// two triangles are not considered overlapping.
    pub fn new(cell_size: f64, overlap_tolerance: f64) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(CoverageInner::new(cell_size)),
            overlap_tolerance: overlap_tolerance.max(0.0),
            events,
        }
    }

    pub fn overlap_tolerance(&self) -> f64 {
        self.overlap_tolerance
    }

    /// Subscribe to batch updates.
    pub fn subscribe(&self) -> broadcast::Receiver<CoverageUpdated> {
        self.events.subscribe()
    }

    /// Store a batch of triangles in order.
    ///
    /// Later triangles in the batch see earlier ones as existing coverage.
    /// Degenerate or non-finite triangles are dropped, as are triangles
    /// spanning more than [`MAX_CELLS_PER_TRIANGLE`] grid cells. Returns the
    /// number stored.
    pub fn add_coverage_triangles<I>(&self, triangles: I) -> usize
    where
        I: IntoIterator<Item = CoverageTriangle>,
    {
        let (added_count, total_area) = {
            let mut inner = self.inner.lock();
            let mut added = 0;
            for triangle in triangles {
                if triangle.is_degenerate() {
                    tracing::trace!(section = triangle.section_id(), "Skipping degenerate triangle");
                    continue;
                }
                let cells = inner.grid.cell_span(triangle.bounds());
                if cells > MAX_CELLS_PER_TRIANGLE {
                    tracing::warn!(
                        section = triangle.section_id(),
                        area = triangle.area(),
                        cells = %cells,
                        "Rejecting oversized coverage triangle"
                    );
                    continue;
                }
                inner.insert(triangle, self.overlap_tolerance);
                added += 1;
            }
            (added, inner.total_area)
        };

        if added_count > 0 {
            tracing::trace!(added_count, total_area, "Coverage updated");
            let _ = self.events.send(CoverageUpdated {
                added_count,
                total_area,
            });
        }
        added_count
    }

    /// Number of stored triangles containing `point` (boundaries count).
    pub fn coverage_at(&self, point: &Point2D) -> usize {
        let inner = self.inner.lock();
        inner
            .grid
            .at_point(point)
            .iter()
            .filter(|&&i| inner.triangles[i].contains(point))
            .count()
    }

    /// Area per overlap count.
    pub fn overlap_statistics(&self) -> OverlapStatistics {
        self.inner.lock().stats.clone()
    }

    /// Snapshot of all stored triangles in insertion order.
    pub fn all_triangles(&self) -> Vec<CoverageTriangle> {
        self.inner.lock().triangles.clone()
    }

    /// Sum of all stored triangle areas in m², overlaps included.
    pub fn covered_area(&self) -> f64 {
        self.inner.lock().total_area
    }

    pub fn triangle_count(&self) -> usize {
        self.inner.lock().triangles.len()
    }

    /// Drop all coverage.
    pub fn clear(&self) {
        let removed = {
            let mut inner = self.inner.lock();
            let removed = inner.triangles.len();
            let cell_size = inner.grid.cell_size();
            *inner = CoverageInner::new(cell_size);
            removed
        };
        tracing::info!(removed, "Coverage map cleared");
    }
}
