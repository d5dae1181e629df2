//! Coverage triangle primitive.

use chrono::{DateTime, Utc};

use crate::coord::Point2D;

/// Triangles with less area than this (m²) are treated as degenerate.
pub const DEGENERATE_AREA: f64 = 1e-9;

/// A patch of ground covered by one section during one control cycle.
///
/// Vertices are fixed at construction. The overlap count is assigned by
/// [`CoverageMapService`](super::CoverageMapService) when the triangle is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageTriangle {
    vertices: [Point2D; 3],
    section_id: usize,
    timestamp: DateTime<Utc>,
    overlap_count: u32,
}

impl CoverageTriangle {
    /// Create a triangle stamped with the current time.
    pub fn new(a: Point2D, b: Point2D, c: Point2D, section_id: usize) -> Self {
        Self::with_timestamp(a, b, c, section_id, Utc::now())
    }

    /// Create a triangle with an explicit timestamp.
    pub fn with_timestamp(
        a: Point2D,
        b: Point2D,
        c: Point2D,
        section_id: usize,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            vertices: [a, b, c],
            section_id,
            timestamp,
            overlap_count: 1,
        }
    }

    pub fn vertices(&self) -> &[Point2D; 3] {
        &self.vertices
    }

    pub fn section_id(&self) -> usize {
        self.section_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Number of passes over this triangle's ground, at least 1.
    pub fn overlap_count(&self) -> u32 {
        self.overlap_count
    }

    pub(crate) fn set_overlap_count(&mut self, count: u32) {
        self.overlap_count = count.max(1);
    }

    /// Twice the signed area (positive for counter-clockwise vertices).
    fn doubled_signed_area(&self) -> f64 {
        let [a, b, c] = &self.vertices;
        (b.easting - a.easting) * (c.northing - a.northing)
            - (c.easting - a.easting) * (b.northing - a.northing)
    }

    /// Area in m², from the 2-D cross product.
    pub fn area(&self) -> f64 {
        self.doubled_signed_area().abs() / 2.0
    }

    /// True for slivers under [`DEGENERATE_AREA`] and for any NaN or infinite vertex.
    pub fn is_degenerate(&self) -> bool {
        !(self.vertices.iter().all(Point2D::is_finite) && self.area() >= DEGENERATE_AREA)
    }

    /// Axis-aligned bounds as (min, max) corners.
    pub fn bounds(&self) -> (Point2D, Point2D) {
        let [a, b, c] = &self.vertices;
        (
            Point2D::new(
                a.easting.min(b.easting).min(c.easting),
                a.northing.min(b.northing).min(c.northing),
            ),
            Point2D::new(
                a.easting.max(b.easting).max(c.easting),
                a.northing.max(b.northing).max(c.northing),
            ),
        )
    }

    /// Whether `point` lies inside the triangle or on its boundary.
    ///
    /// Uses the sign of the cross product against each edge, so vertex
    /// winding does not matter.
    pub fn contains(&self, point: &Point2D) -> bool {
        let [a, b, c] = &self.vertices;
        let d1 = edge_side(a, b, point);
        let d2 = edge_side(b, c, point);
        let d3 = edge_side(c, a, point);

        let has_negative = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
        let has_positive = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
        !(has_negative && has_positive)
    }

    /// Whether the interiors of two triangles overlap by more than `tolerance` meters.
    ///
    /// Separating-axis test over the six edge normals. Triangles that only
    /// share an edge or a vertex, or that interpenetrate by no more than
    /// `tolerance` along some axis, do not intersect.
    pub fn intersects(&self, other: &CoverageTriangle, tolerance: f64) -> bool {
        if self.is_degenerate() || other.is_degenerate() {
            return false;
        }

        for triangle in [self, other] {
            let v = &triangle.vertices;
            for i in 0..3 {
                let p = v[i];
                let q = v[(i + 1) % 3];
                let (dx, dy) = (q.easting - p.easting, q.northing - p.northing);
                let length = (dx * dx + dy * dy).sqrt();
                if length == 0.0 {
                    continue;
                }
                let axis = (-dy / length, dx / length);

                let (min_a, max_a) = self.project(axis);
                let (min_b, max_b) = other.project(axis);
                if max_a <= min_b + tolerance || max_b <= min_a + tolerance {
                    return false;
                }
            }
        }
        true
    }

    fn project(&self, axis: (f64, f64)) -> (f64, f64) {
        self.vertices
            .iter()
            .map(|p| p.easting * axis.0 + p.northing * axis.1)
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), d| {
                (lo.min(d), hi.max(d))
            })
    }
}

/// Cross product of (b - a) × (p - a).
fn edge_side(a: &Point2D, b: &Point2D, p: &Point2D) -> f64 {
    (b.easting - a.easting) * (p.northing - a.northing)
        - (b.northing - a.northing) * (p.easting - a.easting)
}
