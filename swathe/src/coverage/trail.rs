//! Turns successive section boundaries into coverage triangles.

use crate::coord::Point2D;
use crate::sections::{SectionBoundary, SectionState};

use super::triangle::CoverageTriangle;

/// Default minimum travel (m) of a section midpoint before a new strip is emitted.
pub const DEFAULT_MIN_STEP: f64 = 0.05;

/// Default largest midpoint travel (m) bridged by one strip.
///
/// 20 m/s at the slowest 1 s control period. Longer moves are position
/// jumps and restart the trail.
pub const DEFAULT_MAX_STEP: f64 = 20.0;

#[derive(Debug, Clone, Copy)]
struct Edge {
    left: Point2D,
    right: Point2D,
}

impl Edge {
    fn from_boundary(boundary: &SectionBoundary) -> Self {
        Self {
            left: boundary.left.point(),
            right: boundary.right.point(),
        }
    }

    fn midpoint(&self) -> Point2D {
        Point2D::new(
            (self.left.easting + self.right.easting) / 2.0,
            (self.left.northing + self.right.northing) / 2.0,
        )
    }
}

/// Remembers the last boundary of each applying section and emits the
/// strip of ground swept since then as two triangles.
///
/// A section that stops applying breaks its trail; the next strip starts
/// from wherever it turns back on. A move longer than the maximum step
/// (a lost or re-acquired fix) restarts the trail in the same way.
#[derive(Debug, Clone)]
pub struct CoverageTrailBuilder {
    previous: Vec<Option<Edge>>,
    min_step: f64,
    max_step: f64,
}

impl Default for CoverageTrailBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CoverageTrailBuilder {
    pub fn new() -> Self {
        Self::with_min_step(DEFAULT_MIN_STEP)
    }

    pub fn with_min_step(min_step: f64) -> Self {
        Self {
            previous: Vec::new(),
            min_step: min_step.max(0.0),
            max_step: DEFAULT_MAX_STEP,
        }
    }

    /// Set the largest move bridged by one strip. Never below the minimum step.
    pub fn with_max_step(mut self, max_step: f64) -> Self {
        self.max_step = max_step.max(self.min_step);
        self
    }

    /// Advance all trails to `boundaries`.
    ///
    /// `states` is indexed by section id. Sections missing from `states` are
    /// treated as not applying. A change in section count resets every trail.
    pub fn advance(
        &mut self,
        boundaries: &[SectionBoundary],
        states: &[SectionState],
    ) -> Vec<CoverageTriangle> {
        if self.previous.len() != boundaries.len() {
            self.previous = vec![None; boundaries.len()];
        }

        let mut triangles = Vec::new();
        for boundary in boundaries {
            let Some(slot) = self.previous.get_mut(boundary.section_id) else {
                continue;
            };
            let applying = states
                .get(boundary.section_id)
                .is_some_and(SectionState::is_applying);
            if !applying {
                *slot = None;
                continue;
            }

            let current = Edge::from_boundary(boundary);
            match *slot {
                None => *slot = Some(current),
                Some(prev) => {
                    let step = prev.midpoint().distance_to(&current.midpoint());
                    if step < self.min_step {
                        continue;
                    }
                    if step > self.max_step {
                        tracing::debug!(
                            section = boundary.section_id,
                            step,
                            "Coverage trail restarted after position jump"
                        );
                        *slot = Some(current);
                        continue;
                    }
                    triangles.push(CoverageTriangle::new(
                        prev.left,
                        prev.right,
                        current.right,
                        boundary.section_id,
                    ));
                    triangles.push(CoverageTriangle::new(
                        prev.left,
                        current.right,
                        current.left,
                        boundary.section_id,
                    ));
                    *slot = Some(current);
                }
            }
        }
        triangles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::UtmPosition;

    fn boundaries(northing: f64, count: usize, width: f64) -> Vec<SectionBoundary> {
        // Heading north, index 0 leftmost (west)
        let total = count as f64 * width;
        (0..count)
            .map(|id| {
                let left = -total / 2.0 + id as f64 * width;
                SectionBoundary {
                    section_id: id,
                    left: UtmPosition::local(left, northing),
                    right: UtmPosition::local(left + width, northing),
                }
            })
            .collect()
    }

    #[test]
    fn test_first_boundary_only_primes() {
        let mut trail = CoverageTrailBuilder::new();
        let out = trail.advance(&boundaries(0.0, 2, 3.0), &[SectionState::Auto; 2]);
        assert!(out.is_empty());
    }

    #[test]
    fn test_strip_covers_swept_area() {
        let mut trail = CoverageTrailBuilder::new();
        let states = [SectionState::Auto, SectionState::ManualOn];
        trail.advance(&boundaries(0.0, 2, 3.0), &states);
        let out = trail.advance(&boundaries(2.0, 2, 3.0), &states);

        assert_eq!(out.len(), 4);
        let area: f64 = out.iter().map(CoverageTriangle::area).sum();
        assert!((area - 12.0).abs() < 1e-9);
        assert_eq!(out[0].section_id(), 0);
        assert_eq!(out[2].section_id(), 1);
    }

    #[test]
    fn test_inactive_section_breaks_trail() {
        let mut trail = CoverageTrailBuilder::new();
        let on = [SectionState::Auto];
        let off = [SectionState::Off];

        trail.advance(&boundaries(0.0, 1, 3.0), &on);
        assert!(trail.advance(&boundaries(1.0, 1, 3.0), &off).is_empty());
        // Back on: primes again rather than bridging the gap
        assert!(trail.advance(&boundaries(5.0, 1, 3.0), &on).is_empty());
        let out = trail.advance(&boundaries(6.0, 1, 3.0), &on);
        let area: f64 = out.iter().map(CoverageTriangle::area).sum();
        assert!((area - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_small_steps_accumulate() {
        let mut trail = CoverageTrailBuilder::with_min_step(0.5);
        let on = [SectionState::Auto];

        trail.advance(&boundaries(0.0, 1, 2.0), &on);
        assert!(trail.advance(&boundaries(0.2, 1, 2.0), &on).is_empty());
        assert!(trail.advance(&boundaries(0.4, 1, 2.0), &on).is_empty());
        let out = trail.advance(&boundaries(0.6, 1, 2.0), &on);
        let area: f64 = out.iter().map(CoverageTriangle::area).sum();
        assert!((area - 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_jump_restarts_trail() {
        let mut trail = CoverageTrailBuilder::new().with_max_step(5.0);
        let on = [SectionState::Auto; 2];

        trail.advance(&boundaries(0.0, 2, 3.0), &on);
        assert!(trail.advance(&boundaries(5_000.0, 2, 3.0), &on).is_empty());

        // Strips continue from the post-jump edge
        let out = trail.advance(&boundaries(5_001.0, 2, 3.0), &on);
        assert_eq!(out.len(), 4);
        let area: f64 = out.iter().map(CoverageTriangle::area).sum();
        assert!((area - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_max_step_never_below_min_step() {
        let mut trail = CoverageTrailBuilder::with_min_step(1.0).with_max_step(0.1);
        let on = [SectionState::Auto];
        trail.advance(&boundaries(0.0, 1, 2.0), &on);
        assert_eq!(trail.advance(&boundaries(1.0, 1, 2.0), &on).len(), 2);
    }

    #[test]
    fn test_section_count_change_resets() {
        let mut trail = CoverageTrailBuilder::new();
        trail.advance(&boundaries(0.0, 2, 3.0), &[SectionState::Auto; 2]);
        let out = trail.advance(&boundaries(1.0, 3, 2.0), &[SectionState::Auto; 3]);
        assert!(out.is_empty());
    }

    #[test]
    fn test_missing_state_counts_as_off() {
        let mut trail = CoverageTrailBuilder::new();
        trail.advance(&boundaries(0.0, 2, 3.0), &[SectionState::Auto]);
        let out = trail.advance(&boundaries(1.0, 2, 3.0), &[SectionState::Auto]);
        assert!(out.iter().all(|t| t.section_id() == 0));
        assert_eq!(out.len(), 2);
    }
}
