//! Section boundary geometry.
//!
//! Converts the vehicle pose into the left and right edge points of each
//! section, perpendicular to the direction of travel. These points feed the
//! coverage trail: consecutive boundary pairs of an applying section span the
//! ground it covered during one control cycle.

use std::sync::Arc;

use crate::coord::{heading_vector, left_perpendicular, UtmPosition};

use super::configuration::SectionConfigurationService;
use super::error::SectionError;

/// Left and right edge points of one section.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectionBoundary {
    pub section_id: usize,
    pub left: UtmPosition,
    pub right: UtmPosition,
}

/// Computes section edge points from the vehicle pose.
#[derive(Debug, Clone)]
pub struct SectionGeometryService {
    config: Arc<SectionConfigurationService>,
}

impl SectionGeometryService {
    pub fn new(config: Arc<SectionConfigurationService>) -> Self {
        Self { config }
    }

    /// Edge points of a single section.
    ///
    /// # Arguments
    ///
    /// * `section_id` - Section the points belong to (carried into the result)
    /// * `position` - Vehicle reference point
    /// * `heading` - Radians clockwise from north
    /// * `section_width` - Width in meters, must not be negative
    /// * `section_offset` - Lateral offset of the section center, positive = left
    ///
    /// Both points keep the zone, hemisphere and altitude of `position`.
    pub fn calculate_section_boundary_points(
        &self,
        section_id: usize,
        position: &UtmPosition,
        heading: f64,
        section_width: f64,
        section_offset: f64,
    ) -> Result<SectionBoundary, SectionError> {
        check_pose(position, heading)?;
        if !(section_width >= 0.0 && section_width.is_finite()) {
            return Err(SectionError::NegativeWidth(section_width));
        }
        if !section_offset.is_finite() {
            return Err(SectionError::NonFiniteOffset(section_offset));
        }

        let perpendicular = left_perpendicular(heading);
        let origin = position.point();
        let half = section_width / 2.0;

        Ok(SectionBoundary {
            section_id,
            left: position.with_point(origin.offset_by(perpendicular, section_offset + half)),
            right: position.with_point(origin.offset_by(perpendicular, section_offset - half)),
        })
    }

    /// Edge points of every configured section, in index order.
    ///
    /// Edges are walked from the leftmost outward edge, so each section's
    /// right point is the very same value as the next section's left point.
    pub fn calculate_all_section_boundary_points(
        &self,
        position: &UtmPosition,
        heading: f64,
    ) -> Result<Vec<SectionBoundary>, SectionError> {
        check_pose(position, heading)?;

        let config = self.config.configuration();
        let perpendicular = left_perpendicular(heading);
        let origin = position.point();

        let mut edge = config.total_width() / 2.0;
        let mut left = position.with_point(origin.offset_by(perpendicular, edge));
        let mut boundaries = Vec::with_capacity(config.section_count());

        for (section_id, width) in config.section_widths().iter().enumerate() {
            edge -= width;
            let right = position.with_point(origin.offset_by(perpendicular, edge));
            boundaries.push(SectionBoundary {
                section_id,
                left,
                right,
            });
            left = right;
        }

        Ok(boundaries)
    }

    /// Boundary points projected `look_ahead_distance` ahead of the vehicle.
    ///
    /// Used to anticipate where the sections will be by the time a relay
    /// actually switches.
    pub fn calculate_look_ahead_boundary_points(
        &self,
        position: &UtmPosition,
        heading: f64,
    ) -> Result<Vec<SectionBoundary>, SectionError> {
        check_pose(position, heading)?;
        let distance = self.config.configuration().look_ahead_distance();
        let ahead = position.with_point(position.point().offset_by(heading_vector(heading), distance));
        self.calculate_all_section_boundary_points(&ahead, heading)
    }
}

fn check_pose(position: &UtmPosition, heading: f64) -> Result<(), SectionError> {
    if !position.is_finite() {
        return Err(SectionError::NonFinitePosition);
    }
    if !heading.is_finite() {
        return Err(SectionError::NonFiniteHeading(heading));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::Hemisphere;
    use crate::sections::SectionConfiguration;
    use proptest::prelude::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    const EPS: f64 = 1e-9;

    fn geometry(count: usize, width: f64) -> SectionGeometryService {
        let config = SectionConfiguration::uniform(count, width).unwrap();
        SectionGeometryService::new(Arc::new(SectionConfigurationService::new(config)))
    }

    #[test]
    fn test_single_section_heading_north() {
        let geo = geometry(1, 4.0);
        let pos = UtmPosition::local(100.0, 200.0);

        let b = geo
            .calculate_section_boundary_points(0, &pos, 0.0, 4.0, 0.0)
            .unwrap();

        // Heading north: left is west
        assert!((b.left.easting - 98.0).abs() < EPS);
        assert!((b.left.northing - 200.0).abs() < EPS);
        assert!((b.right.easting - 102.0).abs() < EPS);
        assert!((b.right.northing - 200.0).abs() < EPS);
    }

    #[test]
    fn test_offset_section_heading_east() {
        let geo = geometry(1, 4.0);
        let pos = UtmPosition::local(0.0, 0.0);

        let b = geo
            .calculate_section_boundary_points(0, &pos, FRAC_PI_2, 2.0, 3.0)
            .unwrap();

        // Heading east: left is north
        assert!(b.left.easting.abs() < EPS);
        assert!((b.left.northing - 4.0).abs() < EPS);
        assert!((b.right.northing - 2.0).abs() < EPS);
    }

    #[test]
    fn test_metadata_preserved() {
        let geo = geometry(1, 4.0);
        let pos = UtmPosition::new(512_000.0, 6_100_000.0, 42.0, 17, Hemisphere::South).unwrap();

        let b = geo
            .calculate_section_boundary_points(0, &pos, 1.0, 3.0, 0.0)
            .unwrap();

        for p in [b.left, b.right] {
            assert_eq!(p.zone, 17);
            assert_eq!(p.hemisphere, Hemisphere::South);
            assert_eq!(p.altitude, 42.0);
        }
    }

    #[test]
    fn test_negative_width_rejected() {
        let geo = geometry(1, 4.0);
        let pos = UtmPosition::local(0.0, 0.0);
        assert_eq!(
            geo.calculate_section_boundary_points(0, &pos, 0.0, -1.0, 0.0),
            Err(SectionError::NegativeWidth(-1.0))
        );
    }

    #[test]
    fn test_non_finite_position_rejected() {
        let geo = geometry(1, 4.0);
        let pos = UtmPosition::local(f64::NAN, 0.0);
        assert_eq!(
            geo.calculate_section_boundary_points(0, &pos, 0.0, 1.0, 0.0),
            Err(SectionError::NonFinitePosition)
        );
        assert!(geo.calculate_all_section_boundary_points(&pos, 0.0).is_err());
    }

    #[test]
    fn test_non_finite_heading_rejected() {
        let geo = geometry(3, 2.0);
        let pos = UtmPosition::local(10.0, 10.0);

        for heading in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(
                geo.calculate_section_boundary_points(0, &pos, heading, 2.0, 0.0),
                Err(SectionError::NonFiniteHeading(_))
            ));
            assert!(matches!(
                geo.calculate_all_section_boundary_points(&pos, heading),
                Err(SectionError::NonFiniteHeading(_))
            ));
            assert!(matches!(
                geo.calculate_look_ahead_boundary_points(&pos, heading),
                Err(SectionError::NonFiniteHeading(_))
            ));
        }
    }

    #[test]
    fn test_non_finite_width_and_offset_rejected() {
        let geo = geometry(1, 4.0);
        let pos = UtmPosition::local(0.0, 0.0);
        assert!(matches!(
            geo.calculate_section_boundary_points(0, &pos, 0.0, f64::INFINITY, 0.0),
            Err(SectionError::NegativeWidth(_))
        ));
        assert!(matches!(
            geo.calculate_section_boundary_points(0, &pos, 0.0, 1.0, f64::NAN),
            Err(SectionError::NonFiniteOffset(_))
        ));
    }

    #[test]
    fn test_all_sections_contiguous() {
        let geo = geometry(5, 3.0);
        let pos = UtmPosition::local(1000.0, 1000.0);

        let boundaries = geo.calculate_all_section_boundary_points(&pos, 0.3).unwrap();
        assert_eq!(boundaries.len(), 5);

        for pair in boundaries.windows(2) {
            assert_eq!(pair[0].right, pair[1].left);
        }

        let outer = boundaries[0].left.point().distance_to(&boundaries[4].right.point());
        assert!((outer - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_all_sections_match_single_calculation() {
        let geo = geometry(3, 2.5);
        let config = SectionConfiguration::uniform(3, 2.5).unwrap();
        let pos = UtmPosition::local(10.0, -5.0);
        let heading = 2.2;

        let all = geo.calculate_all_section_boundary_points(&pos, heading).unwrap();
        for (id, boundary) in all.iter().enumerate() {
            let single = geo
                .calculate_section_boundary_points(
                    id,
                    &pos,
                    heading,
                    config.section_width(id).unwrap(),
                    config.section_offset(id).unwrap(),
                )
                .unwrap();
            assert!(single.left.point().distance_to(&boundary.left.point()) < 1e-9);
            assert!(single.right.point().distance_to(&boundary.right.point()) < 1e-9);
        }
    }

    #[test]
    fn test_look_ahead_projects_forward() {
        let mut config = SectionConfiguration::uniform(2, 2.0).unwrap();
        config.set_look_ahead_distance(5.0).unwrap();
        let geo = SectionGeometryService::new(Arc::new(SectionConfigurationService::new(config)));
        let pos = UtmPosition::local(0.0, 0.0);

        let ahead = geo.calculate_look_ahead_boundary_points(&pos, PI).unwrap();

        // Heading south: 5 m ahead is northing -5, left is east
        assert!((ahead[0].left.northing + 5.0).abs() < EPS);
        assert!((ahead[0].left.easting - 2.0).abs() < EPS);
        assert!((ahead[1].right.easting + 2.0).abs() < EPS);
    }

    proptest! {
        /// Adjacent sections share an edge point exactly for any heading.
        #[test]
        fn prop_adjacent_sections_share_edges(
            count in 1usize..=31,
            width in 0.1f64..20.0,
            heading in 0.0f64..6.3,
            easting in -1.0e6f64..1.0e6,
            northing in -1.0e6f64..1.0e6
        ) {
            let geo = geometry(count, width);
            let pos = UtmPosition::local(easting, northing);
            let boundaries = geo.calculate_all_section_boundary_points(&pos, heading).unwrap();

            prop_assert_eq!(boundaries.len(), count);
            for pair in boundaries.windows(2) {
                prop_assert_eq!(pair[0].right, pair[1].left);
            }
        }
    }
}
