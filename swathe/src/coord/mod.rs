//! Planar coordinate types
//!
//! Section control works in a local metric frame: UTM easting/northing in
//! meters, with heading measured clockwise from grid north in radians. The
//! zone, hemisphere and altitude of a fix are carried through unchanged so
//! that derived points can be mapped back by the caller.

use std::f64::consts::TAU;
use std::fmt;

use thiserror::Error;

/// Lowest valid UTM zone number.
pub const MIN_UTM_ZONE: u8 = 1;

/// Highest valid UTM zone number.
pub const MAX_UTM_ZONE: u8 = 60;

/// Errors that can occur while building coordinates.
#[derive(Debug, Error, PartialEq)]
pub enum CoordError {
    /// UTM zone outside 1..=60.
    #[error("Invalid UTM zone: {0} (expected {MIN_UTM_ZONE}..={MAX_UTM_ZONE})")]
    InvalidZone(u8),

    /// Easting, northing or altitude is NaN or infinite.
    #[error("Non-finite coordinate: easting={easting}, northing={northing}")]
    NonFinite { easting: f64, northing: f64 },
}

/// Hemisphere of a UTM fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Hemisphere {
    #[default]
    North,
    South,
}

impl fmt::Display for Hemisphere {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hemisphere::North => write!(f, "N"),
            Hemisphere::South => write!(f, "S"),
        }
    }
}

/// A 2-D point in the local metric frame (meters).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point2D {
    pub easting: f64,
    pub northing: f64,
}

impl Point2D {
    /// Create a new point.
    #[inline]
    pub const fn new(easting: f64, northing: f64) -> Self {
        Self { easting, northing }
    }

    /// Euclidean distance to another point.
    #[inline]
    pub fn distance_to(&self, other: &Point2D) -> f64 {
        let de = other.easting - self.easting;
        let dn = other.northing - self.northing;
        (de * de + dn * dn).sqrt()
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.easting.is_finite() && self.northing.is_finite()
    }

    /// Translate this point by `distance` meters along a unit direction.
    #[inline]
    pub fn offset_by(&self, direction: (f64, f64), distance: f64) -> Point2D {
        Point2D {
            easting: self.easting + direction.0 * distance,
            northing: self.northing + direction.1 * distance,
        }
    }
}

/// A UTM position as delivered by the position-fusion collaborator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UtmPosition {
    /// Easting in meters.
    pub easting: f64,
    /// Northing in meters.
    pub northing: f64,
    /// Altitude in meters above the ellipsoid.
    pub altitude: f64,
    /// UTM zone number (1-60).
    pub zone: u8,
    /// Hemisphere of the zone.
    pub hemisphere: Hemisphere,
}

impl UtmPosition {
    /// Create a validated UTM position.
    ///
    /// # Errors
    ///
    /// Returns `CoordError` if the zone is out of range or a coordinate is not finite.
    pub fn new(
        easting: f64,
        northing: f64,
        altitude: f64,
        zone: u8,
        hemisphere: Hemisphere,
    ) -> Result<Self, CoordError> {
        if !(MIN_UTM_ZONE..=MAX_UTM_ZONE).contains(&zone) {
            return Err(CoordError::InvalidZone(zone));
        }
        let position = Self {
            easting,
            northing,
            altitude,
            zone,
            hemisphere,
        };
        if !position.is_finite() {
            return Err(CoordError::NonFinite { easting, northing });
        }
        Ok(position)
    }

    /// Position in a local frame where only easting/northing matter.
    ///
    /// Zone 32 north is used as a neutral default; handy in tests and simulators.
    pub fn local(easting: f64, northing: f64) -> Self {
        Self {
            easting,
            northing,
            altitude: 0.0,
            zone: 32,
            hemisphere: Hemisphere::North,
        }
    }

    /// Whether easting, northing and altitude are all finite.
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.easting.is_finite() && self.northing.is_finite() && self.altitude.is_finite()
    }

    /// The planar part of this position.
    #[inline]
    pub fn point(&self) -> Point2D {
        Point2D::new(self.easting, self.northing)
    }

    /// A new position at `point`, keeping zone, hemisphere and altitude.
    #[inline]
    pub fn with_point(&self, point: Point2D) -> Self {
        Self {
            easting: point.easting,
            northing: point.northing,
            ..*self
        }
    }
}

impl fmt::Display for UtmPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{} {:.2}E {:.2}N",
            self.zone, self.hemisphere, self.easting, self.northing
        )
    }
}

/// Unit vector of travel for a heading (radians, clockwise from north).
///
/// Returned as (east, north).
#[inline]
pub fn heading_vector(heading: f64) -> (f64, f64) {
    (heading.sin(), heading.cos())
}

/// Unit vector pointing to the left of travel for a heading.
///
/// This is the heading vector rotated 90° counter-clockwise.
#[inline]
pub fn left_perpendicular(heading: f64) -> (f64, f64) {
    (-heading.cos(), heading.sin())
}

/// Normalize a heading to the range [0, 2π).
pub fn normalize_heading(heading: f64) -> f64 {
    ((heading % TAU) + TAU) % TAU
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    const EPS: f64 = 1e-9;

    #[test]
    fn test_utm_position_rejects_invalid_zone() {
        let result = UtmPosition::new(500_000.0, 5_000_000.0, 0.0, 0, Hemisphere::North);
        assert_eq!(result.unwrap_err(), CoordError::InvalidZone(0));

        let result = UtmPosition::new(500_000.0, 5_000_000.0, 0.0, 61, Hemisphere::North);
        assert!(matches!(result, Err(CoordError::InvalidZone(61))));
    }

    #[test]
    fn test_utm_position_rejects_nan() {
        let result = UtmPosition::new(f64::NAN, 5_000_000.0, 0.0, 32, Hemisphere::North);
        assert!(matches!(result, Err(CoordError::NonFinite { .. })));
    }

    #[test]
    fn test_with_point_preserves_metadata() {
        let pos = UtmPosition::new(500_000.0, 6_000_000.0, 120.5, 33, Hemisphere::South).unwrap();
        let moved = pos.with_point(Point2D::new(1.0, 2.0));

        assert_eq!(moved.easting, 1.0);
        assert_eq!(moved.northing, 2.0);
        assert_eq!(moved.altitude, 120.5);
        assert_eq!(moved.zone, 33);
        assert_eq!(moved.hemisphere, Hemisphere::South);
    }

    #[test]
    fn test_heading_vector_north_and_east() {
        let (e, n) = heading_vector(0.0);
        assert!(e.abs() < EPS && (n - 1.0).abs() < EPS);

        let (e, n) = heading_vector(FRAC_PI_2);
        assert!((e - 1.0).abs() < EPS && n.abs() < EPS);
    }

    #[test]
    fn test_left_perpendicular_points_west_when_heading_north() {
        let (e, n) = left_perpendicular(0.0);
        assert!((e + 1.0).abs() < EPS);
        assert!(n.abs() < EPS);

        // Heading east: left is north
        let (e, n) = left_perpendicular(FRAC_PI_2);
        assert!(e.abs() < EPS);
        assert!((n - 1.0).abs() < EPS);
    }

    #[test]
    fn test_normalize_heading() {
        assert!((normalize_heading(0.0)).abs() < EPS);
        assert!((normalize_heading(TAU)).abs() < EPS);
        assert!((normalize_heading(-FRAC_PI_2) - 3.0 * FRAC_PI_2).abs() < EPS);
        assert!((normalize_heading(3.0 * PI) - PI).abs() < EPS);
    }

    #[test]
    fn test_distance_and_offset() {
        let a = Point2D::new(0.0, 0.0);
        let b = a.offset_by((0.6, 0.8), 10.0);
        assert!((b.easting - 6.0).abs() < EPS);
        assert!((b.northing - 8.0).abs() < EPS);
        assert!((a.distance_to(&b) - 10.0).abs() < EPS);
    }
}
