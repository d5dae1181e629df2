//! Per-section ground speed.
//!
//! While turning, the implement rotates about a point `turning_radius` meters
//! to the side of the vehicle. A section at lateral offset `x` travels on a
//! circle of radius `turning_radius + x`, so its ground speed scales with the
//! ratio of that radius to the vehicle's own:
//!
//! ```text
//! section_speed = vehicle_speed * (turning_radius + x) / turning_radius
//! ```
//!
//! Offsets are positive to the left and a positive radius is a right turn,
//! so left sections run faster in a right turn and slower in a left one.
//! When a section lies at or beyond the center of rotation the ratio would
//! reach zero or flip sign; such sections are clamped to 0.

use std::sync::Arc;

use parking_lot::Mutex;

use super::configuration::SectionConfigurationService;
use super::error::SectionError;

/// Radii below this magnitude (meters) are treated as a pivot turn.
const PIVOT_RADIUS_EPSILON: f64 = 1e-6;

/// Last computed speeds, one per section.
#[derive(Debug, Default)]
struct SpeedSnapshot {
    speeds: Vec<f64>,
}

/// Converts vehicle speed and turning radius into per-section ground speed.
#[derive(Debug)]
pub struct SectionSpeedService {
    config: Arc<SectionConfigurationService>,
    snapshot: Mutex<SpeedSnapshot>,
}

impl SectionSpeedService {
    pub fn new(config: Arc<SectionConfigurationService>) -> Self {
        Self {
            config,
            snapshot: Mutex::new(SpeedSnapshot::default()),
        }
    }

    /// Compute and store the speed of every section.
    ///
    /// # Arguments
    ///
    /// * `vehicle_speed` - Speed of the vehicle reference point (m/s)
    /// * `turning_radius` - Signed radius in meters; positive = right turn.
    ///   Infinite values mean straight travel.
    /// * `heading` - Current heading (radians); the model is heading-independent
    ///   but the value is kept for tracing
    ///
    /// Returns the new snapshot.
    pub fn calculate_section_speeds(
        &self,
        vehicle_speed: f64,
        turning_radius: f64,
        heading: f64,
    ) -> Vec<f64> {
        let offsets = self.config.configuration().section_offsets();
        let speeds: Vec<f64> = offsets
            .iter()
            .map(|&offset| Self::speed_at_offset(vehicle_speed, turning_radius, offset))
            .collect();

        tracing::trace!(
            vehicle_speed,
            turning_radius,
            heading,
            sections = speeds.len(),
            "Section speeds calculated"
        );

        self.snapshot.lock().speeds = speeds.clone();
        speeds
    }

    /// Speed of one section from the last calculation.
    ///
    /// Before the first calculation every configured section reads 0.
    pub fn section_speed(&self, id: usize) -> Result<f64, SectionError> {
        let count = self.config.section_count();
        if id >= count {
            return Err(SectionError::InvalidSectionId { id, count });
        }
        Ok(self.snapshot.lock().speeds.get(id).copied().unwrap_or(0.0))
    }

    /// All section speeds from the last calculation.
    pub fn all_section_speeds(&self) -> Vec<f64> {
        self.snapshot.lock().speeds.clone()
    }

    /// Ground speed of a point at lateral `offset`.
    pub fn speed_at_offset(vehicle_speed: f64, turning_radius: f64, offset: f64) -> f64 {
        if !turning_radius.is_finite() {
            return vehicle_speed;
        }
        if turning_radius.abs() < PIVOT_RADIUS_EPSILON {
            // Spinning in place: the reference point is not moving along a circle
            return 0.0;
        }

        let ratio = (turning_radius + offset) / turning_radius;
        if ratio <= 0.0 {
            0.0
        } else {
            vehicle_speed * ratio
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sections::SectionConfiguration;
    use proptest::prelude::*;

    const EPS: f64 = 1e-9;

    fn speed_service(count: usize, width: f64) -> SectionSpeedService {
        let config = SectionConfiguration::uniform(count, width).unwrap();
        SectionSpeedService::new(Arc::new(SectionConfigurationService::new(config)))
    }

    #[test]
    fn test_straight_travel_all_equal() {
        let service = speed_service(5, 3.0);
        let speeds = service.calculate_section_speeds(4.0, f64::INFINITY, 0.0);
        assert_eq!(speeds.len(), 5);
        assert!(speeds.iter().all(|s| (s - 4.0).abs() < EPS));
    }

    #[test]
    fn test_large_radius_approximates_straight() {
        let service = speed_service(5, 3.0);
        let speeds = service.calculate_section_speeds(4.0, 1.0e7, 0.0);
        assert!(speeds.iter().all(|s| (s - 4.0).abs() < 1e-5));
    }

    #[test]
    fn test_right_turn_outside_faster() {
        // 3 × 2.5 m, offsets +2.5 / 0 / -2.5, right turn radius 5 m
        let service = speed_service(3, 2.5);
        let speeds = service.calculate_section_speeds(5.0, 5.0, 0.0);

        assert!((speeds[0] - 7.5).abs() < EPS, "left section is outside");
        assert!((speeds[1] - 5.0).abs() < EPS);
        assert!((speeds[2] - 2.5).abs() < EPS, "right section is inside");
    }

    #[test]
    fn test_left_turn_mirrors_right_turn() {
        let service = speed_service(3, 2.5);
        let speeds = service.calculate_section_speeds(5.0, -5.0, 0.0);

        assert!((speeds[0] - 2.5).abs() < EPS);
        assert!((speeds[2] - 7.5).abs() < EPS);
    }

    #[test]
    fn test_tight_turn_clamps_inside_section_to_zero() {
        // Right turn tighter than the implement half-width
        let service = speed_service(3, 2.5);
        let speeds = service.calculate_section_speeds(5.0, 2.0, 0.0);

        assert!(speeds[0] > 5.0);
        assert_eq!(speeds[2], 0.0, "inside section past the pivot must clamp");
        assert!(speeds.iter().all(|s| *s >= 0.0));

        // Tight left turn clamps the leftmost section instead
        let speeds = service.calculate_section_speeds(5.0, -2.0, 0.0);
        assert_eq!(speeds[0], 0.0);
    }

    #[test]
    fn test_section_exactly_on_pivot_is_zero() {
        assert_eq!(SectionSpeedService::speed_at_offset(5.0, 2.5, -2.5), 0.0);
    }

    #[test]
    fn test_pivot_turn_is_zero() {
        let service = speed_service(3, 2.5);
        let speeds = service.calculate_section_speeds(3.0, 0.0, 0.0);
        assert!(speeds.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_snapshot_accessors() {
        let service = speed_service(3, 2.5);
        assert_eq!(service.section_speed(1).unwrap(), 0.0);
        assert!(service.all_section_speeds().is_empty());

        service.calculate_section_speeds(5.0, 5.0, 0.0);
        assert!((service.section_speed(0).unwrap() - 7.5).abs() < EPS);
        assert_eq!(service.all_section_speeds().len(), 3);
    }

    #[test]
    fn test_invalid_id_is_range_error() {
        let service = speed_service(3, 2.5);
        assert_eq!(
            service.section_speed(3),
            Err(SectionError::InvalidSectionId { id: 3, count: 3 })
        );
    }

    proptest! {
        /// Section speeds are never negative for forward travel.
        #[test]
        fn prop_speeds_never_negative(
            speed in 0.0f64..20.0,
            radius in -50.0f64..50.0,
            count in 1usize..=31,
            width in 0.1f64..5.0
        ) {
            let service = speed_service(count, width);
            let speeds = service.calculate_section_speeds(speed, radius, 0.0);
            prop_assert!(speeds.iter().all(|s| *s >= 0.0));
        }

        /// Average section speed equals vehicle speed when no section clamps.
        #[test]
        fn prop_symmetric_speeds_average_to_vehicle_speed(
            speed in 0.1f64..20.0,
            radius in 20.0f64..500.0,
            count in 1usize..=10
        ) {
            let service = speed_service(count, 1.0);
            let speeds = service.calculate_section_speeds(speed, radius, 0.0);
            let mean = speeds.iter().sum::<f64>() / speeds.len() as f64;
            prop_assert!((mean - speed).abs() < 1e-6);
        }
    }
}
