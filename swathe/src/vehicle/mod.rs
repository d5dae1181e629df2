//! Collaborator contracts consumed by section control.
//!
//! Position fusion, vehicle kinematics and the machine-module link live
//! outside this crate. Section control only sees them through these traits,
//! shared as `Arc<dyn …>` between the control loop and other readers.

use std::sync::Arc;

use crate::coord::UtmPosition;

/// Source of fused position, heading and speed.
pub trait PositionUpdateService: Send + Sync {
    /// Latest fused position, or `None` before the first valid fix.
    fn current_position(&self) -> Option<UtmPosition>;

    /// Heading in radians, clockwise from grid north.
    fn current_heading(&self) -> f64;

    /// Ground speed of the vehicle reference point in m/s.
    fn current_speed(&self) -> f64;

    /// Whether the vehicle is currently reversing.
    fn is_reversing(&self) -> bool;
}

/// Source of the vehicle's instantaneous turning radius.
pub trait VehicleKinematicsService: Send + Sync {
    /// Signed turning radius in meters (positive = right turn).
    ///
    /// Straight travel is reported as `f64::INFINITY` or a very large magnitude.
    fn turning_radius(&self) -> f64;
}

/// Receiver of per-section wire states after each control cycle.
///
/// Values follow the machine-module encoding: 0 = off, 1 = on, 2 = auto.
pub trait SectionStateSink: Send + Sync {
    fn send_section_states(&self, states: &[u8]);
}

/// Shared position source.
pub type SharedPositionService = Arc<dyn PositionUpdateService>;

/// Shared kinematics source.
pub type SharedKinematicsService = Arc<dyn VehicleKinematicsService>;

/// Shared wire-state receiver.
pub type SharedSectionStateSink = Arc<dyn SectionStateSink>;

/// Kinematics source for a vehicle that never turns.
#[derive(Debug, Clone, Copy, Default)]
pub struct StraightLineKinematics;

impl VehicleKinematicsService for StraightLineKinematics {
    fn turning_radius(&self) -> f64 {
        f64::INFINITY
    }
}

/// Sink that drops every update, for setups without a machine module.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSectionStateSink;

impl SectionStateSink for NullSectionStateSink {
    fn send_section_states(&self, _states: &[u8]) {}
}
