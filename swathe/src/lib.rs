//! Swathe - section control for precision-agriculture guidance
//!
//! This library decides, many times per second, which implement sections
//! (boom segments, planter rows) should apply product, and keeps an in-memory
//! model of the ground actually covered so overlap and skip statistics can be
//! reported.
//!
//! # Architecture
//!
//! ```text
//! PositionUpdateService ──┐
//! VehicleKinematics ──────┤
//! AnalogSwitchStateService┼──► SectionControlService ──► SectionStateSink (hardware)
//! SectionSpeedService ────┘            │
//!                                      ▼
//!                      SectionGeometryService ──► CoverageMapService
//! ```
//!
//! [`control_loop::ControlCycle`] wires one full cycle together and
//! [`control_loop::ControlLoop`] runs it on a dedicated thread.

pub mod config;
pub mod control_loop;
pub mod coord;
pub mod coverage;
pub mod logging;
pub mod sections;
pub mod switches;
pub mod vehicle;

/// Library version, taken from the crate manifest.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
