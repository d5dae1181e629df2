//! Error types for section configuration and section access.

use thiserror::Error;

use super::types::SectionState;

/// Validation errors raised when a section configuration value is out of range.
///
/// Values are never clamped: the offending assignment is rejected and the
/// configuration keeps its previous, valid contents.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    /// Section count outside the supported range.
    #[error("Invalid section count: {count} (expected {min}..={max})")]
    InvalidSectionCount { count: usize, min: usize, max: usize },

    /// A section width outside the supported range.
    #[error("Invalid width for section {index}: {width} m (expected {min}..={max} m)")]
    InvalidSectionWidth {
        index: usize,
        width: f64,
        min: f64,
        max: f64,
    },

    /// Width assignment for a section that does not exist.
    #[error("Cannot set width of section {id}: only {count} sections configured")]
    UnknownSection { id: usize, count: usize },

    /// Declared section count disagrees with the number of widths supplied.
    #[error("Section count {count} does not match {widths} configured widths")]
    WidthCountMismatch { count: usize, widths: usize },

    /// Turn-on or turn-off delay outside the supported range.
    #[error("Invalid {name}: {seconds} s (expected 0..={max} s)")]
    InvalidDelay {
        name: &'static str,
        seconds: f64,
        max: f64,
    },

    /// Overlap tolerance outside the supported range.
    #[error("Invalid overlap tolerance: {0} m")]
    InvalidOverlapTolerance(f64),

    /// Look-ahead distance outside the supported range.
    #[error("Invalid look-ahead distance: {0} m")]
    InvalidLookAhead(f64),

    /// Minimum speed outside the supported range.
    #[error("Invalid minimum speed: {0} m/s")]
    InvalidMinimumSpeed(f64),
}

/// Errors raised by section services at call time.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SectionError {
    /// Section id is not part of the current configuration.
    #[error("Section id {id} out of range (section count {count})")]
    InvalidSectionId { id: usize, count: usize },

    /// Manual overrides accept `ManualOn`, `ManualOff` or `Auto` (release).
    #[error("{0} is not a valid manual override request")]
    InvalidOverrideState(SectionState),

    /// Section width passed to geometry is negative or not finite.
    #[error("Section width must be finite and not negative: {0} m")]
    NegativeWidth(f64),

    /// Section offset passed to geometry is NaN or infinite.
    #[error("Section offset is not finite: {0} m")]
    NonFiniteOffset(f64),

    /// Vehicle position contains NaN or infinite coordinates.
    #[error("Vehicle position is not finite")]
    NonFinitePosition,

    /// Vehicle heading is NaN or infinite.
    #[error("Vehicle heading is not finite: {0} rad")]
    NonFiniteHeading(f64),
}
