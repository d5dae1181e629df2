//! Section configuration and its single-writer service.
//!
//! `SectionConfiguration` describes the implement: how many sections it has,
//! how wide each one is, and the timing and tolerance parameters the control
//! state machine uses. Every value is validated at the point of assignment,
//! so an instance can never hold a partially-valid configuration.
//!
//! # Layout
//!
//! Sections are laid out contiguously, in index order from left to right,
//! symmetric about the vehicle centerline. Lateral offsets are signed with
//! **positive to the left** of travel:
//!
//! ```text
//!        left (+)                          right (-)
//!   |  section 0  |  section 1  |  section 2  |
//!   +3.75       +1.25    0    -1.25         -3.75     (3 × 2.5 m)
//! ```
//!
//! # Ownership
//!
//! `SectionConfigurationService` is the only writer. Dependents hold an
//! `Arc` to the service and pull the current snapshot when they need it;
//! a `ConfigurationChanged` event and a generation counter tell them when
//! the snapshot was replaced.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;

use super::error::{ConfigError, SectionError};

// ─────────────────────────────────────────────────────────────────────────────
// Limits and defaults
// ─────────────────────────────────────────────────────────────────────────────

/// Minimum number of sections.
pub const MIN_SECTION_COUNT: usize = 1;

/// Maximum number of sections (limited by the machine-module bitfield).
pub const MAX_SECTION_COUNT: usize = 31;

/// Minimum width of a single section (meters).
pub const MIN_SECTION_WIDTH: f64 = 0.1;

/// Maximum width of a single section (meters).
pub const MAX_SECTION_WIDTH: f64 = 20.0;

/// Maximum turn-on/turn-off delay (seconds).
pub const MAX_DELAY_SECS: f64 = 15.0;

/// Maximum overlap tolerance (meters).
pub const MAX_OVERLAP_TOLERANCE: f64 = 5.0;

/// Maximum look-ahead distance (meters).
pub const MAX_LOOK_AHEAD_DISTANCE: f64 = 50.0;

/// Maximum configurable minimum speed (m/s).
pub const MAX_MINIMUM_SPEED: f64 = 10.0;

const DEFAULT_SECTION_COUNT: usize = 5;
const DEFAULT_SECTION_WIDTH: f64 = 3.0;
const DEFAULT_TURN_ON_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_TURN_OFF_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_OVERLAP_TOLERANCE: f64 = 0.1;
const DEFAULT_LOOK_AHEAD_DISTANCE: f64 = 1.0;
const DEFAULT_MINIMUM_SPEED: f64 = 0.5;

/// Capacity of the configuration-changed broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 16;

// ─────────────────────────────────────────────────────────────────────────────
// Validation helpers
// ─────────────────────────────────────────────────────────────────────────────

fn validate_count(count: usize) -> Result<(), ConfigError> {
    if !(MIN_SECTION_COUNT..=MAX_SECTION_COUNT).contains(&count) {
        return Err(ConfigError::InvalidSectionCount {
            count,
            min: MIN_SECTION_COUNT,
            max: MAX_SECTION_COUNT,
        });
    }
    Ok(())
}

fn validate_widths(widths: &[f64]) -> Result<(), ConfigError> {
    validate_count(widths.len())?;
    for (index, &width) in widths.iter().enumerate() {
        // NaN fails the range check
        if !(MIN_SECTION_WIDTH..=MAX_SECTION_WIDTH).contains(&width) {
            return Err(ConfigError::InvalidSectionWidth {
                index,
                width,
                min: MIN_SECTION_WIDTH,
                max: MAX_SECTION_WIDTH,
            });
        }
    }
    Ok(())
}

fn validate_delay(name: &'static str, delay: Duration) -> Result<(), ConfigError> {
    let seconds = delay.as_secs_f64();
    if seconds > MAX_DELAY_SECS {
        return Err(ConfigError::InvalidDelay {
            name,
            seconds,
            max: MAX_DELAY_SECS,
        });
    }
    Ok(())
}

fn validate_range(value: f64, max: f64) -> bool {
    (0.0..=max).contains(&value)
}

/// Convert a delay given in seconds into a validated `Duration`.
///
/// # Errors
///
/// Negative, non-finite or too-large values return `ConfigError::InvalidDelay`.
pub fn delay_from_secs(name: &'static str, seconds: f64) -> Result<Duration, ConfigError> {
    if !(0.0..=MAX_DELAY_SECS).contains(&seconds) {
        return Err(ConfigError::InvalidDelay {
            name,
            seconds,
            max: MAX_DELAY_SECS,
        });
    }
    Ok(Duration::from_secs_f64(seconds))
}

// ─────────────────────────────────────────────────────────────────────────────
// SectionConfiguration
// ─────────────────────────────────────────────────────────────────────────────

/// Validated description of the implement's sections.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionConfiguration {
    section_widths: Vec<f64>,
    turn_on_delay: Duration,
    turn_off_delay: Duration,
    overlap_tolerance: f64,
    look_ahead_distance: f64,
    minimum_speed: f64,
}

impl Default for SectionConfiguration {
    fn default() -> Self {
        Self {
            section_widths: vec![DEFAULT_SECTION_WIDTH; DEFAULT_SECTION_COUNT],
            turn_on_delay: DEFAULT_TURN_ON_DELAY,
            turn_off_delay: DEFAULT_TURN_OFF_DELAY,
            overlap_tolerance: DEFAULT_OVERLAP_TOLERANCE,
            look_ahead_distance: DEFAULT_LOOK_AHEAD_DISTANCE,
            minimum_speed: DEFAULT_MINIMUM_SPEED,
        }
    }
}

impl SectionConfiguration {
    /// Create a builder starting from the defaults.
    pub fn builder() -> SectionConfigurationBuilder {
        SectionConfigurationBuilder::default()
    }

    /// Configuration with `count` sections of identical `width`, other values default.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the count or width is out of range.
    pub fn uniform(count: usize, width: f64) -> Result<Self, ConfigError> {
        validate_count(count)?;
        Self::builder().section_widths(vec![width; count]).build()
    }

    /// Check every value against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_widths(&self.section_widths)?;
        validate_delay("turn-on delay", self.turn_on_delay)?;
        validate_delay("turn-off delay", self.turn_off_delay)?;
        if !validate_range(self.overlap_tolerance, MAX_OVERLAP_TOLERANCE) {
            return Err(ConfigError::InvalidOverlapTolerance(self.overlap_tolerance));
        }
        if !validate_range(self.look_ahead_distance, MAX_LOOK_AHEAD_DISTANCE) {
            return Err(ConfigError::InvalidLookAhead(self.look_ahead_distance));
        }
        if !validate_range(self.minimum_speed, MAX_MINIMUM_SPEED) {
            return Err(ConfigError::InvalidMinimumSpeed(self.minimum_speed));
        }
        Ok(())
    }

    /// Number of sections.
    pub fn section_count(&self) -> usize {
        self.section_widths.len()
    }

    /// Width of every section, in index order.
    pub fn section_widths(&self) -> &[f64] {
        &self.section_widths
    }

    /// Sum of all section widths.
    pub fn total_width(&self) -> f64 {
        self.section_widths.iter().sum()
    }

    /// Width of one section.
    pub fn section_width(&self, id: usize) -> Result<f64, SectionError> {
        self.section_widths
            .get(id)
            .copied()
            .ok_or(SectionError::InvalidSectionId {
                id,
                count: self.section_count(),
            })
    }

    /// Signed lateral offset of a section's center from the centerline (positive = left).
    pub fn section_offset(&self, id: usize) -> Result<f64, SectionError> {
        let width = self.section_width(id)?;
        let preceding: f64 = self.section_widths[..id].iter().sum();
        Ok(self.total_width() / 2.0 - preceding - width / 2.0)
    }

    /// Offsets of all sections, in index order.
    pub fn section_offsets(&self) -> Vec<f64> {
        let mut left_edge = self.total_width() / 2.0;
        self.section_widths
            .iter()
            .map(|w| {
                let center = left_edge - w / 2.0;
                left_edge -= w;
                center
            })
            .collect()
    }

    pub fn turn_on_delay(&self) -> Duration {
        self.turn_on_delay
    }

    pub fn turn_off_delay(&self) -> Duration {
        self.turn_off_delay
    }

    pub fn overlap_tolerance(&self) -> f64 {
        self.overlap_tolerance
    }

    pub fn look_ahead_distance(&self) -> f64 {
        self.look_ahead_distance
    }

    pub fn minimum_speed(&self) -> f64 {
        self.minimum_speed
    }

    /// Replace all section widths (and so the section count).
    pub fn set_section_widths(&mut self, widths: Vec<f64>) -> Result<(), ConfigError> {
        validate_widths(&widths)?;
        self.section_widths = widths;
        Ok(())
    }

    /// Change a single section's width.
    pub fn set_section_width(&mut self, id: usize, width: f64) -> Result<(), ConfigError> {
        let count = self.section_count();
        if id >= count {
            return Err(ConfigError::UnknownSection { id, count });
        }
        let mut widths = self.section_widths.clone();
        widths[id] = width;
        self.set_section_widths(widths)
    }

    pub fn set_turn_on_delay(&mut self, delay: Duration) -> Result<(), ConfigError> {
        validate_delay("turn-on delay", delay)?;
        self.turn_on_delay = delay;
        Ok(())
    }

    pub fn set_turn_off_delay(&mut self, delay: Duration) -> Result<(), ConfigError> {
        validate_delay("turn-off delay", delay)?;
        self.turn_off_delay = delay;
        Ok(())
    }

    pub fn set_overlap_tolerance(&mut self, meters: f64) -> Result<(), ConfigError> {
        if !validate_range(meters, MAX_OVERLAP_TOLERANCE) {
            return Err(ConfigError::InvalidOverlapTolerance(meters));
        }
        self.overlap_tolerance = meters;
        Ok(())
    }

    pub fn set_look_ahead_distance(&mut self, meters: f64) -> Result<(), ConfigError> {
        if !validate_range(meters, MAX_LOOK_AHEAD_DISTANCE) {
            return Err(ConfigError::InvalidLookAhead(meters));
        }
        self.look_ahead_distance = meters;
        Ok(())
    }

    pub fn set_minimum_speed(&mut self, speed: f64) -> Result<(), ConfigError> {
        if !validate_range(speed, MAX_MINIMUM_SPEED) {
            return Err(ConfigError::InvalidMinimumSpeed(speed));
        }
        self.minimum_speed = speed;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for [`SectionConfiguration`]; validation happens in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct SectionConfigurationBuilder {
    config: SectionConfiguration,
}

impl Default for SectionConfigurationBuilder {
    fn default() -> Self {
        Self {
            config: SectionConfiguration::default(),
        }
    }
}

impl SectionConfigurationBuilder {
    pub fn section_widths(mut self, widths: Vec<f64>) -> Self {
        self.config.section_widths = widths;
        self
    }

    pub fn turn_on_delay(mut self, delay: Duration) -> Self {
        self.config.turn_on_delay = delay;
        self
    }

    pub fn turn_off_delay(mut self, delay: Duration) -> Self {
        self.config.turn_off_delay = delay;
        self
    }

    pub fn overlap_tolerance(mut self, meters: f64) -> Self {
        self.config.overlap_tolerance = meters;
        self
    }

    pub fn look_ahead_distance(mut self, meters: f64) -> Self {
        self.config.look_ahead_distance = meters;
        self
    }

    pub fn minimum_speed(mut self, speed: f64) -> Self {
        self.config.minimum_speed = speed;
        self
    }

    /// Validate and produce the configuration.
    pub fn build(self) -> Result<SectionConfiguration, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration service
// ─────────────────────────────────────────────────────────────────────────────

/// Published whenever a new configuration replaces the current one.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationChanged {
    pub previous_section_count: usize,
    pub section_count: usize,
    pub total_width: f64,
    pub generation: u64,
}

#[derive(Debug)]
struct ConfigurationInner {
    current: Arc<SectionConfiguration>,
    generation: u64,
}

/// Single owner of the active [`SectionConfiguration`].
pub struct SectionConfigurationService {
    inner: Mutex<ConfigurationInner>,
    events: broadcast::Sender<ConfigurationChanged>,
}

impl std::fmt::Debug for SectionConfigurationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("SectionConfigurationService")
            .field("section_count", &inner.current.section_count())
            .field("generation", &inner.generation)
            .finish()
    }
}

impl Default for SectionConfigurationService {
    fn default() -> Self {
        Self::new(SectionConfiguration::default())
    }
}

impl SectionConfigurationService {
    /// Create a service holding an already-validated configuration.
    pub fn new(config: SectionConfiguration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(ConfigurationInner {
                current: Arc::new(config),
                generation: 0,
            }),
            events,
        }
    }

    /// Validate and replace the current configuration.
    ///
    /// On success, bumps the generation and publishes `ConfigurationChanged`.
    /// On failure, the previous configuration stays in place.
    pub fn load_configuration(&self, config: SectionConfiguration) -> Result<(), ConfigError> {
        if let Err(e) = config.validate() {
            tracing::warn!(error = %e, "Rejected section configuration");
            return Err(e);
        }

        let event = {
            let mut inner = self.inner.lock();
            let previous_section_count = inner.current.section_count();
            inner.current = Arc::new(config);
            inner.generation += 1;
            ConfigurationChanged {
                previous_section_count,
                section_count: inner.current.section_count(),
                total_width: inner.current.total_width(),
                generation: inner.generation,
            }
        };

        tracing::info!(
            sections = event.section_count,
            total_width = format!("{:.2} m", event.total_width),
            generation = event.generation,
            "Section configuration loaded"
        );
        let _ = self.events.send(event);
        Ok(())
    }

    /// Snapshot of the current configuration.
    pub fn configuration(&self) -> Arc<SectionConfiguration> {
        Arc::clone(&self.inner.lock().current)
    }

    /// Number of successful loads since construction.
    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Snapshot together with its generation, read atomically.
    pub fn configuration_with_generation(&self) -> (Arc<SectionConfiguration>, u64) {
        let inner = self.inner.lock();
        (Arc::clone(&inner.current), inner.generation)
    }

    pub fn section_count(&self) -> usize {
        self.configuration().section_count()
    }

    pub fn section_width(&self, id: usize) -> Result<f64, SectionError> {
        self.configuration().section_width(id)
    }

    pub fn total_width(&self) -> f64 {
        self.configuration().total_width()
    }

    pub fn section_offset(&self, id: usize) -> Result<f64, SectionError> {
        self.configuration().section_offset(id)
    }

    /// Subscribe to configuration changes.
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigurationChanged> {
        self.events.subscribe()
    }
}
