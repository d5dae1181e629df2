//! Section configuration, geometry, speed and control.
//!
//! # Module Structure
//!
//! ```text
//! sections/
//! ├── mod.rs            # This file - module exports
//! ├── configuration.rs  # Validated implement description + single-writer service
//! ├── geometry.rs       # Section edge points from vehicle pose
//! ├── speed.rs          # Per-section ground speed in turns
//! ├── control.rs        # Debounced section state machine
//! ├── types.rs          # SectionState, ChangeType, events
//! └── error.rs          # ConfigError / SectionError
//! ```

mod configuration;
mod control;
mod error;
mod geometry;
mod speed;
mod types;

pub use configuration::{
    delay_from_secs, ConfigurationChanged, SectionConfiguration, SectionConfigurationBuilder,
    SectionConfigurationService, MAX_DELAY_SECS, MAX_LOOK_AHEAD_DISTANCE, MAX_MINIMUM_SPEED,
    MAX_OVERLAP_TOLERANCE, MAX_SECTION_COUNT, MAX_SECTION_WIDTH, MIN_SECTION_COUNT,
    MIN_SECTION_WIDTH,
};
pub use control::{Section, SectionControlService};
pub use error::{ConfigError, SectionError};
pub use geometry::{SectionBoundary, SectionGeometryService};
pub use speed::SectionSpeedService;
pub use types::{ChangeType, SectionState, SectionStateChanged, WIRE_AUTO, WIRE_OFF, WIRE_ON};
