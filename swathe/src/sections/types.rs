//! Section state types and change events.

use std::fmt;
use std::time::Instant;

use serde::Serialize;

/// Wire value sent to the machine module for a section that is off.
pub const WIRE_OFF: u8 = 0;

/// Wire value for a section forced on by the operator.
pub const WIRE_ON: u8 = 1;

/// Wire value for a section under automatic control that is applying.
pub const WIRE_AUTO: u8 = 2;

/// Control state of a single section.
///
/// `Off` and `Auto` are the outcomes of automatic evaluation. `ManualOn` and
/// `ManualOff` are forced by the operator and suspend automatic evaluation
/// until the section is released back to `Auto`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum SectionState {
    #[default]
    Off,
    Auto,
    ManualOn,
    ManualOff,
}

impl SectionState {
    /// Human-readable name for logging/UI.
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionState::Off => "Off",
            SectionState::Auto => "Auto",
            SectionState::ManualOn => "ManualOn",
            SectionState::ManualOff => "ManualOff",
        }
    }

    /// Value sent to hardware: 0 = off, 1 = on, 2 = auto.
    pub fn wire_value(&self) -> u8 {
        match self {
            SectionState::Off | SectionState::ManualOff => WIRE_OFF,
            SectionState::ManualOn => WIRE_ON,
            SectionState::Auto => WIRE_AUTO,
        }
    }

    /// Whether a section in this state is applying product.
    pub fn is_applying(&self) -> bool {
        matches!(self, SectionState::Auto | SectionState::ManualOn)
    }

    /// Whether this state is an operator override.
    pub fn is_manual(&self) -> bool {
        matches!(self, SectionState::ManualOn | SectionState::ManualOff)
    }
}

impl fmt::Display for SectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a section changed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ChangeType {
    /// Debounced automatic transition after a turn-on/turn-off delay.
    Automatic,
    /// Safety stop (reversing or work switch off), bypassing delays.
    Immediate,
    /// Operator override set or released.
    Manual,
    /// Bulk reset of all sections.
    Reset,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeType::Automatic => "automatic",
            ChangeType::Immediate => "immediate",
            ChangeType::Manual => "manual",
            ChangeType::Reset => "reset",
        };
        write!(f, "{}", s)
    }
}

/// A single section transition, published once per actual state change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectionStateChanged {
    pub section_id: usize,
    pub old_state: SectionState,
    pub new_state: SectionState,
    pub change_type: ChangeType,
    /// Control-loop clock reading at which the transition was applied.
    pub timestamp: Instant,
}
