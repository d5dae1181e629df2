//! Operator switch state.
//!
//! Tracks the discrete analog switches wired to the machine module (work,
//! steer and lock). The work switch is the one section control cares about:
//! when it is inactive, every automatically controlled section is turned off
//! immediately.

use std::fmt;

use parking_lot::Mutex;
use tokio::sync::broadcast;

/// Capacity of the switch-change broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// The operator switches tracked by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalogSwitchType {
    WorkSwitch,
    SteerSwitch,
    LockSwitch,
}

impl AnalogSwitchType {
    /// Every switch type, in a fixed order.
    pub const ALL: [AnalogSwitchType; 3] = [
        AnalogSwitchType::WorkSwitch,
        AnalogSwitchType::SteerSwitch,
        AnalogSwitchType::LockSwitch,
    ];

    fn index(self) -> usize {
        match self {
            AnalogSwitchType::WorkSwitch => 0,
            AnalogSwitchType::SteerSwitch => 1,
            AnalogSwitchType::LockSwitch => 2,
        }
    }
}

impl fmt::Display for AnalogSwitchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AnalogSwitchType::WorkSwitch => "work",
            AnalogSwitchType::SteerSwitch => "steer",
            AnalogSwitchType::LockSwitch => "lock",
        };
        write!(f, "{}", s)
    }
}

/// Position of a switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SwitchState {
    Active,
    #[default]
    Inactive,
}

impl SwitchState {
    pub fn is_active(&self) -> bool {
        *self == SwitchState::Active
    }
}

impl From<bool> for SwitchState {
    fn from(active: bool) -> Self {
        if active {
            SwitchState::Active
        } else {
            SwitchState::Inactive
        }
    }
}

/// Published when a switch actually changes position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchStateChanged {
    pub switch: AnalogSwitchType,
    pub old_state: SwitchState,
    pub new_state: SwitchState,
}

/// Holds the current position of every operator switch.
///
/// All switches start `Inactive`.
#[derive(Debug)]
pub struct AnalogSwitchStateService {
    states: Mutex<[SwitchState; 3]>,
    events: broadcast::Sender<SwitchStateChanged>,
}

impl Default for AnalogSwitchStateService {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalogSwitchStateService {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            states: Mutex::new([SwitchState::Inactive; 3]),
            events,
        }
    }

    /// Current position of a switch.
    pub fn switch_state(&self, switch: AnalogSwitchType) -> SwitchState {
        self.states.lock()[switch.index()]
    }

    /// Set a switch position.
    ///
    /// Setting the current value again is a no-op and publishes nothing.
    /// Returns `true` if the state changed.
    pub fn set_switch_state(&self, switch: AnalogSwitchType, new_state: SwitchState) -> bool {
        let old_state = {
            let mut states = self.states.lock();
            let old = states[switch.index()];
            if old == new_state {
                return false;
            }
            states[switch.index()] = new_state;
            old
        };

        tracing::debug!(
            switch = %switch,
            from = ?old_state,
            to = ?new_state,
            "Switch state changed"
        );
        let _ = self.events.send(SwitchStateChanged {
            switch,
            old_state,
            new_state,
        });
        true
    }

    /// Set every switch to `Inactive` without publishing per-switch events.
    pub fn reset_all_switches(&self) {
        *self.states.lock() = [SwitchState::Inactive; 3];
        tracing::debug!("All switches reset");
    }

    /// Convenience for the work switch, the input section control reads.
    pub fn is_work_switch_active(&self) -> bool {
        self.switch_state(AnalogSwitchType::WorkSwitch).is_active()
    }

    /// Subscribe to switch changes.
    pub fn subscribe(&self) -> broadcast::Receiver<SwitchStateChanged> {
        self.events.subscribe()
    }
}
