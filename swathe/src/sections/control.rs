//! Section control state machine.
//!
//! Decides, once per control cycle, which sections apply product.
//!
//! # Evaluation Order
//!
//! ```text
//! reversing            --> every automatic section Off immediately, timers cancelled
//! work switch inactive --> every automatic section Off immediately, timers cancelled
//! otherwise, per automatic section:
//!   Off  --[should be on for turn_on_delay]-->  Auto
//!   Auto --[should be off for turn_off_delay]--> Off
//!   condition flips back before the deadline --> pending timer cancelled
//! ```
//!
//! A section "should be on" when both the vehicle speed and its own ground
//! speed are at or above the configured minimum. Sections under manual
//! override are skipped entirely and keep the state the operator set.
//!
//! Timers are deadlines compared against the caller-supplied clock on every
//! update; nothing sleeps or runs in the background.
//!
//! # Thread Safety
//!
//! All section state sits behind one mutex. Position, switch and speed
//! collaborators are queried before the lock is taken and events are
//! published after it is released, so a subscriber can call straight back
//! into the service. The configuration generation is checked under the
//! lock (section lock, then configuration lock; never the reverse).

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::coord::UtmPosition;
use crate::switches::AnalogSwitchStateService;
use crate::vehicle::{SharedKinematicsService, SharedPositionService};

use super::configuration::{SectionConfiguration, SectionConfigurationService};
use super::error::SectionError;
use super::speed::SectionSpeedService;
use super::types::{ChangeType, SectionState, SectionStateChanged};

/// Capacity of the section-change broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A debounced transition waiting for its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingTransition {
    target: SectionState,
    deadline: Instant,
}

/// One implement section, as seen by the control state machine.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    id: usize,
    width: f64,
    state: SectionState,
    is_manual_override: bool,
    pending: Option<PendingTransition>,
}

impl Section {
    fn new(id: usize, width: f64) -> Self {
        Self {
            id,
            width,
            state: SectionState::Off,
            is_manual_override: false,
            pending: None,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn state(&self) -> SectionState {
        self.state
    }

    pub fn is_manual_override(&self) -> bool {
        self.is_manual_override
    }

    /// Deadline of the pending debounced transition, if one is armed.
    pub fn pending_deadline(&self) -> Option<Instant> {
        self.pending.map(|p| p.deadline)
    }

    /// Move to `new_state`, recording the change if it differs.
    fn transition(
        &mut self,
        new_state: SectionState,
        change_type: ChangeType,
        now: Instant,
        changes: &mut Vec<SectionStateChanged>,
    ) {
        if self.state == new_state {
            return;
        }
        changes.push(SectionStateChanged {
            section_id: self.id,
            old_state: self.state,
            new_state,
            change_type,
            timestamp: now,
        });
        self.state = new_state;
    }

    /// Arm (or keep) a timer toward `target` and fire it once the deadline passes.
    fn debounce(
        &mut self,
        target: SectionState,
        delay: Duration,
        now: Instant,
        changes: &mut Vec<SectionStateChanged>,
    ) {
        let deadline = match self.pending {
            Some(pending) if pending.target == target => pending.deadline,
            _ => {
                let deadline = now + delay;
                self.pending = Some(PendingTransition { target, deadline });
                tracing::debug!(
                    section = self.id,
                    target = %target,
                    delay_ms = delay.as_millis() as u64,
                    "Section timer armed"
                );
                deadline
            }
        };

        if now >= deadline {
            self.pending = None;
            self.transition(target, ChangeType::Automatic, now, changes);
        }
    }

    fn cancel_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            tracing::debug!(
                section = self.id,
                target = %pending.target,
                "Section timer cancelled"
            );
        }
    }
}

/// Section state guarded by the service mutex.
#[derive(Debug)]
struct ControlInner {
    sections: Vec<Section>,
    generation: u64,
}

impl ControlInner {
    fn new(config: &SectionConfiguration, generation: u64) -> Self {
        Self {
            sections: Self::build_sections(config),
            generation,
        }
    }

    fn build_sections(config: &SectionConfiguration) -> Vec<Section> {
        config
            .section_widths()
            .iter()
            .enumerate()
            .map(|(id, &width)| Section::new(id, width))
            .collect()
    }

    /// Replace the sections after a configuration reload.
    ///
    /// Surviving sections that were not `Off` report a `Reset` transition.
    fn rebuild(
        &mut self,
        config: &SectionConfiguration,
        generation: u64,
        now: Instant,
        changes: &mut Vec<SectionStateChanged>,
    ) {
        let mut sections = Self::build_sections(config);
        for (old, new) in self.sections.iter().zip(sections.iter_mut()) {
            new.state = old.state;
            new.transition(SectionState::Off, ChangeType::Reset, now, changes);
        }

        tracing::info!(
            previous = self.sections.len(),
            sections = sections.len(),
            generation,
            "Sections rebuilt for new configuration"
        );
        self.sections = sections;
        self.generation = generation;
    }

    fn section_mut(&mut self, id: usize) -> Result<&mut Section, SectionError> {
        let count = self.sections.len();
        self.sections
            .get_mut(id)
            .ok_or(SectionError::InvalidSectionId { id, count })
    }

    fn section(&self, id: usize) -> Result<&Section, SectionError> {
        self.sections.get(id).ok_or(SectionError::InvalidSectionId {
            id,
            count: self.sections.len(),
        })
    }
}

/// Authoritative owner of per-section control state.
pub struct SectionControlService {
    config: Arc<SectionConfigurationService>,
    speeds: Arc<SectionSpeedService>,
    switches: Arc<AnalogSwitchStateService>,
    position: SharedPositionService,
    kinematics: SharedKinematicsService,
    inner: Mutex<ControlInner>,
    events: broadcast::Sender<SectionStateChanged>,
}

impl std::fmt::Debug for SectionControlService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SectionControlService")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl SectionControlService {
    /// Create the service; every section starts `Off` with no override.
    pub fn new(
        config: Arc<SectionConfigurationService>,
        speeds: Arc<SectionSpeedService>,
        switches: Arc<AnalogSwitchStateService>,
        position: SharedPositionService,
        kinematics: SharedKinematicsService,
    ) -> Self {
        let (snapshot, generation) = config.configuration_with_generation();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            speeds,
            switches,
            position,
            kinematics,
            inner: Mutex::new(ControlInner::new(&snapshot, generation)),
            events,
        }
    }

    /// Subscribe to section transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<SectionStateChanged> {
        self.events.subscribe()
    }

    /// Run one control cycle against the current clock.
    pub fn update_section_states(
        &self,
        position: &UtmPosition,
        heading: f64,
        vehicle_speed: f64,
    ) -> Vec<SectionStateChanged> {
        self.update_section_states_at(position, heading, vehicle_speed, Instant::now())
    }

    /// Run one control cycle at `now`.
    ///
    /// Returns the transitions applied during this call; the same transitions
    /// are published to subscribers.
    pub fn update_section_states_at(
        &self,
        position: &UtmPosition,
        heading: f64,
        vehicle_speed: f64,
        now: Instant,
    ) -> Vec<SectionStateChanged> {
        let config = self.config.configuration();
        let reversing = self.position.is_reversing();
        let work_active = self.switches.is_work_switch_active();

        let section_speeds = if reversing || !work_active {
            Vec::new()
        } else {
            let radius = self.kinematics.turning_radius();
            self.speeds
                .calculate_section_speeds(vehicle_speed, radius, heading)
        };

        tracing::trace!(
            position = %position,
            heading,
            vehicle_speed,
            reversing,
            work_active,
            "Section control cycle"
        );

        let ((), changes) = self.with_sections_tracked(now, |inner, changes| {
            if reversing || !work_active {
                let reason = if reversing {
                    "reversing"
                } else {
                    "work switch inactive"
                };
                Self::force_off(inner, reason, now, changes);
                return;
            }

            let minimum = config.minimum_speed();
            let vehicle_ok = vehicle_speed >= minimum;

            for section in inner.sections.iter_mut().filter(|s| !s.is_manual_override) {
                let section_speed = section_speeds.get(section.id).copied().unwrap_or(0.0);
                let should_be_on = vehicle_ok && section_speed >= minimum;

                match (section.state, should_be_on) {
                    (SectionState::Off | SectionState::ManualOff, true) => {
                        section.debounce(SectionState::Auto, config.turn_on_delay(), now, changes)
                    }
                    (SectionState::Auto | SectionState::ManualOn, false) => {
                        section.debounce(SectionState::Off, config.turn_off_delay(), now, changes)
                    }
                    _ => section.cancel_pending(),
                }
            }
        });
        changes
    }

    /// Turn off every automatic section at once, cancelling timers.
    fn force_off(
        inner: &mut ControlInner,
        reason: &'static str,
        now: Instant,
        changes: &mut Vec<SectionStateChanged>,
    ) {
        let before = changes.len();
        for section in inner.sections.iter_mut().filter(|s| !s.is_manual_override) {
            section.pending = None;
            section.transition(SectionState::Off, ChangeType::Immediate, now, changes);
        }
        if changes.len() > before {
            tracing::info!(
                reason,
                sections = changes.len() - before,
                "Sections turned off immediately"
            );
        }
    }

    /// Force a section on or off, or release it back to automatic control.
    ///
    /// `ManualOn`/`ManualOff` set the state immediately and mark the override.
    /// `Auto` clears the override and sets the section to `Auto`; it is
    /// evaluated normally, with fresh timers, from the next update.
    ///
    /// # Errors
    ///
    /// `InvalidSectionId` for an unknown section, `InvalidOverrideState` for `Off`.
    pub fn set_manual_override(&self, id: usize, state: SectionState) -> Result<(), SectionError> {
        self.set_manual_override_at(id, state, Instant::now())
    }

    /// [`set_manual_override`](Self::set_manual_override) with events stamped `now`.
    pub fn set_manual_override_at(
        &self,
        id: usize,
        state: SectionState,
        now: Instant,
    ) -> Result<(), SectionError> {
        if state == SectionState::Off {
            return Err(SectionError::InvalidOverrideState(state));
        }

        self.with_sections(now, |inner, changes| {
            let section = inner.section_mut(id)?;
            section.pending = None;
            section.is_manual_override = state.is_manual();
            section.transition(state, ChangeType::Manual, now, changes);

            tracing::info!(
                section = id,
                state = %state,
                override_active = section.is_manual_override,
                "Manual section override"
            );
            Ok(())
        })
    }

    /// Whether a section is under manual override.
    pub fn is_manual_override(&self, id: usize) -> Result<bool, SectionError> {
        self.with_sections(Instant::now(), |inner, _| {
            inner.section(id).map(|s| s.is_manual_override)
        })
    }

    /// Current state of one section.
    pub fn section_state(&self, id: usize) -> Result<SectionState, SectionError> {
        self.with_sections(Instant::now(), |inner, _| inner.section(id).map(|s| s.state))
    }

    /// States of all sections, read under a single lock.
    pub fn all_section_states(&self) -> Vec<SectionState> {
        self.with_sections(Instant::now(), |inner, _| {
            inner.sections.iter().map(|s| s.state).collect()
        })
    }

    /// Snapshot of every section including override flags and timers.
    pub fn sections(&self) -> Vec<Section> {
        self.with_sections(Instant::now(), |inner, _| inner.sections.clone())
    }

    /// Number of sections currently controlled.
    pub fn section_count(&self) -> usize {
        self.with_sections(Instant::now(), |inner, _| inner.sections.len())
    }

    /// Wire values for the machine module (0 = off, 1 = on, 2 = auto).
    pub fn wire_states(&self) -> Vec<u8> {
        self.with_sections(Instant::now(), |inner, _| {
            inner.sections.iter().map(|s| s.state.wire_value()).collect()
        })
    }

    /// Ids of sections currently applying product.
    pub fn active_sections(&self) -> Vec<usize> {
        self.with_sections(Instant::now(), |inner, _| {
            inner
                .sections
                .iter()
                .filter(|s| s.state.is_applying())
                .map(|s| s.id)
                .collect()
        })
    }

    /// Clear every override and timer and set all sections to `Auto`.
    ///
    /// This is a baseline for re-evaluation; the next update applies the
    /// real conditions.
    pub fn reset_all_sections(&self) {
        self.reset_all_sections_at(Instant::now())
    }

    /// [`reset_all_sections`](Self::reset_all_sections) with events stamped `now`.
    pub fn reset_all_sections_at(&self, now: Instant) {
        self.with_sections(now, |inner, changes| {
            for section in inner.sections.iter_mut() {
                section.pending = None;
                section.is_manual_override = false;
                section.transition(SectionState::Auto, ChangeType::Reset, now, changes);
            }
            tracing::info!(sections = inner.sections.len(), "All sections reset");
        })
    }

    /// Run `f` on the synced section state, then publish recorded transitions.
    fn with_sections<R>(
        &self,
        now: Instant,
        f: impl FnOnce(&mut ControlInner, &mut Vec<SectionStateChanged>) -> R,
    ) -> R {
        self.with_sections_tracked(now, f).0
    }

    /// Like `with_sections`, also handing back the published transitions.
    ///
    /// The configuration generation is read while the section lock is held,
    /// so sections are only ever rebuilt forward to a newer configuration.
    fn with_sections_tracked<R>(
        &self,
        now: Instant,
        f: impl FnOnce(&mut ControlInner, &mut Vec<SectionStateChanged>) -> R,
    ) -> (R, Vec<SectionStateChanged>) {
        let mut changes = Vec::new();

        let result = {
            let mut inner = self.inner.lock();
            let (config, generation) = self.config.configuration_with_generation();
            if generation > inner.generation {
                inner.rebuild(&config, generation, now, &mut changes);
            }
            f(&mut inner, &mut changes)
        };

        for change in &changes {
            tracing::debug!(
                section = change.section_id,
                from = %change.old_state,
                to = %change.new_state,
                change_type = %change.change_type,
                "Section state changed"
            );
            let _ = self.events.send(*change);
        }
        (result, changes)
    }
}
