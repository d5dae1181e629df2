//! Periodic control cycle.
//!
//! One cycle reads the fused pose, updates section states, pushes wire
//! states to the machine module and records the ground covered since the
//! previous cycle.
//!
//! ```text
//! position ──► SectionControlService ──► SectionStateSink
//!    │                  │
//!    ▼                  ▼
//! SectionGeometryService ──► CoverageTrailBuilder ──► CoverageMapService
//! ```
//!
//! [`ControlLoop`] runs cycles on a dedicated, named thread at a fixed
//! period until its handle is stopped.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::coverage::{CoverageMapService, CoverageTrailBuilder};
use crate::sections::{
    SectionConfiguration, SectionConfigurationService, SectionControlService, SectionError,
    SectionGeometryService, SectionSpeedService, SectionStateChanged,
};
use crate::switches::AnalogSwitchStateService;
use crate::vehicle::{SharedKinematicsService, SharedPositionService, SharedSectionStateSink};

/// Default control period.
pub const DEFAULT_CYCLE_INTERVAL: Duration = Duration::from_millis(100);

/// Thread name of the control loop.
const CONTROL_THREAD_NAME: &str = "swathe-control";

/// Every service of a section-control setup, wired together.
#[derive(Debug, Clone)]
pub struct ServiceStack {
    pub config: Arc<SectionConfigurationService>,
    pub switches: Arc<AnalogSwitchStateService>,
    pub speeds: Arc<SectionSpeedService>,
    pub geometry: Arc<SectionGeometryService>,
    pub control: Arc<SectionControlService>,
    pub coverage: Arc<CoverageMapService>,
}

impl ServiceStack {
    /// Build all services around one configuration.
    ///
    /// The coverage map takes its overlap tolerance from `configuration`.
    pub fn new(
        configuration: SectionConfiguration,
        cell_size: f64,
        position: SharedPositionService,
        kinematics: SharedKinematicsService,
    ) -> Self {
        let overlap_tolerance = configuration.overlap_tolerance();
        let config = Arc::new(SectionConfigurationService::new(configuration));
        let switches = Arc::new(AnalogSwitchStateService::new());
        let speeds = Arc::new(SectionSpeedService::new(Arc::clone(&config)));
        let geometry = Arc::new(SectionGeometryService::new(Arc::clone(&config)));
        let control = Arc::new(SectionControlService::new(
            Arc::clone(&config),
            Arc::clone(&speeds),
            Arc::clone(&switches),
            position,
            kinematics,
        ));
        let coverage = Arc::new(CoverageMapService::new(cell_size, overlap_tolerance));

        Self {
            config,
            switches,
            speeds,
            geometry,
            control,
            coverage,
        }
    }
}

/// Outcome of one control cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// False when no valid fix was available and the cycle did nothing.
    pub ran: bool,
    pub transitions: Vec<SectionStateChanged>,
    pub triangles_added: usize,
    pub elapsed: Duration,
}

/// One position → state → hardware → coverage pass.
pub struct ControlCycle {
    position: SharedPositionService,
    control: Arc<SectionControlService>,
    geometry: Arc<SectionGeometryService>,
    coverage: Arc<CoverageMapService>,
    sink: SharedSectionStateSink,
    trail: Mutex<CoverageTrailBuilder>,
}

impl std::fmt::Debug for ControlCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlCycle")
            .field("trail", &self.trail)
            .finish_non_exhaustive()
    }
}

impl ControlCycle {
    pub fn new(
        position: SharedPositionService,
        control: Arc<SectionControlService>,
        geometry: Arc<SectionGeometryService>,
        coverage: Arc<CoverageMapService>,
        sink: SharedSectionStateSink,
    ) -> Self {
        Self {
            position,
            control,
            geometry,
            coverage,
            sink,
            trail: Mutex::new(CoverageTrailBuilder::new()),
        }
    }

    /// Build a cycle over the services of `stack`.
    pub fn from_stack(
        stack: &ServiceStack,
        position: SharedPositionService,
        sink: SharedSectionStateSink,
    ) -> Self {
        Self::new(
            position,
            Arc::clone(&stack.control),
            Arc::clone(&stack.geometry),
            Arc::clone(&stack.coverage),
            sink,
        )
    }

    /// Run one cycle against the current clock.
    pub fn run(&self) -> Result<CycleReport, SectionError> {
        self.run_at(Instant::now())
    }

    /// Run one cycle with `now` as the debounce clock.
    ///
    /// Without a fix the cycle is skipped. A fix with non-finite coordinates
    /// or heading is an error and leaves every service untouched.
    pub fn run_at(&self, now: Instant) -> Result<CycleReport, SectionError> {
        let started = Instant::now();

        let Some(position) = self.position.current_position() else {
            tracing::trace!("No position fix, skipping control cycle");
            return Ok(CycleReport::default());
        };
        if !position.is_finite() {
            return Err(SectionError::NonFinitePosition);
        }
        let heading = self.position.current_heading();
        if !heading.is_finite() {
            return Err(SectionError::NonFiniteHeading(heading));
        }
        let speed = self.position.current_speed();

        let transitions = self
            .control
            .update_section_states_at(&position, heading, speed, now);
        self.sink.send_section_states(&self.control.wire_states());

        let boundaries = self
            .geometry
            .calculate_all_section_boundary_points(&position, heading)?;
        let states = self.control.all_section_states();
        let triangles = self.trail.lock().advance(&boundaries, &states);
        let triangles_added = self.coverage.add_coverage_triangles(triangles);

        let elapsed = started.elapsed();
        tracing::trace!(
            transitions = transitions.len(),
            triangles_added,
            elapsed_us = elapsed.as_micros() as u64,
            "Control cycle complete"
        );

        Ok(CycleReport {
            ran: true,
            transitions,
            triangles_added,
            elapsed,
        })
    }
}

/// Counters collected by a running [`ControlLoop`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub cycles: u64,
    pub skipped: u64,
    pub errors: u64,
    /// Cycles that took longer than the loop period.
    pub overruns: u64,
}

/// Runs a [`ControlCycle`] periodically on its own thread.
pub struct ControlLoop;

impl ControlLoop {
    /// Start the loop. Cycles begin immediately and repeat every `interval`.
    ///
    /// Late ticks are skipped rather than bunched up.
    pub fn spawn(cycle: Arc<ControlCycle>, interval: Duration) -> std::io::Result<ControlLoopHandle> {
        let interval = interval.max(Duration::from_millis(1));
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let token = CancellationToken::new();
        let shutdown = token.clone();

        let thread = std::thread::Builder::new()
            .name(CONTROL_THREAD_NAME.to_string())
            .spawn(move || runtime.block_on(Self::run(cycle, interval, shutdown)))?;

        tracing::info!(interval_ms = interval.as_millis() as u64, "Control loop started");
        Ok(ControlLoopHandle {
            token,
            thread: Some(thread),
        })
    }

    async fn run(cycle: Arc<ControlCycle>, interval: Duration, shutdown: CancellationToken) -> LoopStats {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut stats = LoopStats::default();

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                _ = ticker.tick() => {
                    match cycle.run() {
                        Ok(report) if report.ran => {
                            stats.cycles += 1;
                            if report.elapsed > interval {
                                stats.overruns += 1;
                                tracing::warn!(
                                    elapsed_ms = report.elapsed.as_millis() as u64,
                                    interval_ms = interval.as_millis() as u64,
                                    "Control cycle overran its period"
                                );
                            }
                        }
                        Ok(_) => stats.skipped += 1,
                        Err(e) => {
                            stats.errors += 1;
                            tracing::warn!(error = %e, "Control cycle failed");
                        }
                    }
                }
            }
        }

        tracing::info!(
            cycles = stats.cycles,
            skipped = stats.skipped,
            errors = stats.errors,
            overruns = stats.overruns,
            "Control loop stopped"
        );
        stats
    }
}

/// Owner of a running control loop. Dropping it stops the loop.
#[derive(Debug)]
pub struct ControlLoopHandle {
    token: CancellationToken,
    thread: Option<JoinHandle<LoopStats>>,
}

impl ControlLoopHandle {
    /// Token that stops the loop when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the loop and wait for the in-flight cycle to finish.
    pub fn stop(mut self) -> LoopStats {
        self.shutdown()
    }

    /// Wait for the loop to end after its token was cancelled elsewhere.
    pub fn join(mut self) -> LoopStats {
        match self.thread.take() {
            Some(thread) => Self::collect(thread),
            None => LoopStats::default(),
        }
    }

    fn shutdown(&mut self) -> LoopStats {
        self.token.cancel();
        match self.thread.take() {
            Some(thread) => Self::collect(thread),
            None => LoopStats::default(),
        }
    }

    fn collect(thread: JoinHandle<LoopStats>) -> LoopStats {
        thread.join().unwrap_or_else(|_| {
            tracing::error!("Control loop thread panicked");
            LoopStats::default()
        })
    }
}

impl Drop for ControlLoopHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::UtmPosition;
    use crate::sections::SectionState;
    use crate::switches::{AnalogSwitchType, SwitchState};
    use crate::vehicle::{PositionUpdateService, SectionStateSink, StraightLineKinematics};
    use std::f64::consts::FRAC_PI_2;

    // ─────────────────────────────────────────────────────────────────────────
    // Test doubles
    // ─────────────────────────────────────────────────────────────────────────

    #[derive(Default)]
    struct ScriptedPosition {
        fix: Mutex<Option<(UtmPosition, f64, f64)>>,
    }

    impl ScriptedPosition {
        fn set(&self, easting: f64, northing: f64, heading: f64, speed: f64) {
            *self.fix.lock() = Some((UtmPosition::local(easting, northing), heading, speed));
        }
    }

    impl PositionUpdateService for ScriptedPosition {
        fn current_position(&self) -> Option<UtmPosition> {
            self.fix.lock().map(|(p, _, _)| p)
        }
        fn current_heading(&self) -> f64 {
            self.fix.lock().map(|(_, h, _)| h).unwrap_or(0.0)
        }
        fn current_speed(&self) -> f64 {
            self.fix.lock().map(|(_, _, s)| s).unwrap_or(0.0)
        }
        fn is_reversing(&self) -> bool {
            false
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<Vec<u8>>>,
    }

    impl SectionStateSink for RecordingSink {
        fn send_section_states(&self, states: &[u8]) {
            self.sent.lock().push(states.to_vec());
        }
    }

    struct Rig {
        position: Arc<ScriptedPosition>,
        sink: Arc<RecordingSink>,
        stack: ServiceStack,
        cycle: ControlCycle,
    }

    fn rig() -> Rig {
        let configuration = SectionConfiguration::builder()
            .section_widths(vec![2.0, 2.0])
            .turn_on_delay(Duration::ZERO)
            .turn_off_delay(Duration::ZERO)
            .minimum_speed(0.5)
            .build()
            .unwrap();
        let position = Arc::new(ScriptedPosition::default());
        let sink = Arc::new(RecordingSink::default());
        let stack = ServiceStack::new(
            configuration,
            10.0,
            position.clone(),
            Arc::new(StraightLineKinematics),
        );
        let cycle = ControlCycle::from_stack(&stack, position.clone(), sink.clone());
        Rig {
            position,
            sink,
            stack,
            cycle,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Cycle tests
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_cycle_without_fix_is_skipped() {
        let rig = rig();
        let report = rig.cycle.run().unwrap();
        assert!(!report.ran);
        assert!(rig.sink.sent.lock().is_empty());
    }

    #[test]
    fn test_non_finite_fix_is_rejected() {
        let rig = rig();
        rig.position.set(f64::NAN, 0.0, 0.0, 2.0);
        assert!(matches!(rig.cycle.run(), Err(SectionError::NonFinitePosition)));
    }

    #[test]
    fn test_non_finite_heading_is_rejected() {
        let rig = rig();
        rig.stack
            .switches
            .set_switch_state(AnalogSwitchType::WorkSwitch, SwitchState::Active);
        let t0 = Instant::now();

        for step in 0..3u32 {
            rig.position.set(0.0, f64::from(step), f64::NAN, 2.0);
            assert!(matches!(
                rig.cycle.run_at(t0 + Duration::from_millis(100) * step),
                Err(SectionError::NonFiniteHeading(_))
            ));
        }

        assert!(rig.sink.sent.lock().is_empty());
        assert_eq!(rig.stack.coverage.triangle_count(), 0);
        assert_eq!(rig.stack.coverage.covered_area(), 0.0);
    }

    #[test]
    fn test_position_jump_restarts_coverage() {
        let rig = rig();
        rig.stack
            .switches
            .set_switch_state(AnalogSwitchType::WorkSwitch, SwitchState::Active);
        let t0 = Instant::now();

        rig.position.set(0.0, 0.0, 0.0, 2.0);
        rig.cycle.run_at(t0).unwrap();
        rig.position.set(0.0, 1.0, 0.0, 2.0);
        rig.cycle.run_at(t0 + Duration::from_millis(100)).unwrap();
        let before = rig.stack.coverage.covered_area();
        assert!((before - 4.0).abs() < 1e-9);

        // Fix jumps 20 km east and 20 km north
        rig.position.set(20_000.0, 20_001.0, 0.0, 2.0);
        let started = Instant::now();
        let jumped = rig.cycle.run_at(t0 + Duration::from_millis(200)).unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(jumped.triangles_added, 0);
        assert_eq!(rig.stack.coverage.covered_area(), before);

        // Coverage resumes from the new location
        rig.position.set(20_000.0, 20_002.0, 0.0, 2.0);
        let resumed = rig.cycle.run_at(t0 + Duration::from_millis(300)).unwrap();
        assert_eq!(resumed.triangles_added, 4);
        assert!((rig.stack.coverage.covered_area() - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_cycle_drives_sink_and_coverage() {
        let rig = rig();
        rig.stack
            .switches
            .set_switch_state(AnalogSwitchType::WorkSwitch, SwitchState::Active);
        let t0 = Instant::now();

        // Heading east along northing 0
        rig.position.set(0.0, 0.0, FRAC_PI_2, 2.0);
        let first = rig.cycle.run_at(t0).unwrap();
        assert!(first.ran);
        assert_eq!(first.transitions.len(), 2);
        assert_eq!(first.triangles_added, 0);

        rig.position.set(5.0, 0.0, FRAC_PI_2, 2.0);
        let second = rig.cycle.run_at(t0 + Duration::from_millis(100)).unwrap();
        assert_eq!(second.triangles_added, 4);

        // 5 m travelled with a 4 m implement
        assert!((rig.stack.coverage.covered_area() - 20.0).abs() < 1e-9);
        let sent = rig.sink.sent.lock();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1], vec![2, 2]);
    }

    #[test]
    fn test_manual_off_section_leaves_no_coverage() {
        let rig = rig();
        rig.stack
            .switches
            .set_switch_state(AnalogSwitchType::WorkSwitch, SwitchState::Active);
        rig.stack
            .control
            .set_manual_override(1, SectionState::ManualOff)
            .unwrap();
        let t0 = Instant::now();

        rig.position.set(0.0, 0.0, 0.0, 2.0);
        rig.cycle.run_at(t0).unwrap();
        rig.position.set(0.0, 3.0, 0.0, 2.0);
        rig.cycle.run_at(t0 + Duration::from_millis(100)).unwrap();

        let triangles = rig.stack.coverage.all_triangles();
        assert!(!triangles.is_empty());
        assert!(triangles.iter().all(|t| t.section_id() == 0));
        assert!((rig.stack.coverage.covered_area() - 6.0).abs() < 1e-9);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Loop tests
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_loop_runs_until_stopped() {
        let rig = rig();
        rig.position.set(0.0, 0.0, 0.0, 0.0);
        let cycle = Arc::new(rig.cycle);

        let handle = ControlLoop::spawn(Arc::clone(&cycle), Duration::from_millis(5)).unwrap();
        assert!(handle.is_running());
        std::thread::sleep(Duration::from_millis(60));
        let stats = handle.stop();

        assert!(stats.cycles >= 2, "only {} cycles ran", stats.cycles);
        assert_eq!(stats.errors, 0);
        assert!(!rig.sink.sent.lock().is_empty());
    }

    #[test]
    fn test_loop_stops_from_token() {
        let rig = rig();
        let handle =
            ControlLoop::spawn(Arc::new(rig.cycle), Duration::from_millis(5)).unwrap();
        let token = handle.cancellation_token();

        std::thread::sleep(Duration::from_millis(20));
        token.cancel();
        let stats = handle.join();

        // No fix was ever set
        assert_eq!(stats.cycles, 0);
        assert!(stats.skipped >= 1);
    }
}
