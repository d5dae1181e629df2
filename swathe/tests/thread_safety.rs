//! Concurrency tests for the section-control services.
//!
//! Four actors share one service stack, the way the control loop, a UI and
//! telemetry would in the field:
//! - position updates driving the state machine
//! - state queries
//! - manual override toggles
//! - coverage insertions
//!
//! Run with: `cargo test --test thread_safety`

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use swathe::control_loop::ServiceStack;
use swathe::coord::{Point2D, UtmPosition};
use swathe::coverage::CoverageTriangle;
use swathe::sections::{SectionConfiguration, SectionState};
use swathe::switches::{AnalogSwitchType, SwitchState};
use swathe::vehicle::{PositionUpdateService, StraightLineKinematics};

// ============================================================================
// Helpers
// ============================================================================

const SECTION_COUNT: usize = 8;
const POSITION_UPDATES: usize = 100;
const STATE_QUERIES: usize = 100;
const OVERRIDE_TOGGLES: usize = 50;
const COVERAGE_INSERTS: usize = 100;

#[derive(Default)]
struct Gnss {
    reversing: AtomicBool,
}

impl PositionUpdateService for Gnss {
    fn current_position(&self) -> Option<UtmPosition> {
        Some(UtmPosition::local(0.0, 0.0))
    }
    fn current_heading(&self) -> f64 {
        0.0
    }
    fn current_speed(&self) -> f64 {
        2.0
    }
    fn is_reversing(&self) -> bool {
        self.reversing.load(Ordering::SeqCst)
    }
}

fn stack() -> (ServiceStack, Arc<Gnss>) {
    let configuration = SectionConfiguration::builder()
        .section_widths(vec![1.5; SECTION_COUNT])
        .turn_on_delay(Duration::from_millis(1))
        .turn_off_delay(Duration::from_millis(1))
        .minimum_speed(1.0)
        .build()
        .unwrap();
    let gnss = Arc::new(Gnss::default());
    let stack = ServiceStack::new(
        configuration,
        5.0,
        gnss.clone(),
        Arc::new(StraightLineKinematics),
    );
    stack
        .switches
        .set_switch_state(AnalogSwitchType::WorkSwitch, SwitchState::Active);
    (stack, gnss)
}

fn random_triangle(rng: &mut StdRng) -> CoverageTriangle {
    let x = rng.random_range(0.0..50.0);
    let y = rng.random_range(0.0..50.0);
    let w = rng.random_range(0.5..3.0);
    let h = rng.random_range(0.5..3.0);
    CoverageTriangle::new(
        Point2D::new(x, y),
        Point2D::new(x + w, y),
        Point2D::new(x, y + h),
        rng.random_range(0..SECTION_COUNT),
    )
}

// ============================================================================
// Tests
// ============================================================================

/// Four concurrent actors finish without errors and leave a consistent state.
#[test]
fn test_four_concurrent_actors() {
    let (stack, gnss) = stack();
    let barrier = Barrier::new(4);

    let last_overrides = std::thread::scope(|s| {
        // Control loop: position updates
        s.spawn(|| {
            let mut rng = StdRng::seed_from_u64(1);
            barrier.wait();
            for i in 0..POSITION_UPDATES {
                let position = UtmPosition::local(0.0, i as f64 * 0.2);
                let speed = rng.random_range(0.0..4.0);
                stack
                    .control
                    .update_section_states(&position, 0.0, speed);
            }
        });

        // UI: state queries
        s.spawn(|| {
            let mut rng = StdRng::seed_from_u64(2);
            barrier.wait();
            for _ in 0..STATE_QUERIES {
                let states = stack.control.all_section_states();
                assert_eq!(states.len(), SECTION_COUNT, "torn section list");

                let wire = stack.control.wire_states();
                assert_eq!(wire.len(), SECTION_COUNT);
                assert!(wire.iter().all(|&w| w <= 2));

                let id = rng.random_range(0..SECTION_COUNT);
                stack.control.section_state(id).unwrap();
                stack.control.is_manual_override(id).unwrap();
                let _ = stack.coverage.coverage_at(&Point2D::new(10.0, 10.0));
            }
        });

        // Operator: manual overrides
        let overrides = s.spawn(|| {
            let mut rng = StdRng::seed_from_u64(3);
            let mut last: Vec<Option<SectionState>> = vec![None; SECTION_COUNT];
            barrier.wait();
            for _ in 0..OVERRIDE_TOGGLES {
                let id = rng.random_range(0..SECTION_COUNT);
                let state = match rng.random_range(0..3) {
                    0 => SectionState::ManualOn,
                    1 => SectionState::ManualOff,
                    _ => SectionState::Auto,
                };
                stack.control.set_manual_override(id, state).unwrap();
                last[id] = Some(state);
            }
            last
        });

        // Coverage writer
        s.spawn(|| {
            let mut rng = StdRng::seed_from_u64(4);
            barrier.wait();
            for _ in 0..COVERAGE_INSERTS {
                let added = stack.coverage.add_coverage_triangles([random_triangle(&mut rng)]);
                assert_eq!(added, 1);
            }
        });

        overrides.join().unwrap()
    });

    // Coverage: every insert stored, statistics agree with the total
    assert_eq!(stack.coverage.triangle_count(), COVERAGE_INSERTS);
    let stats = stack.coverage.overlap_statistics();
    assert!((stats.total_area() - stack.coverage.covered_area()).abs() < 1e-6);

    // Overrides: the last request per section is what stuck
    for (id, last) in last_overrides.iter().enumerate() {
        match last {
            Some(SectionState::ManualOn) | Some(SectionState::ManualOff) => {
                assert!(stack.control.is_manual_override(id).unwrap());
                assert_eq!(stack.control.section_state(id).unwrap(), last.unwrap());
            }
            _ => assert!(!stack.control.is_manual_override(id).unwrap()),
        }
    }

    // One more update while reversing: every automatic section goes off at once
    gnss.reversing.store(true, Ordering::SeqCst);
    stack
        .control
        .update_section_states(&UtmPosition::local(0.0, 25.0), 0.0, 2.0);
    for (id, section) in stack.control.sections().iter().enumerate() {
        if section.is_manual_override() {
            assert_eq!(Some(section.state()), last_overrides[id]);
        } else {
            assert_eq!(section.state(), SectionState::Off);
        }
    }
}

/// A subscriber calling back into the service from its handler does not deadlock.
#[test]
fn test_subscriber_can_query_service() {
    let (stack, _) = stack();
    let mut rx = stack.control.subscribe();

    let control = Arc::clone(&stack.control);
    let listener = std::thread::spawn(move || {
        let mut seen = 0;
        while let Ok(event) = rx.blocking_recv() {
            // Reading back while the writer may be mid-update
            let _ = control.section_state(event.section_id);
            seen += 1;
            if seen == SECTION_COUNT {
                break;
            }
        }
        seen
    });

    for id in 0..SECTION_COUNT {
        stack
            .control
            .set_manual_override(id, SectionState::ManualOn)
            .unwrap();
    }

    assert_eq!(listener.join().unwrap(), SECTION_COUNT);
}
