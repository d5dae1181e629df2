//! Simulate command - drive a scripted field through the control cycle.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Args;
use parking_lot::Mutex;
use swathe::control_loop::{ControlCycle, ControlLoop, LoopStats, ServiceStack};
use swathe::coverage::OverlapStatistics;
use swathe::sections::{ChangeType, SectionStateChanged};
use swathe::switches::{AnalogSwitchStateService, AnalogSwitchType, SwitchState};
use swathe::vehicle::SectionStateSink;
use tokio::sync::broadcast::{self, error::TryRecvError};

use super::load_config;
use crate::error::CliError;
use crate::sim::{field_script, SimulatedTractor};

/// Highest cruise speed accepted (m/s).
const MAX_SPEED: f64 = 20.0;

/// Arguments for the simulate command.
#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Config file to read instead of the default location
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Number of swaths to drive
    #[arg(long, default_value_t = 4)]
    pub passes: usize,

    /// Cruise speed in m/s
    #[arg(long, default_value_t = 3.0)]
    pub speed: f64,

    /// Swath length in meters
    #[arg(long, default_value_t = 100.0)]
    pub length: f64,

    /// Run on the control-loop thread in wall-clock time (Ctrl-C stops)
    #[arg(long)]
    pub realtime: bool,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}

impl SimulateArgs {
    fn validate(&self) -> Result<(), CliError> {
        if self.passes == 0 {
            return Err(CliError::Config("--passes must be at least 1".into()));
        }
        if !(self.speed > 0.0 && self.speed <= MAX_SPEED) {
            return Err(CliError::Config(format!(
                "--speed must be in (0, {}] m/s",
                MAX_SPEED
            )));
        }
        if !(self.length > 0.0 && self.length.is_finite()) {
            return Err(CliError::Config("--length must be positive".into()));
        }
        Ok(())
    }
}

/// Counts wire-state frames sent to the (absent) machine module.
#[derive(Debug, Default)]
struct FrameRecorder {
    frames: Mutex<(u64, Vec<u8>)>,
}

impl SectionStateSink for FrameRecorder {
    fn send_section_states(&self, states: &[u8]) {
        let mut frames = self.frames.lock();
        frames.0 += 1;
        frames.1 = states.to_vec();
    }
}

/// Section transitions by kind.
#[derive(Debug, Default, Clone, Copy)]
struct TransitionTally {
    automatic: u64,
    immediate: u64,
    manual: u64,
    reset: u64,
    missed: u64,
}

impl TransitionTally {
    fn record(&mut self, change: &SectionStateChanged) {
        match change.change_type {
            ChangeType::Automatic => self.automatic += 1,
            ChangeType::Immediate => self.immediate += 1,
            ChangeType::Manual => self.manual += 1,
            ChangeType::Reset => self.reset += 1,
        }
    }

    fn drain(&mut self, rx: &mut broadcast::Receiver<SectionStateChanged>) {
        loop {
            match rx.try_recv() {
                Ok(change) => self.record(&change),
                Err(TryRecvError::Lagged(n)) => self.missed += n,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }

    fn total(&self) -> u64 {
        self.automatic + self.immediate + self.manual + self.reset
    }
}

struct Summary {
    passes: usize,
    distance: f64,
    section_count: usize,
    total_width: f64,
    cycles: u64,
    frames: u64,
    final_wire_states: Vec<u8>,
    transitions: TransitionTally,
    triangles: usize,
    covered_area: f64,
    overlap: OverlapStatistics,
    loop_stats: Option<LoopStats>,
    elapsed: Duration,
}

/// Run the simulate command.
pub fn run(args: SimulateArgs) -> Result<(), CliError> {
    args.validate()?;
    let config = load_config(args.config.as_deref())?;

    let swath_width = config.sections.total_width();
    let tractor = Arc::new(SimulatedTractor::new(
        field_script(args.passes, args.length, swath_width),
        args.speed,
    ));
    let stack = ServiceStack::new(
        config.sections.clone(),
        config.coverage.cell_size,
        tractor.clone(),
        tractor.clone(),
    );
    let recorder = Arc::new(FrameRecorder::default());
    let cycle = Arc::new(ControlCycle::from_stack(
        &stack,
        tractor.clone(),
        recorder.clone(),
    ));
    let mut rx = stack.control.subscribe();
    let interval = config.control.cycle_interval;

    tracing::info!(
        passes = args.passes,
        speed = args.speed,
        sections = stack.control.section_count(),
        interval_ms = interval.as_millis() as u64,
        realtime = args.realtime,
        "Starting field simulation"
    );

    let started = Instant::now();
    let mut transitions = TransitionTally::default();
    let (cycles, loop_stats) = if args.realtime {
        let stats = run_realtime(&tractor, &stack.switches, cycle, interval, &mut rx, &mut transitions)?;
        (stats.cycles, Some(stats))
    } else {
        let cycles = run_simulated(&tractor, &stack.switches, &cycle, interval, &mut rx, &mut transitions)?;
        (cycles, None)
    };

    let (frames, final_wire_states) = recorder.frames.lock().clone();
    let summary = Summary {
        passes: args.passes,
        distance: tractor.script_length(),
        section_count: stack.control.section_count(),
        total_width: swath_width,
        cycles,
        frames,
        final_wire_states,
        transitions,
        triangles: stack.coverage.triangle_count(),
        covered_area: stack.coverage.covered_area(),
        overlap: stack.coverage.overlap_statistics(),
        loop_stats,
        elapsed: started.elapsed(),
    };

    if args.json {
        print_json(&summary)
    } else {
        print_text(&summary);
        Ok(())
    }
}

/// Lower or lift the implement to match the segment being driven.
fn apply_work_switch(tractor: &SimulatedTractor, switches: &AnalogSwitchStateService) {
    if let Some(segment) = tractor.current_segment() {
        switches.set_switch_state(AnalogSwitchType::WorkSwitch, SwitchState::from(segment.work()));
    }
}

/// Step the script as fast as possible with a simulated clock.
fn run_simulated(
    tractor: &SimulatedTractor,
    switches: &AnalogSwitchStateService,
    cycle: &ControlCycle,
    interval: Duration,
    rx: &mut broadcast::Receiver<SectionStateChanged>,
    transitions: &mut TransitionTally,
) -> Result<u64, CliError> {
    let t0 = Instant::now();
    let dt = interval.as_secs_f64();
    let mut cycles = 0u64;

    loop {
        apply_work_switch(tractor, switches);
        if !tractor.advance(dt) {
            break;
        }
        let now = t0 + interval * (cycles as u32);
        cycle.run_at(now)?;
        transitions.drain(rx);
        cycles += 1;
    }
    Ok(cycles)
}

/// Drive in wall-clock time while the control loop runs on its own thread.
fn run_realtime(
    tractor: &SimulatedTractor,
    switches: &AnalogSwitchStateService,
    cycle: Arc<ControlCycle>,
    interval: Duration,
    rx: &mut broadcast::Receiver<SectionStateChanged>,
    transitions: &mut TransitionTally,
) -> Result<LoopStats, CliError> {
    let handle = ControlLoop::spawn(cycle, interval)?;
    let token = handle.cancellation_token();

    let ctrlc_token = token.clone();
    ctrlc::set_handler(move || {
        tracing::info!("Interrupted, stopping simulation");
        ctrlc_token.cancel();
    })
    .map_err(|e| CliError::Simulation(format!("Failed to install Ctrl-C handler: {}", e)))?;

    let dt = interval.as_secs_f64();
    let mut last_step = Instant::now();
    while !token.is_cancelled() {
        apply_work_switch(tractor, switches);
        let elapsed = last_step.elapsed().as_secs_f64().max(dt);
        last_step = Instant::now();
        if !tractor.advance(elapsed) {
            break;
        }
        transitions.drain(rx);
        std::thread::sleep(interval);
    }

    // Let the loop see the final pose once before stopping
    std::thread::sleep(interval);
    let stats = handle.stop();
    transitions.drain(rx);
    Ok(stats)
}

fn print_text(summary: &Summary) {
    let t = &summary.transitions;
    println!("Simulation complete");
    println!("  Passes:        {}", summary.passes);
    println!("  Distance:      {:.1} m", summary.distance);
    println!(
        "  Implement:     {} sections, {:.2} m",
        summary.section_count, summary.total_width
    );
    println!("  Cycles:        {}", summary.cycles);
    println!("  Frames sent:   {}", summary.frames);
    println!("  Final states:  {:?}", summary.final_wire_states);
    println!(
        "  Transitions:   {} (automatic {}, immediate {}, manual {}, reset {})",
        t.total(),
        t.automatic,
        t.immediate,
        t.manual,
        t.reset
    );
    if t.missed > 0 {
        println!("  Missed events: {}", t.missed);
    }
    println!("  Triangles:     {}", summary.triangles);
    println!(
        "  Covered area:  {:.1} m² ({:.3} ha)",
        summary.covered_area,
        summary.covered_area / 10_000.0
    );
    if !summary.overlap.is_empty() {
        println!("  Overlap:");
        for (count, area) in summary.overlap.iter() {
            println!("    {}x: {:.1} m²", count, area);
        }
    }
    if let Some(stats) = summary.loop_stats {
        println!(
            "  Loop:          {} cycles, {} skipped, {} errors, {} overruns",
            stats.cycles, stats.skipped, stats.errors, stats.overruns
        );
    }
    println!("  Wall time:     {:.2?}", summary.elapsed);
}

fn print_json(summary: &Summary) -> Result<(), CliError> {
    let overlap = serde_json::to_value(&summary.overlap)
        .map_err(|e| CliError::Simulation(format!("Failed to encode statistics: {}", e)))?;
    let t = &summary.transitions;

    let mut value = serde_json::json!({
        "passes": summary.passes,
        "distance_m": summary.distance,
        "section_count": summary.section_count,
        "total_width_m": summary.total_width,
        "cycles": summary.cycles,
        "frames": summary.frames,
        "final_wire_states": summary.final_wire_states,
        "transitions": {
            "automatic": t.automatic,
            "immediate": t.immediate,
            "manual": t.manual,
            "reset": t.reset,
            "missed": t.missed,
        },
        "triangles": summary.triangles,
        "covered_area_m2": summary.covered_area,
        "overlap": overlap,
        "elapsed_ms": summary.elapsed.as_millis() as u64,
    });
    if let Some(stats) = summary.loop_stats {
        value["loop"] = serde_json::json!({
            "cycles": stats.cycles,
            "skipped": stats.skipped,
            "errors": stats.errors,
            "overruns": stats.overruns,
        });
    }

    let text = serde_json::to_string_pretty(&value)
        .map_err(|e| CliError::Simulation(format!("Failed to encode summary: {}", e)))?;
    println!("{}", text);
    Ok(())
}
