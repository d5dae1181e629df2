//! Scripted tractor for the `simulate` command.
//!
//! Drives back-and-forth swaths joined by headland U-turns. The implement is
//! lifted (work switch off) for every turn, and after the first swath the
//! tractor backs up a few meters with the implement still down.

use std::f64::consts::PI;

use parking_lot::Mutex;
use swathe::coord::{heading_vector, normalize_heading, UtmPosition};
use swathe::vehicle::{PositionUpdateService, VehicleKinematicsService};

/// Distance backed up after the first swath (meters).
const REVERSE_DISTANCE: f64 = 3.0;

/// Speed while reversing (m/s).
const REVERSE_SPEED: f64 = 1.0;

/// Start of the field in the local frame.
const ORIGIN_EASTING: f64 = 500_000.0;
const ORIGIN_NORTHING: f64 = 5_000_000.0;

/// One piece of the driving script.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Segment {
    /// Forward along the current heading.
    Straight { length: f64, work: bool },
    /// Forward along an arc; positive radius turns right.
    Turn { radius: f64, angle: f64, work: bool },
    /// Backwards along the current heading.
    Reverse { length: f64, work: bool },
}

impl Segment {
    fn length(&self) -> f64 {
        match *self {
            Segment::Straight { length, .. } | Segment::Reverse { length, .. } => length,
            Segment::Turn { radius, angle, .. } => radius.abs() * angle.abs(),
        }
    }

    /// Whether the implement is down during this segment.
    pub fn work(&self) -> bool {
        match *self {
            Segment::Straight { work, .. }
            | Segment::Turn { work, .. }
            | Segment::Reverse { work, .. } => work,
        }
    }
}

/// Build the script for `passes` swaths of `length` meters with `swath_width` spacing.
pub fn field_script(passes: usize, length: f64, swath_width: f64) -> Vec<Segment> {
    let mut script = Vec::new();
    for pass in 0..passes {
        script.push(Segment::Straight { length, work: true });

        if pass == 0 {
            script.push(Segment::Reverse {
                length: REVERSE_DISTANCE,
                work: true,
            });
            script.push(Segment::Straight {
                length: REVERSE_DISTANCE,
                work: true,
            });
        }

        if pass + 1 < passes {
            // Alternate right and left U-turns so passes lie side by side
            let radius = swath_width / 2.0;
            let radius = if pass % 2 == 0 { radius } else { -radius };
            script.push(Segment::Turn {
                radius,
                angle: PI,
                work: false,
            });
        }
    }
    script
}

#[derive(Debug, Clone, Copy)]
struct TractorState {
    easting: f64,
    northing: f64,
    heading: f64,
    speed: f64,
    reversing: bool,
    turning_radius: f64,
}

/// Position and kinematics source that follows a script.
#[derive(Debug)]
pub struct SimulatedTractor {
    state: Mutex<TractorState>,
    script: Vec<Segment>,
    cursor: Mutex<(usize, f64)>,
    cruise_speed: f64,
}

impl SimulatedTractor {
    pub fn new(script: Vec<Segment>, cruise_speed: f64) -> Self {
        Self {
            state: Mutex::new(TractorState {
                easting: ORIGIN_EASTING,
                northing: ORIGIN_NORTHING,
                heading: 0.0,
                speed: 0.0,
                reversing: false,
                turning_radius: f64::INFINITY,
            }),
            script,
            cursor: Mutex::new((0, 0.0)),
            cruise_speed,
        }
    }

    /// Total scripted distance in meters.
    pub fn script_length(&self) -> f64 {
        self.script.iter().map(Segment::length).sum()
    }

    /// Segment currently being driven, `None` once the script is finished.
    pub fn current_segment(&self) -> Option<Segment> {
        self.script.get(self.cursor.lock().0).copied()
    }

    /// Advance the tractor by `dt` seconds. Returns false when the script is done.
    pub fn advance(&self, dt: f64) -> bool {
        let mut cursor = self.cursor.lock();
        let Some(&segment) = self.script.get(cursor.0) else {
            let mut state = self.state.lock();
            state.speed = 0.0;
            state.reversing = false;
            return false;
        };

        let speed = match segment {
            Segment::Reverse { .. } => REVERSE_SPEED,
            _ => self.cruise_speed,
        };
        let remaining = segment.length() - cursor.1;
        let distance = (speed * dt).min(remaining);

        {
            let mut state = self.state.lock();
            let heading = state.heading;
            match segment {
                Segment::Straight { .. } => {
                    Self::move_along(&mut state, heading, distance);
                    state.turning_radius = f64::INFINITY;
                    state.reversing = false;
                }
                Segment::Reverse { .. } => {
                    Self::move_along(&mut state, heading, -distance);
                    state.turning_radius = f64::INFINITY;
                    state.reversing = true;
                }
                Segment::Turn { radius, .. } => {
                    let delta = distance / radius;
                    Self::move_along(&mut state, heading + delta / 2.0, distance);
                    state.heading = normalize_heading(heading + delta);
                    state.turning_radius = radius;
                    state.reversing = false;
                }
            }
            state.speed = speed;
        }

        cursor.1 += distance;
        if cursor.1 >= segment.length() - 1e-9 {
            cursor.0 += 1;
            cursor.1 = 0.0;
        }
        true
    }

    fn move_along(state: &mut TractorState, heading: f64, distance: f64) {
        let (east, north) = heading_vector(heading);
        state.easting += east * distance;
        state.northing += north * distance;
    }
}

impl PositionUpdateService for SimulatedTractor {
    fn current_position(&self) -> Option<UtmPosition> {
        let state = self.state.lock();
        Some(UtmPosition::local(state.easting, state.northing))
    }

    fn current_heading(&self) -> f64 {
        self.state.lock().heading
    }

    fn current_speed(&self) -> f64 {
        self.state.lock().speed
    }

    fn is_reversing(&self) -> bool {
        self.state.lock().reversing
    }
}

impl VehicleKinematicsService for SimulatedTractor {
    fn turning_radius(&self) -> f64 {
        self.state.lock().turning_radius
    }
}
