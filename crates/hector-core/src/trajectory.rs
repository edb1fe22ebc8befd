//! Point-to-point cubic Hermite trajectory planner.
//!
//! Each axis is an independent cubic `f(t) = a0 + a1 t + a2 t² + a3 t³` on
//! `t ∈ [0, T]` with
//!
//! ```text
//! f(0)  = p0        f(T)  = p1
//! f'(0) = v0        f'(T) = v1
//! ```
//!
//! Closed form:
//!
//! ```text
//! a0 = p0
//! a1 = v0
//! a2 = (3(p1 - p0) - T(2 v0 + v1)) / T²
//! a3 = (2(p0 - p1) + T(v0 + v1)) / T³
//! ```
//!
//! The duration is `T = max(|p1 - p0| / speed, MIN_DURATION)`.

use crate::error::ConfigError;
use crate::state_machine::Destination;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Lower bound on segment duration (s).
pub const MIN_DURATION: f64 = 1e-3;

/// Integration sub-steps per look-ahead step when sampling by arc length.
const ARC_SUBSTEPS_PER_STEP: usize = 32;

/// Minimum integration sub-steps for a whole segment when sampling by arc length.
const ARC_MIN_SUBSTEPS: usize = 64;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// How the look-ahead step discretises a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Sampling {
    /// One waypoint every `look_ahead` seconds.
    #[default]
    Time,
    /// One waypoint every `look_ahead` metres of path length.
    ArcLength,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannerConfig {
    /// Nominal cruise speed (m/s).
    pub cruise_speed: f64,
    pub look_ahead: f64,
    pub close_enough: f64,
    pub sampling: Sampling,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            cruise_speed: 2.0,
            look_ahead: 1.0,
            close_enough: 0.1,
            sampling: Sampling::Time,
        }
    }
}

// ---------------------------------------------------------------------------
// Segment
// ---------------------------------------------------------------------------

/// Boundary-value description of one leg plus its solved coefficients.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectorySegment {
    pub start: Vector3<f64>,
    pub start_velocity: Vector3<f64>,
    pub end: Vector3<f64>,
    pub end_velocity: Vector3<f64>,
    duration: f64,
    /// `[a0, a1, a2, a3]`, one component per axis.
    coeffs: [Vector3<f64>; 4],
}

impl TrajectorySegment {
    /// Solve the cubic Hermite boundary-value problem.
    ///
    /// `duration` is clamped to [`MIN_DURATION`].
    pub fn solve(
        start: Vector3<f64>,
        start_velocity: Vector3<f64>,
        end: Vector3<f64>,
        end_velocity: Vector3<f64>,
        duration: f64,
    ) -> Self {
        let t = duration.max(MIN_DURATION);
        let t2 = t * t;
        let t3 = t2 * t;

        let a0 = start;
        let a1 = start_velocity;
        let a2 = ((end - start) * 3.0 - (start_velocity * 2.0 + end_velocity) * t) / t2;
        let a3 = ((start - end) * 2.0 + (start_velocity + end_velocity) * t) / t3;

        Self {
            start,
            start_velocity,
            end,
            end_velocity,
            duration: t,
            coeffs: [a0, a1, a2, a3],
        }
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn coefficients(&self) -> &[Vector3<f64>; 4] {
        &self.coeffs
    }

    /// Position at time `t`, clamped to the segment.
    pub fn position(&self, t: f64) -> Vector3<f64> {
        let t = t.clamp(0.0, self.duration);
        let [a0, a1, a2, a3] = &self.coeffs;
        a0 + (a1 + (a2 + a3 * t) * t) * t
    }

    /// Velocity at time `t`, clamped to the segment.
    pub fn velocity(&self, t: f64) -> Vector3<f64> {
        let t = t.clamp(0.0, self.duration);
        let [_, a1, a2, a3] = &self.coeffs;
        a1 + (a2 * 2.0 + a3 * (3.0 * t)) * t
    }

    /// Largest speed seen over `samples` evenly spaced instants.
    pub fn peak_speed(&self, samples: usize) -> f64 {
        let n = samples.max(2);
        (0..n)
            .map(|i| {
                let t = self.duration * i as f64 / (n - 1) as f64;
                self.velocity(t).norm()
            })
            .fold(0.0, f64::max)
    }

    /// Sample at `step, 2·step, …` and finally at `T`.
    ///
    /// Produces `ceil(T / step)` waypoints; the last one is exactly `end`.
    pub fn sample_time(&self, step: f64) -> Vec<Waypoint> {
        // Guards against k·step landing a hair below T due to rounding.
        let tol = step * 1e-9;
        let mut out = Vec::with_capacity((self.duration / step).ceil() as usize);

        let mut k = 1usize;
        loop {
            let t = k as f64 * step;
            if t >= self.duration - tol {
                break;
            }
            out.push(Waypoint::new(t, self.position(t)));
            k += 1;
        }
        out.push(Waypoint::new(self.duration, self.end));
        out
    }

    /// Sample every `step` metres of path length, then `end`.
    pub fn sample_arc_length(&self, step: f64) -> Vec<Waypoint> {
        let chord = (self.end - self.start).norm();
        let substeps =
            ((chord / step).ceil() as usize * ARC_SUBSTEPS_PER_STEP).max(ARC_MIN_SUBSTEPS);
        let dt = self.duration / substeps as f64;

        let mut out = Vec::new();
        let mut travelled = 0.0;
        let mut next_mark = step;
        let mut prev = self.start;

        // Stop one short: the final instant is always appended as `end`.
        for i in 1..substeps {
            let t = i as f64 * dt;
            let p = self.position(t);
            travelled += (p - prev).norm();
            prev = p;
            if travelled >= next_mark {
                out.push(Waypoint::new(t, p));
                while next_mark <= travelled {
                    next_mark += step;
                }
            }
        }
        out.push(Waypoint::new(self.duration, self.end));
        out
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Waypoint {
    /// Time from segment start (s).
    pub time: f64,
    pub position: Vector3<f64>,
}

impl Waypoint {
    pub fn new(time: f64, position: Vector3<f64>) -> Self {
        Self { time, position }
    }
}

/// A planned leg: the solved segment (absent for degenerate legs) and its
/// sampled waypoints.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Trajectory {
    pub segment: Option<TrajectorySegment>,
    pub waypoints: Vec<Waypoint>,
}

impl Trajectory {
    /// Single-point trajectory sitting on `position`.
    pub fn hold(position: Vector3<f64>) -> Self {
        Self {
            segment: None,
            waypoints: vec![Waypoint::new(0.0, position)],
        }
    }

    /// The point the motion controller should chase right now.
    pub fn current_target(&self) -> Option<Vector3<f64>> {
        self.waypoints.first().map(|w| w.position)
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }
}

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

pub struct Planner {
    config: PlannerConfig,
}

impl Planner {
    /// Validates the configuration once; planning itself cannot fail.
    pub fn new(config: PlannerConfig) -> Result<Self, ConfigError> {
        require_positive("average_speed", config.cruise_speed)?;
        require_positive("look_ahead", config.look_ahead)?;
        require_positive("close_enough", config.close_enough)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Plan from the current position/velocity to `dest`.
    pub fn plan(
        &self,
        position: Vector3<f64>,
        velocity: Vector3<f64>,
        dest: &Destination,
    ) -> Trajectory {
        let distance = (dest.position - position).norm();
        if distance < self.config.close_enough {
            return Trajectory::hold(dest.position);
        }

        let duration = distance / self.config.cruise_speed;
        let segment =
            TrajectorySegment::solve(position, velocity, dest.position, dest.velocity, duration);

        let waypoints = match self.config.sampling {
            Sampling::Time => segment.sample_time(self.config.look_ahead),
            Sampling::ArcLength => segment.sample_arc_length(self.config.look_ahead),
        };

        Trajectory {
            segment: Some(segment),
            waypoints,
        }
    }
}

pub(crate) fn require_positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { name, value })
    }
}
