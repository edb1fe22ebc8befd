//! Closed-loop mission simulation in simulated time.
//!
//! The coordinator runs exactly as it does live, but ticks are driven by a
//! counter instead of the wall clock, so a whole mission finishes in
//! milliseconds and is fully deterministic for a given seed.

use crate::coordinator::TickCoordinator;
use crate::plant::{Plant, PlantParams};
use crate::snapshot::channel;
use crate::topics::OutputTopics;
use hector_core::{parse_goals, ConfigError, MissionParams, MissionState};
use nalgebra::{Vector2, Vector3};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------
pub const MAX_TIME: f64 = 120.0;
/// Distance from home at which a landing counts as complete (m).
pub const LANDED_TOLERANCE: f64 = 0.05;

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------
#[derive(Debug, Clone)]
pub struct SimParams {
    pub mission: MissionParams,
    pub plant: PlantParams,
    pub max_time: f64, // s
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            mission: MissionParams::default(),
            plant: PlantParams::default(),
            max_time: MAX_TIME,
        }
    }
}

impl SimParams {
    /// Goals the ground target drives through: every pair of the goal string.
    pub fn target_goals(&self) -> Result<Vec<Vector2<f64>>, ConfigError> {
        match &self.mission.goals {
            Some(goals) => parse_goals(goals),
            None => Ok(Vec::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// Simulation Result
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Serialize)]
pub struct SimResult {
    pub time: Vec<f64>,
    pub position: Vec<Vector3<f64>>,
    pub velocity: Vec<Vector3<f64>>,
    pub heading: Vec<f64>,
    pub target: Vec<Vector2<f64>>,
    pub state: Vec<MissionState>,
    pub rotate: Vec<bool>,
    pub waypoints: Vec<usize>, // length of the trajectory published that tick

    /// Every state entered, in order, with its entry time.
    pub transitions: Vec<(MissionState, f64)>,
    pub idle_ticks: u64,
    /// Landed back on home before `max_time`.
    pub completed: bool,
    pub home: Vector3<f64>,
    pub goal: Vector2<f64>,
}

impl SimResult {
    fn with_capacity(n: usize, home: Vector3<f64>, goal: Vector2<f64>) -> Self {
        Self {
            time: Vec::with_capacity(n),
            position: Vec::with_capacity(n),
            velocity: Vec::with_capacity(n),
            heading: Vec::with_capacity(n),
            target: Vec::with_capacity(n),
            state: Vec::with_capacity(n),
            rotate: Vec::with_capacity(n),
            waypoints: Vec::with_capacity(n),
            transitions: Vec::new(),
            idle_ticks: 0,
            completed: false,
            home,
            goal,
        }
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn final_state(&self) -> Option<MissionState> {
        self.state.last().copied()
    }

    /// Entry time of `state`, if it was reached.
    pub fn entered_at(&self, state: MissionState) -> Option<f64> {
        self.transitions
            .iter()
            .find(|(s, _)| *s == state)
            .map(|&(_, t)| t)
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Fly a full mission against the simulated plant.
pub fn run_mission(p: &SimParams) -> Result<SimResult, ConfigError> {
    let config = p.mission.validate()?;
    let home = config.home();
    let mut plant = Plant::new(&p.plant, home, p.target_goals()?)?;

    let (tx, inbox) = channel();
    let topics = OutputTopics::new();
    let mut coord = TickCoordinator::new(&config, inbox, topics.clone())?;

    let dt = config.tick_period().as_secs_f64();
    let max_ticks = (p.max_time / dt).ceil() as usize;
    let mut res = SimResult::with_capacity(max_ticks, home, config.goal());

    for k in 0..max_ticks {
        let time = k as f64 * dt;

        plant.publish(&tx);
        coord.tick(time);

        let command = topics.target.latest().map(|msg| msg.point);
        let rotate = topics.rotate.latest().unwrap_or(false);

        // Record
        let v = plant.vehicle();
        res.time.push(time);
        res.position.push(v.position);
        res.velocity.push(v.velocity);
        res.heading.push(v.heading);
        res.target.push(plant.target().position);
        res.state.push(coord.state());
        res.rotate.push(rotate);
        res.waypoints
            .push(topics.trajectory.latest().map_or(0, |path| path.poses.len()));

        // Termination: landed
        if coord.state() == MissionState::Land && (v.position - home).norm() <= LANDED_TOLERANCE {
            res.completed = true;
            break;
        }

        plant.step(dt, command, rotate);
    }

    res.idle_ticks = coord.summary().idle_ticks;
    res.transitions = MissionState::ALL
        .iter()
        .map(|&s| (s, coord.machine().transition_time(s)))
        .filter(|(_, t)| !t.is_nan())
        .collect();

    tracing::debug!(
        ticks = res.len(),
        completed = res.completed,
        "simulated mission finished"
    );
    Ok(res)
}
