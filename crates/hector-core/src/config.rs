//! Startup parameters.
//!
//! [`MissionParams`] is the raw, serde-friendly parameter set. It is checked
//! exactly once by [`MissionParams::validate`], which yields the
//! [`MissionConfig`] the tick loop runs on. Nothing is re-validated per tick.

use crate::error::ConfigError;
use crate::state_machine::{ReturnCondition, StateMachineConfig};
use crate::trajectory::{require_positive, PlannerConfig, Sampling};
use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MissionParams {
    pub cruise_height: f64,
    pub height_tolerance: f64,
    pub look_ahead: f64,
    pub sampling: Sampling,
    pub close_enough: f64,
    pub average_speed: f64,
    pub initial_x: f64,
    pub initial_y: f64,
    pub initial_z: f64,
    /// Space/comma separated `x,y` pairs. The last pair is the goal.
    /// Defaults to the initial position when absent.
    pub goals: Option<String>,
    pub verbose: bool,
    pub tick_rate_hz: f64,
    pub return_condition: ReturnCondition,
}

impl Default for MissionParams {
    fn default() -> Self {
        Self {
            cruise_height: 2.0,
            height_tolerance: 0.05,
            look_ahead: 1.0,
            sampling: Sampling::Time,
            close_enough: 0.1,
            average_speed: 2.0,
            initial_x: 0.0,
            initial_y: 0.0,
            initial_z: 0.178,
            goals: None,
            verbose: false,
            tick_rate_hz: 25.0,
            return_condition: ReturnCondition::MissionSignal,
        }
    }
}

impl MissionParams {
    /// Every key a parameter file may set.
    pub const KEYS: [&'static str; 13] = [
        "cruise_height",
        "height_tolerance",
        "look_ahead",
        "sampling",
        "close_enough",
        "average_speed",
        "initial_x",
        "initial_y",
        "initial_z",
        "goals",
        "verbose",
        "tick_rate_hz",
        "return_condition",
    ];

    pub fn home(&self) -> Vector3<f64> {
        Vector3::new(self.initial_x, self.initial_y, self.initial_z)
    }

    /// Check every parameter and resolve the goal.
    pub fn validate(&self) -> Result<MissionConfig, ConfigError> {
        require_positive("tick_rate_hz", self.tick_rate_hz)?;
        require_positive("height_tolerance", self.height_tolerance)?;
        require_finite("cruise_height", self.cruise_height)?;
        for (name, value) in [
            ("initial_x", self.initial_x),
            ("initial_y", self.initial_y),
            ("initial_z", self.initial_z),
        ] {
            require_finite(name, value)?;
        }

        let planner = PlannerConfig {
            cruise_speed: self.average_speed,
            look_ahead: self.look_ahead,
            close_enough: self.close_enough,
            sampling: self.sampling,
        };
        // Same checks the planner applies, surfaced here so they fail at startup.
        require_positive("average_speed", planner.cruise_speed)?;
        require_positive("look_ahead", planner.look_ahead)?;
        require_positive("close_enough", planner.close_enough)?;

        let home = self.home();
        let goal = match &self.goals {
            Some(goals) => {
                let goal = last_goal(goals)?;
                tracing::info!("Last target goal is ({}, {})", goal.x, goal.y);
                goal
            }
            None => {
                tracing::warn!(
                    "Param goals not found, set to ({}, {})",
                    self.initial_x,
                    self.initial_y
                );
                home.xy()
            }
        };

        Ok(MissionConfig {
            state_machine: StateMachineConfig {
                cruise_height: self.cruise_height,
                height_tolerance: self.height_tolerance,
                close_enough: self.close_enough,
                home,
                goal,
                return_condition: self.return_condition,
            },
            planner,
            tick_rate_hz: self.tick_rate_hz,
            verbose: self.verbose,
        })
    }
}

/// Validated configuration, ready to build the tick loop from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MissionConfig {
    pub state_machine: StateMachineConfig,
    pub planner: PlannerConfig,
    pub tick_rate_hz: f64,
    pub verbose: bool,
}

impl MissionConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate_hz)
    }

    pub fn home(&self) -> Vector3<f64> {
        self.state_machine.home
    }

    pub fn goal(&self) -> Vector2<f64> {
        self.state_machine.goal
    }
}

// ---------------------------------------------------------------------------
// Goal parsing
// ---------------------------------------------------------------------------

/// Parse `"x0,y0 x1,y1 ..."` into coordinate pairs.
///
/// Spaces and commas are interchangeable separators and runs of them are
/// collapsed, so `"1 2, 3,4"` is two pairs.
pub fn parse_goals(input: &str) -> Result<Vec<Vector2<f64>>, ConfigError> {
    let values = input
        .split([' ', ','])
        .filter(|tok| !tok.is_empty())
        .map(|tok| {
            tok.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| ConfigError::invalid_goals(input, format!("{tok:?} is not a number")))
        })
        .collect::<Result<Vec<f64>, _>>()?;

    if values.is_empty() {
        return Err(ConfigError::invalid_goals(input, "no coordinates"));
    }
    if values.len() % 2 != 0 {
        return Err(ConfigError::invalid_goals(input, "unpaired coordinate"));
    }

    Ok(values
        .chunks_exact(2)
        .map(|pair| Vector2::new(pair[0], pair[1]))
        .collect())
}

/// The final goal in a goal string; earlier pairs are waypoints of the
/// ground target and do not concern the vehicle.
pub fn last_goal(input: &str) -> Result<Vector2<f64>, ConfigError> {
    parse_goals(input)?
        .last()
        .copied()
        .ok_or_else(|| ConfigError::invalid_goals(input, "no coordinates"))
}

fn require_finite(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NotFinite { name, value })
    }
}
