//! Mission state machine.
//!
//! # States
//!
//! | State          | Rotation | Destination                  | Leaves when                         |
//! |----------------|----------|------------------------------|-------------------------------------|
//! | `Takeoff`      | off      | home, at cruise height       | altitude within tolerance of cruise |
//! | `PursueTarget` | on       | live ground target           | planar distance to target arrived   |
//! | `PursueGoal`   | on       | fixed goal                   | planar distance to goal arrived     |
//! | `Return`       | on       | home, at cruise height       | [`ReturnCondition`] satisfied       |
//! | `Land`         | off      | home, at initial altitude    | never                               |
//!
//! Transitions only ever move to [`MissionState::next`], so the machine can
//! never revisit an earlier phase.

use crate::types::{planar_distance, TargetPose};
use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Enums & Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[repr(u8)]
pub enum MissionState {
    Takeoff = 0,
    PursueTarget = 1,
    PursueGoal = 2,
    Return = 3,
    Land = 4,
}

impl MissionState {
    pub const ALL: [MissionState; NUM_STATES] = [
        Self::Takeoff,
        Self::PursueTarget,
        Self::PursueGoal,
        Self::Return,
        Self::Land,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Takeoff => "TAKEOFF",
            Self::PursueTarget => "PURSUE_TARGET",
            Self::PursueGoal => "PURSUE_GOAL",
            Self::Return => "RETURN",
            Self::Land => "LAND",
        }
    }

    /// The only state this one may transition into.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Takeoff => Some(Self::PursueTarget),
            Self::PursueTarget => Some(Self::PursueGoal),
            Self::PursueGoal => Some(Self::Return),
            Self::Return => Some(Self::Land),
            Self::Land => None,
        }
    }

    /// Whether the motion controller may rotate the vehicle in this state.
    pub fn rotation_enabled(self) -> bool {
        matches!(self, Self::PursueTarget | Self::PursueGoal | Self::Return)
    }
}

pub const NUM_STATES: usize = 5;

/// What ends the RETURN leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReturnCondition {
    /// Land once the ground target reports its own mission finished.
    #[default]
    MissionSignal,
    /// Land once the vehicle is back over home.
    ReachedHome,
    /// Land on whichever of the above happens first.
    Either,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateMachineConfig {
    pub cruise_height: f64,
    pub height_tolerance: f64,
    pub close_enough: f64,
    /// Launch position; also the landing spot.
    pub home: Vector3<f64>,
    pub goal: Vector2<f64>,
    pub return_condition: ReturnCondition,
}

impl Default for StateMachineConfig {
    fn default() -> Self {
        Self {
            cruise_height: 2.0,
            height_tolerance: 0.05,
            close_enough: 0.1,
            home: Vector3::new(0.0, 0.0, 0.178),
            goal: Vector2::zeros(),
            return_condition: ReturnCondition::MissionSignal,
        }
    }
}

/// Inputs required by the state machine update.
#[derive(Debug, Clone, Copy)]
pub struct MissionInput {
    pub time: f64,
    pub position: Vector3<f64>,
    pub target: TargetPose,
    pub mission_active: Option<bool>,
}

/// Where the planner should head this tick, and how fast it should be
/// moving on arrival.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Destination {
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
}

impl Destination {
    fn fixed(position: Vector3<f64>) -> Self {
        Self {
            position,
            velocity: Vector3::zeros(),
        }
    }
}

// ---------------------------------------------------------------------------
// State Machine
// ---------------------------------------------------------------------------

pub struct StateMachine {
    config: StateMachineConfig,
    state: MissionState,

    /// Time at which each state was first entered, NaN if never.
    transition_times: [f64; NUM_STATES],
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new(StateMachineConfig::default())
    }
}

impl StateMachine {
    pub fn new(config: StateMachineConfig) -> Self {
        let mut transition_times = [f64::NAN; NUM_STATES];
        transition_times[MissionState::Takeoff as usize] = 0.0;

        Self {
            config,
            state: MissionState::Takeoff,
            transition_times,
        }
    }

    /// Evaluate the transition predicate for the current state and advance
    /// by at most one state.
    pub fn update(&mut self, input: &MissionInput) -> MissionState {
        let cfg = &self.config;

        let advance = match self.state {
            MissionState::Takeoff => cfg.cruise_height - input.position.z <= cfg.height_tolerance,
            MissionState::PursueTarget => {
                planar_distance(&input.position, &input.target.position) <= cfg.close_enough
            }
            MissionState::PursueGoal => {
                planar_distance(&input.position, &cfg.goal) <= cfg.close_enough
            }
            MissionState::Return => {
                let signal_done = input.mission_active == Some(false);
                let home_reached =
                    planar_distance(&input.position, &cfg.home.xy()) <= cfg.close_enough;
                match cfg.return_condition {
                    ReturnCondition::MissionSignal => signal_done,
                    ReturnCondition::ReachedHome => home_reached,
                    ReturnCondition::Either => signal_done || home_reached,
                }
            }
            MissionState::Land => false,
        };

        if advance {
            if let Some(next) = self.state.next() {
                self.transition_to(next, input.time);
            }
        }

        self.state
    }

    fn transition_to(&mut self, new_state: MissionState, time: f64) {
        tracing::info!(
            from = self.state.label(),
            to = new_state.label(),
            time,
            "mission transition"
        );
        self.state = new_state;
        self.transition_times[new_state as usize] = time;
    }

    /// Resolve the destination for the current state.
    pub fn destination(&self, target: &TargetPose) -> Destination {
        let cfg = &self.config;
        let home = cfg.home;

        match self.state {
            MissionState::Takeoff | MissionState::Return => {
                Destination::fixed(Vector3::new(home.x, home.y, cfg.cruise_height))
            }
            MissionState::PursueTarget => Destination {
                position: Vector3::new(target.position.x, target.position.y, cfg.cruise_height),
                velocity: Vector3::new(target.velocity.x, target.velocity.y, 0.0),
            },
            MissionState::PursueGoal => {
                Destination::fixed(Vector3::new(cfg.goal.x, cfg.goal.y, cfg.cruise_height))
            }
            MissionState::Land => Destination::fixed(home),
        }
    }

    pub fn rotate(&self) -> bool {
        self.state.rotation_enabled()
    }

    pub fn current_state(&self) -> MissionState {
        self.state
    }

    pub fn config(&self) -> &StateMachineConfig {
        &self.config
    }

    /// Time the given state was entered, or NaN if not reached yet.
    pub fn transition_time(&self, state: MissionState) -> f64 {
        self.transition_times[state as usize]
    }

    pub fn transition_times(&self) -> &[f64; NUM_STATES] {
        &self.transition_times
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> StateMachineConfig {
        StateMachineConfig {
            goal: Vector2::new(5.0, 5.0),
            ..Default::default()
        }
    }

    fn input(time: f64, position: Vector3<f64>, target: Vector2<f64>) -> MissionInput {
        MissionInput {
            time,
            position,
            target: TargetPose::at(target),
            mission_active: Some(true),
        }
    }

    /// Drive a fresh machine into PURSUE_TARGET.
    fn airborne() -> StateMachine {
        let mut sm = StateMachine::new(config());
        sm.update(&input(1.0, Vector3::new(0.0, 0.0, 2.0), Vector2::new(3.0, 0.0)));
        assert_eq!(sm.current_state(), MissionState::PursueTarget);
        sm
    }

    #[test]
    fn test_takeoff_waits_for_height() {
        let mut sm = StateMachine::new(config());
        assert!(!sm.rotate());

        let s = sm.update(&input(0.1, Vector3::new(0.0, 0.0, 1.0), Vector2::new(3.0, 0.0)));
        assert_eq!(s, MissionState::Takeoff);

        let s = sm.update(&input(0.2, Vector3::new(0.0, 0.0, 1.96), Vector2::new(3.0, 0.0)));
        assert_eq!(s, MissionState::PursueTarget);
        assert!(sm.rotate());
        assert_eq!(sm.transition_time(MissionState::PursueTarget), 0.2);
    }

    #[test]
    fn test_takeoff_accepts_overshoot() {
        let mut sm = StateMachine::new(config());
        let s = sm.update(&input(0.1, Vector3::new(0.0, 0.0, 2.0000001), Vector2::zeros()));
        assert_eq!(s, MissionState::PursueTarget);
    }

    #[test]
    fn test_far_target_stays_in_pursuit() {
        let mut sm = airborne();
        for i in 0..10 {
            let s = sm.update(&input(
                2.0 + i as f64,
                Vector3::new(0.0, 0.0, 2.0),
                Vector2::new(0.100_01, 0.0),
            ));
            assert_eq!(s, MissionState::PursueTarget);
        }
    }

    #[test]
    fn test_close_target_moves_to_goal() {
        let mut sm = airborne();
        // Altitude differs but only planar distance counts.
        let s = sm.update(&input(2.0, Vector3::new(3.0, 0.05, 9.0), Vector2::new(3.0, 0.0)));
        assert_eq!(s, MissionState::PursueGoal);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let mut sm = StateMachine::new(StateMachineConfig {
            close_enough: 0.5,
            ..config()
        });
        sm.update(&input(1.0, Vector3::new(0.0, 0.0, 2.0), Vector2::new(3.0, 0.0)));
        let s = sm.update(&input(2.0, Vector3::new(0.0, 0.0, 2.0), Vector2::new(0.5, 0.0)));
        assert_eq!(s, MissionState::PursueGoal);
    }

    #[test]
    fn test_one_transition_per_tick() {
        let mut sm = StateMachine::new(config());
        // Satisfies TAKEOFF, PURSUE_TARGET and PURSUE_GOAL predicates at once.
        let s = sm.update(&input(0.1, Vector3::new(5.0, 5.0, 2.0), Vector2::new(5.0, 5.0)));
        assert_eq!(s, MissionState::PursueTarget);
        let s = sm.update(&input(0.2, Vector3::new(5.0, 5.0, 2.0), Vector2::new(5.0, 5.0)));
        assert_eq!(s, MissionState::PursueGoal);
    }

    #[test]
    fn test_never_goes_back() {
        let mut sm = airborne();
        sm.update(&input(2.0, Vector3::new(3.0, 0.0, 2.0), Vector2::new(3.0, 0.0)));
        assert_eq!(sm.current_state(), MissionState::PursueGoal);

        // Altitude drops below cruise and the target is right below us:
        // neither TAKEOFF nor PURSUE_TARGET may come back.
        for i in 0..20 {
            let s = sm.update(&input(
                3.0 + i as f64,
                Vector3::new(3.0, 0.0, 0.5),
                Vector2::new(3.0, 0.0),
            ));
            assert!(s >= MissionState::PursueGoal, "went back to {}", s.label());
        }
    }

    #[test]
    fn test_return_waits_for_signal() {
        let mut sm = airborne();
        sm.update(&input(2.0, Vector3::new(3.0, 0.0, 2.0), Vector2::new(3.0, 0.0)));
        sm.update(&input(3.0, Vector3::new(5.0, 5.0, 2.0), Vector2::new(3.0, 0.0)));
        assert_eq!(sm.current_state(), MissionState::Return);

        // Back over home but the target is still running.
        let s = sm.update(&input(4.0, Vector3::new(0.0, 0.0, 2.0), Vector2::new(3.0, 0.0)));
        assert_eq!(s, MissionState::Return);

        // Unknown signal is not "finished".
        let mut unknown = input(5.0, Vector3::new(0.0, 0.0, 2.0), Vector2::new(3.0, 0.0));
        unknown.mission_active = None;
        assert_eq!(sm.update(&unknown), MissionState::Return);

        let mut done = input(6.0, Vector3::new(1.0, 1.0, 2.0), Vector2::new(3.0, 0.0));
        done.mission_active = Some(false);
        assert_eq!(sm.update(&done), MissionState::Land);
        assert!(!sm.rotate());

        // Terminal.
        assert_eq!(sm.update(&done), MissionState::Land);
    }

    #[test]
    fn test_return_on_reaching_home() {
        let mut sm = StateMachine::new(StateMachineConfig {
            return_condition: ReturnCondition::ReachedHome,
            ..config()
        });
        sm.update(&input(1.0, Vector3::new(0.0, 0.0, 2.0), Vector2::new(3.0, 0.0)));
        sm.update(&input(2.0, Vector3::new(3.0, 0.0, 2.0), Vector2::new(3.0, 0.0)));
        sm.update(&input(3.0, Vector3::new(5.0, 5.0, 2.0), Vector2::new(3.0, 0.0)));
        assert_eq!(sm.current_state(), MissionState::Return);

        let mut done = input(4.0, Vector3::new(2.0, 2.0, 2.0), Vector2::new(3.0, 0.0));
        done.mission_active = Some(false);
        assert_eq!(sm.update(&done), MissionState::Return);

        let s = sm.update(&input(5.0, Vector3::new(0.05, 0.0, 2.0), Vector2::new(3.0, 0.0)));
        assert_eq!(s, MissionState::Land);
    }

    #[test]
    fn test_destinations() {
        let mut sm = StateMachine::new(config());
        let target = TargetPose::moving(Vector2::new(3.0, 1.0), Vector2::new(0.2, -0.1));

        let d = sm.destination(&target);
        assert_eq!(d.position, Vector3::new(0.0, 0.0, 2.0));
        assert_eq!(d.velocity, Vector3::zeros());

        sm.update(&input(1.0, Vector3::new(0.0, 0.0, 2.0), Vector2::new(3.0, 1.0)));
        let d = sm.destination(&target);
        assert_eq!(d.position, Vector3::new(3.0, 1.0, 2.0));
        assert_eq!(d.velocity, Vector3::new(0.2, -0.1, 0.0));

        sm.update(&input(2.0, Vector3::new(3.0, 1.0, 2.0), Vector2::new(3.0, 1.0)));
        let d = sm.destination(&target);
        assert_eq!(d.position, Vector3::new(5.0, 5.0, 2.0));
    }

    #[test]
    fn test_transition_times_unreached_are_nan() {
        let sm = airborne();
        assert_eq!(sm.transition_time(MissionState::Takeoff), 0.0);
        assert_eq!(sm.transition_time(MissionState::PursueTarget), 1.0);
        assert!(sm.transition_time(MissionState::PursueGoal).is_nan());
        assert!(sm.transition_time(MissionState::Land).is_nan());
    }
}
