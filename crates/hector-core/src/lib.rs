//! # Hector Core
//!
//! Mission-level decision logic for the hector autopilot. This crate holds
//! only the code that runs every control tick and does no I/O:
//! - Snapshot types for pose, velocity and ground-target estimates
//! - Mission state machine (takeoff, pursuit, goal, return, land)
//! - Cubic Hermite point-to-point trajectory planner
//! - Startup configuration and goal-string parsing
//!
//! Everything that talks to the outside world (snapshot delivery, latched
//! outputs, the tick loop itself) lives in `hector-sim`.

pub mod config;
pub mod error;
pub mod state_machine;
pub mod trajectory;
pub mod types;

// Re-export core types
pub use config::{parse_goals, MissionConfig, MissionParams};
pub use error::ConfigError;
pub use state_machine::{
    Destination, MissionInput, MissionState, ReturnCondition, StateMachine, StateMachineConfig,
    NUM_STATES,
};
pub use trajectory::{Planner, PlannerConfig, Sampling, Trajectory, TrajectorySegment, Waypoint};
pub use types::{Pose, Snapshots, TargetPose, Velocity};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
