//! Hector Runtime Library
//!
//! Wires the mission core to the outside world: snapshot delivery, the
//! fixed-rate tick loop, latched outputs, and a simulated vehicle, estimator
//! and ground target to fly against.

pub mod coordinator;
pub mod live;
pub mod plant;
pub mod run_flag;
pub mod sim;
pub mod snapshot;
pub mod topics;

// Re-export main types
pub use coordinator::{RunSummary, TickCoordinator, TickOutcome, TickReport};
pub use live::{fly, LiveSummary};
pub use plant::{GroundTarget, Plant, PlantParams, VehicleState};
pub use run_flag::RunFlag;
pub use sim::{run_mission, SimParams, SimResult};
pub use snapshot::{channel, SnapshotInbox, SnapshotSender, SnapshotUpdate};
pub use topics::{Latched, OutputTopics, Path, PointStamped, WORLD_FRAME};
