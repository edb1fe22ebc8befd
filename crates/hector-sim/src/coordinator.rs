//! Per-tick coordination: drain snapshots, step the mission, plan, publish.

use crate::run_flag::RunFlag;
use crate::snapshot::SnapshotInbox;
use crate::topics::{OutputTopics, Path, PointStamped, WORLD_FRAME};
use hector_core::{
    ConfigError, Destination, MissionConfig, MissionInput, MissionParams, MissionState, Planner,
    StateMachine, Trajectory,
};
use std::thread;
use std::time::{Duration, Instant};

/// How often the startup wait re-checks the inbox.
const SNAPSHOT_POLL: Duration = Duration::from_millis(10);

/// What one tick produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub time: f64,
    pub state: MissionState,
    pub rotate: bool,
    pub destination: Destination,
    pub trajectory: Trajectory,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// A required snapshot is still missing; outputs were left untouched.
    Idle,
    Planned(TickReport),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub ticks: u64,
    pub idle_ticks: u64,
    pub final_state: MissionState,
}

pub struct TickCoordinator {
    machine: StateMachine,
    planner: Planner,
    inbox: SnapshotInbox,
    topics: OutputTopics,
    tick_period: Duration,
    verbose: bool,

    tick: u64,
    idle_ticks: u64,
    last: Option<TickReport>,
}

impl TickCoordinator {
    pub fn new(
        config: &MissionConfig,
        inbox: SnapshotInbox,
        topics: OutputTopics,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            machine: StateMachine::new(config.state_machine),
            planner: Planner::new(config.planner)?,
            inbox,
            topics,
            tick_period: config.tick_period(),
            verbose: config.verbose,
            tick: 0,
            idle_ticks: 0,
            last: None,
        })
    }

    /// Validate `params` and build a coordinator. On a configuration error
    /// the run flag is cleared so cooperating components shut down too.
    pub fn configure(
        params: &MissionParams,
        inbox: SnapshotInbox,
        topics: OutputTopics,
        flag: &RunFlag,
    ) -> Result<Self, ConfigError> {
        let result = params
            .validate()
            .and_then(|config| Self::new(&config, inbox, topics));
        if let Err(e) = &result {
            tracing::error!("Invalid configuration: {}", e);
            flag.stop();
        }
        result
    }

    /// Run one tick at mission time `time` (s).
    pub fn tick(&mut self, time: f64) -> TickOutcome {
        self.tick += 1;
        self.inbox.drain();

        let snaps = *self.inbox.latest();
        if !snaps.is_ready() {
            self.idle_ticks += 1;
            tracing::debug!(tick = self.tick, "snapshots not ready, idling");
            return TickOutcome::Idle;
        }

        let input = MissionInput {
            time,
            position: snaps.pose.position,
            target: snaps.target,
            mission_active: snaps.mission_active,
        };
        let state = self.machine.update(&input);
        let destination = self.machine.destination(&snaps.target);
        let trajectory = self
            .planner
            .plan(snaps.pose.position, snaps.velocity.linear, &destination);
        let rotate = self.machine.rotate();

        self.publish(rotate, &destination, &trajectory);

        if self.verbose {
            tracing::info!(
                tick = self.tick,
                waypoints = trajectory.len(),
                "{}",
                state.label()
            );
        }

        let report = TickReport {
            tick: self.tick,
            time,
            state,
            rotate,
            destination,
            trajectory,
        };
        self.last = Some(report.clone());
        TickOutcome::Planned(report)
    }

    fn publish(&self, rotate: bool, destination: &Destination, trajectory: &Trajectory) {
        self.topics.rotate.publish(rotate);
        self.topics.target.publish(PointStamped {
            frame_id: WORLD_FRAME,
            tick: self.tick,
            point: trajectory
                .current_target()
                .unwrap_or(destination.position),
        });
        self.topics
            .trajectory
            .publish(Path::from_waypoints(self.tick, &trajectory.waypoints));
        self.topics.state.publish(self.machine.current_state());
    }

    /// Block until every required snapshot has arrived. Returns false if the
    /// run flag was cleared first.
    pub fn wait_for_snapshots(&mut self, flag: &RunFlag) -> bool {
        while flag.is_running() {
            self.inbox.drain();
            if self.inbox.latest().is_ready() {
                return true;
            }
            thread::sleep(SNAPSHOT_POLL);
        }
        false
    }

    /// Fixed-rate loop. Returns once the run flag is cleared, and clears it
    /// on the way out so cooperating components stop as well.
    pub fn run(&mut self, flag: &RunFlag) -> RunSummary {
        if self.wait_for_snapshots(flag) {
            tracing::info!("===== BEGIN =====");
        }

        let start = Instant::now();
        let mut next = start;
        while flag.is_running() {
            self.tick(start.elapsed().as_secs_f64());

            next += self.tick_period;
            let now = Instant::now();
            if next > now {
                thread::sleep(next - now);
            } else {
                tracing::debug!(tick = self.tick, "tick overran its period");
                next = now;
            }
        }

        flag.stop();
        tracing::info!("===== END =====");
        self.summary()
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            ticks: self.tick,
            idle_ticks: self.idle_ticks,
            final_state: self.machine.current_state(),
        }
    }

    pub fn tick_period(&self) -> Duration {
        self.tick_period
    }

    pub fn state(&self) -> MissionState {
        self.machine.current_state()
    }

    pub fn machine(&self) -> &StateMachine {
        &self.machine
    }

    /// Output of the most recent tick that planned.
    pub fn last_report(&self) -> Option<&TickReport> {
        self.last.as_ref()
    }

    pub fn topics(&self) -> &OutputTopics {
        &self.topics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{channel, SnapshotSender};
    use hector_core::{Pose, TargetPose, Velocity};
    use nalgebra::{Vector2, Vector3};

    fn setup() -> (SnapshotSender, TickCoordinator) {
        let (tx, inbox) = channel();
        let config = MissionParams {
            goals: Some("4,4".into()),
            ..Default::default()
        }
        .validate()
        .unwrap();
        let coord = TickCoordinator::new(&config, inbox, OutputTopics::new()).unwrap();
        (tx, coord)
    }

    fn send_all(tx: &SnapshotSender, position: Vector3<f64>, target: Vector2<f64>) {
        tx.pose(Pose::new(position, 0.0));
        tx.velocity(Velocity::new(Vector3::zeros(), 0.0));
        tx.target(TargetPose::at(target));
    }

    #[test]
    fn test_idle_until_snapshots_arrive() {
        let (tx, mut coord) = setup();

        // Only part of the data is in at tick 1.
        tx.pose(Pose::new(Vector3::new(0.0, 0.0, 0.178), 0.0));
        assert_eq!(coord.tick(0.04), TickOutcome::Idle);
        assert!(coord.topics().trajectory.latest().is_none());
        assert!(coord.topics().rotate.latest().is_none());
        assert!(coord.last_report().is_none());

        send_all(&tx, Vector3::new(0.0, 0.0, 0.178), Vector2::new(3.0, 0.0));
        match coord.tick(0.08) {
            TickOutcome::Planned(report) => {
                assert_eq!(report.tick, 2);
                assert_eq!(report.state, MissionState::Takeoff);
                assert!(!report.rotate);
            }
            TickOutcome::Idle => panic!("expected a plan on tick 2"),
        }
        assert_eq!(coord.summary().idle_ticks, 1);
        assert_eq!(coord.topics().rotate.latest(), Some(false));
    }

    #[test]
    fn test_nan_snapshot_keeps_previous_output() {
        let (tx, mut coord) = setup();
        send_all(&tx, Vector3::new(0.0, 0.0, 0.178), Vector2::new(3.0, 0.0));
        coord.tick(0.04);
        let published = coord.topics().trajectory.latest().unwrap();
        let count = coord.topics().trajectory.publish_count();

        // Estimator glitches back to NaN.
        tx.pose(Pose::unknown());
        assert_eq!(coord.tick(0.08), TickOutcome::Idle);
        assert_eq!(coord.topics().trajectory.latest().unwrap(), published);
        assert_eq!(coord.topics().trajectory.publish_count(), count);
    }

    #[test]
    fn test_takeoff_plans_straight_up() {
        let (tx, mut coord) = setup();
        send_all(&tx, Vector3::new(0.0, 0.0, 0.178), Vector2::new(3.0, 0.0));
        let TickOutcome::Planned(report) = coord.tick(0.04) else {
            panic!("expected plan");
        };

        assert_eq!(report.destination.position, Vector3::new(0.0, 0.0, 2.0));
        let path = coord.topics().trajectory.latest().unwrap();
        assert_eq!(path.frame_id, "world");
        assert_eq!(*path.poses.last().unwrap(), Vector3::new(0.0, 0.0, 2.0));
        assert!(path.poses.iter().all(|p| p.x == 0.0 && p.y == 0.0));

        let target = coord.topics().target.latest().unwrap();
        assert_eq!(target.point, path.poses[0]);
    }

    #[test]
    fn test_pursuit_enables_rotation() {
        let (tx, mut coord) = setup();
        send_all(&tx, Vector3::new(0.0, 0.0, 2.0), Vector2::new(3.0, 0.0));
        let TickOutcome::Planned(report) = coord.tick(0.04) else {
            panic!("expected plan");
        };
        assert_eq!(report.state, MissionState::PursueTarget);
        assert!(report.rotate);
        assert_eq!(
            report.trajectory.waypoints.last().unwrap().position,
            Vector3::new(3.0, 0.0, 2.0)
        );
        assert_eq!(coord.topics().rotate.latest(), Some(true));
    }

    #[test]
    fn test_configure_failure_clears_flag() {
        let (_tx, inbox) = channel();
        let flag = RunFlag::new();
        let params = MissionParams {
            goals: Some("bad".into()),
            ..Default::default()
        };
        let result = TickCoordinator::configure(&params, inbox, OutputTopics::new(), &flag);
        assert!(matches!(result, Err(ConfigError::InvalidGoals { .. })));
        assert!(!flag.is_running());
    }

    #[test]
    fn test_run_stops_on_flag() {
        let (tx, inbox) = channel();
        let config = MissionParams {
            tick_rate_hz: 200.0,
            ..Default::default()
        }
        .validate()
        .unwrap();
        let mut coord = TickCoordinator::new(&config, inbox, OutputTopics::new()).unwrap();
        send_all(&tx, Vector3::new(0.0, 0.0, 0.178), Vector2::new(3.0, 0.0));

        let flag = RunFlag::new();
        let stopper = {
            let flag = flag.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(100));
                flag.stop();
            })
        };
        let summary = coord.run(&flag);
        stopper.join().unwrap();

        assert!(!flag.is_running());
        assert!(summary.ticks > 0);
        assert_eq!(summary.idle_ticks, 0);
        assert_eq!(summary.final_state, MissionState::Takeoff);
    }
}
