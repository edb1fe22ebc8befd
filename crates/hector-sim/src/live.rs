//! Real-time flight: the coordinator's fixed-rate loop on the calling thread
//! and the simulated plant on a producer thread, talking only through
//! snapshots in and latched topics out.

use crate::coordinator::{RunSummary, TickCoordinator};
use crate::plant::Plant;
use crate::run_flag::RunFlag;
use crate::sim::{SimParams, LANDED_TOLERANCE};
use crate::snapshot::{channel, SnapshotSender};
use crate::topics::OutputTopics;
use hector_core::{ConfigError, MissionState};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiveSummary {
    pub run: RunSummary,
    /// Landed back on home before `max_time`.
    pub completed: bool,
    /// Plant time when the run ended (s).
    pub flight_time: f64,
}

#[derive(Debug, Default)]
struct PlantOutcome {
    completed: bool,
    flight_time: f64,
}

/// Fly a mission in wall-clock time. Blocks until the vehicle has landed,
/// `max_time` has passed, or `flag` is cleared from elsewhere.
pub fn fly(p: &SimParams, flag: &RunFlag) -> Result<LiveSummary, ConfigError> {
    let (tx, inbox) = channel();
    let topics = OutputTopics::new();
    let mut coord = TickCoordinator::configure(&p.mission, inbox, topics.clone(), flag)?;

    let plant = p
        .target_goals()
        .and_then(|goals| Plant::new(&p.plant, p.mission.home(), goals));
    let plant = match plant {
        Ok(plant) => plant,
        Err(e) => {
            tracing::error!("Invalid plant configuration: {}", e);
            flag.stop();
            return Err(e);
        }
    };

    let producer = {
        let flag = flag.clone();
        let topics = topics.clone();
        let period = coord.tick_period();
        let max_time = p.max_time;
        thread::spawn(move || drive_plant(plant, tx, topics, flag, period, max_time))
    };

    let run = coord.run(flag);
    let outcome = producer.join().unwrap_or_else(|_| {
        tracing::error!("plant thread panicked");
        PlantOutcome::default()
    });

    Ok(LiveSummary {
        run,
        completed: outcome.completed,
        flight_time: outcome.flight_time,
    })
}

fn drive_plant(
    mut plant: Plant,
    tx: SnapshotSender,
    topics: OutputTopics,
    flag: RunFlag,
    period: Duration,
    max_time: f64,
) -> PlantOutcome {
    let dt = period.as_secs_f64();
    let home = plant.home();
    let mut completed = false;
    let mut next = Instant::now();

    while flag.is_running() {
        plant.publish(&tx);

        next += period;
        let now = Instant::now();
        if next > now {
            thread::sleep(next - now);
        }

        let command = topics.target.latest().map(|msg| msg.point);
        let rotate = topics.rotate.latest().unwrap_or(false);
        plant.step(dt, command, rotate);

        let landed = topics.state.latest() == Some(MissionState::Land)
            && (plant.vehicle().position - home).norm() <= LANDED_TOLERANCE;
        if landed {
            tracing::info!(time = plant.time(), "vehicle landed");
            completed = true;
            break;
        }
        if plant.time() >= max_time {
            tracing::warn!(max_time, "mission did not finish in time");
            break;
        }
    }

    flag.stop();
    PlantOutcome {
        completed,
        flight_time: plant.time(),
    }
}
