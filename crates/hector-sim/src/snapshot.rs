//! Last-writer-wins delivery of inbound snapshots.
//!
//! Producers (estimator, tracker, mission signal) push whole values through a
//! [`SnapshotSender`]. The tick loop owns the matching [`SnapshotInbox`] and
//! drains it exactly once at the start of every tick, so a tick never sees a
//! value change under it.

use hector_core::{Pose, Snapshots, TargetPose, Velocity};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SnapshotUpdate {
    Pose(Pose),
    Velocity(Velocity),
    Target(TargetPose),
    MissionActive(bool),
}

/// Producer handle. Cheap to clone, one per collaborator.
#[derive(Debug, Clone)]
pub struct SnapshotSender {
    tx: Sender<SnapshotUpdate>,
}

impl SnapshotSender {
    /// Returns false once the inbox has been dropped.
    pub fn send(&self, update: SnapshotUpdate) -> bool {
        self.tx.send(update).is_ok()
    }

    pub fn pose(&self, pose: Pose) -> bool {
        self.send(SnapshotUpdate::Pose(pose))
    }

    pub fn velocity(&self, velocity: Velocity) -> bool {
        self.send(SnapshotUpdate::Velocity(velocity))
    }

    pub fn target(&self, target: TargetPose) -> bool {
        self.send(SnapshotUpdate::Target(target))
    }

    pub fn mission_active(&self, active: bool) -> bool {
        self.send(SnapshotUpdate::MissionActive(active))
    }
}

pub struct SnapshotInbox {
    rx: Receiver<SnapshotUpdate>,
    latest: Snapshots,
    disconnected: bool,
}

/// Create a connected sender/inbox pair. The inbox starts with every
/// snapshot unknown.
pub fn channel() -> (SnapshotSender, SnapshotInbox) {
    let (tx, rx) = mpsc::channel();
    (
        SnapshotSender { tx },
        SnapshotInbox {
            rx,
            latest: Snapshots::default(),
            disconnected: false,
        },
    )
}

impl SnapshotInbox {
    /// Apply every pending update, later ones overwriting earlier ones.
    /// Returns the number of updates applied.
    pub fn drain(&mut self) -> usize {
        let mut applied = 0;
        loop {
            match self.rx.try_recv() {
                Ok(update) => {
                    self.apply(update);
                    applied += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.disconnected {
                        tracing::warn!("all snapshot producers disconnected");
                        self.disconnected = true;
                    }
                    break;
                }
            }
        }
        applied
    }

    fn apply(&mut self, update: SnapshotUpdate) {
        match update {
            SnapshotUpdate::Pose(p) => self.latest.pose = p,
            SnapshotUpdate::Velocity(v) => self.latest.velocity = v,
            SnapshotUpdate::Target(t) => self.latest.target = t,
            SnapshotUpdate::MissionActive(a) => self.latest.mission_active = Some(a),
        }
    }

    pub fn latest(&self) -> &Snapshots {
        &self.latest
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Vector2, Vector3};

    #[test]
    fn test_nothing_until_drained() {
        let (tx, mut inbox) = channel();
        tx.target(TargetPose::at(Vector2::new(1.0, 2.0)));
        assert!(!inbox.latest().target.is_valid());

        assert_eq!(inbox.drain(), 1);
        assert_eq!(inbox.latest().target.position, Vector2::new(1.0, 2.0));
    }

    #[test]
    fn test_last_writer_wins() {
        let (tx, mut inbox) = channel();
        for i in 0..5 {
            tx.pose(Pose::new(Vector3::new(i as f64, 0.0, 1.0), 0.0));
        }
        tx.mission_active(true);
        tx.mission_active(false);

        assert_eq!(inbox.drain(), 7);
        assert_eq!(inbox.latest().pose.position.x, 4.0);
        assert_eq!(inbox.latest().mission_active, Some(false));
        // Velocity never sent.
        assert!(!inbox.latest().is_ready());
    }

    #[test]
    fn test_values_survive_disconnect() {
        let (tx, mut inbox) = channel();
        tx.velocity(Velocity::new(Vector3::new(0.5, 0.0, 0.0), 0.1));
        drop(tx);

        inbox.drain();
        assert!(inbox.is_disconnected());
        assert_eq!(inbox.latest().velocity.linear.x, 0.5);
        assert_eq!(inbox.drain(), 0);
    }
}
