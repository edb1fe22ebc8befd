//! Latched outbound topics for the motion controller.
//!
//! A latched topic keeps its most recent message so that a subscriber that
//! attaches late still receives it. Handles are cheap clones of the same
//! underlying slot.

use hector_core::{MissionState, Waypoint};
use nalgebra::Vector3;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};

/// Frame every outbound point is expressed in.
pub const WORLD_FRAME: &str = "world";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointStamped {
    pub frame_id: &'static str,
    pub tick: u64,
    pub point: Vector3<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Path {
    pub frame_id: &'static str,
    pub tick: u64,
    pub poses: Vec<Vector3<f64>>,
}

impl Path {
    pub fn from_waypoints(tick: u64, waypoints: &[Waypoint]) -> Self {
        Self {
            frame_id: WORLD_FRAME,
            tick,
            poses: waypoints.iter().map(|w| w.position).collect(),
        }
    }
}

#[derive(Debug)]
struct Slot<T> {
    value: Option<T>,
    publish_count: u64,
}

/// A single latched topic.
#[derive(Debug)]
pub struct Latched<T> {
    slot: Arc<Mutex<Slot<T>>>,
}

impl<T> Clone for Latched<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Default for Latched<T> {
    fn default() -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot {
                value: None,
                publish_count: 0,
            })),
        }
    }
}

impl<T: Clone> Latched<T> {
    pub fn publish(&self, value: T) {
        let mut slot = self.lock();
        slot.value = Some(value);
        slot.publish_count += 1;
    }

    /// Last published value, if any.
    pub fn latest(&self) -> Option<T> {
        self.lock().value.clone()
    }

    pub fn publish_count(&self) -> u64 {
        self.lock().publish_count
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        // Every write replaces the whole value, so a poisoned slot is still consistent.
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Everything the tick loop publishes.
#[derive(Debug, Clone, Default)]
pub struct OutputTopics {
    pub rotate: Latched<bool>,
    pub target: Latched<PointStamped>,
    pub trajectory: Latched<Path>,
    /// Diagnostic only; the motion controller does not consume it.
    pub state: Latched<MissionState>,
}

impl OutputTopics {
    pub fn new() -> Self {
        Self::default()
    }
}
