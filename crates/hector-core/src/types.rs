//! Snapshot types delivered by the estimator and target tracker.
//!
//! Every snapshot starts out as NaN, meaning "not yet received". The tick
//! loop refuses to plan until all required snapshots are finite.

use nalgebra::{UnitQuaternion, Vector2, Vector3};

// ---------------------------------------------------------------------------
// Vehicle pose
// ---------------------------------------------------------------------------

/// Vehicle position (world frame) and heading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vector3<f64>,
    /// Yaw angle (rad), counter-clockwise from world +x.
    pub heading: f64,
}

impl Pose {
    pub fn new(position: Vector3<f64>, heading: f64) -> Self {
        Self { position, heading }
    }

    /// Build a pose from an estimator orientation, keeping only yaw.
    pub fn from_orientation(position: Vector3<f64>, orientation: &UnitQuaternion<f64>) -> Self {
        let (_roll, _pitch, yaw) = orientation.euler_angles();
        Self::new(position, yaw)
    }

    pub fn unknown() -> Self {
        Self::new(Vector3::repeat(f64::NAN), f64::NAN)
    }

    pub fn is_valid(&self) -> bool {
        self.position.iter().all(|v| v.is_finite()) && self.heading.is_finite()
    }
}

// ---------------------------------------------------------------------------
// Vehicle velocity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Velocity {
    pub linear: Vector3<f64>,
    /// Yaw rate (rad/s).
    pub angular_z: f64,
}

impl Velocity {
    pub fn new(linear: Vector3<f64>, angular_z: f64) -> Self {
        Self { linear, angular_z }
    }

    pub fn unknown() -> Self {
        Self::new(Vector3::repeat(f64::NAN), f64::NAN)
    }

    pub fn is_valid(&self) -> bool {
        self.linear.iter().all(|v| v.is_finite()) && self.angular_z.is_finite()
    }
}

// ---------------------------------------------------------------------------
// Ground target
// ---------------------------------------------------------------------------

/// Planar position of the moving ground target.
///
/// `velocity` is the tracker's estimate and is zero when the tracker only
/// reports position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetPose {
    pub position: Vector2<f64>,
    pub velocity: Vector2<f64>,
}

impl TargetPose {
    pub fn at(position: Vector2<f64>) -> Self {
        Self {
            position,
            velocity: Vector2::zeros(),
        }
    }

    pub fn moving(position: Vector2<f64>, velocity: Vector2<f64>) -> Self {
        Self { position, velocity }
    }

    pub fn unknown() -> Self {
        Self::at(Vector2::repeat(f64::NAN))
    }

    pub fn is_valid(&self) -> bool {
        self.position.iter().all(|v| v.is_finite()) && self.velocity.iter().all(|v| v.is_finite())
    }
}

// ---------------------------------------------------------------------------
// Per-tick snapshot set
// ---------------------------------------------------------------------------

/// Latest value of every inbound signal, as seen by one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshots {
    pub pose: Pose,
    pub velocity: Velocity,
    pub target: TargetPose,
    /// Target-mission-active signal. `None` until the tracker first reports it.
    pub mission_active: Option<bool>,
}

impl Default for Snapshots {
    fn default() -> Self {
        Self {
            pose: Pose::unknown(),
            velocity: Velocity::unknown(),
            target: TargetPose::unknown(),
            mission_active: None,
        }
    }
}

impl Snapshots {
    /// True once pose, velocity and target have all been received.
    pub fn is_ready(&self) -> bool {
        self.pose.is_valid() && self.velocity.is_valid() && self.target.is_valid()
    }
}

/// Planar (x, y) distance, ignoring altitude.
pub fn planar_distance(a: &Vector3<f64>, b: &Vector2<f64>) -> f64 {
    (a.xy() - b).norm()
}
