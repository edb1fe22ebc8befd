//! Kinematic stand-ins for everything around the mission core: the motion
//! controller and airframe, the pose/velocity estimator, and the ground
//! target with its tracker.

use crate::snapshot::SnapshotSender;
use hector_core::{ConfigError, Pose, TargetPose, Velocity};
use nalgebra::{UnitQuaternion, Vector2, Vector3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::f64::consts::{PI, TAU};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------
const SUBSTEPS: usize = 4;

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------
#[derive(Debug, Clone)]
pub struct PlantParams {
    // Motion controller
    pub position_gain: f64, // 1/s
    pub max_speed: f64,     // m/s
    pub velocity_tau: f64,  // s, first-order response of the airframe
    pub spin_rate: f64,     // rad/s while rotation is enabled

    // Ground target
    pub target_start: Vector2<f64>,
    pub target_speed: f64, // m/s

    // Estimator
    pub estimator_delay: f64,    // s before the first pose/velocity estimate
    pub pose_noise_std: f64,     // m
    pub velocity_noise_std: f64, // m/s
    pub seed: u64,
}

impl Default for PlantParams {
    fn default() -> Self {
        Self {
            position_gain: 3.0,
            max_speed: 4.0,
            velocity_tau: 0.1,
            spin_rate: 1.0,
            target_start: Vector2::new(2.0, 1.0),
            target_speed: 0.22,
            estimator_delay: 0.2,
            pose_noise_std: 0.005,
            velocity_noise_std: 0.01,
            seed: 42,
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleState {
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub heading: f64,
    pub yaw_rate: f64,
}

/// Ground target driving through its own list of goals.
#[derive(Debug, Clone)]
pub struct GroundTarget {
    pub position: Vector2<f64>,
    pub velocity: Vector2<f64>,
    goals: Vec<Vector2<f64>>,
    next_goal: usize,
    speed: f64,
}

impl GroundTarget {
    pub fn new(start: Vector2<f64>, goals: Vec<Vector2<f64>>, speed: f64) -> Self {
        Self {
            position: start,
            velocity: Vector2::zeros(),
            goals,
            next_goal: 0,
            speed,
        }
    }

    /// True once the last goal has been reached.
    pub fn is_done(&self) -> bool {
        self.next_goal >= self.goals.len()
    }

    fn step(&mut self, dt: f64) {
        let Some(goal) = self.goals.get(self.next_goal).copied() else {
            self.velocity = Vector2::zeros();
            return;
        };

        let to_goal = goal - self.position;
        let dist = to_goal.norm();
        let reach = self.speed * dt;
        if dist <= reach {
            self.position = goal;
            self.next_goal += 1;
            self.velocity = Vector2::zeros();
        } else {
            self.velocity = to_goal / dist * self.speed;
            self.position += self.velocity * dt;
        }
    }
}

// ---------------------------------------------------------------------------
// Plant
// ---------------------------------------------------------------------------
pub struct Plant {
    params: PlantParams,
    home: Vector3<f64>,
    time: f64,
    vehicle: VehicleState,
    target: GroundTarget,
    rng: StdRng,
    pose_noise: Normal<f64>,
    velocity_noise: Normal<f64>,
}

impl Plant {
    /// Vehicle starts at rest on `home`; the target heads through `target_goals`.
    pub fn new(
        params: &PlantParams,
        home: Vector3<f64>,
        target_goals: Vec<Vector2<f64>>,
    ) -> Result<Self, ConfigError> {
        let pose_noise = noise("pose_noise_std", params.pose_noise_std)?;
        let velocity_noise = noise("velocity_noise_std", params.velocity_noise_std)?;
        for (name, value) in [
            ("position_gain", params.position_gain),
            ("max_speed", params.max_speed),
            ("velocity_tau", params.velocity_tau),
            ("target_speed", params.target_speed),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NotPositive { name, value });
            }
        }

        Ok(Self {
            params: params.clone(),
            home,
            time: 0.0,
            vehicle: VehicleState {
                position: home,
                velocity: Vector3::zeros(),
                heading: 0.0,
                yaw_rate: 0.0,
            },
            target: GroundTarget::new(params.target_start, target_goals, params.target_speed),
            rng: StdRng::seed_from_u64(params.seed),
            pose_noise,
            velocity_noise,
        })
    }

    /// Publish what the estimator and tracker currently know.
    pub fn publish(&mut self, tx: &SnapshotSender) {
        if self.time >= self.params.estimator_delay {
            let v = &self.vehicle;
            let pos_noise = Vector3::from_fn(|_, _| self.pose_noise.sample(&mut self.rng));
            let vel_noise = Vector3::from_fn(|_, _| self.velocity_noise.sample(&mut self.rng));
            let orientation = UnitQuaternion::from_euler_angles(0.0, 0.0, v.heading);

            tx.pose(Pose::from_orientation(v.position + pos_noise, &orientation));
            tx.velocity(Velocity::new(v.velocity + vel_noise, v.yaw_rate));
        }

        tx.target(TargetPose::moving(self.target.position, self.target.velocity));
        tx.mission_active(!self.target.is_done());
    }

    /// Advance by `dt`, chasing `command` (the latched target point) if any.
    pub fn step(&mut self, dt: f64, command: Option<Vector3<f64>>, rotate: bool) {
        let p = &self.params;
        let sub = dt / SUBSTEPS as f64;
        let alpha = (sub / p.velocity_tau).min(1.0);
        let v = &mut self.vehicle;

        v.yaw_rate = if rotate { p.spin_rate } else { 0.0 };

        for _ in 0..SUBSTEPS {
            let v_cmd = match command {
                Some(point) => {
                    let raw = (point - v.position) * p.position_gain;
                    let speed = raw.norm();
                    if speed > p.max_speed {
                        raw * (p.max_speed / speed)
                    } else {
                        raw
                    }
                }
                None => Vector3::zeros(),
            };

            v.velocity += (v_cmd - v.velocity) * alpha;
            v.position += v.velocity * sub;

            // Resting on the ground.
            if v.position.z < self.home.z {
                v.position.z = self.home.z;
                v.velocity.z = v.velocity.z.max(0.0);
            }

            v.heading = (v.heading + v.yaw_rate * sub + PI).rem_euclid(TAU) - PI;
        }

        self.target.step(dt);
        self.time += dt;
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn vehicle(&self) -> &VehicleState {
        &self.vehicle
    }

    pub fn target(&self) -> &GroundTarget {
        &self.target
    }

    pub fn home(&self) -> Vector3<f64> {
        self.home
    }
}

fn noise(name: &'static str, std_dev: f64) -> Result<Normal<f64>, ConfigError> {
    Normal::new(0.0, std_dev)
        .ok()
        .filter(|_| std_dev.is_finite() && std_dev >= 0.0)
        .ok_or(ConfigError::Negative {
            name,
            value: std_dev,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::channel;
    use approx::assert_relative_eq;

    fn quiet() -> PlantParams {
        PlantParams {
            pose_noise_std: 0.0,
            velocity_noise_std: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_target_visits_goals_then_stops() {
        let mut target = GroundTarget::new(
            Vector2::zeros(),
            vec![Vector2::new(1.0, 0.0), Vector2::new(1.0, 1.0)],
            0.5,
        );
        for _ in 0..100 {
            target.step(0.1);
        }
        assert!(target.is_done());
        assert_eq!(target.position, Vector2::new(1.0, 1.0));
        assert_eq!(target.velocity, Vector2::zeros());
    }

    #[test]
    fn test_estimator_warm_up() {
        let home = Vector3::new(0.0, 0.0, 0.178);
        let mut plant = Plant::new(&quiet(), home, vec![]).unwrap();
        let (tx, mut inbox) = channel();

        plant.publish(&tx);
        inbox.drain();
        assert!(!inbox.latest().pose.is_valid());
        assert!(inbox.latest().target.is_valid());
        // No goals at all: the target has nothing left to do.
        assert_eq!(inbox.latest().mission_active, Some(false));

        for _ in 0..10 {
            plant.step(0.04, None, false);
        }
        plant.publish(&tx);
        inbox.drain();
        assert!(inbox.latest().is_ready());
        assert_relative_eq!(inbox.latest().pose.position, home);
    }

    #[test]
    fn test_vehicle_reaches_command() {
        let home = Vector3::new(0.0, 0.0, 0.178);
        let mut plant = Plant::new(&quiet(), home, vec![]).unwrap();
        let goal = Vector3::new(1.0, -1.0, 2.0);
        for _ in 0..250 {
            plant.step(0.04, Some(goal), true);
        }
        assert_relative_eq!(plant.vehicle().position, goal, epsilon = 1e-3);
        assert!(plant.vehicle().heading.abs() <= PI);
        assert_eq!(plant.vehicle().yaw_rate, 1.0);
    }

    #[test]
    fn test_ground_clamp() {
        let home = Vector3::new(0.0, 0.0, 0.178);
        let mut plant = Plant::new(&quiet(), home, vec![]).unwrap();
        for _ in 0..50 {
            plant.step(0.04, Some(Vector3::new(0.0, 0.0, -5.0)), false);
        }
        assert_eq!(plant.vehicle().position.z, 0.178);
    }

    #[test]
    fn test_rejects_negative_noise() {
        let params = PlantParams {
            pose_noise_std: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            Plant::new(&params, Vector3::zeros(), vec![]),
            Err(ConfigError::Negative { name: "pose_noise_std", .. })
        ));
    }
}
