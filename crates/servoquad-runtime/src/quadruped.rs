//! Stock four-legged layout built inside any [`SimulatedWorld`].
//!
//! ```text
//!            +Z (forward)
//!              ▲
//!   front_left │ front_right
//!        ●─────┼─────●
//!        │   torso   │      each leg: hip hinge → upper segment
//!        ●─────┼─────●                knee hinge → lower segment
//!   rear_left  │ rear_right
//! ```
//!
//! Every hinge turns about body `+X`.  Left-side servos are mounted mirrored
//! and use [`Direction::CounterClockwise`], so the same servo-space command
//! swings both sides of the robot the same way.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use servoquad_hal::schedule::CommitPolicy;
use servoquad_hal::servo::ServoActuator;
use servoquad_hal::world::SimulatedWorld;
use servoquad_types::{
    ActuatorProfile, BodyHandle, Direction, FrictionProfile, JointConfig, Pose, QuadError,
    RegulatorProfile, Vec3,
};
use tracing::info;

use crate::robot::{Leg, RobotController};

/// Leg names in build order.
pub const LEG_NAMES: [&str; 4] = ["front_left", "front_right", "rear_left", "rear_right"];

/// Shared tuning handed to every actuator of the robot.
#[derive(Debug, Clone, Default)]
pub struct ProfileSet {
    pub servo: Option<Arc<ActuatorProfile>>,
    pub position_regulator: Option<Arc<RegulatorProfile>>,
    pub velocity_regulator: Option<Arc<RegulatorProfile>>,
    pub friction: Option<Arc<FrictionProfile>>,
    pub commit_policy: CommitPolicy,
}

impl ProfileSet {
    fn apply(&self, mut servo: ServoActuator) -> ServoActuator {
        if let Some(profile) = &self.servo {
            servo = servo.with_profile(profile.clone());
        }
        if let Some(profile) = &self.position_regulator {
            servo = servo.with_position_regulator(profile.clone());
        }
        if let Some(profile) = &self.velocity_regulator {
            servo = servo.with_velocity_regulator(profile.clone());
        }
        if let Some(profile) = &self.friction {
            servo = servo.with_friction(profile.clone());
        }
        servo.with_commit_policy(self.commit_policy)
    }
}

/// Body dimensions and joint ranges, in metres and degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuadrupedLayout {
    /// Height of the hips above the ground plane.
    pub hip_height: f32,
    /// Lateral distance of each hip from the torso centreline.
    pub hip_half_width: f32,
    /// Longitudinal distance of each hip from the torso centre.
    pub hip_half_length: f32,
    pub upper_length: f32,
    pub lower_length: f32,
    pub hip_range: (f32, f32),
    pub knee_range: (f32, f32),
    pub forward_offset: f32,
}

impl Default for QuadrupedLayout {
    fn default() -> Self {
        Self {
            hip_height: 0.5,
            hip_half_width: 0.12,
            hip_half_length: 0.2,
            upper_length: 0.25,
            lower_length: 0.25,
            hip_range: (-60.0, 60.0),
            knee_range: (-110.0, 110.0),
            forward_offset: 0.0,
        }
    }
}

impl QuadrupedLayout {
    /// Reject non-positive segment lengths and malformed joint ranges.
    pub fn validate(&self) -> Result<(), QuadError> {
        if !(self.upper_length > 0.0 && self.lower_length > 0.0) {
            return Err(QuadError::Config(format!(
                "segment lengths must be > 0, got upper={} lower={}",
                self.upper_length, self.lower_length
            )));
        }
        self.joint(self.hip_range, 0.0, Direction::Clockwise)
            .validate("hip")?;
        self.joint(self.knee_range, 0.0, Direction::Clockwise)
            .validate("knee")
    }

    fn joint(&self, (min, max): (f32, f32), segment: f32, direction: Direction) -> JointConfig {
        JointConfig {
            min_angle: min,
            max_angle: max,
            ..JointConfig::default()
        }
        .with_anchor(Vec3::new(0.0, segment * 0.5, 0.0))
        .with_direction(direction)
    }
}

/// Add a torso and four two-segment legs to `world` and wire them into a
/// [`RobotController`].
///
/// The controller is returned uninitialized; call
/// [`RobotController::initialize`] before ticking it.
pub fn spawn_quadruped(
    world: &mut dyn SimulatedWorld,
    layout: &QuadrupedLayout,
    profiles: &ProfileSet,
) -> Result<RobotController, QuadError> {
    layout.validate()?;

    let torso = world.add_body(Pose::at(Vec3::new(0.0, layout.hip_height, 0.0)));
    let mut robot = RobotController::new(torso, layout.forward_offset);

    for name in LEG_NAMES {
        let left = name.ends_with("left");
        let front = name.starts_with("front");
        let direction = if left {
            Direction::CounterClockwise
        } else {
            Direction::Clockwise
        };
        let hip = Vec3::new(
            if left { -layout.hip_half_width } else { layout.hip_half_width },
            layout.hip_height,
            if front { layout.hip_half_length } else { -layout.hip_half_length },
        );

        let upper_body = world.add_body(Pose::at(hip - Vec3::UP * (layout.upper_length * 0.5)));
        let lower_body = world.add_body(Pose::at(
            hip - Vec3::UP * (layout.upper_length + layout.lower_length * 0.5),
        ));

        let upper = segment(
            format!("{name}_upper"),
            upper_body,
            torso,
            layout.joint(layout.hip_range, layout.upper_length, direction),
        );
        let lower = segment(
            format!("{name}_lower"),
            lower_body,
            upper_body,
            layout.joint(layout.knee_range, layout.lower_length, direction),
        );

        robot = robot.with_leg(
            Leg::new(name)
                .with_upper(profiles.apply(upper))
                .with_lower(profiles.apply(lower)),
        );
    }

    info!(bodies = world.body_count(), legs = LEG_NAMES.len(), "quadruped spawned");
    Ok(robot)
}

fn segment(name: String, body: BodyHandle, parent: BodyHandle, joint: JointConfig) -> ServoActuator {
    ServoActuator::new(name, body, Some(parent), joint)
}
