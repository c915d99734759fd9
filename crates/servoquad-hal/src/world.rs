//! Physics-engine interface consumed by the actuator core.
//!
//! The core only ever *reads* body poses and angular velocities and *writes*
//! torques and hinge commands.  Engines (or the in-process
//! [`SimWorld`][crate::sim::SimWorld]) implement [`PhysicsWorld`]; the core is
//! handed a `&mut dyn PhysicsWorld` for the duration of a call and never keeps
//! it.
//!
//! Angles and hinge velocities are in degrees; body angular velocities are in
//! radians per second, world frame.

use servoquad_types::{BodyHandle, JointHandle, Pose, QuadError, Vec3};

/// Motor command written to a hinge every control tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JointMotor {
    /// Desired hinge velocity in degrees per second.
    pub target_velocity: f32,
    /// Maximum force the motor may spend reaching `target_velocity`.
    pub max_force: f32,
}

/// Angular travel window of a hinge constraint, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointLimits {
    pub min: f32,
    pub max: f32,
}

impl JointLimits {
    /// Window from `min` to `max` degrees.
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }
}

/// Everything a physics engine needs to create a servo hinge.
///
/// `anchor` and `axis` are in the controlled body's local frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HingeSpec {
    pub body: BodyHandle,
    pub parent: Option<BodyHandle>,
    pub anchor: Vec3,
    pub axis: Vec3,
    pub limits: JointLimits,
}

/// Read/write surface of a rigid-body physics engine.
///
/// Every method fails with [`QuadError::UnknownBody`] or
/// [`QuadError::UnknownJoint`] when handed a handle the world does not own.
pub trait PhysicsWorld {
    /// World-space pose of `body`.
    fn pose(&self, body: BodyHandle) -> Result<Pose, QuadError>;

    /// World-space angular velocity of `body` in radians per second.
    fn angular_velocity(&self, body: BodyHandle) -> Result<Vec3, QuadError>;

    /// Accumulate a world-space torque on `body` for the next physics step.
    fn add_torque(&mut self, body: BodyHandle, torque: Vec3) -> Result<(), QuadError>;

    /// Create a hinge joining `spec.body` to `spec.parent` (or to the world).
    /// The hinge starts with its motor disabled.
    fn create_hinge(&mut self, spec: HingeSpec) -> Result<JointHandle, QuadError>;

    fn set_motor(&mut self, joint: JointHandle, motor: JointMotor) -> Result<(), QuadError>;

    fn set_motor_enabled(&mut self, joint: JointHandle, enabled: bool) -> Result<(), QuadError>;

    fn set_limits(&mut self, joint: JointHandle, limits: JointLimits) -> Result<(), QuadError>;
}

/// A [`PhysicsWorld`] that owns its bodies and can be advanced by a
/// fixed-step driver.
///
/// Bodies start kinematic: they follow the velocities set on them until a
/// hinge takes them over.
pub trait SimulatedWorld: PhysicsWorld {
    /// Add a body at `pose` and return its handle.
    fn add_body(&mut self, pose: Pose) -> BodyHandle;

    /// Number of bodies added so far.
    fn body_count(&self) -> usize;

    /// Impose a world-space linear velocity in metres per second.
    fn set_linear_velocity(&mut self, body: BodyHandle, velocity: Vec3) -> Result<(), QuadError>;

    /// Impose a world-space angular velocity in radians per second.
    fn set_angular_velocity(&mut self, body: BodyHandle, velocity: Vec3)
    -> Result<(), QuadError>;

    /// Integrate the world forward by `dt` seconds and clear accumulated
    /// torques.
    fn step(&mut self, dt: f32);
}

#[cfg(test)]
mod tests {
    use super::*;
    use servoquad_types::Quaternion;

    /// World with a single body that records the last command it saw.
    #[derive(Default)]
    struct RecordingWorld {
        torque: Vec3,
        motor: Option<JointMotor>,
        limits: Option<JointLimits>,
        enabled: bool,
    }

    impl PhysicsWorld for RecordingWorld {
        fn pose(&self, body: BodyHandle) -> Result<Pose, QuadError> {
            match body.0 {
                0 => Ok(Pose::new(Vec3::ZERO, Quaternion::identity())),
                _ => Err(QuadError::UnknownBody(body)),
            }
        }

        fn angular_velocity(&self, body: BodyHandle) -> Result<Vec3, QuadError> {
            self.pose(body).map(|_| Vec3::ZERO)
        }

        fn add_torque(&mut self, body: BodyHandle, torque: Vec3) -> Result<(), QuadError> {
            self.pose(body)?;
            self.torque += torque;
            Ok(())
        }

        fn create_hinge(&mut self, spec: HingeSpec) -> Result<JointHandle, QuadError> {
            self.pose(spec.body)?;
            self.limits = Some(spec.limits);
            Ok(JointHandle(0))
        }

        fn set_motor(&mut self, _joint: JointHandle, motor: JointMotor) -> Result<(), QuadError> {
            self.motor = Some(motor);
            Ok(())
        }

        fn set_motor_enabled(&mut self, _joint: JointHandle, enabled: bool) -> Result<(), QuadError> {
            self.enabled = enabled;
            Ok(())
        }

        fn set_limits(&mut self, _joint: JointHandle, limits: JointLimits) -> Result<(), QuadError> {
            self.limits = Some(limits);
            Ok(())
        }
    }

    #[test]
    fn trait_is_object_safe() {
        let mut world = RecordingWorld::default();
        let dyn_world: &mut dyn PhysicsWorld = &mut world;
        let joint = dyn_world
            .create_hinge(HingeSpec {
                body: BodyHandle(0),
                parent: None,
                anchor: Vec3::ZERO,
                axis: Vec3::RIGHT,
                limits: JointLimits::new(-10.0, 10.0),
            })
            .unwrap();
        dyn_world
            .set_motor(
                joint,
                JointMotor {
                    target_velocity: 5.0,
                    max_force: 1.0,
                },
            )
            .unwrap();
        assert_eq!(world.motor.unwrap().target_velocity, 5.0);
        assert_eq!(world.limits, Some(JointLimits::new(-10.0, 10.0)));
    }

    #[test]
    fn unknown_body_is_reported() {
        let mut world = RecordingWorld::default();
        let err = world.add_torque(BodyHandle(3), Vec3::UP).unwrap_err();
        assert_eq!(err, QuadError::UnknownBody(BodyHandle(3)));
        assert_eq!(world.torque, Vec3::ZERO);
    }
}
