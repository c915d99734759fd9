//! Small deterministic hinge world for unit tests and headless CI.
//!
//! Full rigid-body dynamics live in the `servoquad-rapier` crate; both
//! implement [`SimulatedWorld`], so the same robot runs on either.
//!
//! [`SimWorld`] is deliberately small: no gravity, no contacts and no
//! collision.  Bodies that are not driven by a hinge are *kinematic*: they
//! move with whatever linear and angular velocity was last set on them and
//! ignore torque.  Hinge-driven bodies are placed every step from their
//! parent's pose and the hinge angle, which the hinge integrates from its
//! motor (a force-limited velocity servo) and the torque accumulated on the
//! body along the hinge axis.
//!
//! A body carries at most one hinge; creating another one retires the
//! previous handle.  Hinges are advanced in creation order, so a hinge must be
//! created after the hinge that moves its parent.
//!
//! # Example
//!
//! ```rust
//! use servoquad_hal::sim::SimWorld;
//! use servoquad_hal::world::{HingeSpec, JointLimits, JointMotor, PhysicsWorld};
//! use servoquad_types::{BodyHandle, Pose, Vec3};
//!
//! let mut world = SimWorld::builder()
//!     .body(Pose::default())
//!     .body(Pose::at(Vec3::new(0.0, -1.0, 0.0)))
//!     .build();
//!
//! let joint = world
//!     .create_hinge(HingeSpec {
//!         body: BodyHandle(1),
//!         parent: Some(BodyHandle(0)),
//!         anchor: Vec3::new(0.0, 1.0, 0.0),
//!         axis: Vec3::RIGHT,
//!         limits: JointLimits::new(-45.0, 45.0),
//!     })
//!     .unwrap();
//! world.set_motor_enabled(joint, true).unwrap();
//! world
//!     .set_motor(joint, JointMotor { target_velocity: 90.0, max_force: 100.0 })
//!     .unwrap();
//!
//! for _ in 0..60 {
//!     world.step(1.0 / 60.0);
//! }
//! // Driven into the upper limit.
//! assert!((world.hinge_angle(joint).unwrap() - 45.0).abs() < 1e-4);
//! ```

use servoquad_types::math::{DEG_TO_RAD, RAD_TO_DEG};
use servoquad_types::{BodyHandle, JointHandle, Pose, QuadError, Quaternion, Vec3};
use tracing::debug;

use crate::world::{HingeSpec, JointLimits, JointMotor, PhysicsWorld, SimulatedWorld};

/// Rotational inertia assigned to bodies added without an explicit value.
pub const DEFAULT_INERTIA: f32 = 0.1;

// ────────────────────────────────────────────────────────────────────────────
// Internal state
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct SimBody {
    pose: Pose,
    linear_velocity: Vec3,
    /// World frame, radians per second.
    angular_velocity: Vec3,
    torque: Vec3,
    inertia: f32,
    /// Index of the hinge placing this body, if any.
    driven_by: Option<usize>,
}

impl SimBody {
    fn new(pose: Pose, inertia: f32) -> Self {
        Self {
            pose,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            torque: Vec3::ZERO,
            inertia,
            driven_by: None,
        }
    }
}

/// Hinge geometry is captured relative to the parent frame (or the world
/// frame) at creation; the angle is zero in that configuration.
#[derive(Debug, Clone)]
struct SimHinge {
    body: BodyHandle,
    parent: Option<BodyHandle>,
    anchor_in_parent: Vec3,
    axis_in_parent: Vec3,
    rest_rotation: Quaternion,
    rest_offset: Vec3,
    angle: f32,
    /// Degrees per second.
    velocity: f32,
    motor: JointMotor,
    motor_enabled: bool,
    limits: JointLimits,
}

// ────────────────────────────────────────────────────────────────────────────
// SimWorld
// ────────────────────────────────────────────────────────────────────────────

/// Minimal rigid-body world implementing [`PhysicsWorld`] and
/// [`SimulatedWorld`].
#[derive(Debug, Clone, Default)]
pub struct SimWorld {
    bodies: Vec<SimBody>,
    hinges: Vec<Option<SimHinge>>,
}

impl SimWorld {
    /// Create an empty world.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start laying out bodies with a [`SimWorldBuilder`].
    pub fn builder() -> SimWorldBuilder {
        SimWorldBuilder::default()
    }

    /// Add a kinematic body with [`DEFAULT_INERTIA`].
    pub fn add_body(&mut self, pose: Pose) -> BodyHandle {
        self.add_body_with_inertia(pose, DEFAULT_INERTIA)
    }

    /// Add a kinematic body with an explicit rotational inertia.
    pub fn add_body_with_inertia(&mut self, pose: Pose, inertia: f32) -> BodyHandle {
        self.bodies.push(SimBody::new(pose, inertia.max(f32::EPSILON)));
        BodyHandle(self.bodies.len() - 1)
    }

    /// Number of bodies added so far.
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Number of live (non-retired) hinges.
    pub fn hinge_count(&self) -> usize {
        self.hinges.iter().flatten().count()
    }

    /// Teleport a body.  Hinge-driven bodies are placed again on the next
    /// [`step`][Self::step].
    pub fn set_pose(&mut self, body: BodyHandle, pose: Pose) -> Result<(), QuadError> {
        self.body_mut(body)?.pose = pose;
        Ok(())
    }

    /// Set a world-frame linear velocity in metres per second.
    pub fn set_linear_velocity(&mut self, body: BodyHandle, velocity: Vec3) -> Result<(), QuadError> {
        self.body_mut(body)?.linear_velocity = velocity;
        Ok(())
    }

    /// Set a world-frame angular velocity in radians per second.
    pub fn set_angular_velocity(
        &mut self,
        body: BodyHandle,
        velocity: Vec3,
    ) -> Result<(), QuadError> {
        self.body_mut(body)?.angular_velocity = velocity;
        Ok(())
    }

    /// Linear velocity of `body`.
    pub fn linear_velocity(&self, body: BodyHandle) -> Result<Vec3, QuadError> {
        Ok(self.body(body)?.linear_velocity)
    }

    /// Torque accumulated on `body` since the last step.
    pub fn accumulated_torque(&self, body: BodyHandle) -> Result<Vec3, QuadError> {
        Ok(self.body(body)?.torque)
    }

    /// Drop every accumulated torque.
    pub fn clear_torques(&mut self) {
        for body in &mut self.bodies {
            body.torque = Vec3::ZERO;
        }
    }

    /// Hinge angle in degrees, zero at creation.
    pub fn hinge_angle(&self, joint: JointHandle) -> Result<f32, QuadError> {
        Ok(self.hinge(joint)?.angle)
    }

    /// Hinge velocity in degrees per second.
    pub fn hinge_velocity(&self, joint: JointHandle) -> Result<f32, QuadError> {
        Ok(self.hinge(joint)?.velocity)
    }

    /// Current limit window of `joint`.
    pub fn limits(&self, joint: JointHandle) -> Result<JointLimits, QuadError> {
        Ok(self.hinge(joint)?.limits)
    }

    /// Last motor command written to `joint`.
    pub fn motor(&self, joint: JointHandle) -> Result<JointMotor, QuadError> {
        Ok(self.hinge(joint)?.motor)
    }

    /// Whether the motor of `joint` drives.
    pub fn motor_enabled(&self, joint: JointHandle) -> Result<bool, QuadError> {
        Ok(self.hinge(joint)?.motor_enabled)
    }

    /// Advance the world by `dt` seconds.
    ///
    /// Kinematic bodies integrate their velocities, then hinges are solved in
    /// creation order.  Accumulated torques are cleared afterwards.
    pub fn step(&mut self, dt: f32) {
        if !(dt.is_finite() && dt > 0.0) {
            return;
        }

        for body in self.bodies.iter_mut().filter(|b| b.driven_by.is_none()) {
            body.pose.position += body.linear_velocity * dt;
            let spin = body.angular_velocity.length() * dt * RAD_TO_DEG;
            if spin > 0.0 {
                body.pose.orientation = Quaternion::from_axis_angle(body.angular_velocity, spin)
                    .mul(body.pose.orientation)
                    .normalized();
            }
        }

        for index in 0..self.hinges.len() {
            self.solve_hinge(index, dt);
        }

        self.clear_torques();
    }

    fn solve_hinge(&mut self, index: usize, dt: f32) {
        let Some(hinge) = self.hinges[index].as_ref() else {
            return;
        };
        let (parent_pose, parent_velocity) = match hinge.parent {
            Some(parent) => {
                let parent = &self.bodies[parent.0];
                (parent.pose, parent.angular_velocity)
            }
            None => (Pose::default(), Vec3::ZERO),
        };
        let body_index = hinge.body.0;
        let (torque, inertia) = {
            let body = &self.bodies[body_index];
            (body.torque, body.inertia)
        };

        let Some(hinge) = self.hinges[index].as_mut() else {
            return;
        };
        let axis_world = parent_pose.orientation.rotate(hinge.axis_in_parent);

        if hinge.motor_enabled {
            let max_dv = hinge.motor.max_force / inertia * RAD_TO_DEG * dt;
            let dv = (hinge.motor.target_velocity - hinge.velocity).clamp(-max_dv, max_dv);
            hinge.velocity += dv;
        }
        hinge.velocity += torque.dot(axis_world) / inertia * RAD_TO_DEG * dt;

        hinge.angle += hinge.velocity * dt;
        if hinge.angle > hinge.limits.max {
            hinge.angle = hinge.limits.max;
            hinge.velocity = 0.0;
        } else if hinge.angle < hinge.limits.min {
            hinge.angle = hinge.limits.min;
            hinge.velocity = 0.0;
        }

        let swing = Quaternion::from_axis_angle(hinge.axis_in_parent, hinge.angle);
        let orientation = parent_pose
            .orientation
            .mul(swing)
            .mul(hinge.rest_rotation)
            .normalized();
        let position =
            parent_pose.transform_point(hinge.anchor_in_parent + swing.rotate(hinge.rest_offset));
        let angular_velocity = parent_velocity + axis_world * (hinge.velocity * DEG_TO_RAD);

        let body = &mut self.bodies[body_index];
        body.pose = Pose::new(position, orientation);
        body.angular_velocity = angular_velocity;
    }

    fn body(&self, body: BodyHandle) -> Result<&SimBody, QuadError> {
        self.bodies.get(body.0).ok_or(QuadError::UnknownBody(body))
    }

    fn body_mut(&mut self, body: BodyHandle) -> Result<&mut SimBody, QuadError> {
        self.bodies.get_mut(body.0).ok_or(QuadError::UnknownBody(body))
    }

    fn hinge(&self, joint: JointHandle) -> Result<&SimHinge, QuadError> {
        self.hinges
            .get(joint.0)
            .and_then(Option::as_ref)
            .ok_or(QuadError::UnknownJoint(joint))
    }

    fn hinge_mut(&mut self, joint: JointHandle) -> Result<&mut SimHinge, QuadError> {
        self.hinges
            .get_mut(joint.0)
            .and_then(Option::as_mut)
            .ok_or(QuadError::UnknownJoint(joint))
    }
}

impl PhysicsWorld for SimWorld {
    fn pose(&self, body: BodyHandle) -> Result<Pose, QuadError> {
        Ok(self.body(body)?.pose)
    }

    fn angular_velocity(&self, body: BodyHandle) -> Result<Vec3, QuadError> {
        Ok(self.body(body)?.angular_velocity)
    }

    fn add_torque(&mut self, body: BodyHandle, torque: Vec3) -> Result<(), QuadError> {
        self.body_mut(body)?.torque += torque;
        Ok(())
    }

    fn create_hinge(&mut self, spec: HingeSpec) -> Result<JointHandle, QuadError> {
        let pose = self.body(spec.body)?.pose;
        let parent = match spec.parent {
            Some(parent) => self.body(parent)?.pose,
            None => Pose::default(),
        };

        let anchor_world = pose.transform_point(spec.anchor);
        let hinge = SimHinge {
            body: spec.body,
            parent: spec.parent,
            anchor_in_parent: parent
                .orientation
                .inverse_rotate(anchor_world - parent.position),
            axis_in_parent: parent
                .orientation
                .inverse_rotate(pose.orientation.rotate(spec.axis))
                .normalized(),
            rest_rotation: parent.orientation.conjugate().mul(pose.orientation),
            rest_offset: parent.orientation.inverse_rotate(pose.position - anchor_world),
            angle: 0.0,
            velocity: 0.0,
            motor: JointMotor::default(),
            motor_enabled: false,
            limits: spec.limits,
        };

        if let Some(previous) = self.bodies[spec.body.0].driven_by.take() {
            self.hinges[previous] = None;
            debug!(body = %spec.body, retired = %JointHandle(previous), "hinge replaced");
        }
        self.hinges.push(Some(hinge));
        let index = self.hinges.len() - 1;
        self.bodies[spec.body.0].driven_by = Some(index);
        Ok(JointHandle(index))
    }

    fn set_motor(&mut self, joint: JointHandle, motor: JointMotor) -> Result<(), QuadError> {
        self.hinge_mut(joint)?.motor = motor;
        Ok(())
    }

    fn set_motor_enabled(&mut self, joint: JointHandle, enabled: bool) -> Result<(), QuadError> {
        self.hinge_mut(joint)?.motor_enabled = enabled;
        Ok(())
    }

    fn set_limits(&mut self, joint: JointHandle, limits: JointLimits) -> Result<(), QuadError> {
        self.hinge_mut(joint)?.limits = limits;
        Ok(())
    }
}

impl SimulatedWorld for SimWorld {
    fn add_body(&mut self, pose: Pose) -> BodyHandle {
        SimWorld::add_body(self, pose)
    }

    fn body_count(&self) -> usize {
        SimWorld::body_count(self)
    }

    fn set_linear_velocity(&mut self, body: BodyHandle, velocity: Vec3) -> Result<(), QuadError> {
        SimWorld::set_linear_velocity(self, body, velocity)
    }

    fn set_angular_velocity(
        &mut self,
        body: BodyHandle,
        velocity: Vec3,
    ) -> Result<(), QuadError> {
        SimWorld::set_angular_velocity(self, body, velocity)
    }

    fn step(&mut self, dt: f32) {
        SimWorld::step(self, dt);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimWorldBuilder
// ────────────────────────────────────────────────────────────────────────────

/// Builder that lays out the initial bodies of a [`SimWorld`].  Bodies get
/// handles `0, 1, 2, …` in the order they are added.
#[derive(Debug, Default)]
pub struct SimWorldBuilder {
    bodies: Vec<(Pose, f32)>,
}

impl SimWorldBuilder {
    /// Queue a body with [`DEFAULT_INERTIA`].
    pub fn body(self, pose: Pose) -> Self {
        self.body_with_inertia(pose, DEFAULT_INERTIA)
    }

    /// Queue a body with an explicit rotational inertia.
    pub fn body_with_inertia(mut self, pose: Pose, inertia: f32) -> Self {
        self.bodies.push((pose, inertia));
        self
    }

    /// Create the world with the queued bodies.
    pub fn build(self) -> SimWorld {
        let mut world = SimWorld::new();
        for (pose, inertia) in self.bodies {
            world.add_body_with_inertia(pose, inertia);
        }
        world
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    fn pendulum() -> (SimWorld, JointHandle) {
        let mut world = SimWorld::builder()
            .body(Pose::default())
            .body(Pose::at(Vec3::new(0.0, -1.0, 0.0)))
            .build();
        let joint = world
            .create_hinge(HingeSpec {
                body: BodyHandle(1),
                parent: Some(BodyHandle(0)),
                anchor: Vec3::new(0.0, 1.0, 0.0),
                axis: Vec3::RIGHT,
                limits: JointLimits::new(-90.0, 90.0),
            })
            .unwrap();
        (world, joint)
    }

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-4
    }

    #[test]
    fn new_hinge_starts_with_motor_disabled() {
        let (world, joint) = pendulum();
        assert!(!world.motor_enabled(joint).unwrap());
        assert_eq!(world.hinge_angle(joint).unwrap(), 0.0);
        assert_eq!(world.hinge_count(), 1);
    }

    #[test]
    fn disabled_motor_leaves_body_at_rest() {
        let (mut world, joint) = pendulum();
        world
            .set_motor(
                joint,
                JointMotor {
                    target_velocity: 90.0,
                    max_force: 10.0,
                },
            )
            .unwrap();
        for _ in 0..30 {
            world.step(DT);
        }
        assert_eq!(world.hinge_angle(joint).unwrap(), 0.0);
        assert!(close(world.pose(BodyHandle(1)).unwrap().position, Vec3::new(0.0, -1.0, 0.0)));
    }

    #[test]
    fn motor_swings_body_about_anchor() {
        let (mut world, joint) = pendulum();
        world.set_motor_enabled(joint, true).unwrap();
        world
            .set_motor(
                joint,
                JointMotor {
                    target_velocity: 90.0,
                    max_force: 1000.0,
                },
            )
            .unwrap();
        for _ in 0..60 {
            world.step(DT);
        }
        // +90° about +X carries -Y onto -Z.
        let angle = world.hinge_angle(joint).unwrap();
        assert!((angle - 90.0).abs() < 1e-3, "angle={angle}");
        let body = world.pose(BodyHandle(1)).unwrap();
        assert!(close(body.position, Vec3::new(0.0, 0.0, -1.0)), "{:?}", body.position);
        assert!(close(body.up(), Vec3::FORWARD));
    }

    #[test]
    fn motor_force_limits_acceleration() {
        let (mut world, joint) = pendulum();
        world.set_motor_enabled(joint, true).unwrap();
        world
            .set_motor(
                joint,
                JointMotor {
                    target_velocity: 1_000.0,
                    max_force: 0.01,
                },
            )
            .unwrap();
        world.step(DT);
        let expected = 0.01 / DEFAULT_INERTIA * RAD_TO_DEG * DT;
        assert!((world.hinge_velocity(joint).unwrap() - expected).abs() < 1e-4);
    }

    #[test]
    fn limits_clamp_angle_and_stop_hinge() {
        let (mut world, joint) = pendulum();
        world.set_limits(joint, JointLimits::new(-0.001, 0.0)).unwrap();
        world.set_motor_enabled(joint, true).unwrap();
        world
            .set_motor(
                joint,
                JointMotor {
                    target_velocity: -500.0,
                    max_force: 100.0,
                },
            )
            .unwrap();
        for _ in 0..10 {
            world.step(DT);
            assert_eq!(world.hinge_angle(joint).unwrap(), -0.001);
            assert_eq!(world.hinge_velocity(joint).unwrap(), 0.0);
        }
    }

    #[test]
    fn torque_along_axis_accelerates_hinge_and_is_cleared() {
        let (mut world, joint) = pendulum();
        world.add_torque(BodyHandle(1), Vec3::RIGHT * 0.5).unwrap();
        assert_eq!(world.accumulated_torque(BodyHandle(1)).unwrap(), Vec3::RIGHT * 0.5);
        world.step(DT);
        assert!(world.hinge_velocity(joint).unwrap() > 0.0);
        assert_eq!(world.accumulated_torque(BodyHandle(1)).unwrap(), Vec3::ZERO);
    }

    #[test]
    fn child_angular_velocity_includes_parent_spin() {
        let (mut world, joint) = pendulum();
        world.set_angular_velocity(BodyHandle(0), Vec3::UP * 2.0).unwrap();
        world.set_motor_enabled(joint, true).unwrap();
        world
            .set_motor(
                joint,
                JointMotor {
                    target_velocity: 0.0,
                    max_force: 10.0,
                },
            )
            .unwrap();
        world.step(DT);
        let omega = world.angular_velocity(BodyHandle(1)).unwrap();
        assert!(close(omega, Vec3::UP * 2.0), "{omega:?}");
    }

    #[test]
    fn kinematic_body_integrates_velocity() {
        let mut world = SimWorld::builder().body(Pose::default()).build();
        world.set_linear_velocity(BodyHandle(0), Vec3::FORWARD).unwrap();
        world
            .set_angular_velocity(BodyHandle(0), Vec3::UP * (90.0 * DEG_TO_RAD))
            .unwrap();
        for _ in 0..60 {
            world.step(DT);
        }
        let pose = world.pose(BodyHandle(0)).unwrap();
        assert!(close(pose.position, Vec3::FORWARD));
        assert!(close(pose.forward(), Vec3::RIGHT), "{:?}", pose.forward());
    }

    #[test]
    fn recreating_hinge_retires_previous_handle() {
        let (mut world, first) = pendulum();
        let second = world
            .create_hinge(HingeSpec {
                body: BodyHandle(1),
                parent: Some(BodyHandle(0)),
                anchor: Vec3::new(0.0, 1.0, 0.0),
                axis: Vec3::RIGHT,
                limits: JointLimits::new(-10.0, 10.0),
            })
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(world.hinge_count(), 1);
        assert_eq!(
            world.motor_enabled(first).unwrap_err(),
            QuadError::UnknownJoint(first)
        );
    }

    #[test]
    fn unknown_handles_are_rejected() {
        let mut world = SimWorld::new();
        assert_eq!(
            world.pose(BodyHandle(0)).unwrap_err(),
            QuadError::UnknownBody(BodyHandle(0))
        );
        assert_eq!(
            world.set_limits(JointHandle(4), JointLimits::new(0.0, 1.0)).unwrap_err(),
            QuadError::UnknownJoint(JointHandle(4))
        );
    }
}
