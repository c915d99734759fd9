//! [`RapierWorld`] – a [`SimulatedWorld`] backed by a rapier pipeline.
//!
//! Bodies are inserted as kinematic, velocity-driven rigid bodies so a torso
//! follows whatever velocity is imposed on it.  Creating a hinge turns the
//! controlled body dynamic and joins it to its parent (or to a fixed ground
//! body) with a revolute impulse joint:
//!
//! ```text
//!   parent frame ── local_frame1 ──┐
//!                                  ├─ coincide at creation, angle = 0
//!   child frame  ── local_frame2 ──┘      free axis = frame X = hinge axis
//! ```
//!
//! Bodies carry no colliders and gravity defaults to zero, matching the
//! in-process [`SimWorld`][servoquad_hal::sim::SimWorld].  Accumulated
//! torques are cleared after every step.

use nalgebra::{Isometry3, Point3, Translation3, Vector3};
use rapier3d::prelude::{
    CCDSolver, ColliderSet, DefaultBroadPhase, GenericJointBuilder, ImpulseJointHandle,
    ImpulseJointSet, IntegrationParameters, IslandManager, JointAxesMask, JointAxis,
    MassProperties, MultibodyJointSet, NarrowPhase, PhysicsPipeline, QueryPipeline,
    RigidBodyBuilder, RigidBodyHandle, RigidBodySet, RigidBodyType,
};
use servoquad_hal::world::{HingeSpec, JointLimits, JointMotor, PhysicsWorld, SimulatedWorld};
use servoquad_types::math::{DEG_TO_RAD, RAD_TO_DEG};
use servoquad_types::{BodyHandle, JointHandle, Pose, QuadError, Vec3};
use tracing::debug;

use crate::convert::{axis_frame, from_isometry, from_vector, to_isometry, to_vector};

/// Mass of bodies added without an explicit value, in kilograms.
pub const DEFAULT_MASS: f32 = 1.0;

/// Principal rotational inertia of bodies added without an explicit value.
pub const DEFAULT_INERTIA: f32 = 0.1;

/// Damping factor of the rapier velocity motor.
const MOTOR_DAMPING: f32 = 1.0;

/// Bookkeeping for one body.
#[derive(Debug, Clone, Copy)]
struct Body {
    handle: RigidBodyHandle,
    /// Applied when a hinge turns the body dynamic.
    mass: MassProperties,
    /// Index into `hinges` of the hinge moving this body.
    driven_by: Option<usize>,
}

/// Bookkeeping for one live hinge.
#[derive(Debug, Clone, Copy)]
struct Hinge {
    handle: ImpulseJointHandle,
    motor: JointMotor,
    motor_enabled: bool,
    limits: JointLimits,
}

/// rapier rigid-body world implementing [`PhysicsWorld`] and
/// [`SimulatedWorld`].
pub struct RapierWorld {
    rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    physics_pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,
    integration_parameters: IntegrationParameters,
    gravity: Vector3<f32>,

    /// Anchor for hinges without a parent body.
    ground: RigidBodyHandle,
    bodies: Vec<Body>,
    hinges: Vec<Option<Hinge>>,
}

impl Default for RapierWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl RapierWorld {
    /// Create an empty world without gravity.
    pub fn new() -> Self {
        let mut rigid_body_set = RigidBodySet::new();
        let ground = rigid_body_set.insert(RigidBodyBuilder::fixed().build());
        Self {
            rigid_body_set,
            collider_set: ColliderSet::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            integration_parameters: IntegrationParameters::default(),
            gravity: Vector3::zeros(),
            ground,
            bodies: Vec::new(),
            hinges: Vec::new(),
        }
    }

    /// Set the world-space gravity acceleration in metres per second squared.
    pub fn with_gravity(mut self, gravity: Vec3) -> Self {
        self.gravity = to_vector(gravity);
        self
    }

    /// World-space gravity.
    pub fn gravity(&self) -> Vec3 {
        from_vector(&self.gravity)
    }

    /// Add a kinematic body with explicit mass properties.  They take effect
    /// once a hinge turns the body dynamic.
    pub fn add_body_with_mass(&mut self, pose: Pose, mass: f32, inertia: f32) -> BodyHandle {
        let mass = mass_properties(mass, inertia);
        let body = RigidBodyBuilder::kinematic_velocity_based()
            .position(to_isometry(&pose))
            .additional_mass_properties(mass)
            .can_sleep(false)
            .build();
        self.bodies.push(Body {
            handle: self.rigid_body_set.insert(body),
            mass,
            driven_by: None,
        });
        BodyHandle(self.bodies.len() - 1)
    }

    /// Number of live (non-retired) hinges.
    pub fn hinge_count(&self) -> usize {
        self.hinges.iter().flatten().count()
    }

    /// `true` while `body` is simulated dynamically, i.e. driven by a hinge.
    pub fn is_dynamic(&self, body: BodyHandle) -> Result<bool, QuadError> {
        let handle = self.handle(body)?;
        Ok(self
            .rigid_body_set
            .get(handle)
            .is_some_and(|rb| rb.is_dynamic()))
    }

    /// Linear velocity of `body`.
    pub fn linear_velocity(&self, body: BodyHandle) -> Result<Vec3, QuadError> {
        let handle = self.handle(body)?;
        let rb = self
            .rigid_body_set
            .get(handle)
            .ok_or(QuadError::UnknownBody(body))?;
        Ok(from_vector(rb.linvel()))
    }

    /// Hinge angle in degrees, measured between the two joint frames about
    /// the free axis.  Zero at creation.
    pub fn hinge_angle(&self, joint: JointHandle) -> Result<f32, QuadError> {
        let hinge = self.hinge(joint)?;
        let data = self
            .impulse_joint_set
            .get(hinge.handle)
            .ok_or(QuadError::UnknownJoint(joint))?;
        let frame1 = self.world_pose(data.body1, joint)? * data.data.local_frame1;
        let frame2 = self.world_pose(data.body2, joint)? * data.data.local_frame2;
        let relative = frame1.rotation.inverse() * frame2.rotation;
        Ok(relative.scaled_axis().x * RAD_TO_DEG)
    }

    /// Current limit window of `joint`, in degrees.
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

    /// Advance the pipeline by `dt` seconds, then clear user torques.
    pub fn step(&mut self, dt: f32) {
        if !(dt.is_finite() && dt > 0.0) {
            return;
        }
        self.integration_parameters.dt = dt;
        self.physics_pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &(),
            &(),
        );
        for (_, rb) in self.rigid_body_set.iter_mut() {
            rb.reset_torques(false);
        }
    }

    fn handle(&self, body: BodyHandle) -> Result<RigidBodyHandle, QuadError> {
        self.bodies
            .get(body.0)
            .map(|b| b.handle)
            .ok_or(QuadError::UnknownBody(body))
    }

    fn world_pose(
        &self,
        handle: RigidBodyHandle,
        joint: JointHandle,
    ) -> Result<Isometry3<f32>, QuadError> {
        self.rigid_body_set
            .get(handle)
            .map(|rb| *rb.position())
            .ok_or(QuadError::UnknownJoint(joint))
    }

    fn hinge(&self, joint: JointHandle) -> Result<&Hinge, QuadError> {
        self.hinges
            .get(joint.0)
            .and_then(Option::as_ref)
            .ok_or(QuadError::UnknownJoint(joint))
    }

    fn hinge_mut(&mut self, joint: JointHandle) -> Result<&mut Hinge, QuadError> {
        self.hinges
            .get_mut(joint.0)
            .and_then(Option::as_mut)
            .ok_or(QuadError::UnknownJoint(joint))
    }

    /// Push the stored motor state of `joint` into the rapier joint.  A
    /// disabled motor keeps its command but gets no force.
    fn write_motor(&mut self, joint: JointHandle) -> Result<(), QuadError> {
        let hinge = *self.hinge(joint)?;
        let (velocity, force) = if hinge.motor_enabled {
            (hinge.motor.target_velocity * DEG_TO_RAD, hinge.motor.max_force)
        } else {
            (0.0, 0.0)
        };
        let rapier_joint = self
            .impulse_joint_set
            .get_mut(hinge.handle)
            .ok_or(QuadError::UnknownJoint(joint))?;
        rapier_joint
            .data
            .set_motor_velocity(JointAxis::AngX, velocity, MOTOR_DAMPING)
            .set_motor_max_force(JointAxis::AngX, force);
        Ok(())
    }
}

fn mass_properties(mass: f32, inertia: f32) -> MassProperties {
    MassProperties::new(
        Point3::origin(),
        mass.max(f32::EPSILON),
        Vector3::repeat(inertia.max(f32::EPSILON)),
    )
}

fn radians(limits: JointLimits) -> [f32; 2] {
    [limits.min * DEG_TO_RAD, limits.max * DEG_TO_RAD]
}

impl PhysicsWorld for RapierWorld {
    fn pose(&self, body: BodyHandle) -> Result<Pose, QuadError> {
        let handle = self.handle(body)?;
        self.rigid_body_set
            .get(handle)
            .map(|rb| from_isometry(rb.position()))
            .ok_or(QuadError::UnknownBody(body))
    }

    fn angular_velocity(&self, body: BodyHandle) -> Result<Vec3, QuadError> {
        let handle = self.handle(body)?;
        self.rigid_body_set
            .get(handle)
            .map(|rb| from_vector(rb.angvel()))
            .ok_or(QuadError::UnknownBody(body))
    }

    fn add_torque(&mut self, body: BodyHandle, torque: Vec3) -> Result<(), QuadError> {
        let handle = self.handle(body)?;
        let rb = self
            .rigid_body_set
            .get_mut(handle)
            .ok_or(QuadError::UnknownBody(body))?;
        rb.add_torque(to_vector(torque), true);
        Ok(())
    }

    fn create_hinge(&mut self, spec: HingeSpec) -> Result<JointHandle, QuadError> {
        let child = self.handle(spec.body)?;
        let parent = match spec.parent {
            Some(parent) => self.handle(parent)?,
            None => self.ground,
        };
        let position = |handle| self.rigid_body_set.get(handle).map(|rb| *rb.position());
        let (Some(child_pose), Some(parent_pose)) = (position(child), position(parent)) else {
            return Err(QuadError::UnknownBody(spec.body));
        };

        let frame2 = Isometry3::from_parts(
            Translation3::from(to_vector(spec.anchor)),
            axis_frame(spec.axis),
        );
        let frame1 = parent_pose.inv_mul(&child_pose) * frame2;
        let joint = GenericJointBuilder::new(JointAxesMask::LOCKED_REVOLUTE_AXES)
            .local_frame1(frame1)
            .local_frame2(frame2)
            .limits(JointAxis::AngX, radians(spec.limits))
            .build();

        let slot = &mut self.bodies[spec.body.0];
        let mass = slot.mass;
        if let Some(previous) = slot.driven_by.take()
            && let Some(old) = self.hinges[previous].take()
        {
            self.impulse_joint_set.remove(old.handle, true);
            debug!(body = %spec.body, retired = %JointHandle(previous), "hinge replaced");
        }

        if let Some(rb) = self.rigid_body_set.get_mut(child) {
            rb.set_body_type(RigidBodyType::Dynamic, true);
            rb.set_additional_mass_properties(mass, true);
        }

        let handle = self.impulse_joint_set.insert(parent, child, joint, true);
        self.hinges.push(Some(Hinge {
            handle,
            motor: JointMotor::default(),
            motor_enabled: false,
            limits: spec.limits,
        }));
        let index = self.hinges.len() - 1;
        self.bodies[spec.body.0].driven_by = Some(index);
        let joint = JointHandle(index);
        self.write_motor(joint)?;
        Ok(joint)
    }

    fn set_motor(&mut self, joint: JointHandle, motor: JointMotor) -> Result<(), QuadError> {
        self.hinge_mut(joint)?.motor = motor;
        self.write_motor(joint)
    }

    fn set_motor_enabled(&mut self, joint: JointHandle, enabled: bool) -> Result<(), QuadError> {
        self.hinge_mut(joint)?.motor_enabled = enabled;
        self.write_motor(joint)
    }

    fn set_limits(&mut self, joint: JointHandle, limits: JointLimits) -> Result<(), QuadError> {
        let hinge = self.hinge_mut(joint)?;
        hinge.limits = limits;
        let handle = hinge.handle;
        let rapier_joint = self
            .impulse_joint_set
            .get_mut(handle)
            .ok_or(QuadError::UnknownJoint(joint))?;
        rapier_joint.data.set_limits(JointAxis::AngX, radians(limits));
        Ok(())
    }
}

impl SimulatedWorld for RapierWorld {
    fn add_body(&mut self, pose: Pose) -> BodyHandle {
        self.add_body_with_mass(pose, DEFAULT_MASS, DEFAULT_INERTIA)
    }

    fn body_count(&self) -> usize {
        self.bodies.len()
    }

    fn set_linear_velocity(&mut self, body: BodyHandle, velocity: Vec3) -> Result<(), QuadError> {
        let handle = self.handle(body)?;
        let rb = self
            .rigid_body_set
            .get_mut(handle)
            .ok_or(QuadError::UnknownBody(body))?;
        rb.set_linvel(to_vector(velocity), true);
        Ok(())
    }

    fn set_angular_velocity(
        &mut self,
        body: BodyHandle,
        velocity: Vec3,
    ) -> Result<(), QuadError> {
        let handle = self.handle(body)?;
        let rb = self
            .rigid_body_set
            .get_mut(handle)
            .ok_or(QuadError::UnknownBody(body))?;
        rb.set_angvel(to_vector(velocity), true);
        Ok(())
    }

    fn step(&mut self, dt: f32) {
        RapierWorld::step(self, dt);
    }
}
