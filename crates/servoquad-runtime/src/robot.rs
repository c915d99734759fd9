//! [`RobotController`] – groups servo actuators into legs and tracks how far
//! and in which direction the robot body has travelled.
//!
//! Heading and distance are measured against a reference captured at
//! [`initialize`][RobotController::initialize]: the body forward direction,
//! turned by `forward_offset` degrees about the body up axis and flattened
//! onto the horizontal plane, plus the body position.
//!
//! # Example
//!
//! ```rust
//! use servoquad_hal::sim::SimWorld;
//! use servoquad_runtime::robot::RobotController;
//! use servoquad_types::{BodyHandle, Pose, Vec3};
//!
//! let mut world = SimWorld::builder().body(Pose::default()).build();
//! let mut robot = RobotController::new(BodyHandle(0), 0.0);
//! robot.initialize(&mut world).unwrap();
//!
//! world.set_pose(BodyHandle(0), Pose::at(Vec3::new(0.0, 0.0, -2.0))).unwrap();
//! assert!((robot.distance(&world).unwrap() + 2.0).abs() < 1e-5);
//! ```

use servoquad_hal::geometry::signed_angle;
use servoquad_hal::servo::ServoActuator;
use servoquad_hal::world::PhysicsWorld;
use servoquad_types::{BodyHandle, Pose, QuadError, Quaternion, Vec3};
use tracing::{debug, instrument};

// ────────────────────────────────────────────────────────────────────────────
// Leg
// ────────────────────────────────────────────────────────────────────────────

/// Upper and lower actuator of one leg.  Either may be absent.
#[derive(Debug, Clone)]
pub struct Leg {
    name: String,
    upper: Option<ServoActuator>,
    lower: Option<ServoActuator>,
}

impl Leg {
    /// Create a leg with no actuators.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            upper: None,
            lower: None,
        }
    }

    /// Set the actuator between the body and the upper segment.
    pub fn with_upper(mut self, servo: ServoActuator) -> Self {
        self.upper = Some(servo);
        self
    }

    /// Set the actuator between the upper and lower segments.
    pub fn with_lower(mut self, servo: ServoActuator) -> Self {
        self.lower = Some(servo);
        self
    }

    /// Leg name, e.g. `front_left`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Upper actuator, if any.
    pub fn upper(&self) -> Option<&ServoActuator> {
        self.upper.as_ref()
    }

    /// Lower actuator, if any.
    pub fn lower(&self) -> Option<&ServoActuator> {
        self.lower.as_ref()
    }

    /// Mutable upper actuator, if any.
    pub fn upper_mut(&mut self) -> Option<&mut ServoActuator> {
        self.upper.as_mut()
    }

    /// Mutable lower actuator, if any.
    pub fn lower_mut(&mut self) -> Option<&mut ServoActuator> {
        self.lower.as_mut()
    }

    /// Present actuators, upper first.
    pub fn actuators(&self) -> impl Iterator<Item = &ServoActuator> {
        self.upper.iter().chain(self.lower.iter())
    }

    /// Mutable present actuators, upper first.
    pub fn actuators_mut(&mut self) -> impl Iterator<Item = &mut ServoActuator> {
        self.upper.iter_mut().chain(self.lower.iter_mut())
    }
}

/// Which actuators of each leg a batch operation touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegSegment {
    /// Only the upper actuator.
    Upper,
    /// Only the lower actuator.
    Lower,
    /// Both actuators.
    Both,
}

// ────────────────────────────────────────────────────────────────────────────
// RobotController
// ────────────────────────────────────────────────────────────────────────────

/// The robot body, its legs and the heading/distance reference.
#[derive(Debug, Clone)]
pub struct RobotController {
    body: BodyHandle,
    forward_offset: f32,
    legs: Vec<Leg>,
    initial_forward: Vec3,
    initial_position: Vec3,
}

impl RobotController {
    /// Controller for `body`.  `forward_offset` (degrees about body up)
    /// corrects models whose local `+Z` is not the walking direction.
    pub fn new(body: BodyHandle, forward_offset: f32) -> Self {
        Self {
            body,
            forward_offset,
            legs: Vec::new(),
            initial_forward: Vec3::ZERO,
            initial_position: Vec3::ZERO,
        }
    }

    /// Append a leg.
    pub fn with_leg(mut self, leg: Leg) -> Self {
        self.legs.push(leg);
        self
    }

    /// Capture the heading/distance reference and initialize every actuator.
    ///
    /// Actuators are initialized leg by leg, upper before lower.
    #[instrument(level = "debug", skip(self, world), fields(body = %self.body))]
    pub fn initialize(&mut self, world: &mut dyn PhysicsWorld) -> Result<(), QuadError> {
        let pose = world.pose(self.body)?;
        self.initial_forward = self.horizontal_forward(&pose);
        self.initial_position = pose.position;

        for servo in self.actuators_mut() {
            servo.initialize(world)?;
        }
        debug!(legs = self.legs.len(), "robot initialized");
        Ok(())
    }

    /// Signed yaw in degrees, about world up, from the initial forward
    /// direction to the current one.
    pub fn heading(&self, world: &dyn PhysicsWorld) -> Result<f32, QuadError> {
        let pose = world.pose(self.body)?;
        Ok(signed_angle(
            self.initial_forward,
            self.horizontal_forward(&pose),
            Vec3::UP,
        ))
    }

    /// Displacement since initialization projected onto the initial forward
    /// direction.  Negative when the robot went backwards.
    pub fn distance(&self, world: &dyn PhysicsWorld) -> Result<f32, QuadError> {
        let position = world.pose(self.body)?.position;
        Ok((position - self.initial_position).dot(self.initial_forward))
    }

    fn horizontal_forward(&self, pose: &Pose) -> Vec3 {
        Quaternion::from_axis_angle(pose.up(), self.forward_offset)
            .rotate(pose.forward())
            .project_on_plane(Vec3::UP)
            .normalized()
    }

    // ── Per-tick fan-out ───────────────────────────────────────────────────

    /// Per-frame refresh of every actuator.
    pub fn tick(&mut self, world: &dyn PhysicsWorld) -> Result<(), QuadError> {
        for servo in self.actuators_mut() {
            servo.tick(world)?;
        }
        Ok(())
    }

    /// Advance every actuator's control loop by `dt` seconds.
    pub fn fixed_tick(&mut self, world: &mut dyn PhysicsWorld, dt: f32) -> Result<(), QuadError> {
        for servo in self.actuators_mut() {
            servo.fixed_tick(world, dt)?;
        }
        Ok(())
    }

    // ── Batch fixation ─────────────────────────────────────────────────────

    /// Lock every actuator.
    pub fn fix_legs(&mut self, world: &mut dyn PhysicsWorld) -> Result<(), QuadError> {
        self.set_fixed(world, LegSegment::Both, true)
    }

    /// Free every actuator.
    pub fn unfix_legs(&mut self, world: &mut dyn PhysicsWorld) -> Result<(), QuadError> {
        self.set_fixed(world, LegSegment::Both, false)
    }

    /// Lock the upper actuator of each leg.
    pub fn fix_upper_legs(&mut self, world: &mut dyn PhysicsWorld) -> Result<(), QuadError> {
        self.set_fixed(world, LegSegment::Upper, true)
    }

    /// Free the upper actuator of each leg.
    pub fn unfix_upper_legs(&mut self, world: &mut dyn PhysicsWorld) -> Result<(), QuadError> {
        self.set_fixed(world, LegSegment::Upper, false)
    }

    /// Lock the lower actuator of each leg.
    pub fn fix_lower_legs(&mut self, world: &mut dyn PhysicsWorld) -> Result<(), QuadError> {
        self.set_fixed(world, LegSegment::Lower, true)
    }

    /// Free the lower actuator of each leg.
    pub fn unfix_lower_legs(&mut self, world: &mut dyn PhysicsWorld) -> Result<(), QuadError> {
        self.set_fixed(world, LegSegment::Lower, false)
    }

    /// Fix or free the selected segment of every leg.  Missing actuators are
    /// skipped.
    pub fn set_fixed(
        &mut self,
        world: &mut dyn PhysicsWorld,
        segment: LegSegment,
        fixed: bool,
    ) -> Result<(), QuadError> {
        for leg in &mut self.legs {
            if matches!(segment, LegSegment::Upper | LegSegment::Both)
                && let Some(servo) = leg.upper.as_mut()
            {
                servo.set_fixed(world, fixed)?;
            }
            if matches!(segment, LegSegment::Lower | LegSegment::Both)
                && let Some(servo) = leg.lower.as_mut()
            {
                servo.set_fixed(world, fixed)?;
            }
        }
        debug!(?segment, fixed, "leg fixation applied");
        Ok(())
    }

    /// Gate the motor of every actuator.
    pub fn set_motors_enabled(
        &mut self,
        world: &mut dyn PhysicsWorld,
        enabled: bool,
    ) -> Result<(), QuadError> {
        for servo in self.actuators_mut() {
            servo.set_motor_enabled(world, enabled)?;
        }
        Ok(())
    }

    // ── Accessors ──────────────────────────────────────────────────────────

    /// The torso body.
    pub fn body(&self) -> BodyHandle {
        self.body
    }

    /// Forward correction in degrees about the body up axis.
    pub fn forward_offset(&self) -> f32 {
        self.forward_offset
    }

    /// Horizontal forward direction captured at initialization.
    pub fn initial_forward(&self) -> Vec3 {
        self.initial_forward
    }

    /// Body position captured at initialization.
    pub fn initial_position(&self) -> Vec3 {
        self.initial_position
    }

    /// Legs in the order they were added.
    pub fn legs(&self) -> &[Leg] {
        &self.legs
    }

    /// Leg at `index`, if any.
    pub fn leg(&self, index: usize) -> Option<&Leg> {
        self.legs.get(index)
    }

    /// Mutable leg at `index`, if any.
    pub fn leg_mut(&mut self, index: usize) -> Option<&mut Leg> {
        self.legs.get_mut(index)
    }

    /// Every present actuator, leg by leg, upper before lower.
    pub fn actuators(&self) -> impl Iterator<Item = &ServoActuator> {
        self.legs.iter().flat_map(Leg::actuators)
    }

    /// Mutable actuators in the same order as [`actuators`][Self::actuators].
    pub fn actuators_mut(&mut self) -> impl Iterator<Item = &mut ServoActuator> {
        self.legs.iter_mut().flat_map(Leg::actuators_mut)
    }

    /// Look an actuator up by name.
    pub fn actuator_mut(&mut self, name: &str) -> Option<&mut ServoActuator> {
        self.actuators_mut().find(|servo| servo.name() == name)
    }
}
