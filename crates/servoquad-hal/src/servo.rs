//! [`ServoActuator`] – a position-controlled hinge driven through an
//! unreliable physics solver.
//!
//! # Angle spaces
//!
//! *Joint space* is the angle the actuator measures geometrically about its
//! axis.  *Servo space* is what callers see and command: identical for
//! [`Direction::Clockwise`], negated for [`Direction::CounterClockwise`].
//! Converting servo → joint clamps to `[min_angle, max_angle]`; converting
//! joint → servo does not clamp.
//!
//! # Control cascade
//!
//! Every [`fixed_tick`][ServoActuator::fixed_tick] the position loop turns the
//! angle error into a desired velocity (clamped to `±max_velocity`), and the
//! velocity loop adds a correction (clamped to
//! `±`[`VELOCITY_CORRECTION_LIMIT`]) compensating for the solver not holding
//! its target velocity.  The sum is written to the hinge motor together with
//! the profile's force limit.
//!
//! # Fixation
//!
//! ```text
//!   Free ── set_fixed(true) ──▶ Fixed     limits ← [angle - 0.001, angle]
//!   Fixed ── set_fixed(false) ─▶ Free     limits ← [min - margin, max + margin]
//! ```
//!
//! While fixed the regulators are not run; they resume from their previous
//! internal state once freed.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use servoquad_hal::servo::ServoActuator;
//! use servoquad_hal::sim::SimWorld;
//! use servoquad_types::{ActuatorProfile, BodyHandle, JointConfig, Pose, RegulatorProfile, Vec3};
//!
//! let mut world = SimWorld::builder()
//!     .body(Pose::default())
//!     .body(Pose::at(Vec3::new(0.0, -0.5, 0.0)))
//!     .build();
//!
//! let mut servo = ServoActuator::new(
//!     "knee",
//!     BodyHandle(1),
//!     Some(BodyHandle(0)),
//!     JointConfig::new(-90.0, 90.0).with_anchor(Vec3::new(0.0, 0.5, 0.0)),
//! )
//! .with_profile(Arc::new(ActuatorProfile::default()))
//! .with_position_regulator(Arc::new(RegulatorProfile::default()));
//!
//! servo.initialize(&mut world).unwrap();
//! servo.set_target_angle(30.0);
//! for _ in 0..120 {
//!     servo.fixed_tick(&mut world, 1.0 / 60.0).unwrap();
//!     world.step(1.0 / 60.0);
//! }
//! assert!((servo.current_angle(&world).unwrap() - 30.0).abs() < 0.5);
//! ```

use std::sync::Arc;

use servoquad_types::{
    ActuatorProfile, BodyHandle, Direction, FrictionProfile, JointConfig, JointHandle, Pose,
    QuadError, RegulatorProfile, Vec3,
};
use tracing::{debug, instrument, trace, warn};

use crate::friction::JointFriction;
use crate::geometry;
use crate::pid::PidRegulator;
use crate::schedule::{CommandSchedule, CommitPolicy, SimTime};
use crate::world::{HingeSpec, JointLimits, JointMotor, PhysicsWorld};

/// Bound on the velocity-loop correction, in degrees per second.
pub const VELOCITY_CORRECTION_LIMIT: f32 = 500.0;

/// Width of the constraint window that holds a fixed joint, in degrees.
pub const FIXATION_WINDOW: f32 = 0.001;

/// Fixation state of a servo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fixation {
    /// Driven by the regulator cascade.
    #[default]
    Free,
    /// Held in place by a near-zero-width constraint window.
    Fixed,
}

/// A servo joint with cascaded position/velocity control, delayed commands,
/// fixation and friction.
#[derive(Debug, Clone)]
pub struct ServoActuator {
    name: String,
    body: BodyHandle,
    parent: Option<BodyHandle>,
    config: JointConfig,
    axis: Vec3,

    profile: Option<Arc<ActuatorProfile>>,
    position_profile: Option<Arc<RegulatorProfile>>,
    velocity_profile: Option<Arc<RegulatorProfile>>,
    position_loop: PidRegulator,
    velocity_loop: PidRegulator,
    friction: JointFriction,

    joint: Option<JointHandle>,
    target_angle: f32,
    fixation: Fixation,
    motor_enabled: bool,
    zero_direction: Vec3,
    axis_in_parent: Vec3,

    clock: SimTime,
    schedule: CommandSchedule,
    last_command: Option<JointMotor>,
}

impl ServoActuator {
    /// Create an unconfigured servo moving `body` relative to `parent`.
    ///
    /// Attach profiles with the `with_*` builders before
    /// [`initialize`][Self::initialize].
    pub fn new(
        name: impl Into<String>,
        body: BodyHandle,
        parent: Option<BodyHandle>,
        config: JointConfig,
    ) -> Self {
        Self {
            name: name.into(),
            body,
            parent,
            axis: geometry::corrected_axis(config.axis),
            config,
            profile: None,
            position_profile: None,
            velocity_profile: None,
            position_loop: PidRegulator::new(None),
            velocity_loop: PidRegulator::new(None),
            friction: JointFriction::default(),
            joint: None,
            target_angle: 0.0,
            fixation: Fixation::Free,
            motor_enabled: false,
            zero_direction: Vec3::ZERO,
            axis_in_parent: Vec3::ZERO,
            clock: SimTime::ZERO,
            schedule: CommandSchedule::default(),
            last_command: None,
        }
    }

    /// Attach the actuator profile (delay, velocity cap, force limit).
    pub fn with_profile(mut self, profile: Arc<ActuatorProfile>) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Attach the gains of the outer, position-to-velocity loop.
    pub fn with_position_regulator(mut self, profile: Arc<RegulatorProfile>) -> Self {
        self.position_loop = PidRegulator::new(Some(profile.clone()));
        self.position_profile = Some(profile);
        self
    }

    /// Attach the gains of the inner velocity-correction loop.  Without it
    /// the correction is zero.
    pub fn with_velocity_regulator(mut self, profile: Arc<RegulatorProfile>) -> Self {
        self.velocity_loop = PidRegulator::new(Some(profile.clone()));
        self.velocity_profile = Some(profile);
        self
    }

    /// Attach joint friction.
    pub fn with_friction(mut self, profile: Arc<FrictionProfile>) -> Self {
        self.friction = JointFriction::new(Some(profile));
        self
    }

    /// Choose how a new target treats commits still pending.
    pub fn with_commit_policy(mut self, policy: CommitPolicy) -> Self {
        self.schedule = CommandSchedule::new(policy);
        self
    }

    // ── Lifecycle ──────────────────────────────────────────────────────────

    /// Create the physics hinge and capture the zero reference.
    ///
    /// Any previously held joint handle, pending commit and regulator state is
    /// discarded.  The servo starts free with its motor enabled and its target
    /// set to the current angle.
    ///
    /// Fails with [`QuadError::InvalidProfile`] before touching the world when
    /// [`validate`][Self::validate] rejects the configuration.
    #[instrument(level = "debug", skip(self, world), fields(joint = %self.name))]
    pub fn initialize(&mut self, world: &mut dyn PhysicsWorld) -> Result<(), QuadError> {
        self.validate()?;
        self.release();
        self.position_loop = PidRegulator::new(self.position_profile.clone());
        self.velocity_loop = PidRegulator::new(self.velocity_profile.clone());
        self.axis = geometry::corrected_axis(self.config.axis);

        let joint = world.create_hinge(HingeSpec {
            body: self.body,
            parent: self.parent,
            anchor: self.config.anchor,
            axis: self.axis,
            limits: self.nominal_limits(),
        })?;
        self.joint = Some(joint);

        self.set_motor_enabled(world, true)?;
        self.refresh_reference(world)?;
        self.target_angle = self.joint_to_servo(self.joint_angle(world)?);

        if !self.is_configured() {
            warn!(
                joint = %self.name,
                "servo is not fully configured (actuator or position regulator profile missing); it will not be driven"
            );
        }
        self.friction.report_unconfigured(&self.name);

        debug!(joint = %self.name, handle = %joint, "servo initialized");
        Ok(())
    }

    /// Check the joint geometry and every attached profile.
    pub fn validate(&self) -> Result<(), QuadError> {
        self.config.validate(&self.name)?;
        if let Some(profile) = &self.profile {
            profile.validate(&self.name)?;
        }
        if let Some(profile) = &self.position_profile {
            profile.validate(&format!("{}.position_regulator", self.name))?;
        }
        if let Some(profile) = &self.velocity_profile {
            profile.validate(&format!("{}.velocity_regulator", self.name))?;
        }
        Ok(())
    }

    /// Forget the physics joint and all time-dependent state.  The servo must
    /// be [`initialize`][Self::initialize]d again before it drives anything.
    pub fn release(&mut self) {
        self.joint = None;
        self.fixation = Fixation::Free;
        self.motor_enabled = false;
        self.schedule.clear();
        self.clock = SimTime::ZERO;
        self.last_command = None;
    }

    /// Per-frame refresh.  While no joint is attached the zero reference
    /// follows the live geometry, so previews show the current pose as zero.
    pub fn tick(&mut self, world: &dyn PhysicsWorld) -> Result<(), QuadError> {
        if self.joint.is_none() {
            self.refresh_reference(world)?;
        }
        Ok(())
    }

    /// Advance the control loop by `dt` seconds.
    ///
    /// Due commits are applied first.  The regulators only run when the motor
    /// is enabled, the servo is free and fully configured; friction applies
    /// whenever a joint is attached.
    pub fn fixed_tick(&mut self, world: &mut dyn PhysicsWorld, dt: f32) -> Result<(), QuadError> {
        self.clock += SimTime::from_secs(dt);
        for angle in self.schedule.drain_due(self.clock) {
            self.commit(angle);
        }

        let Some(joint) = self.joint else {
            return Ok(());
        };

        let velocity = self.angular_velocity(world)?;

        if self.motor_enabled
            && self.fixation == Fixation::Free
            && self.position_loop.is_configured()
            && let Some(profile) = self.profile.clone()
        {
            let motor = self.regulate(world, &profile, velocity, dt)?;
            world.set_motor(joint, motor)?;
            self.last_command = Some(motor);
        }

        let axis_world = world.pose(self.body)?.orientation.rotate(self.axis);
        self.friction
            .apply(world, self.body, self.parent, axis_world, velocity)?;
        Ok(())
    }

    fn regulate(
        &mut self,
        world: &dyn PhysicsWorld,
        profile: &ActuatorProfile,
        velocity: f32,
        dt: f32,
    ) -> Result<JointMotor, QuadError> {
        let target = self.servo_to_joint(self.target_angle);
        let current = self.joint_angle(world)?;

        let desired = bound(
            self.position_loop.run(target, current, dt),
            -profile.max_velocity,
            profile.max_velocity,
        );
        let correction = bound(
            self.velocity_loop.run(desired, velocity, dt),
            -VELOCITY_CORRECTION_LIMIT,
            VELOCITY_CORRECTION_LIMIT,
        );

        trace!(joint = %self.name, target, current, desired, correction, "regulated");
        Ok(JointMotor {
            target_velocity: desired + correction,
            max_force: profile.max_force,
        })
    }

    // ── Commands ───────────────────────────────────────────────────────────

    /// Command a new servo-space target angle.
    ///
    /// The value takes effect `delay` seconds of simulated time later (zero
    /// without a profile), clamped to the servo-space range.  Whether older
    /// pending commands survive depends on the [`CommitPolicy`].
    pub fn set_target_angle(&mut self, angle: f32) {
        let delay = self.profile.as_deref().map_or(0.0, |p| p.delay);
        let due = self.clock + SimTime::from_secs(delay);
        trace!(joint = %self.name, angle, %due, "target scheduled");
        self.schedule.push(due, angle);
    }

    fn commit(&mut self, angle: f32) {
        let (min, max) = self.servo_bounds();
        self.target_angle = bound(angle, min, max);
        debug!(joint = %self.name, target = self.target_angle, "target committed");
    }

    /// Lock or unlock the joint.  No-op when the state is unchanged or no
    /// joint is attached.
    pub fn set_fixed(&mut self, world: &mut dyn PhysicsWorld, fixed: bool) -> Result<(), QuadError> {
        let Some(joint) = self.joint else {
            return Ok(());
        };
        if fixed == self.is_fixed() {
            return Ok(());
        }

        if fixed {
            let angle = self.joint_angle(world)?;
            self.target_angle = self.joint_to_servo(angle);
            world.set_limits(joint, JointLimits::new(angle - FIXATION_WINDOW, angle))?;
            self.fixation = Fixation::Fixed;
        } else {
            world.set_limits(joint, self.nominal_limits())?;
            self.fixation = Fixation::Free;
        }
        debug!(joint = %self.name, fixation = ?self.fixation, "fixation changed");
        Ok(())
    }

    /// Gate the hinge motor.  No-op when unchanged or no joint is attached.
    pub fn set_motor_enabled(
        &mut self,
        world: &mut dyn PhysicsWorld,
        enabled: bool,
    ) -> Result<(), QuadError> {
        let Some(joint) = self.joint else {
            return Ok(());
        };
        if enabled == self.motor_enabled {
            return Ok(());
        }
        world.set_motor_enabled(joint, enabled)?;
        self.motor_enabled = enabled;
        Ok(())
    }

    // ── Measurements ───────────────────────────────────────────────────────

    /// Current angle in servo space (not clamped).
    pub fn current_angle(&self, world: &dyn PhysicsWorld) -> Result<f32, QuadError> {
        Ok(self.joint_to_servo(self.joint_angle(world)?))
    }

    /// Angular velocity relative to the parent about the joint axis, in
    /// degrees per second.
    pub fn angular_velocity(&self, world: &dyn PhysicsWorld) -> Result<f32, QuadError> {
        let pose = world.pose(self.body)?;
        let own = world.angular_velocity(self.body)?;
        let parent = match self.parent {
            Some(parent) => Some(world.angular_velocity(parent)?),
            None => None,
        };
        Ok(geometry::relative_angular_velocity(&pose, own, parent, self.axis))
    }

    fn joint_angle(&self, world: &dyn PhysicsWorld) -> Result<f32, QuadError> {
        let (pose, parent) = self.poses(world)?;
        let dir = geometry::joint_direction(
            &pose,
            parent.as_ref(),
            self.config.anchor,
            self.axis,
            self.axis_in_parent,
        );
        Ok(geometry::signed_angle(self.zero_direction, dir, self.axis_in_parent))
    }

    fn refresh_reference(&mut self, world: &dyn PhysicsWorld) -> Result<(), QuadError> {
        let (pose, parent) = self.poses(world)?;
        self.axis_in_parent = geometry::axis_in_parent_frame(&pose, parent.as_ref(), self.axis);
        self.zero_direction = geometry::joint_direction(
            &pose,
            parent.as_ref(),
            self.config.anchor,
            self.axis,
            self.axis_in_parent,
        );
        Ok(())
    }

    fn poses(&self, world: &dyn PhysicsWorld) -> Result<(Pose, Option<Pose>), QuadError> {
        let pose = world.pose(self.body)?;
        let parent = match self.parent {
            Some(parent) => Some(world.pose(parent)?),
            None => None,
        };
        Ok((pose, parent))
    }

    // ── Angle spaces ───────────────────────────────────────────────────────

    /// Servo-space angle to joint space: sense flip, then clamp to the
    /// commanded range.
    pub fn servo_to_joint(&self, angle: f32) -> f32 {
        let angle = match self.config.direction {
            Direction::Clockwise => angle,
            Direction::CounterClockwise => -angle,
        };
        bound(angle, self.config.min_angle, self.config.max_angle)
    }

    /// Joint-space angle to servo space: sense flip only.
    pub fn joint_to_servo(&self, angle: f32) -> f32 {
        match self.config.direction {
            Direction::Clockwise => angle,
            Direction::CounterClockwise => -angle,
        }
    }

    /// Commandable range in servo space.
    pub fn servo_bounds(&self) -> (f32, f32) {
        match self.config.direction {
            Direction::Clockwise => (self.config.min_angle, self.config.max_angle),
            Direction::CounterClockwise => (-self.config.max_angle, -self.config.min_angle),
        }
    }

    /// Physics limits of a free joint.
    pub fn nominal_limits(&self) -> JointLimits {
        JointLimits::new(
            self.config.min_angle - self.config.limit_margin,
            self.config.max_angle + self.config.limit_margin,
        )
    }

    // ── Accessors ──────────────────────────────────────────────────────────

    /// Name used in logs and lookups.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The body this servo moves.
    pub fn body(&self) -> BodyHandle {
        self.body
    }

    /// The body the hinge is attached to; `None` means the world.
    pub fn parent(&self) -> Option<BodyHandle> {
        self.parent
    }

    /// Joint geometry and travel.
    pub fn config(&self) -> &JointConfig {
        &self.config
    }

    /// Physics hinge, present between `initialize` and `release`.
    pub fn joint(&self) -> Option<JointHandle> {
        self.joint
    }

    /// Commanded travel in degrees.
    pub fn range(&self) -> f32 {
        self.config.range()
    }

    /// Committed target in servo space.
    pub fn target_angle(&self) -> f32 {
        self.target_angle
    }

    /// Committed target converted to (clamped) joint space, as fed to the
    /// position loop.
    pub fn target_joint_angle(&self) -> f32 {
        self.servo_to_joint(self.target_angle)
    }

    /// Current fixation state.
    pub fn fixation(&self) -> Fixation {
        self.fixation
    }

    /// `true` while the joint is locked in place.
    pub fn is_fixed(&self) -> bool {
        self.fixation == Fixation::Fixed
    }

    /// `true` while the hinge motor is allowed to drive.
    pub fn is_motor_enabled(&self) -> bool {
        self.motor_enabled
    }

    /// `true` when both the actuator profile and the position regulator
    /// profile are attached.
    pub fn is_configured(&self) -> bool {
        self.profile.is_some() && self.position_loop.is_configured()
    }

    /// Number of target commands not yet committed.
    pub fn pending_commits(&self) -> usize {
        self.schedule.len()
    }

    /// Simulated time seen by this servo since initialization.
    pub fn clock(&self) -> SimTime {
        self.clock
    }

    /// Last motor command written to the hinge.
    pub fn last_command(&self) -> Option<JointMotor> {
        self.last_command
    }

    /// Friction model applied every fixed tick.
    pub fn friction(&self) -> &JointFriction {
        &self.friction
    }

    /// Reference direction, in the parent frame, that reads as zero degrees.
    pub fn zero_direction(&self) -> Vec3 {
        self.zero_direction
    }
}

/// `f32::clamp` without the panic on inverted or NaN bounds.
fn bound(value: f32, min: f32, max: f32) -> f32 {
    value.max(min).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimWorld;
    use servoquad_types::Quaternion;

    const DT: f32 = 1.0 / 60.0;

    /// Torso at the origin with a shank hanging half a metre below it.
    fn world() -> SimWorld {
        SimWorld::builder()
            .body(Pose::default())
            .body(Pose::at(Vec3::new(0.0, -0.5, 0.0)))
            .build()
    }

    fn joint(direction: Direction) -> JointConfig {
        JointConfig::new(-90.0, 90.0)
            .with_anchor(Vec3::new(0.0, 0.5, 0.0))
            .with_direction(direction)
    }

    fn servo(direction: Direction, profile: ActuatorProfile) -> ServoActuator {
        ServoActuator::new("knee", BodyHandle(1), Some(BodyHandle(0)), joint(direction))
            .with_profile(Arc::new(profile))
            .with_position_regulator(Arc::new(RegulatorProfile::new(10.0, 0.0, 0.0, 0.0)))
    }

    fn run(servo: &mut ServoActuator, world: &mut SimWorld, ticks: usize, dt: f32) {
        for _ in 0..ticks {
            servo.fixed_tick(world, dt).unwrap();
            world.step(dt);
        }
    }

    #[test]
    fn initialize_creates_free_enabled_joint_at_zero() {
        let mut w = world();
        let mut s = servo(Direction::Clockwise, ActuatorProfile::default());
        s.initialize(&mut w).unwrap();

        let joint = s.joint().unwrap();
        assert!(s.is_motor_enabled());
        assert!(!s.is_fixed());
        assert!(w.motor_enabled(joint).unwrap());
        assert_eq!(w.limits(joint).unwrap(), JointLimits::new(-91.0, 91.0));
        assert!(s.current_angle(&w).unwrap().abs() < 1e-4);
        assert!(s.target_angle().abs() < 1e-4);
    }

    #[test]
    fn counter_clockwise_commit_maps_to_negated_joint_target() {
        let mut w = world();
        let mut s = servo(Direction::CounterClockwise, ActuatorProfile::default());
        s.initialize(&mut w).unwrap();

        s.set_target_angle(60.0);
        s.fixed_tick(&mut w, DT).unwrap();
        assert_eq!(s.target_angle(), 60.0);
        assert_eq!(s.target_joint_angle(), -60.0);
    }

    #[test]
    fn commit_clamps_to_servo_space_bounds() {
        let mut w = world();
        let mut s = ServoActuator::new(
            "hip",
            BodyHandle(1),
            Some(BodyHandle(0)),
            JointConfig::new(-30.0, 60.0)
                .with_anchor(Vec3::new(0.0, 0.5, 0.0))
                .with_direction(Direction::CounterClockwise),
        )
        .with_profile(Arc::new(ActuatorProfile::default()))
        .with_position_regulator(Arc::new(RegulatorProfile::default()));
        s.initialize(&mut w).unwrap();

        // Counter-clockwise servo space is [-60, 30].
        s.set_target_angle(45.0);
        s.fixed_tick(&mut w, DT).unwrap();
        assert_eq!(s.target_angle(), 30.0);
        s.set_target_angle(-100.0);
        s.fixed_tick(&mut w, DT).unwrap();
        assert_eq!(s.target_angle(), -60.0);
        assert_eq!(s.target_joint_angle(), 60.0);
    }

    #[test]
    fn joint_to_servo_does_not_clamp() {
        let s = servo(Direction::CounterClockwise, ActuatorProfile::default());
        assert_eq!(s.joint_to_servo(150.0), -150.0);
        assert_eq!(s.servo_to_joint(-150.0), 90.0);
    }

    #[test]
    fn delayed_commit_lands_exactly_at_due_time() {
        let mut w = world();
        let mut s = servo(Direction::Clockwise, ActuatorProfile::new(0.1, 180.0, 10.0));
        s.initialize(&mut w).unwrap();
        let prior = s.target_angle();

        s.set_target_angle(45.0);
        let dt = 0.02;
        run(&mut s, &mut w, 4, dt);
        assert_eq!(s.target_angle(), prior, "committed before t=0.1");
        assert_eq!(s.pending_commits(), 1);

        run(&mut s, &mut w, 1, dt);
        assert_eq!(s.clock(), SimTime::from_secs(0.1));
        assert_eq!(s.target_angle(), 45.0);
        assert_eq!(s.pending_commits(), 0);
    }

    #[test]
    fn equal_delays_commit_in_issue_order() {
        let mut w = world();
        let mut s = servo(Direction::Clockwise, ActuatorProfile::new(0.1, 180.0, 10.0));
        s.initialize(&mut w).unwrap();

        s.set_target_angle(10.0);
        run(&mut s, &mut w, 3, 0.02);
        s.set_target_angle(20.0);
        assert_eq!(s.pending_commits(), 2);

        run(&mut s, &mut w, 2, 0.02);
        assert_eq!(s.target_angle(), 10.0);
        run(&mut s, &mut w, 3, 0.02);
        assert_eq!(s.target_angle(), 20.0);
        assert_eq!(s.pending_commits(), 0);
    }

    #[test]
    fn supersede_policy_drops_pending_commit() {
        let mut w = world();
        let mut s = servo(Direction::Clockwise, ActuatorProfile::new(0.1, 180.0, 10.0))
            .with_commit_policy(CommitPolicy::Supersede);
        s.initialize(&mut w).unwrap();

        s.set_target_angle(10.0);
        s.set_target_angle(20.0);
        assert_eq!(s.pending_commits(), 1);
        run(&mut s, &mut w, 5, 0.02);
        assert_eq!(s.target_angle(), 20.0);
    }

    #[test]
    fn tracks_target_through_physics() {
        let mut w = world();
        let mut s = servo(Direction::Clockwise, ActuatorProfile::default());
        s.initialize(&mut w).unwrap();

        s.set_target_angle(40.0);
        run(&mut s, &mut w, 180, DT);
        let angle = s.current_angle(&w).unwrap();
        assert!((angle - 40.0).abs() < 0.5, "angle={angle}");
    }

    #[test]
    fn counter_clockwise_servo_reports_mirrored_angle() {
        let mut w = world();
        let mut s = servo(Direction::CounterClockwise, ActuatorProfile::default());
        s.initialize(&mut w).unwrap();

        s.set_target_angle(25.0);
        run(&mut s, &mut w, 180, DT);
        let servo_angle = s.current_angle(&w).unwrap();
        assert!((servo_angle - 25.0).abs() < 0.5, "servo={servo_angle}");
        let hinge = w.hinge_angle(s.joint().unwrap()).unwrap();
        assert!((hinge + 25.0).abs() < 0.5, "hinge={hinge}");
    }

    #[test]
    fn position_loop_output_is_clamped_to_max_velocity() {
        let mut w = world();
        let mut s = servo(Direction::Clockwise, ActuatorProfile::new(0.0, 45.0, 10.0));
        s.initialize(&mut w).unwrap();

        s.set_target_angle(90.0);
        s.fixed_tick(&mut w, DT).unwrap();
        // p * error = 900 → clamped to 45; no velocity regulator attached.
        assert_eq!(s.last_command().unwrap().target_velocity, 45.0);
        assert_eq!(s.last_command().unwrap().max_force, 10.0);
    }

    #[test]
    fn velocity_correction_is_clamped() {
        let mut w = world();
        let mut s = servo(Direction::Clockwise, ActuatorProfile::new(0.0, 720.0, 10.0))
            .with_velocity_regulator(Arc::new(RegulatorProfile::new(100.0, 0.0, 0.0, 0.0)));
        s.initialize(&mut w).unwrap();

        s.set_target_angle(-90.0);
        s.fixed_tick(&mut w, DT).unwrap();
        // desired = -720, correction = 100 * -720 → clamped to -500.
        let cmd = s.last_command().unwrap();
        assert_eq!(cmd.target_velocity, -720.0 - VELOCITY_CORRECTION_LIMIT);
    }

    #[test]
    fn fixed_joint_holds_angle_despite_commands() {
        let mut w = world();
        let mut s = servo(Direction::Clockwise, ActuatorProfile::default());
        s.initialize(&mut w).unwrap();
        s.set_target_angle(30.0);
        run(&mut s, &mut w, 6, DT);

        s.set_fixed(&mut w, true).unwrap();
        assert!(s.is_fixed());
        let locked = s.current_angle(&w).unwrap();
        assert!((s.target_angle() - locked).abs() < 1e-4);

        s.set_target_angle(-70.0);
        for _ in 0..120 {
            s.fixed_tick(&mut w, DT).unwrap();
            w.step(DT);
            let angle = s.current_angle(&w).unwrap();
            assert!((angle - locked).abs() < 0.01, "drifted to {angle} from {locked}");
        }
    }

    #[test]
    fn unfix_restores_nominal_limits_exactly() {
        let mut w = world();
        let mut s = ServoActuator::new(
            "hip",
            BodyHandle(1),
            Some(BodyHandle(0)),
            JointConfig::new(-40.0, 75.0)
                .with_anchor(Vec3::new(0.0, 0.5, 0.0))
                .with_limit_margin(2.5),
        )
        .with_profile(Arc::new(ActuatorProfile::default()))
        .with_position_regulator(Arc::new(RegulatorProfile::default()));
        s.initialize(&mut w).unwrap();
        let joint = s.joint().unwrap();

        s.set_fixed(&mut w, true).unwrap();
        let held = w.limits(joint).unwrap();
        assert!((held.max - held.min - FIXATION_WINDOW).abs() < 1e-6);

        s.set_fixed(&mut w, false).unwrap();
        assert_eq!(w.limits(joint).unwrap(), JointLimits::new(-42.5, 77.5));
    }

    #[test]
    fn fixation_is_noop_without_joint_or_when_unchanged() {
        let mut w = world();
        let mut s = servo(Direction::Clockwise, ActuatorProfile::default());
        s.set_fixed(&mut w, true).unwrap();
        assert!(!s.is_fixed());

        s.initialize(&mut w).unwrap();
        let joint = s.joint().unwrap();
        s.set_fixed(&mut w, false).unwrap();
        assert_eq!(w.limits(joint).unwrap(), s.nominal_limits());
    }

    #[test]
    fn regulators_resume_after_unfix() {
        let mut w = world();
        let mut s = servo(Direction::Clockwise, ActuatorProfile::default());
        s.initialize(&mut w).unwrap();
        s.set_fixed(&mut w, true).unwrap();
        s.set_target_angle(20.0);
        run(&mut s, &mut w, 30, DT);
        s.set_fixed(&mut w, false).unwrap();
        run(&mut s, &mut w, 180, DT);
        assert!((s.current_angle(&w).unwrap() - 20.0).abs() < 0.5);
    }

    #[test]
    fn disabled_motor_issues_no_command() {
        let mut w = world();
        let mut s = servo(Direction::Clockwise, ActuatorProfile::default());
        s.initialize(&mut w).unwrap();
        s.set_motor_enabled(&mut w, false).unwrap();
        assert!(!w.motor_enabled(s.joint().unwrap()).unwrap());

        s.set_target_angle(45.0);
        run(&mut s, &mut w, 30, DT);
        assert!(s.last_command().is_none());
        assert!(s.current_angle(&w).unwrap().abs() < 1e-3);
    }

    #[test]
    fn unconfigured_servo_is_inert_but_still_commits() {
        let mut w = world();
        let mut s = ServoActuator::new("loose", BodyHandle(1), Some(BodyHandle(0)), joint(Direction::Clockwise));
        assert!(!s.is_configured());
        s.initialize(&mut w).unwrap();

        s.set_target_angle(15.0);
        run(&mut s, &mut w, 10, DT);
        assert_eq!(s.target_angle(), 15.0);
        assert!(s.last_command().is_none());
    }

    #[test]
    fn angular_velocity_is_relative_to_parent() {
        let mut w = world();
        let s = servo(Direction::Clockwise, ActuatorProfile::default());
        let spin = Vec3::RIGHT * 2.0;
        w.set_angular_velocity(BodyHandle(0), spin).unwrap();
        w.set_angular_velocity(BodyHandle(1), spin).unwrap();
        assert!(s.angular_velocity(&w).unwrap().abs() < 1e-4);
    }

    #[test]
    fn friction_reacts_on_parent_every_tick() {
        let mut w = world();
        let mut s = servo(Direction::Clockwise, ActuatorProfile::default())
            .with_friction(Arc::new(FrictionProfile {
                viscous_k: 0.001,
                static_k: 0.0,
            }));
        s.initialize(&mut w).unwrap();
        s.set_target_angle(45.0);
        for _ in 0..20 {
            s.fixed_tick(&mut w, DT).unwrap();
            let body = w.accumulated_torque(BodyHandle(1)).unwrap();
            let parent = w.accumulated_torque(BodyHandle(0)).unwrap();
            assert_eq!(parent, -body);
            w.step(DT);
        }
    }

    #[test]
    fn preview_tick_follows_geometry_until_initialized() {
        let mut w = world();
        let mut s = servo(Direction::Clockwise, ActuatorProfile::default());
        s.tick(&w).unwrap();
        let before = s.zero_direction();

        // Swing the shank by hand; without a joint the zero reference follows.
        let q = Quaternion::from_axis_angle(Vec3::RIGHT, 90.0);
        w.set_pose(BodyHandle(1), Pose::new(q.rotate(Vec3::new(0.0, -0.5, 0.0)), q))
            .unwrap();
        s.tick(&w).unwrap();
        assert!((s.zero_direction() - before).length() > 0.5);
        assert!(s.current_angle(&w).unwrap().abs() < 1e-4);
    }

    #[test]
    fn reinitialize_drops_old_handle_and_pending_commits() {
        let mut w = world();
        let mut s = servo(Direction::Clockwise, ActuatorProfile::new(0.5, 180.0, 10.0));
        s.initialize(&mut w).unwrap();
        let first = s.joint().unwrap();
        s.set_target_angle(10.0);
        assert_eq!(s.pending_commits(), 1);

        s.initialize(&mut w).unwrap();
        assert_ne!(s.joint().unwrap(), first);
        assert_eq!(s.pending_commits(), 0);
        assert_eq!(s.clock(), SimTime::ZERO);
    }

    #[test]
    fn negative_velocity_cap_fails_initialize() {
        let mut w = world();
        let mut s = servo(Direction::Clockwise, ActuatorProfile::new(0.0, -1.0, 10.0));
        assert!(matches!(
            s.initialize(&mut w),
            Err(QuadError::InvalidProfile { .. })
        ));
        assert!(s.joint().is_none());
        assert_eq!(w.hinge_count(), 0);

        s.set_target_angle(30.0);
        run(&mut s, &mut w, 5, DT);
        assert_eq!(s.target_angle(), 30.0);
        assert!(s.last_command().is_none());
    }

    #[test]
    fn malformed_joint_range_fails_initialize() {
        let mut w = world();
        for (min, max) in [(10.0, -10.0), (f32::NAN, 60.0)] {
            let config = JointConfig {
                min_angle: min,
                max_angle: max,
                ..joint(Direction::Clockwise)
            };
            let mut s = ServoActuator::new("hip", BodyHandle(1), Some(BodyHandle(0)), config)
                .with_profile(Arc::new(ActuatorProfile::default()))
                .with_position_regulator(Arc::new(RegulatorProfile::default()));
            let err = s.initialize(&mut w).unwrap_err();
            assert!(err.to_string().contains("hip"), "{err}");

            // Commands on the rejected servo still never panic.
            s.set_target_angle(45.0);
            s.fixed_tick(&mut w, DT).unwrap();
            let _ = s.servo_to_joint(45.0);
        }
        assert_eq!(w.hinge_count(), 0);
    }

    #[test]
    fn negative_integral_limit_fails_initialize() {
        let mut w = world();
        let mut s = servo(Direction::Clockwise, ActuatorProfile::default())
            .with_velocity_regulator(Arc::new(RegulatorProfile::new(1.0, 1.0, 0.0, -1.0)));
        let err = s.initialize(&mut w).unwrap_err();
        assert!(err.to_string().contains("knee.velocity_regulator"), "{err}");
    }

    #[test]
    fn stale_body_handle_surfaces_error() {
        let mut w = world();
        let mut s = ServoActuator::new("ghost", BodyHandle(7), None, JointConfig::default());
        assert_eq!(
            s.initialize(&mut w).unwrap_err(),
            QuadError::UnknownBody(BodyHandle(7))
        );
    }
}
