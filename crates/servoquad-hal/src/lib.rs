//! `servoquad-hal` – per-joint actuator control core.
//!
//! Everything that runs inside one joint's control loop lives here, written
//! against the injected [`PhysicsWorld`][world::PhysicsWorld] interface so the
//! physics engine stays an external, owned-elsewhere resource.
//!
//! # Modules
//!
//! - [`world`] – [`PhysicsWorld`][world::PhysicsWorld]: the read-pose /
//!   write-command surface of a physics engine, plus hinge command records.
//! - [`pid`] – [`PidRegulator`][pid::PidRegulator]: single-axis PID stage
//!   with a clamped integrator and an inert unconfigured mode.
//! - [`geometry`] – pure functions turning body poses into signed joint
//!   angles and parent-relative angular velocities.
//! - [`schedule`] – [`SimTime`][schedule::SimTime] and
//!   [`CommandSchedule`][schedule::CommandSchedule]: the delayed target-angle
//!   commit queue.
//! - [`servo`] – [`ServoActuator`][servo::ServoActuator]: cascaded
//!   position → velocity control, servo/joint angle spaces and the fixation
//!   state machine.
//! - [`friction`] – [`JointFriction`][friction::JointFriction]: Coulomb +
//!   viscous opposing torque with an equal reaction on the parent body.
//! - [`sim`] – [`SimWorld`][sim::SimWorld]: a small in-process hinge world
//!   for headless runs and tests without an external engine.

pub mod friction;
pub mod geometry;
pub mod pid;
pub mod schedule;
pub mod servo;
pub mod sim;
pub mod world;

pub use friction::JointFriction;
pub use pid::PidRegulator;
pub use schedule::{CommandSchedule, CommitPolicy, SimTime};
pub use servo::{Fixation, ServoActuator};
pub use sim::{SimWorld, SimWorldBuilder};
pub use world::{HingeSpec, JointLimits, JointMotor, PhysicsWorld, SimulatedWorld};
