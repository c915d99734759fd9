//! `servoquad-rapier` – [`rapier3d`] backend for the servoquad actuator core.
//!
//! [`RapierWorld`] implements [`PhysicsWorld`][servoquad_hal::world::PhysicsWorld]
//! and [`SimulatedWorld`][servoquad_hal::world::SimulatedWorld] on top of a
//! full rapier pipeline.  Every body is a rapier rigid body and every servo
//! hinge is a revolute impulse joint whose free axis carries the velocity
//! motor, the force limit and the angle limits written by the servo.
//!
//! # Modules
//!
//! - [`convert`] – conversions between the workspace math records and
//!   `nalgebra`.
//! - [`world`] – [`RapierWorld`]: body and joint bookkeeping plus the
//!   pipeline step.
//!
//! # Example
//!
//! ```rust
//! use servoquad_hal::world::{HingeSpec, JointLimits, PhysicsWorld, SimulatedWorld};
//! use servoquad_rapier::RapierWorld;
//! use servoquad_types::{Pose, Vec3};
//!
//! let mut world = RapierWorld::new();
//! let torso = world.add_body(Pose::default());
//! let shank = world.add_body(Pose::at(Vec3::new(0.0, -0.5, 0.0)));
//! let joint = world
//!     .create_hinge(HingeSpec {
//!         body: shank,
//!         parent: Some(torso),
//!         anchor: Vec3::new(0.0, 0.5, 0.0),
//!         axis: Vec3::RIGHT,
//!         limits: JointLimits::new(-45.0, 45.0),
//!     })
//!     .unwrap();
//! world.step(1.0 / 60.0);
//! assert!(world.hinge_angle(joint).unwrap().abs() < 1e-3);
//! ```

pub mod convert;
pub mod world;

pub use world::{DEFAULT_INERTIA, DEFAULT_MASS, RapierWorld};
