//! `servoquad-runtime` – robot assembly and the fixed-step loop.
//!
//! Everything above a single joint lives here: legs, the robot controller
//! with its heading/distance reference, the stock quadruped layout and the
//! driver that interleaves control ticks with physics steps.
//!
//! # Modules
//!
//! - [`robot`] – [`RobotController`][robot::RobotController] and
//!   [`Leg`][robot::Leg]: actuator grouping, batch fixation and motor gating,
//!   heading and walked distance.
//! - [`quadruped`] – [`spawn_quadruped`][quadruped::spawn_quadruped]: builds
//!   a torso and four two-segment legs in any
//!   [`SimulatedWorld`][servoquad_hal::world::SimulatedWorld] and wires shared
//!   profiles into every actuator.
//! - [`simulation`] – [`Simulation`][simulation::Simulation]: fixed-step
//!   driver owning the world, the robot and the simulated clock.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: installs the
//!   global `tracing` subscriber.

pub mod quadruped;
pub mod robot;
pub mod simulation;
pub mod telemetry;

pub use quadruped::{LEG_NAMES, ProfileSet, QuadrupedLayout, spawn_quadruped};
pub use robot::{Leg, LegSegment, RobotController};
pub use simulation::Simulation;
pub use telemetry::{LogFormat, init_tracing};
