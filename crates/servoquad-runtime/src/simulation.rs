//! Fixed-step driver tying a [`RobotController`] to a [`SimulatedWorld`].
//!
//! Each physics step runs [`RobotController::fixed_tick`] exactly once and
//! then advances the world by the same `fixed_dt`.  Variable-rate callers use
//! [`Simulation::advance`], which runs the per-frame
//! [`tick`][RobotController::tick] and as many whole fixed steps as the
//! accumulated frame time allows.
//!
//! # Example
//!
//! ```rust
//! use servoquad_hal::sim::SimWorld;
//! use servoquad_runtime::quadruped::{spawn_quadruped, ProfileSet, QuadrupedLayout};
//! use servoquad_runtime::simulation::Simulation;
//!
//! let mut world = SimWorld::new();
//! let robot = spawn_quadruped(&mut world, &QuadrupedLayout::default(), &ProfileSet::default()).unwrap();
//! let mut sim = Simulation::new(world, robot, 1.0 / 60.0).unwrap();
//! sim.initialize().unwrap();
//! assert_eq!(sim.run_for(1.0).unwrap(), 60);
//! ```

use servoquad_hal::schedule::SimTime;
use servoquad_hal::world::SimulatedWorld;
use servoquad_types::QuadError;
use tracing::{debug, warn};

use crate::robot::RobotController;

/// Upper bound on fixed steps run by a single [`Simulation::advance`] call.
/// Frame time beyond that is dropped so a stalled caller cannot spiral.
pub const MAX_STEPS_PER_FRAME: u32 = 8;

/// Owns the world and the robot and keeps the simulated clock.
pub struct Simulation<W: SimulatedWorld> {
    world: W,
    robot: RobotController,
    fixed_dt: f32,
    clock: SimTime,
    accumulator: f32,
}

impl<W: SimulatedWorld> Simulation<W> {
    /// `fixed_dt` must be a finite number of seconds greater than zero.
    pub fn new(world: W, robot: RobotController, fixed_dt: f32) -> Result<Self, QuadError> {
        if !(fixed_dt.is_finite() && fixed_dt > 0.0) {
            return Err(QuadError::Config(format!(
                "fixed_dt must be a finite value > 0, got {fixed_dt}"
            )));
        }
        Ok(Self {
            world,
            robot,
            fixed_dt,
            clock: SimTime::ZERO,
            accumulator: 0.0,
        })
    }

    /// Initialize the robot against the owned world and reset the clock.
    pub fn initialize(&mut self) -> Result<(), QuadError> {
        self.robot.initialize(&mut self.world)?;
        self.clock = SimTime::ZERO;
        self.accumulator = 0.0;
        Ok(())
    }

    /// One fixed step: control first, then physics.
    pub fn step(&mut self) -> Result<(), QuadError> {
        self.robot.fixed_tick(&mut self.world, self.fixed_dt)?;
        self.world.step(self.fixed_dt);
        self.clock += SimTime::from_secs(self.fixed_dt);
        Ok(())
    }

    /// Run the whole number of fixed steps closest to `duration` seconds.
    /// Returns the number of steps taken.
    pub fn run_for(&mut self, duration: f32) -> Result<u64, QuadError> {
        if !(duration.is_finite() && duration > 0.0) {
            return Ok(0);
        }
        let steps = (f64::from(duration) / f64::from(self.fixed_dt)).round() as u64;
        for _ in 0..steps {
            self.step()?;
        }
        debug!(steps, clock = %self.clock, "run finished");
        Ok(steps)
    }

    /// Feed `frame_dt` seconds of wall time.  Runs the per-frame tick, then
    /// the fixed steps that fit.  Returns the number of fixed steps taken.
    pub fn advance(&mut self, frame_dt: f32) -> Result<u32, QuadError> {
        self.robot.tick(&self.world)?;
        if frame_dt.is_finite() && frame_dt > 0.0 {
            self.accumulator += frame_dt;
        }

        let mut steps = 0;
        while self.accumulator >= self.fixed_dt {
            if steps == MAX_STEPS_PER_FRAME {
                warn!(
                    dropped = self.accumulator,
                    "simulation falling behind; dropping frame time"
                );
                self.accumulator = 0.0;
                break;
            }
            self.step()?;
            self.accumulator -= self.fixed_dt;
            steps += 1;
        }
        Ok(steps)
    }

    /// The owned world.
    pub fn world(&self) -> &W {
        &self.world
    }

    /// Mutable access to the owned world.
    pub fn world_mut(&mut self) -> &mut W {
        &mut self.world
    }

    /// The owned robot.
    pub fn robot(&self) -> &RobotController {
        &self.robot
    }

    /// Mutable access to the owned robot.
    pub fn robot_mut(&mut self) -> &mut RobotController {
        &mut self.robot
    }

    /// Split borrow for callers that command the robot against the world.
    pub fn parts_mut(&mut self) -> (&mut W, &mut RobotController) {
        (&mut self.world, &mut self.robot)
    }

    /// Seconds per fixed step.
    pub fn fixed_dt(&self) -> f32 {
        self.fixed_dt
    }

    /// Simulated time since the last [`initialize`][Self::initialize].
    pub fn clock(&self) -> SimTime {
        self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::quadruped::{ProfileSet, QuadrupedLayout, spawn_quadruped};
    use servoquad_hal::sim::SimWorld;
    use servoquad_types::{ActuatorProfile, RegulatorProfile};

    fn quadruped(delay: f32) -> Simulation<SimWorld> {
        let mut world = SimWorld::new();
        let profiles = ProfileSet {
            servo: Some(Arc::new(ActuatorProfile::new(delay, 180.0, 10.0))),
            position_regulator: Some(Arc::new(RegulatorProfile::default())),
            ..ProfileSet::default()
        };
        let robot = spawn_quadruped(&mut world, &QuadrupedLayout::default(), &profiles).unwrap();
        let mut sim = Simulation::new(world, robot, 0.02).unwrap();
        sim.initialize().unwrap();
        sim
    }

    #[test]
    fn rejects_non_positive_step() {
        let world = SimWorld::new();
        let robot = RobotController::new(servoquad_types::BodyHandle(0), 0.0);
        assert!(Simulation::new(world, robot, 0.0).is_err());
    }

    #[test]
    fn run_for_counts_steps_and_clock() {
        let mut sim = quadruped(0.0);
        assert_eq!(sim.run_for(1.0).unwrap(), 50);
        assert_eq!(sim.clock(), SimTime::from_secs(1.0));
    }

    #[test]
    fn delayed_commit_lands_after_five_steps() {
        let mut sim = quadruped(0.1);
        for servo in sim.robot_mut().actuators_mut() {
            servo.set_target_angle(45.0);
        }
        sim.run_for(0.08).unwrap();
        assert!(sim.robot().actuators().all(|s| s.target_angle() != 45.0));
        sim.step().unwrap();
        assert!(sim.robot().actuators().all(|s| s.target_angle() == 45.0));
    }

    #[test]
    fn stance_is_reached() {
        let mut sim = quadruped(0.0);
        {
            let (_, robot) = sim.parts_mut();
            for servo in robot.actuators_mut() {
                servo.set_target_angle(20.0);
            }
        }
        sim.run_for(3.0).unwrap();
        let (world, robot) = sim.parts_mut();
        for servo in robot.actuators() {
            let angle = servo.current_angle(&*world).unwrap();
            assert!((angle - 20.0).abs() < 0.5, "{} at {angle}", servo.name());
        }
    }

    #[test]
    fn advance_accumulates_partial_frames() {
        let mut sim = quadruped(0.0);
        assert_eq!(sim.advance(0.015).unwrap(), 0);
        assert_eq!(sim.advance(0.015).unwrap(), 1);
        assert_eq!(sim.advance(0.045).unwrap(), 2);
    }

    #[test]
    fn advance_caps_steps_per_frame() {
        let mut sim = quadruped(0.0);
        assert_eq!(sim.advance(10.0).unwrap(), MAX_STEPS_PER_FRAME);
        assert_eq!(sim.advance(0.0).unwrap(), 0);
    }
}
