//! `servoquad` – headless quadruped servo simulation.
//!
//! The binary:
//!
//! 1. Loads `servoquad.toml` (path from the first argument or
//!    `SERVOQUAD_CONFIG`), falling back to defaults when the file is absent.
//! 2. Spawns the stock quadruped in the configured physics backend (rapier by
//!    default, or the in-process hinge world) and commands the configured
//!    stance.
//! 3. Runs the fixed-step loop for `duration` simulated seconds, printing
//!    joint angles, heading and distance every `report_interval`.
//! 4. Intercepts **Ctrl-C** to stop the loop after the current step.

mod config;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use servoquad_hal::sim::SimWorld;
use servoquad_hal::world::SimulatedWorld;
use servoquad_rapier::RapierWorld;
use servoquad_runtime::robot::RobotController;
use servoquad_runtime::{Simulation, init_tracing, spawn_quadruped};
use servoquad_types::math::DEG_TO_RAD;
use servoquad_types::{QuadError, Vec3};
use tracing::{info, warn};

use crate::config::{LegStance, PhysicsBackend, SimConfig};

fn main() {
    init_tracing();
    print_banner();

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_handler = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping after the current step …".yellow().bold());
        running_handler.store(false, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; the run can only end on its own");
    }

    if let Err(e) = run(&running) {
        eprintln!("{}: {e}", "Error".red().bold());
        std::process::exit(1);
    }
}

fn run(running: &AtomicBool) -> Result<(), QuadError> {
    let path = config::config_path(std::env::args().nth(1));
    let cfg = match config::load_from(&path)? {
        Some(cfg) => {
            println!("  Config loaded from {}", path.display().to_string().bold());
            cfg
        }
        None => {
            println!(
                "  No config at {}; using defaults.",
                path.display().to_string().bold()
            );
            let mut cfg = SimConfig::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };
    cfg.validate()?;

    match cfg.physics.backend {
        PhysicsBackend::Rapier => {
            println!("  Physics: {}", "rapier3d".bold());
            let world = RapierWorld::new().with_gravity(Vec3::UP * -cfg.physics.gravity);
            simulate(world, &cfg, running)
        }
        PhysicsBackend::Sim => {
            println!("  Physics: {}", "in-process hinge world".bold());
            if cfg.physics.gravity != 0.0 {
                warn!(
                    gravity = cfg.physics.gravity,
                    "the in-process hinge world ignores gravity"
                );
            }
            simulate(SimWorld::new(), &cfg, running)
        }
    }
}

fn simulate<W: SimulatedWorld>(
    mut world: W,
    cfg: &SimConfig,
    running: &AtomicBool,
) -> Result<(), QuadError> {
    let robot = spawn_quadruped(&mut world, &cfg.layout, &cfg.profile_set())?;
    let mut sim = Simulation::new(world, robot, cfg.fixed_dt)?;
    sim.initialize()?;

    {
        let (world, robot) = sim.parts_mut();
        let body = robot.body();
        world.set_linear_velocity(body, robot.initial_forward() * cfg.body_velocity)?;
        world.set_angular_velocity(body, Vec3::UP * (cfg.body_yaw_rate * DEG_TO_RAD))?;
        apply_stance(robot, cfg);
    }

    let total = steps_for(cfg.duration, cfg.fixed_dt);
    let per_report = steps_for(cfg.report_interval, cfg.fixed_dt).max(1);
    info!(steps = total, fixed_dt = cfg.fixed_dt, "simulation started");
    println!();

    let mut done = 0;
    while done < total && running.load(Ordering::SeqCst) {
        sim.step()?;
        done += 1;
        if done % per_report == 0 || done == total {
            print_status(&sim)?;
        }
    }

    if done < total {
        println!("{}", format!("  Stopped after {done} of {total} steps.").yellow());
    } else {
        println!("{}", "  ✓ Run complete.".green());
    }
    Ok(())
}

/// Command every configured leg's stance target.
fn apply_stance(robot: &mut RobotController, cfg: &SimConfig) {
    for index in 0..robot.legs().len() {
        let Some(leg) = robot.leg_mut(index) else {
            continue;
        };
        let Some(LegStance { upper, lower }) = cfg.stance.get(leg.name()).copied() else {
            continue;
        };
        if let Some(servo) = leg.upper_mut() {
            servo.set_target_angle(upper);
        }
        if let Some(servo) = leg.lower_mut() {
            servo.set_target_angle(lower);
        }
    }
}

fn steps_for(seconds: f32, fixed_dt: f32) -> u64 {
    if !(seconds.is_finite() && seconds > 0.0) {
        return 0;
    }
    (f64::from(seconds) / f64::from(fixed_dt)).round() as u64
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║              servoquad               ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!(
        "  {} {}",
        "servoquad".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Quadruped servo actuator simulation");
    println!();
}

fn print_status<W: SimulatedWorld>(sim: &Simulation<W>) -> Result<(), QuadError> {
    let world = sim.world();
    let robot = sim.robot();
    println!(
        "  {} heading {:>7.2}°  distance {:>7.3} m",
        format!("t={}", sim.clock()).bold(),
        robot.heading(world)?,
        robot.distance(world)?
    );
    for leg in robot.legs() {
        let mut line = format!("    {:<12}", leg.name());
        for servo in leg.actuators() {
            let marker = if servo.is_fixed() { "⊘" } else { " " };
            line.push_str(&format!(
                " {}{:>8.2}° → {:>7.2}°",
                marker,
                servo.current_angle(world)?,
                servo.target_angle()
            ));
        }
        println!("{}", line.dimmed());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use servoquad_runtime::LEG_NAMES;

    #[test]
    fn steps_round_to_nearest_whole_step() {
        assert_eq!(steps_for(1.0, 0.02), 50);
        assert_eq!(steps_for(1.0, 1.0 / 60.0), 60);
        assert_eq!(steps_for(0.0, 0.02), 0);
        assert_eq!(steps_for(-3.0, 0.02), 0);
    }

    #[test]
    fn stance_targets_reach_named_leg_only() {
        let mut cfg = SimConfig::default();
        cfg.stance.insert(
            "rear_left".into(),
            LegStance {
                upper: 15.0,
                lower: -30.0,
            },
        );
        let mut world = SimWorld::new();
        let mut robot = spawn_quadruped(&mut world, &cfg.layout, &cfg.profile_set()).unwrap();
        robot.initialize(&mut world).unwrap();
        apply_stance(&mut robot, &cfg);
        robot.fixed_tick(&mut world, cfg.fixed_dt).unwrap();

        for leg in robot.legs() {
            let upper = leg.upper().unwrap().target_angle();
            let lower = leg.lower().unwrap().target_angle();
            if leg.name() == LEG_NAMES[2] {
                assert_eq!((upper, lower), (15.0, -30.0));
            } else {
                assert!(upper.abs() < 1e-4 && lower.abs() < 1e-4);
            }
        }
    }

    #[test]
    fn quadruped_reaches_stance_on_rapier() {
        let mut cfg = SimConfig::default();
        for name in LEG_NAMES {
            cfg.stance.insert(
                name.into(),
                LegStance {
                    upper: 20.0,
                    lower: -30.0,
                },
            );
        }
        let mut world = RapierWorld::new();
        let robot = spawn_quadruped(&mut world, &cfg.layout, &cfg.profile_set()).unwrap();
        let mut sim = Simulation::new(world, robot, cfg.fixed_dt).unwrap();
        sim.initialize().unwrap();
        assert_eq!(sim.world().hinge_count(), 8);

        apply_stance(sim.robot_mut(), &cfg);
        sim.run_for(4.0).unwrap();

        let (world, robot) = sim.parts_mut();
        for leg in robot.legs() {
            let upper = leg.upper().unwrap().current_angle(&*world).unwrap();
            let lower = leg.lower().unwrap().current_angle(&*world).unwrap();
            assert!((upper - 20.0).abs() < 1.0, "{} upper at {upper}", leg.name());
            assert!((lower + 30.0).abs() < 1.0, "{} lower at {lower}", leg.name());
        }
    }
}
