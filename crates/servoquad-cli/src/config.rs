//! Simulation settings – reads `servoquad.toml`.
//!
//! Every field is optional in the file; missing values fall back to the
//! defaults below.  `SERVOQUAD_*` environment overrides are applied after
//! parsing.
//!
//! ```toml
//! fixed_dt = 0.02
//! duration = 5.0
//! commit_policy = "overlap"
//!
//! [physics]
//! backend = "rapier"
//! gravity = 0.0
//!
//! [servo]
//! delay = 0.1
//! max_velocity = 180.0
//! max_force = 10.0
//!
//! [position_regulator]
//! p = 10.0
//!
//! [stance.front_left]
//! upper = 20.0
//! lower = -40.0
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use servoquad_hal::schedule::CommitPolicy;
use servoquad_runtime::quadruped::{LEG_NAMES, ProfileSet, QuadrupedLayout};
use servoquad_types::{ActuatorProfile, FrictionProfile, QuadError, RegulatorProfile};

/// File name looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "servoquad.toml";

/// Physics engine the robot runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhysicsBackend {
    /// rapier3d rigid-body pipeline.
    #[default]
    Rapier,
    /// Small deterministic in-process hinge world.
    Sim,
}

/// `[physics]` table.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsSettings {
    pub backend: PhysicsBackend,
    /// Downward acceleration in metres per second squared.  Only the rapier
    /// backend simulates gravity.
    pub gravity: f32,
}

/// Servo-space targets for one leg, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LegStance {
    pub upper: f32,
    pub lower: f32,
}

/// Settings of one headless run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Physics / control step in seconds.
    #[serde(default = "default_fixed_dt")]
    pub fixed_dt: f32,

    /// Simulated seconds to run.
    #[serde(default = "default_duration")]
    pub duration: f32,

    /// Simulated seconds between status reports.
    #[serde(default = "default_report_interval")]
    pub report_interval: f32,

    #[serde(default)]
    pub commit_policy: CommitPolicy,

    #[serde(default)]
    pub physics: PhysicsSettings,

    #[serde(default = "default_servo")]
    pub servo: Option<ActuatorProfile>,

    #[serde(default = "default_position_regulator")]
    pub position_regulator: Option<RegulatorProfile>,

    #[serde(default)]
    pub velocity_regulator: Option<RegulatorProfile>,

    #[serde(default)]
    pub friction: Option<FrictionProfile>,

    #[serde(default)]
    pub layout: QuadrupedLayout,

    /// Forward speed imposed on the torso, metres per second.
    #[serde(default)]
    pub body_velocity: f32,

    /// Yaw rate imposed on the torso, degrees per second.
    #[serde(default)]
    pub body_yaw_rate: f32,

    /// Stance targets keyed by leg name.
    #[serde(default)]
    pub stance: BTreeMap<String, LegStance>,
}

fn default_fixed_dt() -> f32 {
    0.02
}
fn default_duration() -> f32 {
    5.0
}
fn default_report_interval() -> f32 {
    1.0
}
fn default_servo() -> Option<ActuatorProfile> {
    Some(ActuatorProfile::default())
}
fn default_position_regulator() -> Option<RegulatorProfile> {
    Some(RegulatorProfile::default())
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            fixed_dt: default_fixed_dt(),
            duration: default_duration(),
            report_interval: default_report_interval(),
            commit_policy: CommitPolicy::default(),
            physics: PhysicsSettings::default(),
            servo: default_servo(),
            position_regulator: default_position_regulator(),
            velocity_regulator: None,
            friction: None,
            layout: QuadrupedLayout::default(),
            body_velocity: 0.0,
            body_yaw_rate: 0.0,
            stance: BTreeMap::new(),
        }
    }
}

impl SimConfig {
    /// Reject values the simulation cannot run with.
    pub fn validate(&self) -> Result<(), QuadError> {
        if !(self.fixed_dt.is_finite() && self.fixed_dt > 0.0) {
            return Err(QuadError::Config(format!(
                "fixed_dt must be a finite value > 0, got {}",
                self.fixed_dt
            )));
        }
        if !(self.duration.is_finite() && self.duration >= 0.0) {
            return Err(QuadError::Config(format!(
                "duration must be a finite value >= 0, got {}",
                self.duration
            )));
        }
        if !self.physics.gravity.is_finite() {
            return Err(QuadError::Config(format!(
                "physics.gravity must be finite, got {}",
                self.physics.gravity
            )));
        }
        if let Some(servo) = &self.servo {
            servo.validate("servo")?;
        }
        if let Some(pid) = &self.position_regulator {
            pid.validate("position_regulator")?;
        }
        if let Some(pid) = &self.velocity_regulator {
            pid.validate("velocity_regulator")?;
        }
        self.layout.validate()?;
        if let Some(unknown) = self.stance.keys().find(|k| !LEG_NAMES.contains(&k.as_str())) {
            return Err(QuadError::Config(format!(
                "unknown leg '{unknown}' in [stance]; expected one of {}",
                LEG_NAMES.join(", ")
            )));
        }
        Ok(())
    }

    /// Shared profiles for every actuator of the robot.
    pub fn profile_set(&self) -> ProfileSet {
        ProfileSet {
            servo: self.servo.map(Arc::new),
            position_regulator: self.position_regulator.map(Arc::new),
            velocity_regulator: self.velocity_regulator.map(Arc::new),
            friction: self.friction.map(Arc::new),
            commit_policy: self.commit_policy,
        }
    }
}

/// Resolve the config path: explicit argument, then `SERVOQUAD_CONFIG`, then
/// [`DEFAULT_CONFIG_FILE`].
pub fn config_path(arg: Option<String>) -> PathBuf {
    resolve_path(arg, std::env::var("SERVOQUAD_CONFIG").ok())
}

/// Extracted for testability without mutating environment variables.
pub(crate) fn resolve_path(arg: Option<String>, env: Option<String>) -> PathBuf {
    arg.or(env)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Load the config from `path`.  Returns `None` if the file does not exist.
pub fn load_from(path: &Path) -> Result<Option<SimConfig>, QuadError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        QuadError::Config(format!("failed to read config at {}: {e}", path.display()))
    })?;
    let mut cfg: SimConfig = toml::from_str(&raw)
        .map_err(|e| QuadError::Config(format!("failed to parse {}: {e}", path.display())))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `SERVOQUAD_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `SERVOQUAD_FIXED_DT` | `fixed_dt` |
/// | `SERVOQUAD_DURATION` | `duration` |
///
/// Values that do not parse as numbers are ignored.
pub fn apply_env_overrides(cfg: &mut SimConfig) {
    apply_overrides_from(cfg, |key| std::env::var(key).ok());
}

pub(crate) fn apply_overrides_from(cfg: &mut SimConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("SERVOQUAD_FIXED_DT")
        && let Ok(dt) = v.trim().parse::<f32>()
    {
        cfg.fixed_dt = dt;
    }
    if let Some(v) = lookup("SERVOQUAD_DURATION")
        && let Ok(duration) = v.trim().parse::<f32>()
    {
        cfg.duration = duration;
    }
}
