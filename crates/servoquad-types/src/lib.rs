//! `servoquad-types` – shared vocabulary of the servoquad workspace.
//!
//! Math primitives live in [`math`]; this module holds the physics handles,
//! the immutable tuning profiles consumed by the actuator core, joint geometry
//! configuration and the workspace-wide [`QuadError`].

pub mod math;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use math::{Pose, Quaternion, Vec3};

// ────────────────────────────────────────────────────────────────────────────
// Physics handles
// ────────────────────────────────────────────────────────────────────────────

/// Opaque identifier of a rigid body owned by a physics world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BodyHandle(pub usize);

/// Opaque identifier of a hinge joint owned by a physics world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JointHandle(pub usize);

impl fmt::Display for BodyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "body#{}", self.0)
    }
}

impl fmt::Display for JointHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "joint#{}", self.0)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Profiles
// ────────────────────────────────────────────────────────────────────────────

/// Gains of a single PID loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegulatorProfile {
    pub p: f32,
    pub i: f32,
    pub d: f32,
    /// Symmetric bound on the integral accumulator; must be `>= 0`.
    pub i_limit: f32,
}

impl Default for RegulatorProfile {
    fn default() -> Self {
        Self {
            p: 10.0,
            i: 0.0,
            d: 0.0,
            i_limit: 0.0,
        }
    }
}

impl RegulatorProfile {
    pub fn new(p: f32, i: f32, d: f32, i_limit: f32) -> Self {
        Self { p, i, d, i_limit }
    }

    /// Reject a negative or non-finite integral limit.
    pub fn validate(&self, name: &str) -> Result<(), QuadError> {
        if !(self.i_limit.is_finite() && self.i_limit >= 0.0) {
            return Err(QuadError::InvalidProfile {
                name: name.to_string(),
                details: format!("i_limit must be a finite value >= 0, got {}", self.i_limit),
            });
        }
        Ok(())
    }
}

/// Physical characteristics of a servo actuator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuatorProfile {
    /// Latency between a target-angle command and its effect, in seconds.
    pub delay: f32,
    /// Cap on the position loop output, in degrees per second.
    pub max_velocity: f32,
    /// Force limit handed to the physics joint motor.
    pub max_force: f32,
}

impl Default for ActuatorProfile {
    fn default() -> Self {
        Self {
            delay: 0.0,
            max_velocity: 180.0,
            max_force: 10.0,
        }
    }
}

impl ActuatorProfile {
    pub fn new(delay: f32, max_velocity: f32, max_force: f32) -> Self {
        Self {
            delay,
            max_velocity,
            max_force,
        }
    }

    /// Every field must be finite and non-negative.
    pub fn validate(&self, name: &str) -> Result<(), QuadError> {
        for (field, value) in [
            ("delay", self.delay),
            ("max_velocity", self.max_velocity),
            ("max_force", self.max_force),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(QuadError::InvalidProfile {
                    name: name.to_string(),
                    details: format!("{field} must be a finite value >= 0, got {value}"),
                });
            }
        }
        Ok(())
    }
}

/// Coulomb (`static_k`) and viscous (`viscous_k`) joint friction.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FrictionProfile {
    pub viscous_k: f32,
    pub static_k: f32,
}

// ────────────────────────────────────────────────────────────────────────────
// Joint configuration
// ────────────────────────────────────────────────────────────────────────────

/// Relation between servo-space and joint-space angles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Servo angle equals joint angle.
    #[default]
    Clockwise,
    /// Servo angle is the negated joint angle.
    CounterClockwise,
}

/// Default widening of the physics limits beyond the commanded range, in
/// degrees.  Solvers misbehave when the motor target sits on the constraint.
pub const DEFAULT_LIMIT_MARGIN: f32 = 1.0;

/// Immutable geometry of one servo joint.
///
/// `anchor` and `axis` are expressed in the controlled body's local frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JointConfig {
    pub anchor: Vec3,
    pub axis: Vec3,
    pub direction: Direction,
    pub min_angle: f32,
    pub max_angle: f32,
    pub limit_margin: f32,
}

impl Default for JointConfig {
    fn default() -> Self {
        Self {
            anchor: Vec3::ZERO,
            axis: Vec3::RIGHT,
            direction: Direction::Clockwise,
            min_angle: -180.0,
            max_angle: 180.0,
            limit_margin: DEFAULT_LIMIT_MARGIN,
        }
    }
}

impl JointConfig {
    /// Joint travelling between `min_angle` and `max_angle` degrees.  The
    /// bounds are reordered if given backwards.
    pub fn new(min_angle: f32, max_angle: f32) -> Self {
        Self {
            min_angle: min_angle.min(max_angle),
            max_angle: min_angle.max(max_angle),
            ..Self::default()
        }
    }

    pub fn with_anchor(mut self, anchor: Vec3) -> Self {
        self.anchor = anchor;
        self
    }

    pub fn with_axis(mut self, axis: Vec3) -> Self {
        self.axis = axis;
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_limit_margin(mut self, margin: f32) -> Self {
        self.limit_margin = margin;
        self
    }

    /// Commanded travel, `max_angle - min_angle`.
    pub fn range(&self) -> f32 {
        self.max_angle - self.min_angle
    }

    /// Both bounds must be finite with `min_angle <= max_angle`, and the
    /// margin finite and non-negative.
    pub fn validate(&self, name: &str) -> Result<(), QuadError> {
        let invalid = |details: String| QuadError::InvalidProfile {
            name: name.to_string(),
            details,
        };
        if !(self.min_angle.is_finite() && self.max_angle.is_finite()) {
            return Err(invalid(format!(
                "angle bounds must be finite, got [{}, {}]",
                self.min_angle, self.max_angle
            )));
        }
        if !(self.min_angle <= self.max_angle) {
            return Err(invalid(format!(
                "min_angle ({}) must not exceed max_angle ({})",
                self.min_angle, self.max_angle
            )));
        }
        if !(self.limit_margin.is_finite() && self.limit_margin >= 0.0) {
            return Err(invalid(format!(
                "limit_margin must be a finite value >= 0, got {}",
                self.limit_margin
            )));
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Workspace-wide error type.
///
/// None of these are raised by the control arithmetic itself; they surface
/// wiring mistakes (stale handles) and bad configuration input.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuadError {
    #[error("Unknown body: {0}")]
    UnknownBody(BodyHandle),

    #[error("Unknown joint: {0}")]
    UnknownJoint(JointHandle),

    #[error("Invalid profile '{name}': {details}")]
    InvalidProfile { name: String, details: String },

    #[error("Configuration error: {0}")]
    Config(String),
}
