//! Joint friction: a Coulomb + viscous torque opposing the joint axis.
//!
//! ```text
//! torque = -axis_world * (velocity * viscous_k + static_k)
//! ```
//!
//! The torque is applied to the controlled body and its exact negative to the
//! parent body, so the pair receives no net torque from friction.

use std::sync::Arc;

use servoquad_types::{BodyHandle, FrictionProfile, QuadError, Vec3};
use tracing::warn;

use crate::world::PhysicsWorld;

/// Friction component attached to one servo joint.
///
/// Without a profile the component is inert.
#[derive(Debug, Clone, Default)]
pub struct JointFriction {
    profile: Option<Arc<FrictionProfile>>,
}

impl JointFriction {
    pub fn new(profile: Option<Arc<FrictionProfile>>) -> Self {
        Self { profile }
    }

    pub fn is_configured(&self) -> bool {
        self.profile.is_some()
    }

    pub fn profile(&self) -> Option<&FrictionProfile> {
        self.profile.as_deref()
    }

    /// Torque for a joint turning at `velocity` degrees per second about
    /// `axis_world`.  `None` when unconfigured.
    pub fn torque(&self, axis_world: Vec3, velocity: f32) -> Option<Vec3> {
        let profile = self.profile.as_deref()?;
        Some(-axis_world.normalized() * (velocity * profile.viscous_k + profile.static_k))
    }

    /// Apply the friction torque to `body` and the reaction to `parent`.
    ///
    /// Returns the torque applied to `body`.
    pub fn apply(
        &self,
        world: &mut dyn PhysicsWorld,
        body: BodyHandle,
        parent: Option<BodyHandle>,
        axis_world: Vec3,
        velocity: f32,
    ) -> Result<Option<Vec3>, QuadError> {
        let Some(torque) = self.torque(axis_world, velocity) else {
            return Ok(None);
        };
        world.add_torque(body, torque)?;
        if let Some(parent) = parent {
            world.add_torque(parent, -torque)?;
        }
        Ok(Some(torque))
    }

    /// Emit the one-time diagnostic for a joint without friction settings.
    pub(crate) fn report_unconfigured(&self, joint: &str) {
        if !self.is_configured() {
            warn!(joint, "friction profile not set; joint friction disabled");
        }
    }
}
