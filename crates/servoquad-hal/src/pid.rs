//! Single-axis PID regulator used for both stages of the servo cascade.
//!
//! The regulator holds its gains by shared reference to an immutable
//! [`RegulatorProfile`].  A regulator built without a profile is *inert*:
//! [`PidRegulator::run`] returns `0.0` and leaves its state untouched, so a
//! half-configured actuator degrades to "no command" instead of failing.
//!
//! There is no reset operation; the accumulated integrator and derivative
//! memory persist until the regulator is recreated.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use servoquad_hal::pid::PidRegulator;
//! use servoquad_types::RegulatorProfile;
//!
//! let mut pid = PidRegulator::new(Some(Arc::new(RegulatorProfile::new(10.0, 0.0, 0.0, 0.0))));
//! let output = pid.run(10.0, 0.0, 1.0 / 60.0);
//! assert!((output - 100.0).abs() < 1e-4);
//! ```

use std::sync::Arc;

use servoquad_types::RegulatorProfile;

/// A PID stage with an integrator clamped to `±i_limit`.
#[derive(Debug, Clone, Default)]
pub struct PidRegulator {
    profile: Option<Arc<RegulatorProfile>>,
    integrator: f32,
    previous_error: f32,
}

impl PidRegulator {
    /// Create a regulator with zeroed state.  `None` builds an inert one.
    pub fn new(profile: Option<Arc<RegulatorProfile>>) -> Self {
        Self {
            profile,
            integrator: 0.0,
            previous_error: 0.0,
        }
    }

    /// `true` when gains are attached.
    pub fn is_configured(&self) -> bool {
        self.profile.is_some()
    }

    /// Gains in use, if any.
    pub fn profile(&self) -> Option<&RegulatorProfile> {
        self.profile.as_deref()
    }

    /// Current value of the integral accumulator.
    pub fn integrator(&self) -> f32 {
        self.integrator
    }

    /// Error seen by the previous [`run`][Self::run] call.
    pub fn previous_error(&self) -> f32 {
        self.previous_error
    }

    /// Compute the next output for `target` given the measured `current`.
    ///
    /// The derivative term is dropped when `dt` is not positive so a zero
    /// step never produces a non-finite output.
    pub fn run(&mut self, target: f32, current: f32, dt: f32) -> f32 {
        let Some(profile) = self.profile.as_deref() else {
            return 0.0;
        };

        let error = target - current;

        // Negative or NaN limits act as zero.
        let limit = profile.i_limit.max(0.0);
        self.integrator = (self.integrator + error * dt).clamp(-limit, limit);

        let derivative = if dt > 0.0 {
            (error - self.previous_error) / dt
        } else {
            0.0
        };
        self.previous_error = error;

        profile.p * error + profile.i * self.integrator + profile.d * derivative
    }
}
