//! Delayed target-angle commits.
//!
//! A servo does not react to a command instantly: every
//! [`ServoActuator::set_target_angle`][crate::servo::ServoActuator::set_target_angle]
//! call becomes a [`PendingCommit`] due at `now + delay`.  Commits live in a
//! per-actuator queue ordered by due time and are drained at the start of the
//! actuator's fixed tick.
//!
//! Simulated time is kept as an integer microsecond count ([`SimTime`]) so
//! that summing many `f32` step sizes does not drift past (or short of) a due
//! time.
//!
//! # Example
//!
//! ```rust
//! use servoquad_hal::schedule::{CommandSchedule, CommitPolicy, SimTime};
//!
//! let mut schedule = CommandSchedule::new(CommitPolicy::Overlap);
//! schedule.push(SimTime::from_secs(0.1), 45.0);
//!
//! assert!(schedule.drain_due(SimTime::from_secs(0.08)).is_empty());
//! assert_eq!(schedule.drain_due(SimTime::from_secs(0.1)), vec![45.0]);
//! ```

use std::fmt;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// SimTime
// ────────────────────────────────────────────────────────────────────────────

/// Monotonic simulation clock with microsecond resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimTime {
    micros: u64,
}

impl SimTime {
    pub const ZERO: Self = Self { micros: 0 };

    pub const fn from_micros(micros: u64) -> Self {
        Self { micros }
    }

    /// Convert seconds to the nearest microsecond.  Negative or non-finite
    /// input maps to zero.
    pub fn from_secs(secs: f32) -> Self {
        if !(secs.is_finite() && secs > 0.0) {
            return Self::ZERO;
        }
        Self {
            micros: (f64::from(secs) * 1_000_000.0).round() as u64,
        }
    }

    pub const fn as_micros(self) -> u64 {
        self.micros
    }

    pub fn as_secs(self) -> f64 {
        self.micros as f64 / 1_000_000.0
    }
}

impl Add for SimTime {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self {
            micros: self.micros.saturating_add(rhs.micros),
        }
    }
}

impl AddAssign for SimTime {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}s", self.as_secs())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// CommandSchedule
// ────────────────────────────────────────────────────────────────────────────

/// How a new command treats commits that are still pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitPolicy {
    /// Every command is an independent timer.  A later command with a shorter
    /// delay can land before an earlier one, and the last commit to *fire*
    /// wins.
    #[default]
    Overlap,
    /// A new command discards every pending commit, so the last command
    /// *issued* wins.
    Supersede,
}

/// A target angle waiting for its due time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingCommit {
    pub due: SimTime,
    pub angle: f32,
}

/// Time-ordered queue of pending commits.
///
/// Commits sharing a due time fire in insertion order.
#[derive(Debug, Clone, Default)]
pub struct CommandSchedule {
    policy: CommitPolicy,
    pending: Vec<PendingCommit>,
}

impl CommandSchedule {
    pub fn new(policy: CommitPolicy) -> Self {
        Self {
            policy,
            pending: Vec::new(),
        }
    }

    pub fn policy(&self) -> CommitPolicy {
        self.policy
    }

    /// Queue `angle` to commit at `due`.
    pub fn push(&mut self, due: SimTime, angle: f32) {
        if self.policy == CommitPolicy::Supersede {
            self.pending.clear();
        }
        let at = self.pending.partition_point(|c| c.due <= due);
        self.pending.insert(at, PendingCommit { due, angle });
    }

    /// Remove and return, in firing order, every commit due at or before
    /// `now`.
    pub fn drain_due(&mut self, now: SimTime) -> Vec<f32> {
        let split = self.pending.partition_point(|c| c.due <= now);
        self.pending.drain(..split).map(|c| c.angle).collect()
    }

    /// Due time of the next commit, if any.
    pub fn next_due(&self) -> Option<SimTime> {
        self.pending.first().map(|c| c.due)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_secs_rounds_to_microseconds() {
        assert_eq!(SimTime::from_secs(0.1).as_micros(), 100_000);
        assert_eq!(SimTime::from_secs(0.02).as_micros(), 20_000);
        assert_eq!(SimTime::from_secs(1.0 / 60.0).as_micros(), 16_667);
        assert_eq!(SimTime::from_secs(-1.0), SimTime::ZERO);
        assert_eq!(SimTime::from_secs(f32::NAN), SimTime::ZERO);
    }

    #[test]
    fn summed_steps_reach_due_time_exactly() {
        let step = SimTime::from_secs(0.02);
        let mut now = SimTime::ZERO;
        for _ in 0..5 {
            now += step;
        }
        assert_eq!(now, SimTime::from_secs(0.1));
    }

    #[test]
    fn drain_returns_only_due_commits_in_time_order() {
        let mut schedule = CommandSchedule::new(CommitPolicy::Overlap);
        schedule.push(SimTime::from_micros(300), 3.0);
        schedule.push(SimTime::from_micros(100), 1.0);
        schedule.push(SimTime::from_micros(200), 2.0);

        assert_eq!(schedule.drain_due(SimTime::from_micros(250)), vec![1.0, 2.0]);
        assert_eq!(schedule.len(), 1);
        assert_eq!(schedule.next_due(), Some(SimTime::from_micros(300)));
    }

    #[test]
    fn equal_due_times_fire_in_insertion_order() {
        let mut schedule = CommandSchedule::new(CommitPolicy::Overlap);
        schedule.push(SimTime::from_micros(50), 10.0);
        schedule.push(SimTime::from_micros(50), 20.0);
        assert_eq!(schedule.drain_due(SimTime::from_micros(50)), vec![10.0, 20.0]);
    }

    #[test]
    fn overlap_lets_shorter_delay_fire_first() {
        // Long-delay command issued first, short-delay command issued second:
        // the stale long-delay value fires last.
        let mut schedule = CommandSchedule::new(CommitPolicy::Overlap);
        schedule.push(SimTime::from_micros(500), 30.0);
        schedule.push(SimTime::from_micros(200), 60.0);
        let fired = schedule.drain_due(SimTime::from_micros(1_000));
        assert_eq!(fired.last(), Some(&30.0));
    }

    #[test]
    fn supersede_discards_pending_commits() {
        let mut schedule = CommandSchedule::new(CommitPolicy::Supersede);
        schedule.push(SimTime::from_micros(500), 30.0);
        schedule.push(SimTime::from_micros(200), 60.0);
        assert_eq!(schedule.len(), 1);
        assert_eq!(schedule.drain_due(SimTime::from_micros(1_000)), vec![60.0]);
        assert!(schedule.is_empty());
    }
}
