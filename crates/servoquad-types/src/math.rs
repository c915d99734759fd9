//! Rigid-body math primitives shared by every servoquad crate.
//!
//! The world frame is right-handed with `+Y` up, `+Z` forward and `+X` right.
//! Angles crossing crate boundaries are expressed in **degrees**; angular
//! velocities read from the physics world are in radians per second.
//!
//! # Example
//!
//! ```rust
//! use servoquad_types::math::{Quaternion, Vec3};
//!
//! // 90° about +Y turns forward (+Z) into right (+X).
//! let q = Quaternion::from_axis_angle(Vec3::UP, 90.0);
//! let r = q.rotate(Vec3::FORWARD);
//! assert!((r.x - 1.0).abs() < 1e-5);
//! assert!(r.z.abs() < 1e-5);
//! ```

use std::ops::{Add, AddAssign, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

/// Degrees per radian.
pub const RAD_TO_DEG: f32 = 180.0 / std::f32::consts::PI;
/// Radians per degree.
pub const DEG_TO_RAD: f32 = std::f32::consts::PI / 180.0;

// ────────────────────────────────────────────────────────────────────────────
// Vec3
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D vector used for points, directions, axes and angular velocities.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    /// The zero vector.
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);
    /// World / body-local `+X`.
    pub const RIGHT: Self = Self::new(1.0, 0.0, 0.0);
    /// World / body-local `+Y`.
    pub const UP: Self = Self::new(0.0, 1.0, 0.0);
    /// World / body-local `+Z`.
    pub const FORWARD: Self = Self::new(0.0, 0.0, 1.0);

    /// Create a new vector.
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    pub fn cross(self, rhs: Self) -> Self {
        Self::new(
            self.y * rhs.z - self.z * rhs.y,
            self.z * rhs.x - self.x * rhs.z,
            self.x * rhs.y - self.y * rhs.x,
        )
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Unit vector in the same direction, or [`Vec3::ZERO`] when the length
    /// is too small to normalise.
    pub fn normalized(self) -> Self {
        let len = self.length();
        if len > 1e-6 { self * (1.0 / len) } else { Self::ZERO }
    }

    /// Remove the component of `self` along `normal`.
    ///
    /// `normal` need not be unit length; a zero normal returns `self`.
    pub fn project_on_plane(self, normal: Self) -> Self {
        let sq = normal.dot(normal);
        if sq < f32::EPSILON {
            return self;
        }
        self - normal * (self.dot(normal) / sq)
    }

    /// Unsigned angle to `other` in degrees, `[0, 180]`.
    ///
    /// Returns `0` when either vector is (numerically) zero.  Uses `atan2`
    /// so small angles keep their precision in `f32`.
    pub fn angle_to(self, other: Self) -> f32 {
        if self.dot(self) * other.dot(other) < 1e-30 {
            return 0.0;
        }
        self.cross(other).length().atan2(self.dot(other)) * RAD_TO_DEG
    }
}

impl Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Neg for Vec3 {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Self;
    fn mul(self, s: f32) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Quaternion
// ────────────────────────────────────────────────────────────────────────────

/// A unit quaternion representing a 3-D rotation (w, x, y, z convention).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

impl Quaternion {
    /// Create a quaternion.  The caller is responsible for providing a unit
    /// quaternion (|q| = 1).
    pub const fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self { w, x, y, z }
    }

    /// The identity rotation.
    pub const fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Right-handed rotation of `degrees` about `axis`.
    ///
    /// A zero axis yields the identity.
    pub fn from_axis_angle(axis: Vec3, degrees: f32) -> Self {
        let axis = axis.normalized();
        if axis == Vec3::ZERO {
            return Self::identity();
        }
        let half = degrees * DEG_TO_RAD * 0.5;
        let s = half.sin();
        Self::new(half.cos(), axis.x * s, axis.y * s, axis.z * s)
    }

    /// Hamilton product: `self` applied after `rhs`.
    pub fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        )
    }

    /// Conjugate (== inverse for a unit quaternion).
    pub fn conjugate(self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    /// Rescale to unit length; a degenerate quaternion becomes the identity.
    pub fn normalized(self) -> Self {
        let n = (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt();
        if n < 1e-9 {
            return Self::identity();
        }
        Self::new(self.w / n, self.x / n, self.y / n, self.z / n)
    }

    /// Rotate a vector: p' = q * p * q*.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let p = Self::new(0.0, v.x, v.y, v.z);
        let r = self.mul(p).mul(self.conjugate());
        Vec3::new(r.x, r.y, r.z)
    }

    /// Rotate a world-space vector into this rotation's local frame.
    pub fn inverse_rotate(self, v: Vec3) -> Vec3 {
        self.conjugate().rotate(v)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Pose
// ────────────────────────────────────────────────────────────────────────────

/// World-space pose of a rigid body.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quaternion,
}

impl Pose {
    pub fn new(position: Vec3, orientation: Quaternion) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// Pose at `position` with identity orientation.
    pub fn at(position: Vec3) -> Self {
        Self::new(position, Quaternion::identity())
    }

    /// Map a body-local point into world space.
    pub fn transform_point(&self, local: Vec3) -> Vec3 {
        self.position + self.orientation.rotate(local)
    }

    /// Body `+Z` in world space.
    pub fn forward(&self) -> Vec3 {
        self.orientation.rotate(Vec3::FORWARD)
    }

    /// Body `+X` in world space.
    pub fn right(&self) -> Vec3 {
        self.orientation.rotate(Vec3::RIGHT)
    }

    /// Body `+Y` in world space.
    pub fn up(&self) -> Vec3 {
        self.orientation.rotate(Vec3::UP)
    }
}
