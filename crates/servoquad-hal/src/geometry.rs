//! Joint geometry: signed hinge angle and axis-relative angular velocity from
//! explicit body poses.
//!
//! Physics engines report hinge angles in their own (and sometimes broken)
//! conventions, so the actuator measures its joint directly: it captures a
//! *zero direction* in the parent frame at initialization and later measures
//! the signed angle between that direction and the current one about the
//! rotation axis.
//!
//! All functions here are pure.  `anchor` and `axis` are body-local; `parent`
//! is the pose of the body the joint hangs from, or `None` for a joint
//! anchored to the world.
//!
//! # Example
//!
//! ```rust
//! use servoquad_hal::geometry::signed_angle;
//! use servoquad_types::Vec3;
//!
//! let a = signed_angle(Vec3::FORWARD, Vec3::RIGHT, Vec3::UP);
//! assert!((a - 90.0).abs() < 1e-4);
//! let b = signed_angle(Vec3::RIGHT, Vec3::FORWARD, Vec3::UP);
//! assert!((b + 90.0).abs() < 1e-4);
//! ```

use servoquad_types::math::RAD_TO_DEG;
use servoquad_types::{Pose, Vec3};

/// `cos(45°)`: threshold for choosing the fallback reference axis.
const FALLBACK_AXIS_COS: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// Replace a zero axis with `+X`; normalise anything else.
pub fn corrected_axis(axis: Vec3) -> Vec3 {
    if axis.length() == 0.0 {
        Vec3::RIGHT
    } else {
        axis.normalized()
    }
}

/// Rotation axis of the body expressed in its parent's frame (or the world
/// frame when there is no parent).
pub fn axis_in_parent_frame(pose: &Pose, parent: Option<&Pose>, axis: Vec3) -> Vec3 {
    let world = pose.orientation.rotate(axis);
    match parent {
        Some(parent) => parent.orientation.inverse_rotate(world),
        None => world,
    }
}

/// Unit direction from the joint anchor to the body reference point, in the
/// parent frame, projected onto the joint's plane of rotation.
///
/// When the anchor sits on the reference point, or the direction is parallel
/// to the axis, a body-local axis is used instead: body `+Z` if `axis` is at
/// least 45° away from `+Z`, otherwise body `+X`.  This keeps the projection
/// well defined.
pub fn joint_direction(
    pose: &Pose,
    parent: Option<&Pose>,
    anchor: Vec3,
    axis: Vec3,
    axis_in_parent: Vec3,
) -> Vec3 {
    let mut dir = pose.position - pose.transform_point(anchor);

    let world_axis = pose.orientation.rotate(axis);
    let degenerate = dir.length() < 1e-6 || dir.normalized().dot(world_axis).abs() >= 1.0 - 1e-6;
    if degenerate {
        dir = if Vec3::FORWARD.dot(axis).abs() <= FALLBACK_AXIS_COS {
            pose.forward()
        } else {
            pose.right()
        };
    }

    if let Some(parent) = parent {
        dir = parent.orientation.inverse_rotate(dir);
    }

    dir.project_on_plane(axis_in_parent).normalized()
}

/// Signed angle from `from` to `to` about `axis`, in degrees within
/// `[-180, 180]`.  Positive follows the right-hand rule around `axis`.
pub fn signed_angle(from: Vec3, to: Vec3, axis: Vec3) -> f32 {
    let unsigned = from.angle_to(to);
    if axis.dot(from.cross(to)) < 0.0 {
        -unsigned
    } else {
        unsigned
    }
}

/// Angular velocity of the body relative to its parent, projected on the
/// body-local `axis`, in degrees per second.
///
/// `angular_velocity` and `parent_angular_velocity` are world-frame, radians
/// per second.
pub fn relative_angular_velocity(
    pose: &Pose,
    angular_velocity: Vec3,
    parent_angular_velocity: Option<Vec3>,
    axis: Vec3,
) -> f32 {
    let mut velocity = angular_velocity * RAD_TO_DEG;
    if let Some(parent) = parent_angular_velocity {
        velocity = velocity - parent * RAD_TO_DEG;
    }
    pose.orientation.inverse_rotate(velocity).dot(axis)
}
