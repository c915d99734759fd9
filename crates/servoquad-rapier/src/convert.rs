//! Conversions between the workspace math records and `nalgebra`, the math
//! library rapier is built on.

use std::f32::consts::PI;

use nalgebra::{Isometry3, Quaternion as NaQuaternion, Translation3, UnitQuaternion, Vector3};
use servoquad_types::{Pose, Quaternion, Vec3};

/// Workspace vector to `nalgebra`.
pub fn to_vector(v: Vec3) -> Vector3<f32> {
    Vector3::new(v.x, v.y, v.z)
}

/// `nalgebra` vector to the workspace record.
pub fn from_vector(v: &Vector3<f32>) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

/// Workspace quaternion to a normalized `nalgebra` rotation.
pub fn to_rotation(q: Quaternion) -> UnitQuaternion<f32> {
    UnitQuaternion::new_normalize(NaQuaternion::new(q.w, q.x, q.y, q.z))
}

pub fn from_rotation(q: &UnitQuaternion<f32>) -> Quaternion {
    let q = q.quaternion();
    Quaternion::new(q.w, q.i, q.j, q.k)
}

pub fn to_isometry(pose: &Pose) -> Isometry3<f32> {
    Isometry3::from_parts(
        Translation3::from(to_vector(pose.position)),
        to_rotation(pose.orientation),
    )
}

pub fn from_isometry(iso: &Isometry3<f32>) -> Pose {
    Pose::new(from_vector(&iso.translation.vector), from_rotation(&iso.rotation))
}

/// Rotation taking local `+X`, the free axis of a rapier revolute joint,
/// onto `axis`.
pub fn axis_frame(axis: Vec3) -> UnitQuaternion<f32> {
    UnitQuaternion::rotation_between(&Vector3::x(), &to_vector(axis))
        .unwrap_or_else(|| UnitQuaternion::from_axis_angle(&Vector3::y_axis(), PI))
}
