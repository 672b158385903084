//! Unit quaternion rotations.

use serde::{Deserialize, Serialize};

use super::Vector3;
use crate::core::math::{NORM_EPSILON, SLERP_LINEAR_THRESHOLD};

/// Rotation represented as a unit quaternion (Hamilton convention).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    /// Scalar part
    pub w: f64,
    /// X component of the vector part
    pub x: f64,
    /// Y component of the vector part
    pub y: f64,
    /// Z component of the vector part
    pub z: f64,
}

impl Quaternion {
    /// Create a quaternion, normalized to unit length.
    ///
    /// A degenerate (near zero) input yields the identity rotation.
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }.normalized()
    }

    /// Identity rotation.
    #[inline]
    pub fn identity() -> Self {
        Self {
            w: 1.0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }

    /// Rotation of `angle` radians about `axis` (need not be unit length).
    pub fn from_axis_angle(axis: Vector3, angle: f64) -> Self {
        let norm = axis.norm();
        if norm < NORM_EPSILON {
            return Self::identity();
        }
        let (s, c) = (angle * 0.5).sin_cos();
        let k = s / norm;
        Self::new(c, axis.x * k, axis.y * k, axis.z * k)
    }

    /// Rotation about the Z axis (yaw).
    #[inline]
    pub fn from_yaw(yaw: f64) -> Self {
        Self::from_axis_angle(Vector3::new(0.0, 0.0, 1.0), yaw)
    }

    fn norm(&self) -> f64 {
        (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Unit-length copy of this quaternion.
    pub fn normalized(&self) -> Self {
        let n = self.norm();
        if n < NORM_EPSILON {
            return Self::identity();
        }
        Self {
            w: self.w / n,
            x: self.x / n,
            y: self.y / n,
            z: self.z / n,
        }
    }

    /// Inverse rotation (conjugate of a unit quaternion).
    #[inline]
    pub fn inverse(&self) -> Self {
        Self {
            w: self.w,
            x: -self.x,
            y: -self.y,
            z: -self.z,
        }
    }

    /// Hamilton product `self * other` (apply `other` first, then `self`).
    pub fn multiply(&self, other: &Quaternion) -> Quaternion {
        Quaternion {
            w: self.w * other.w - self.x * other.x - self.y * other.y - self.z * other.z,
            x: self.w * other.x + self.x * other.w + self.y * other.z - self.z * other.y,
            y: self.w * other.y - self.x * other.z + self.y * other.w + self.z * other.x,
            z: self.w * other.z + self.x * other.y - self.y * other.x + self.z * other.w,
        }
        .normalized()
    }

    /// Rotate a vector.
    ///
    /// ```text
    /// v' = v + 2w(q × v) + 2 q × (q × v)
    /// ```
    pub fn rotate(&self, v: &Vector3) -> Vector3 {
        let q = Vector3::new(self.x, self.y, self.z);
        let t = q.cross(v) * 2.0;
        *v + t * self.w + q.cross(&t)
    }

    /// Rotation angle in radians, in [0, π].
    pub fn angle(&self) -> f64 {
        let v = Vector3::new(self.x, self.y, self.z).norm();
        2.0 * v.atan2(self.w.abs())
    }

    /// Spherical linear interpolation, taking the shortest arc.
    pub fn slerp(&self, other: &Quaternion, t: f64) -> Quaternion {
        let mut end = *other;
        let mut dot = self.w * end.w + self.x * end.x + self.y * end.y + self.z * end.z;
        if dot < 0.0 {
            end = Quaternion {
                w: -end.w,
                x: -end.x,
                y: -end.y,
                z: -end.z,
            };
            dot = -dot;
        }

        if dot > SLERP_LINEAR_THRESHOLD {
            return Quaternion::new(
                self.w + (end.w - self.w) * t,
                self.x + (end.x - self.x) * t,
                self.y + (end.y - self.y) * t,
                self.z + (end.z - self.z) * t,
            );
        }

        let theta_0 = dot.acos();
        let theta = theta_0 * t;
        let sin_theta_0 = theta_0.sin();
        let s0 = (theta_0 - theta).sin() / sin_theta_0;
        let s1 = theta.sin() / sin_theta_0;
        Quaternion::new(
            self.w * s0 + end.w * s1,
            self.x * s0 + end.x * s1,
            self.y * s0 + end.y * s1,
            self.z * s0 + end.z * s1,
        )
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}
