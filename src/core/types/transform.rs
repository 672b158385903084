//! Rigid body transforms.
//!
//! Naming follows the `T_A_B` convention: `T_A_B` maps points expressed in
//! frame B into frame A, so `T_A_C = T_A_B.compose(&T_B_C)`.

use serde::{Deserialize, Serialize};

use super::{Quaternion, Vector3};

/// Rigid body transform (rotation + translation) in 3D.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform3D {
    /// Rotation part
    #[serde(default)]
    pub rotation: Quaternion,
    /// Translation in meters
    #[serde(default)]
    pub translation: Vector3,
}

impl Transform3D {
    /// Create a transform from rotation and translation.
    #[inline]
    pub fn new(rotation: Quaternion, translation: Vector3) -> Self {
        Self {
            rotation: rotation.normalized(),
            translation,
        }
    }

    /// Identity transform.
    #[inline]
    pub fn identity() -> Self {
        Self {
            rotation: Quaternion::identity(),
            translation: Vector3::zero(),
        }
    }

    /// Pure translation.
    #[inline]
    pub fn from_translation(translation: Vector3) -> Self {
        Self::new(Quaternion::identity(), translation)
    }

    /// Compose two transforms: self ∘ other
    ///
    /// ```text
    /// C = A ∘ B:
    ///   C.R = A.R · B.R
    ///   C.t = A.R · B.t + A.t
    /// ```
    pub fn compose(&self, other: &Transform3D) -> Transform3D {
        Transform3D {
            rotation: self.rotation.multiply(&other.rotation),
            translation: self.rotation.rotate(&other.translation) + self.translation,
        }
    }

    /// Inverse of this transform.
    ///
    /// ```text
    /// A⁻¹:
    ///   R = A.Rᵀ
    ///   t = -A.Rᵀ · A.t
    /// ```
    pub fn inverse(&self) -> Transform3D {
        let r_inv = self.rotation.inverse();
        Transform3D {
            rotation: r_inv,
            translation: -r_inv.rotate(&self.translation),
        }
    }

    /// Map a point from the source frame into the target frame.
    #[inline]
    pub fn transform_point(&self, point: &Vector3) -> Vector3 {
        self.rotation.rotate(point) + self.translation
    }

    /// Interpolate between two transforms.
    ///
    /// Linear interpolation for translation and slerp for rotation.
    pub fn interpolate(start: &Transform3D, end: &Transform3D, t: f64) -> Transform3D {
        Transform3D {
            rotation: start.rotation.slerp(&end.rotation, t),
            translation: start.translation.lerp(&end.translation, t),
        }
    }
}

impl Default for Transform3D {
    fn default() -> Self {
        Self::identity()
    }
}
