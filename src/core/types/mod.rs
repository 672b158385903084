//! Core data types for rigid body geometry.
//!
//! - [`Vector3`]: 3D point / vector in meters
//! - [`Quaternion`]: Unit quaternion rotation
//! - [`Transform3D`]: Rigid body transform (`T_A_B` convention)

mod point;
mod rotation;
mod transform;

pub use point::Vector3;
pub use rotation::Quaternion;
pub use transform::Transform3D;
