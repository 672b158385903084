//! Core foundation layer.
//!
//! This is the bottom layer of the server with no internal dependencies.
//! All other layers depend on core.
//!
//! # Contents
//!
//! - [`types`]: Rigid body types (vectors, rotations, transforms)
//! - [`math`]: Scalar helpers shared by the types

pub mod math;
pub mod types;
