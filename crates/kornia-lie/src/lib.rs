#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Kornia Lie Groups
//!
//! Double precision implementations of the 3D rotation group and of rigid body transformations,
//! as needed by the bundle adjustment engine.
//!
//! ## Supported Groups
//!
//! - **SO(3)**: 3D rotation group
//! - **SE(3)**: 3D rigid body transformations (rotation + translation)
//!
//! ## Example
//!
//! ```rust
//! use glam::DVec3;
//! use kornia_lie::so3::{exp_so3, log_so3};
//!
//! // Create a rotation from axis-angle representation
//! let rot = exp_so3(DVec3::new(0.0, 0.0, std::f64::consts::FRAC_PI_2));
//!
//! // Recover the unit axis and the angle
//! let (axis, angle) = log_so3(&rot).unwrap();
//! assert!((angle - std::f64::consts::FRAC_PI_2).abs() < 1e-9);
//! assert!((axis - DVec3::Z).length() < 1e-9);
//! ```

mod error;
pub use error::LieError;

/// Special Euclidean group SE(3) for 3D rigid transformations.
pub mod se3;

/// Special Orthogonal group SO(3) for 3D rotations.
pub mod so3;
