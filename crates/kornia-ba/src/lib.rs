#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Kornia Bundle Adjustment
//!
//! Refines triangulated world points and camera poses so that the total squared reprojection
//! error of the tracked corners is minimal, following Kanatani and Sugaya, "Bundle adjustment
//! for 3-d reconstruction" (2010).
//!
//! The pipeline of one [`bundle_adjust`] invocation:
//!
//! 1. the scene is normalized to remove the 7 gauge degrees of freedom: frame 0 becomes the
//!    identity pose and the chosen axis of frame 1's camera center becomes the unity value,
//! 2. a damped Gauss-Newton loop computes the analytic gradient and Hessian blocks, eliminates
//!    the point blocks with a Schur complement, solves the reduced frame system and applies the
//!    correction, re-damping and rolling back when the error does not decrease,
//! 3. the refined scene is transformed back into the caller's coordinate frame.
//!
//! Camera frames are stored as world-to-camera transformations `x_cam = R * x_world + T`.

/// Camera intrinsics and projection.
pub mod camera;

/// Configuration of the adjuster.
pub mod config;

/// Analytic gradient and Gauss-Newton Hessian blocks.
pub mod derivatives;

/// Error types of the adjuster.
pub mod error;

/// Finite difference verification of the analytic derivatives.
pub mod finite_diff;

/// Mapping between free and full parameter indices.
pub mod layout;

/// Gauge normalization of a scene.
pub mod normalize;

/// The damped Gauss-Newton outer loop.
pub mod optimizer;

/// Problem description and mutable optimization state.
pub mod problem;

/// Reprojection error evaluation.
pub mod reprojection;

/// Schur complement correction solver.
pub mod solver;

/// Synthetic scenes for tests, benchmarks and demos.
pub mod synthetic;

/// Point tracks.
pub mod track;

/// Linear triangulation of tracks.
pub mod triangulation;

/// Application of corrections to the optimization state.
pub mod update;

pub use camera::CameraIntrinsics;
pub use config::{BundleAdjustmentConfig, DerivativeTolerance, UnityAxis};
pub use error::BundleAdjustmentError;
pub use optimizer::{bundle_adjust, BundleAdjustmentResult, TerminationReason};
pub use reprojection::reprojection_error;
pub use track::PointTrack;
pub use triangulation::{triangulate_track, triangulate_tracks};
