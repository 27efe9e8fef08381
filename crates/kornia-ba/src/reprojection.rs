use glam::{DVec2, DVec3};
use kornia_lie::se3::SE3F64;

use crate::camera::CameraIntrinsics;
use crate::error::BundleAdjustmentError;
use crate::problem::{BundleAdjustmentProblem, OptimizationState};
use crate::track::PointTrack;

/// Total squared reprojection error of a state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReprojectionError {
    /// Sum of squared pixel distances over all observations.
    pub total: f64,
    /// Total divided by the number of observations, `None` without observations.
    pub mean: Option<f64>,
}

/// Replace one point and/or one frame of the state during an evaluation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Overrides<'a> {
    /// `(point index, position)` used instead of the stored point.
    pub point: Option<(usize, DVec3)>,
    /// `(frame index, pose)` used instead of the stored frame.
    pub frame: Option<(usize, &'a SE3F64)>,
}

impl<'a> Overrides<'a> {
    /// No override.
    pub fn none() -> Self {
        Self::default()
    }

    /// Override a single point.
    pub fn point(index: usize, position: DVec3) -> Self {
        Self {
            point: Some((index, position)),
            frame: None,
        }
    }

    /// Override a single frame.
    pub fn frame(index: usize, pose: &'a SE3F64) -> Self {
        Self {
            point: None,
            frame: Some((index, pose)),
        }
    }
}

/// Pixel residual `project(frame * point) - observed`.
#[inline]
pub fn residual(
    intrinsics: &CameraIntrinsics,
    frame: &SE3F64,
    point: DVec3,
    observed: DVec2,
) -> DVec2 {
    intrinsics.project(frame.transform_point(point)) - observed
}

/// Evaluate the total squared reprojection error.
///
/// The state is not modified, the overrides replace a point and/or a frame for this evaluation
/// only.
///
/// # Arguments
///
/// * `problem` - The observations and the intrinsics.
/// * `state` - The current points and frames.
/// * `overrides` - Optional point and frame replacements.
pub fn evaluate(
    problem: &BundleAdjustmentProblem,
    state: &OptimizationState,
    overrides: Overrides<'_>,
) -> ReprojectionError {
    let mut total = 0.0;
    let mut count = 0usize;

    for (point_ind, obs) in problem.observations.iter().enumerate() {
        let point = match overrides.point {
            Some((ind, p)) if ind == point_ind => p,
            _ => state.points[point_ind],
        };

        for (frame_ind, pixel) in obs.iter() {
            let frame = match overrides.frame {
                Some((ind, f)) if ind == *frame_ind => f,
                _ => &state.frames[*frame_ind],
            };
            total += residual(&problem.intrinsics, frame, point, *pixel).length_squared();
            count += 1;
        }
    }

    ReprojectionError {
        total,
        mean: (count > 0).then(|| total / count as f64),
    }
}

/// Reprojection error of a reconstruction given by the caller's arrays.
///
/// # Arguments
///
/// * `tracks` - The point tracks.
/// * `intrinsics` - The camera intrinsics.
/// * `world_points` - The world points indexed by track id, `None` when not triangulated.
/// * `frames` - The world-to-camera transformation of each frame.
pub fn reprojection_error(
    tracks: &[PointTrack],
    intrinsics: &CameraIntrinsics,
    world_points: &[Option<DVec3>],
    frames: &[SE3F64],
) -> Result<ReprojectionError, BundleAdjustmentError> {
    let (problem, state) =
        BundleAdjustmentProblem::from_tracks(tracks, intrinsics, world_points, frames)?;
    Ok(evaluate(&problem, &state, Overrides::none()))
}
