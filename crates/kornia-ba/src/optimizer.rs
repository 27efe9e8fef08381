//! Damped Gauss-Newton (Levenberg-Marquardt) outer loop.

use glam::DVec3;
use kornia_lie::se3::SE3F64;
use serde::{Deserialize, Serialize};

use crate::camera::CameraIntrinsics;
use crate::config::BundleAdjustmentConfig;
use crate::derivatives::compute_derivatives;
use crate::error::BundleAdjustmentError;
use crate::finite_diff::check_derivatives;
use crate::layout::ParameterLayout;
use crate::normalize::GaugeNormalizer;
use crate::problem::{BundleAdjustmentProblem, OptimizationState};
use crate::reprojection::{evaluate, Overrides};
use crate::solver::solve_corrections;
use crate::track::PointTrack;
use crate::update::apply_corrections;

/// Total squared reprojection error, in squared pixels, treated as already optimal.
pub const NEGLIGIBLE_ERROR: f64 = 1e-12;

/// Reason why the optimizer terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    /// The initial reprojection error is negligible, nothing to optimize.
    ZeroInitialError,
    /// Converged: the error change of an accepted step is below tolerance.
    Converged,
    /// Lambda exceeded its maximum without finding a step that decreases the error.
    Stalled,
    /// Maximum iterations reached.
    MaxIterations,
}

/// Result of a bundle adjustment invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleAdjustmentResult {
    /// Whether the optimization converged.
    pub success: bool,
    /// Final error divided by the initial error.
    pub error_ratio: f64,
    /// Total squared reprojection error before the optimization.
    pub initial_error: f64,
    /// Total squared reprojection error after the optimization.
    pub final_error: f64,
    /// Number of accepted steps.
    pub iterations: usize,
    /// Reason for termination.
    pub termination_reason: TerminationReason,
    /// Total error before the optimization and after each accepted step.
    pub error_history: Vec<f64>,
}

/// Refine world points and camera frames to minimize the total squared reprojection error.
///
/// The world points of tracks with a triangulated point are optimized together with all the
/// frames. On success and on convergence failure the refined reconstruction is written back into
/// `world_points` and `frames`, expressed in the caller's original coordinate frame. On error both
/// arrays are left untouched.
///
/// # Arguments
///
/// * `tracks` - The point tracks, `track_id` indexes `world_points`.
/// * `intrinsics` - The camera intrinsics shared by all frames.
/// * `world_points` - The world points, `None` for tracks which are not triangulated.
/// * `frames` - The world-to-camera transformation of each frame, at least 2.
/// * `config` - The optimizer configuration.
///
/// # Returns
///
/// The [`BundleAdjustmentResult`], `success` is false when no improving step could be found or
/// the iteration limit was hit.
///
/// # Example
///
/// ```
/// use glam::DVec3;
/// use kornia_ba::{bundle_adjust, synthetic, BundleAdjustmentConfig, CameraIntrinsics, UnityAxis};
/// use rand::{rngs::StdRng, SeedableRng};
///
/// let mut rng = StdRng::seed_from_u64(0);
/// let intrinsics = CameraIntrinsics::new(500.0, 500.0, 320.0, 240.0);
/// let points = synthetic::cube_points(DVec3::ZERO, 2.0);
/// let mut frames = synthetic::circle_camera_shots(DVec3::ZERO, 8.0, 2.0, &[0.0, 0.2, 0.4]);
/// let tracks = synthetic::project_tracks(&mut rng, &intrinsics, &points, &frames, 0.0);
///
/// let mut world_points: Vec<Option<DVec3>> = points.iter().map(|p| Some(*p + 0.01)).collect();
/// let config = BundleAdjustmentConfig::default().with_unity(UnityAxis::X, 1.0);
/// let result =
///     bundle_adjust(&tracks, &intrinsics, &mut world_points, &mut frames, &config).unwrap();
/// assert!(result.error_ratio < 1.0);
/// ```
pub fn bundle_adjust(
    tracks: &[PointTrack],
    intrinsics: &CameraIntrinsics,
    world_points: &mut [Option<DVec3>],
    frames: &mut [SE3F64],
    config: &BundleAdjustmentConfig,
) -> Result<BundleAdjustmentResult, BundleAdjustmentError> {
    if frames.len() < 2 {
        return Err(BundleAdjustmentError::NotEnoughFrames(frames.len()));
    }

    let (problem, mut state) =
        BundleAdjustmentProblem::from_tracks(tracks, intrinsics, world_points, frames)?;

    let normalizer = GaugeNormalizer::new(config.unity_axis, config.unity_value);
    let params = normalizer.normalize(&mut state)?;

    let layout =
        ParameterLayout::new(problem.points_count(), problem.frames_count, config.unity_axis);
    log::debug!(
        "bundle adjustment: {} points, {} frames, {} observations, {} unknowns",
        problem.points_count(),
        problem.frames_count,
        problem.observations_count(),
        3 * problem.points_count() + layout.free_frame_len()
    );

    let result = optimize(&problem, &layout, &normalizer, &mut state, config)?;

    if result.iterations > 0 {
        normalizer.revert(&mut state, &params);
        if !state.is_finite() {
            return Err(BundleAdjustmentError::NonFiniteCorrection);
        }
        state.write_back(&problem, world_points, frames);
    }

    Ok(result)
}

/// Run the damped Gauss-Newton loop on a normalized state.
///
/// Each outer iteration computes the derivatives, then searches for a damping factor whose
/// correction decreases the total error. A rejected correction is rolled back by restoring the
/// snapshot taken before the search.
pub fn optimize(
    problem: &BundleAdjustmentProblem,
    layout: &ParameterLayout,
    normalizer: &GaugeNormalizer,
    state: &mut OptimizationState,
    config: &BundleAdjustmentConfig,
) -> Result<BundleAdjustmentResult, BundleAdjustmentError> {
    let initial_error = evaluate(problem, state, Overrides::none()).total;
    log::debug!("initial reprojection error: {initial_error}");

    let finish = |success: bool,
                  current_error: f64,
                  iterations: usize,
                  reason: TerminationReason,
                  history: Vec<f64>| {
        let error_ratio = if initial_error < NEGLIGIBLE_ERROR {
            1.0
        } else {
            current_error / initial_error
        };
        log::info!(
            "bundle adjustment finished: {reason:?} after {iterations} iterations, \
             error {initial_error} -> {current_error} (ratio {error_ratio})"
        );
        BundleAdjustmentResult {
            success,
            error_ratio,
            initial_error,
            final_error: current_error,
            iterations,
            termination_reason: reason,
            error_history: history,
        }
    };

    let mut history = vec![initial_error];
    if initial_error < NEGLIGIBLE_ERROR {
        return Ok(finish(
            true,
            initial_error,
            0,
            TerminationReason::ZeroInitialError,
            history,
        ));
    }

    let mut lambda = config.initial_lambda;
    let mut current_error = initial_error;
    let mut iterations = 0;

    loop {
        if iterations >= config.max_iterations {
            log::warn!("reached the maximum of {} iterations", config.max_iterations);
            return Ok(finish(
                false,
                current_error,
                iterations,
                TerminationReason::MaxIterations,
                history,
            ));
        }

        let buffers = compute_derivatives(problem, layout, state)?;
        if config.check_derivatives {
            check_derivatives(
                problem,
                layout,
                state,
                &buffers,
                config.finite_diff_step,
                &config.derivative_tolerance,
            )?;
        }

        let snapshot = state.clone();
        let mut accepted = None;
        // the cap is checked after a rejected trial, so the first trial above it still runs
        loop {
            let corrections = solve_corrections(problem, layout, &buffers, lambda)?;
            apply_corrections(state, &corrections);

            let new_error = evaluate(problem, state, Overrides::none()).total;
            if new_error < current_error {
                accepted = Some(new_error);
                break;
            }

            log::trace!("rejected step: error {new_error} >= {current_error} at lambda {lambda}");
            *state = snapshot.clone();
            if lambda > config.max_lambda {
                break;
            }
            lambda *= config.lambda_factor;
        }

        let Some(new_error) = accepted else {
            log::warn!(
                "no step decreases the error {current_error}, lambda exceeded {}",
                config.max_lambda
            );
            return Ok(finish(
                false,
                current_error,
                iterations,
                TerminationReason::Stalled,
                history,
            ));
        };

        let error_change = current_error - new_error;
        current_error = new_error;
        iterations += 1;
        history.push(current_error);
        log::debug!("iteration {iterations}: error {current_error} lambda {lambda}");

        normalizer.check(&state.frames)?;

        if error_change.abs() < config.min_error_change {
            return Ok(finish(
                true,
                current_error,
                iterations,
                TerminationReason::Converged,
                history,
            ));
        }

        lambda /= config.lambda_factor;
    }
}
