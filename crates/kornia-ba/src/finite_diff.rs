//! Finite difference verification of the analytic derivatives.
//!
//! The gradient is estimated with central differences of the total reprojection error. The
//! Hessian blocks are Gauss-Newton approximations `2 * J^T * J`, they are estimated from a central
//! difference Jacobian of every observation residual.

use glam::{DMat3, DVec2, DVec3};
use kornia_lie::se3::SE3F64;
use kornia_lie::so3::exp_so3;

use crate::config::DerivativeTolerance;
use crate::derivatives::{is_rotation_var, DerivativeBuffers};
use crate::error::BundleAdjustmentError;
use crate::layout::{ParameterLayout, FRAME_VARS, POINT_VARS, ROTATION_OFFSET};
use crate::problem::{BundleAdjustmentProblem, OptimizationState};
use crate::reprojection::{evaluate, residual, Overrides};

/// Move a world-to-camera frame along one of its 6 variables.
///
/// Variables `0..3` shift the camera center, variables `3..6` rotate the camera-to-world rotation
/// by a left multiplicative increment.
pub fn perturb_frame(frame: &SE3F64, var: usize, delta: f64) -> SE3F64 {
    let world_from_cam = frame.inverse();
    let mut r_dir = world_from_cam.r;
    let mut center = world_from_cam.t;
    if is_rotation_var(var) {
        let mut w = DVec3::ZERO;
        w[var - ROTATION_OFFSET] = delta;
        r_dir = exp_so3(w) * r_dir;
    } else {
        center[var] += delta;
    }
    SE3F64::new(r_dir, center).inverse()
}

fn residual_jacobian(
    problem: &BundleAdjustmentProblem,
    point: DVec3,
    frame: &SE3F64,
    observed: DVec2,
    step: f64,
) -> ([DVec3; 2], [[f64; FRAME_VARS]; 2]) {
    let intrinsics = &problem.intrinsics;
    let mut jp = [DVec3::ZERO; 2];
    let mut jf = [[0.0; FRAME_VARS]; 2];

    for k in 0..POINT_VARS {
        let mut d = DVec3::ZERO;
        d[k] = step;
        let plus = residual(intrinsics, frame, point + d, observed);
        let minus = residual(intrinsics, frame, point - d, observed);
        let deriv = (plus - minus) / (2.0 * step);
        jp[0][k] = deriv.x;
        jp[1][k] = deriv.y;
    }

    for var in 0..FRAME_VARS {
        let plus = residual(intrinsics, &perturb_frame(frame, var, step), point, observed);
        let minus = residual(intrinsics, &perturb_frame(frame, var, -step), point, observed);
        let deriv = (plus - minus) / (2.0 * step);
        jf[0][var] = deriv.x;
        jf[1][var] = deriv.y;
    }

    (jp, jf)
}

/// Estimate the gradient and Hessian blocks with central finite differences.
///
/// # Arguments
///
/// * `problem` - The observations and the intrinsics.
/// * `layout` - The parameter layout.
/// * `state` - The state at which the derivatives are estimated.
/// * `step` - The finite difference step.
pub fn finite_difference_derivatives(
    problem: &BundleAdjustmentProblem,
    layout: &ParameterLayout,
    state: &OptimizationState,
    step: f64,
) -> DerivativeBuffers {
    let points_count = problem.points_count();
    let frames_count = problem.frames_count;
    let mut buffers = DerivativeBuffers::zeros(points_count, frames_count);

    for (point_ind, point) in state.points.iter().enumerate() {
        for k in 0..POINT_VARS {
            let mut d = DVec3::ZERO;
            d[k] = step;
            let plus = evaluate(problem, state, Overrides::point(point_ind, *point + d)).total;
            let minus = evaluate(problem, state, Overrides::point(point_ind, *point - d)).total;
            buffers.gradient[layout.point_offset(point_ind) + k] = (plus - minus) / (2.0 * step);
        }
    }

    for (frame_ind, frame) in state.frames.iter().enumerate() {
        for var in 0..FRAME_VARS {
            let frame_plus = perturb_frame(frame, var, step);
            let frame_minus = perturb_frame(frame, var, -step);
            let plus = evaluate(problem, state, Overrides::frame(frame_ind, &frame_plus)).total;
            let minus = evaluate(problem, state, Overrides::frame(frame_ind, &frame_minus)).total;
            buffers.gradient[layout.frame_offset(frame_ind) + var] = (plus - minus) / (2.0 * step);
        }
    }

    for (point_ind, obs) in problem.observations.iter().enumerate() {
        let point = state.points[point_ind];
        for (frame_ind, pixel) in obs.iter() {
            let (jp, jf) =
                residual_jacobian(problem, point, &state.frames[*frame_ind], *pixel, step);

            let mut point_block = DMat3::ZERO;
            let frame_block = &mut buffers.frame_blocks[*frame_ind];
            let mut cross = [[0.0; FRAME_VARS]; POINT_VARS];
            for k in 0..2 {
                point_block += 2.0
                    * DMat3::from_cols(jp[k] * jp[k].x, jp[k] * jp[k].y, jp[k] * jp[k].z);
                for a in 0..FRAME_VARS {
                    for b in 0..FRAME_VARS {
                        frame_block[a][b] += 2.0 * jf[k][a] * jf[k][b];
                    }
                }
                for (p, row) in cross.iter_mut().enumerate() {
                    for (b, v) in row.iter_mut().enumerate() {
                        *v += 2.0 * jp[k][p] * jf[k][b];
                    }
                }
            }
            buffers.point_blocks[point_ind] += point_block;
            buffers.point_frame_blocks[point_ind * frames_count + frame_ind] = cross;
        }
    }

    buffers
}

fn compare(
    what: impl FnOnce() -> String,
    analytic: f64,
    numeric: f64,
    tolerance: &DerivativeTolerance,
) -> Result<(), BundleAdjustmentError> {
    if tolerance.is_close(analytic, numeric) {
        Ok(())
    } else {
        Err(BundleAdjustmentError::DerivativeMismatch {
            what: what(),
            analytic,
            numeric,
        })
    }
}

/// Compare analytic derivatives with their finite difference estimate.
///
/// # Errors
///
/// [`BundleAdjustmentError::DerivativeMismatch`] naming the first entry outside the tolerance.
pub fn check_derivatives(
    problem: &BundleAdjustmentProblem,
    layout: &ParameterLayout,
    state: &OptimizationState,
    analytic: &DerivativeBuffers,
    step: f64,
    tolerance: &DerivativeTolerance,
) -> Result<(), BundleAdjustmentError> {
    let numeric = finite_difference_derivatives(problem, layout, state, step);
    let frames_count = problem.frames_count;

    for (i, (a, n)) in analytic.gradient.iter().zip(numeric.gradient.iter()).enumerate() {
        compare(|| format!("gradient[{i}]"), *a, *n, tolerance)?;
    }

    for (point_ind, (a, n)) in analytic
        .point_blocks
        .iter()
        .zip(numeric.point_blocks.iter())
        .enumerate()
    {
        for c in 0..POINT_VARS {
            for r in 0..POINT_VARS {
                compare(
                    || format!("point block {point_ind} ({r}, {c})"),
                    a.col(c)[r],
                    n.col(c)[r],
                    tolerance,
                )?;
            }
        }
    }

    for (frame_ind, (a, n)) in analytic
        .frame_blocks
        .iter()
        .zip(numeric.frame_blocks.iter())
        .enumerate()
    {
        for r in 0..FRAME_VARS {
            for c in 0..FRAME_VARS {
                compare(
                    || format!("frame block {frame_ind} ({r}, {c})"),
                    a[r][c],
                    n[r][c],
                    tolerance,
                )?;
            }
        }
    }

    for (ind, (a, n)) in analytic
        .point_frame_blocks
        .iter()
        .zip(numeric.point_frame_blocks.iter())
        .enumerate()
    {
        for r in 0..POINT_VARS {
            for c in 0..FRAME_VARS {
                compare(
                    || {
                        format!(
                            "point-frame block ({}, {}) ({r}, {c})",
                            ind / frames_count,
                            ind % frames_count
                        )
                    },
                    a[r][c],
                    n[r][c],
                    tolerance,
                )?;
            }
        }
    }

    log::debug!("analytic derivatives agree with finite differences");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraIntrinsics;
    use crate::config::UnityAxis;
    use crate::derivatives::compute_derivatives;
    use crate::synthetic;
    use rand::{rngs::StdRng, SeedableRng};

    fn random_problem(seed: u64) -> (BundleAdjustmentProblem, ParameterLayout, OptimizationState) {
        let mut rng = StdRng::seed_from_u64(seed);
        let intrinsics = CameraIntrinsics::new(50.0, 55.0, 32.0, 24.0).with_f0(10.0);
        let points = synthetic::random_points(&mut rng, 6, DVec3::ZERO, 1.0);
        let frames = synthetic::circle_camera_shots(DVec3::ZERO, 6.0, 1.5, &[0.0, 0.3, 0.6]);
        let tracks = synthetic::project_tracks(&mut rng, &intrinsics, &points, &frames, 0.5);
        let world: Vec<Option<DVec3>> = synthetic::perturb_points(&mut rng, &points, 0.05)
            .into_iter()
            .map(Some)
            .collect();
        let (problem, state) =
            BundleAdjustmentProblem::from_tracks(&tracks, &intrinsics, &world, &frames)
                .expect("valid problem");
        let layout = ParameterLayout::new(problem.points_count(), frames.len(), UnityAxis::X);
        (problem, layout, state)
    }

    #[test]
    fn test_perturb_frame_zero() {
        let frame = SE3F64::from_axis_angle(DVec3::new(0.1, 0.2, 0.3), DVec3::new(1.0, 2.0, 3.0));
        for var in 0..FRAME_VARS {
            let same = perturb_frame(&frame, var, 0.0);
            assert!(same.r.abs_diff_eq(frame.r, 1e-12));
            assert!(same.t.abs_diff_eq(frame.t, 1e-12));
        }
    }

    #[test]
    fn test_perturb_frame_moves_center() {
        let frame = SE3F64::from_axis_angle(DVec3::new(0.1, 0.2, 0.3), DVec3::new(1.0, 2.0, 3.0));
        let moved = perturb_frame(&frame, 1, 0.5);
        let delta = moved.inverse().t - frame.inverse().t;
        assert!(delta.abs_diff_eq(DVec3::new(0.0, 0.5, 0.0), 1e-12));
        assert!(moved.r.abs_diff_eq(frame.r, 1e-12));
    }

    #[test]
    fn test_analytic_matches_finite_difference() -> Result<(), BundleAdjustmentError> {
        for seed in 0..3 {
            let (problem, layout, state) = random_problem(seed);
            let analytic = compute_derivatives(&problem, &layout, &state)?;
            check_derivatives(
                &problem,
                &layout,
                &state,
                &analytic,
                1e-5,
                &DerivativeTolerance::default(),
            )?;
        }
        Ok(())
    }

    #[test]
    fn test_mismatch_is_reported() -> Result<(), BundleAdjustmentError> {
        let (problem, layout, state) = random_problem(11);
        let mut analytic = compute_derivatives(&problem, &layout, &state)?;
        analytic.gradient[0] += 1.0e4;
        let res = check_derivatives(
            &problem,
            &layout,
            &state,
            &analytic,
            1e-5,
            &DerivativeTolerance::default(),
        );
        assert!(matches!(
            res,
            Err(BundleAdjustmentError::DerivativeMismatch { .. })
        ));
        Ok(())
    }
}
