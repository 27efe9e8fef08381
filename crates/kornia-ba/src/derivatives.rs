//! Analytic derivatives of the total reprojection error.
//!
//! For an observation of point `X` in frame `(R, T)` the camera point is `x = R * X + T`. Frames
//! are parametrized by the camera center `c = -R^T * T` and a left multiplicative rotation
//! increment `w` of the camera-to-world rotation `R^T`:
//!
//! ```text
//! x(X, c, w) = (exp([w]x) * R^T)^T * (X - c)
//! ```
//!
//! With `A = J_proj(x) * R` the 2x3 Jacobian of the pixel with respect to the world point, the
//! Jacobians of the pixel residual are
//!
//! ```text
//! dr/dX = A,  dr/dc = -A,  dr/dw = A * [X - c]x
//! ```
//!
//! The gradient is `2 * J^T * r` and the Hessian is approximated by Gauss-Newton, `2 * J^T * J`.

use glam::{DMat3, DVec2, DVec3};
use kornia_lie::se3::SE3F64;
use kornia_linalg::invert3x3;
use rayon::prelude::*;

use crate::error::BundleAdjustmentError;
use crate::layout::{ParameterLayout, FRAME_VARS, POINT_VARS, ROTATION_OFFSET};
use crate::problem::{BundleAdjustmentProblem, OptimizationState};
use crate::reprojection::residual;

/// 6x6 frame-frame Hessian block, row major.
pub type FrameBlock = [[f64; FRAME_VARS]; FRAME_VARS];

/// 3x6 point-frame Hessian block, row major.
pub type PointFrameBlock = [[f64; FRAME_VARS]; POINT_VARS];

/// Gradient and block Hessian of the total reprojection error.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivativeBuffers {
    /// Gradient, laid out as described by [`ParameterLayout`].
    pub gradient: Vec<f64>,
    /// 3x3 point-point block of each point.
    pub point_blocks: Vec<DMat3>,
    /// 6x6 frame-frame block of each frame.
    pub frame_blocks: Vec<FrameBlock>,
    /// 3x6 point-frame block of each `(point, frame)` pair, at index `point * frames + frame`.
    pub point_frame_blocks: Vec<PointFrameBlock>,
    points_count: usize,
    frames_count: usize,
}

impl DerivativeBuffers {
    /// Zero initialized buffers of `points_count` points and `frames_count` frames.
    pub fn zeros(points_count: usize, frames_count: usize) -> Self {
        Self {
            gradient: vec![0.0; POINT_VARS * points_count + FRAME_VARS * frames_count],
            point_blocks: vec![DMat3::ZERO; points_count],
            frame_blocks: vec![[[0.0; FRAME_VARS]; FRAME_VARS]; frames_count],
            point_frame_blocks: vec![[[0.0; FRAME_VARS]; POINT_VARS]; points_count * frames_count],
            points_count,
            frames_count,
        }
    }

    /// Number of points.
    pub fn points_count(&self) -> usize {
        self.points_count
    }

    /// Number of frames.
    pub fn frames_count(&self) -> usize {
        self.frames_count
    }

    /// Gradient with respect to a point.
    pub fn point_gradient(&self, point: usize) -> DVec3 {
        let o = POINT_VARS * point;
        DVec3::new(self.gradient[o], self.gradient[o + 1], self.gradient[o + 2])
    }

    /// Gradient with respect to a frame.
    pub fn frame_gradient(&self, frame: usize) -> &[f64] {
        let o = POINT_VARS * self.points_count + FRAME_VARS * frame;
        &self.gradient[o..o + FRAME_VARS]
    }

    /// The point-frame block of a `(point, frame)` pair.
    pub fn point_frame(&self, point: usize, frame: usize) -> &PointFrameBlock {
        &self.point_frame_blocks[point * self.frames_count + frame]
    }

    fn is_finite(&self) -> bool {
        self.gradient.iter().all(|v| v.is_finite())
            && self.point_blocks.iter().all(|b| b.is_finite())
            && self
                .frame_blocks
                .iter()
                .all(|b| b.iter().flatten().all(|v| v.is_finite()))
            && self
                .point_frame_blocks
                .iter()
                .all(|b| b.iter().flatten().all(|v| v.is_finite()))
    }
}

/// Jacobian rows of the two pixel residual components of one observation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ObservationJacobian {
    /// Residual `[du, dv]`.
    pub residual: [f64; 2],
    /// Derivative of each residual component with respect to the point.
    pub point: [DVec3; 2],
    /// Derivative of each residual component with respect to `[c, w]`.
    pub frame: [[f64; FRAME_VARS]; 2],
}

pub(crate) fn observation_jacobian(
    problem: &BundleAdjustmentProblem,
    point: DVec3,
    frame: &SE3F64,
    observed: DVec2,
) -> ObservationJacobian {
    let r = residual(&problem.intrinsics, frame, point, observed);
    let jac_proj = problem
        .intrinsics
        .project_jacobian(frame.transform_point(point));

    // X - c in world coordinates
    let center = -(frame.r.transpose() * frame.t);
    let lever = point - center;

    let rt = frame.r.transpose();
    let mut point_rows = [DVec3::ZERO; 2];
    let mut frame_rows = [[0.0; FRAME_VARS]; 2];
    for k in 0..2 {
        let a = rt * jac_proj[k];
        let a_w = a.cross(lever);
        point_rows[k] = a;
        frame_rows[k] = [-a.x, -a.y, -a.z, a_w.x, a_w.y, a_w.z];
    }

    ObservationJacobian {
        residual: [r.x, r.y],
        point: point_rows,
        frame: frame_rows,
    }
}

// contribution of one point to the derivative buffers
struct PointContribution {
    gradient: DVec3,
    block: DMat3,
    // (frame, frame gradient, frame block, point-frame block)
    frames: Vec<(usize, [f64; FRAME_VARS], FrameBlock, PointFrameBlock)>,
}

fn point_contribution(
    problem: &BundleAdjustmentProblem,
    state: &OptimizationState,
    point_ind: usize,
) -> PointContribution {
    let point = state.points[point_ind];
    let mut gradient = DVec3::ZERO;
    let mut block = DMat3::ZERO;
    let mut frames = Vec::with_capacity(problem.observations[point_ind].len());

    for (frame_ind, pixel) in problem.observations[point_ind].iter() {
        let jac = observation_jacobian(problem, point, &state.frames[*frame_ind], *pixel);

        let mut frame_grad = [0.0; FRAME_VARS];
        let mut frame_block = [[0.0; FRAME_VARS]; FRAME_VARS];
        let mut cross = [[0.0; FRAME_VARS]; POINT_VARS];

        for k in 0..2 {
            let e = jac.residual[k];
            let jp = jac.point[k];
            let jf = &jac.frame[k];

            gradient += 2.0 * e * jp;
            block += 2.0 * DMat3::from_cols(jp * jp.x, jp * jp.y, jp * jp.z);

            for a in 0..FRAME_VARS {
                frame_grad[a] += 2.0 * e * jf[a];
                for b in 0..FRAME_VARS {
                    frame_block[a][b] += 2.0 * jf[a] * jf[b];
                }
            }
            for (p, cross_row) in cross.iter_mut().enumerate() {
                for (b, v) in cross_row.iter_mut().enumerate() {
                    *v += 2.0 * jp[p] * jf[b];
                }
            }
        }

        frames.push((*frame_ind, frame_grad, frame_block, cross));
    }

    PointContribution {
        gradient,
        block,
        frames,
    }
}

/// Compute the gradient and Gauss-Newton Hessian blocks at the current state.
///
/// The per point contributions are computed in parallel and merged in point order, the result
/// does not depend on the number of threads.
///
/// # Errors
///
/// * [`BundleAdjustmentError::NonFiniteDerivative`] if any value is NaN or infinite.
/// * [`BundleAdjustmentError::SingularPointHessian`] if a point block is not invertible, which
///   happens when a point is observed in fewer than 2 frames.
pub fn compute_derivatives(
    problem: &BundleAdjustmentProblem,
    layout: &ParameterLayout,
    state: &OptimizationState,
) -> Result<DerivativeBuffers, BundleAdjustmentError> {
    let points_count = problem.points_count();
    let frames_count = problem.frames_count;

    let contributions: Vec<PointContribution> = (0..points_count)
        .into_par_iter()
        .map(|point_ind| point_contribution(problem, state, point_ind))
        .collect();

    let mut buffers = DerivativeBuffers::zeros(points_count, frames_count);
    for (point_ind, contrib) in contributions.into_iter().enumerate() {
        let po = layout.point_offset(point_ind);
        buffers.gradient[po..po + POINT_VARS].copy_from_slice(&contrib.gradient.to_array());
        buffers.point_blocks[point_ind] = contrib.block;

        for (frame_ind, frame_grad, frame_block, cross) in contrib.frames {
            let fo = layout.frame_offset(frame_ind);
            for (g, v) in buffers.gradient[fo..fo + FRAME_VARS]
                .iter_mut()
                .zip(frame_grad.iter())
            {
                *g += v;
            }
            let dst = &mut buffers.frame_blocks[frame_ind];
            for (dst_row, src_row) in dst.iter_mut().zip(frame_block.iter()) {
                for (d, s) in dst_row.iter_mut().zip(src_row.iter()) {
                    *d += s;
                }
            }
            buffers.point_frame_blocks[point_ind * frames_count + frame_ind] = cross;
        }
    }

    if !buffers.is_finite() {
        return Err(BundleAdjustmentError::NonFiniteDerivative(
            "gradient or hessian blocks contain NaN or infinite values".to_string(),
        ));
    }

    for (point_ind, block) in buffers.point_blocks.iter().enumerate() {
        if invert3x3(block).is_err() {
            return Err(BundleAdjustmentError::SingularPointHessian {
                track_id: problem.track_ids[point_ind],
            });
        }
    }

    Ok(buffers)
}

/// Whether a frame variable is a rotation increment rather than a camera center component.
#[inline]
pub fn is_rotation_var(var: usize) -> bool {
    var >= ROTATION_OFFSET
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraIntrinsics;
    use crate::config::UnityAxis;
    use crate::track::PointTrack;

    fn setup(observed_frames: &[usize]) -> (BundleAdjustmentProblem, OptimizationState) {
        let intrinsics = CameraIntrinsics::new(400.0, 400.0, 320.0, 240.0);
        let frames = vec![
            SE3F64::IDENTITY,
            SE3F64::from_axis_angle(DVec3::new(0.0, 0.1, 0.0), DVec3::new(-1.0, 0.2, 0.0)),
            SE3F64::from_axis_angle(DVec3::new(0.05, -0.1, 0.0), DVec3::new(0.5, -1.0, 0.1)),
        ];
        let tracks = vec![PointTrack::from_observations(
            0,
            observed_frames
                .iter()
                .map(|f| (*f, DVec2::new(300.0 + *f as f64, 250.0))),
        )];
        BundleAdjustmentProblem::from_tracks(
            &tracks,
            &intrinsics,
            &[Some(DVec3::new(0.2, -0.1, 5.0))],
            &frames,
        )
        .expect("valid problem")
    }

    #[test]
    fn test_buffers_shape_and_symmetry() -> Result<(), BundleAdjustmentError> {
        let (problem, state) = setup(&[0, 1, 2]);
        let layout = ParameterLayout::new(1, 3, UnityAxis::Y);
        let buffers = compute_derivatives(&problem, &layout, &state)?;

        assert_eq!(buffers.gradient.len(), 3 + 18);
        assert_eq!(buffers.point_frame_blocks.len(), 3);
        let block = buffers.point_blocks[0];
        assert!(block.abs_diff_eq(block.transpose(), 1e-9));
        for fb in buffers.frame_blocks.iter() {
            for a in 0..FRAME_VARS {
                for b in 0..FRAME_VARS {
                    assert!((fb[a][b] - fb[b][a]).abs() < 1e-9 * (1.0 + fb[a][b].abs()));
                }
            }
        }
        Ok(())
    }

    #[test]
    fn test_single_observation_is_singular() {
        let (problem, state) = setup(&[1]);
        let layout = ParameterLayout::new(1, 3, UnityAxis::Y);
        let res = compute_derivatives(&problem, &layout, &state);
        assert!(matches!(
            res,
            Err(BundleAdjustmentError::SingularPointHessian { track_id: 0 })
        ));
    }

    #[test]
    fn test_translation_jacobian_opposes_point_jacobian() {
        let (problem, state) = setup(&[0, 1]);
        let jac = observation_jacobian(
            &problem,
            state.points[0],
            &state.frames[1],
            problem.observations[0][1].1,
        );
        for k in 0..2 {
            assert_eq!(jac.frame[k][0], -jac.point[k].x);
            assert_eq!(jac.frame[k][1], -jac.point[k].y);
            assert_eq!(jac.frame[k][2], -jac.point[k].z);
        }
        assert!(is_rotation_var(4));
        assert!(!is_rotation_var(2));
    }

    #[test]
    fn test_non_finite_point() {
        let (problem, mut state) = setup(&[0, 1, 2]);
        state.points[0] = DVec3::new(f64::NAN, 0.0, 1.0);
        let layout = ParameterLayout::new(1, 3, UnityAxis::Y);
        assert!(matches!(
            compute_derivatives(&problem, &layout, &state),
            Err(BundleAdjustmentError::NonFiniteDerivative(_))
        ));
    }
}
