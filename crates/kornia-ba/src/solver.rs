//! Schur complement solver of the damped normal equations.
//!
//! The normal equations have the block structure
//!
//! ```text
//! | Hp   C  | | dp |     | gp |
//! | C^T  Hf | | df | = - | gf |
//! ```
//!
//! where `Hp` is block diagonal with one 3x3 block per point. Only the point blocks are damped,
//! `Hp' = (1 + lambda) * Hp`. Eliminating the points gives the reduced frame system
//!
//! ```text
//! (Hf - C^T Hp'^-1 C) df = C^T Hp'^-1 gp - gf
//! dp = -Hp'^-1 (C df + gp)
//! ```
//!
//! which is assembled and solved over the free frame variables only.

use faer::Mat;
use glam::{DMat3, DVec3};
use kornia_linalg::{invert3x3, solve_linear_system};
use rayon::prelude::*;

use crate::derivatives::{DerivativeBuffers, PointFrameBlock};
use crate::error::BundleAdjustmentError;
use crate::layout::{ParameterLayout, FRAME_VARS, POINT_VARS};
use crate::problem::BundleAdjustmentProblem;

/// Correction of every point and frame variable.
///
/// Frame corrections are `[dc, dw]`: the camera center shift followed by the rotation increment.
/// Entries fixed by the gauge are exactly zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Corrections {
    /// Correction of each point.
    pub points: Vec<DVec3>,
    /// Correction of each frame.
    pub frames: Vec<[f64; FRAME_VARS]>,
}

impl Corrections {
    fn is_finite(&self) -> bool {
        self.points.iter().all(|p| p.is_finite())
            && self.frames.iter().flatten().all(|v| v.is_finite())
    }
}

// products of the damped inverse point block with the point-frame blocks and the gradient
struct EliminatedPoint {
    // (frame, Hp'^-1 * C)
    inv_cross: Vec<(usize, PointFrameBlock)>,
    // Hp'^-1 * gp
    inv_grad: DVec3,
}

fn mat3_mul_cross(m: &DMat3, c: &PointFrameBlock) -> PointFrameBlock {
    let mut out = [[0.0; FRAME_VARS]; POINT_VARS];
    for (r, out_row) in out.iter_mut().enumerate() {
        for (b, v) in out_row.iter_mut().enumerate() {
            *v = (0..POINT_VARS).map(|k| m.col(k)[r] * c[k][b]).sum();
        }
    }
    out
}

fn eliminate_point(
    problem: &BundleAdjustmentProblem,
    buffers: &DerivativeBuffers,
    point_ind: usize,
    lambda: f64,
) -> Result<EliminatedPoint, BundleAdjustmentError> {
    let damped = buffers.point_blocks[point_ind] * (1.0 + lambda);
    let inv = invert3x3(&damped).map_err(|_| BundleAdjustmentError::SingularPointHessian {
        track_id: problem.track_ids[point_ind],
    })?;

    let inv_cross = problem.observations[point_ind]
        .iter()
        .map(|(frame_ind, _)| {
            let cross = buffers.point_frame(point_ind, *frame_ind);
            (*frame_ind, mat3_mul_cross(&inv, cross))
        })
        .collect();

    Ok(EliminatedPoint {
        inv_cross,
        inv_grad: inv * buffers.point_gradient(point_ind),
    })
}

/// Solve the damped normal equations for the corrections of all variables.
///
/// # Arguments
///
/// * `problem` - The observations, used to visit only the observed point-frame blocks.
/// * `layout` - The parameter layout with the gauge-fixed variables.
/// * `buffers` - The gradient and Hessian blocks at the current state.
/// * `lambda` - The damping factor applied to the point blocks.
///
/// # Errors
///
/// * [`BundleAdjustmentError::SingularPointHessian`] if a damped point block is not invertible.
/// * [`BundleAdjustmentError::ReducedSystem`] if the reduced frame system is singular.
/// * [`BundleAdjustmentError::NonFiniteCorrection`] if the corrections are not finite.
pub fn solve_corrections(
    problem: &BundleAdjustmentProblem,
    layout: &ParameterLayout,
    buffers: &DerivativeBuffers,
    lambda: f64,
) -> Result<Corrections, BundleAdjustmentError> {
    let points_count = problem.points_count();
    let frames_count = problem.frames_count;
    let free_len = layout.free_frame_len();

    // frame-frame blocks and frame gradient restricted to the free variables
    let mut mat_g = Mat::<f64>::zeros(free_len, free_len);
    let mut rhs = vec![0.0; free_len];
    for frame_ind in 0..frames_count {
        let block = &buffers.frame_blocks[frame_ind];
        let grad = buffers.frame_gradient(frame_ind);
        for a in 0..FRAME_VARS {
            let Some(fa) = layout.free_index(frame_ind, a) else {
                continue;
            };
            rhs[fa] = -grad[a];
            for b in 0..FRAME_VARS {
                if let Some(fb) = layout.free_index(frame_ind, b) {
                    mat_g.write(fa, fb, block[a][b]);
                }
            }
        }
    }

    let eliminated = (0..points_count)
        .into_par_iter()
        .map(|point_ind| eliminate_point(problem, buffers, point_ind, lambda))
        .collect::<Result<Vec<_>, _>>()?;

    // subtract C^T Hp'^-1 C and add C^T Hp'^-1 gp
    for (point_ind, elim) in eliminated.iter().enumerate() {
        for (frame_j, _) in elim.inv_cross.iter() {
            let cross_j = buffers.point_frame(point_ind, *frame_j);

            for a in 0..FRAME_VARS {
                let Some(fa) = layout.free_index(*frame_j, a) else {
                    continue;
                };

                let rhs_term: f64 = (0..POINT_VARS)
                    .map(|p| cross_j[p][a] * elim.inv_grad[p])
                    .sum();
                rhs[fa] += rhs_term;

                for (frame_k, inv_cross_k) in elim.inv_cross.iter() {
                    for b in 0..FRAME_VARS {
                        let Some(fb) = layout.free_index(*frame_k, b) else {
                            continue;
                        };
                        let term: f64 = (0..POINT_VARS)
                            .map(|p| cross_j[p][a] * inv_cross_k[p][b])
                            .sum();
                        mat_g.write(fa, fb, mat_g.read(fa, fb) - term);
                    }
                }
            }
        }
    }

    let free_corrections = solve_linear_system(mat_g.as_ref(), &rhs)?;

    // reinsert the gauge-fixed variables as zeros
    let mut frames = vec![[0.0; FRAME_VARS]; frames_count];
    for (free, value) in free_corrections.iter().enumerate() {
        let (frame_ind, var) = layout.frame_var(free);
        frames[frame_ind][var] = *value;
    }

    // back substitution: dp = -Hp'^-1 (C df + gp) = -(Hp'^-1 C) df - Hp'^-1 gp
    let points = eliminated
        .iter()
        .map(|elim| {
            let mut dp = -elim.inv_grad;
            for (frame_ind, inv_cross) in elim.inv_cross.iter() {
                let df = &frames[*frame_ind];
                for (p, row) in inv_cross.iter().enumerate() {
                    dp[p] -= row.iter().zip(df.iter()).map(|(c, d)| c * d).sum::<f64>();
                }
            }
            dp
        })
        .collect();

    let corrections = Corrections { points, frames };
    if !corrections.is_finite() {
        return Err(BundleAdjustmentError::NonFiniteCorrection);
    }

    Ok(corrections)
}
