use glam::DVec3;
use kornia_lie::se3::SE3F64;
use kornia_lie::so3::exp_so3;

use crate::layout::{FRAME_VARS, ROTATION_OFFSET};
use crate::problem::OptimizationState;
use crate::solver::Corrections;

/// Rotation increments with a smaller norm are not applied.
pub const MIN_ROTATION_INCREMENT: f64 = 1e-5;

/// Apply a correction to one world-to-camera frame.
///
/// The camera center is shifted additively and the camera-to-world rotation is rotated by the
/// left increment `exp([dw]x)`, then the pose is converted back to world-to-camera.
pub fn apply_frame_correction(frame: &SE3F64, correction: &[f64; FRAME_VARS]) -> SE3F64 {
    let world_from_cam = frame.inverse();

    let d_center = DVec3::new(correction[0], correction[1], correction[2]);
    let d_rot = DVec3::new(
        correction[ROTATION_OFFSET],
        correction[ROTATION_OFFSET + 1],
        correction[ROTATION_OFFSET + 2],
    );

    let center = world_from_cam.t + d_center;
    let r_dir = if d_rot.length() < MIN_ROTATION_INCREMENT {
        world_from_cam.r
    } else {
        exp_so3(d_rot) * world_from_cam.r
    };

    SE3F64::new(r_dir, center).inverse()
}

/// Apply the corrections to the state in place.
///
/// Frames whose correction is exactly zero, such as the gauge frame 0, are left bit-identical.
pub fn apply_corrections(state: &mut OptimizationState, corrections: &Corrections) {
    for (point, delta) in state.points.iter_mut().zip(corrections.points.iter()) {
        *point += *delta;
    }

    for (frame, correction) in state.frames.iter_mut().zip(corrections.frames.iter()) {
        if correction.iter().all(|v| *v == 0.0) {
            continue;
        }
        *frame = apply_frame_correction(frame, correction);
    }
}
