//! Gauge normalization.
//!
//! A reconstruction from image observations is only defined up to a similarity transformation:
//! 3 rotation, 3 translation and 1 scale degrees of freedom. The normalizer removes them by
//! moving the world into the coordinate frame of camera 0 and scaling it so that a chosen
//! component of camera 1's center equals a unity value.

use glam::{DMat3, DVec3};
use kornia_lie::se3::SE3F64;

use crate::config::UnityAxis;
use crate::error::BundleAdjustmentError;
use crate::problem::OptimizationState;

/// Tolerance of the gauge constraint checks.
pub const GAUGE_TOLERANCE: f64 = 1e-3;

/// Parameters needed to revert a normalization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizationParams {
    /// Original world-to-camera rotation of frame 0.
    pub r0: DMat3,
    /// Original world-to-camera translation of frame 0.
    pub t0: DVec3,
    /// Scale applied to the world.
    pub scale: f64,
}

impl NormalizationParams {
    /// Map a point from the original to the normalized world, `s * (R0 * x + T0)`.
    #[inline]
    pub fn normalize_point(&self, x: DVec3) -> DVec3 {
        self.scale * (self.r0 * x + self.t0)
    }

    /// Map a point from the normalized to the original world, `R0^T * (x / s - T0)`.
    #[inline]
    pub fn revert_point(&self, x: DVec3) -> DVec3 {
        self.r0.transpose() * (x / self.scale - self.t0)
    }

    /// Express a world-to-camera pose in the normalized world.
    ///
    /// `R' = Rk * R0^T`, `T' = s * (Tk - Rk * R0^T * T0)`.
    #[inline]
    pub fn normalize_pose(&self, pose: &SE3F64) -> SE3F64 {
        let r = pose.r * self.r0.transpose();
        SE3F64::new(r, self.scale * (pose.t - r * self.t0))
    }

    /// Express a world-to-camera pose of the normalized world in the original world.
    ///
    /// `Rk = R' * R0`, `Tk = T' / s + R' * T0`.
    #[inline]
    pub fn revert_pose(&self, pose: &SE3F64) -> SE3F64 {
        SE3F64::new(pose.r * self.r0, pose.t / self.scale + pose.r * self.t0)
    }
}

/// Removes and restores the gauge freedom of a scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaugeNormalizer {
    /// Component of frame 1's camera center fixed by the normalization.
    pub unity_axis: UnityAxis,
    /// Value of that component after normalization.
    pub unity_value: f64,
}

impl GaugeNormalizer {
    /// Create a normalizer.
    pub fn new(unity_axis: UnityAxis, unity_value: f64) -> Self {
        Self {
            unity_axis,
            unity_value,
        }
    }

    /// Normalize the state in place.
    ///
    /// # Returns
    ///
    /// The parameters needed by [`revert`](Self::revert).
    ///
    /// # Errors
    ///
    /// * [`BundleAdjustmentError::NotEnoughFrames`] with fewer than 2 frames.
    /// * [`BundleAdjustmentError::DegenerateGauge`] if frame 1's camera center has no component
    ///   along the unity axis relative to frame 0.
    /// * [`BundleAdjustmentError::GaugeViolation`] if the normalized state does not satisfy the
    ///   gauge constraints or does not map back onto the original state.
    pub fn normalize(
        &self,
        state: &mut OptimizationState,
    ) -> Result<NormalizationParams, BundleAdjustmentError> {
        if state.frames.len() < 2 {
            return Err(BundleAdjustmentError::NotEnoughFrames(state.frames.len()));
        }

        let (r0, t0) = (state.frames[0].r, state.frames[0].t);
        let (r1, t1) = (state.frames[1].r, state.frames[1].t);

        // translation from frame 0 to frame 1 in frame 0 axes
        let shift = t0 - r0 * r1.transpose() * t1;
        let shift_unity = shift[self.unity_axis.index()];
        let scale = self.unity_value / shift_unity;
        if !scale.is_finite() || shift_unity.abs() <= f64::EPSILON * shift.length() {
            return Err(BundleAdjustmentError::DegenerateGauge { shift: shift_unity });
        }

        let params = NormalizationParams { r0, t0, scale };

        for point in state.points.iter_mut() {
            let normalized = params.normalize_point(*point);
            check_back_conversion(*point, params.revert_point(normalized), "point")?;
            *point = normalized;
        }

        for frame in state.frames.iter_mut() {
            let normalized = params.normalize_pose(frame);
            let back = params.revert_pose(&normalized);
            check_back_conversion(frame.t, back.t, "frame translation")?;
            if !back.r.abs_diff_eq(frame.r, GAUGE_TOLERANCE) {
                return Err(BundleAdjustmentError::GaugeViolation(
                    "frame rotation does not survive the normalization round trip".to_string(),
                ));
            }
            *frame = normalized;
        }

        log::debug!(
            "normalized scene: scale {scale}, camera shift {shift} along axis {:?}",
            self.unity_axis
        );

        self.check(&state.frames)?;
        Ok(params)
    }

    /// Restore the original coordinate frame of a normalized state.
    pub fn revert(&self, state: &mut OptimizationState, params: &NormalizationParams) {
        for point in state.points.iter_mut() {
            *point = params.revert_point(*point);
        }
        for frame in state.frames.iter_mut() {
            *frame = params.revert_pose(frame);
        }
    }

    /// Check the gauge constraints on the world-to-camera frames.
    ///
    /// Frame 0 must be the identity and the unity-axis component of frame 1's camera center must
    /// equal the unity value.
    pub fn check(&self, frames: &[SE3F64]) -> Result<(), BundleAdjustmentError> {
        if frames.len() < 2 {
            return Err(BundleAdjustmentError::NotEnoughFrames(frames.len()));
        }

        let frame0 = &frames[0];
        if !frame0.r.abs_diff_eq(DMat3::IDENTITY, GAUGE_TOLERANCE) {
            return Err(BundleAdjustmentError::GaugeViolation(format!(
                "R0 must be identity, got {}",
                frame0.r
            )));
        }
        if !frame0.t.abs_diff_eq(DVec3::ZERO, GAUGE_TOLERANCE) {
            return Err(BundleAdjustmentError::GaugeViolation(format!(
                "T0 must be zero, got {}",
                frame0.t
            )));
        }

        let center1 = frames[1].inverse().t;
        let value = center1[self.unity_axis.index()];
        if (value - self.unity_value).abs() > GAUGE_TOLERANCE * self.unity_value.abs().max(1.0) {
            return Err(BundleAdjustmentError::GaugeViolation(format!(
                "camera center of frame 1 along {:?} must be {}, got {value}",
                self.unity_axis, self.unity_value
            )));
        }

        Ok(())
    }
}

fn check_back_conversion(
    original: DVec3,
    back: DVec3,
    what: &str,
) -> Result<(), BundleAdjustmentError> {
    let tol = GAUGE_TOLERANCE * original.abs().max_element().max(1.0);
    if !back.abs_diff_eq(original, tol) {
        return Err(BundleAdjustmentError::GaugeViolation(format!(
            "{what} does not survive the normalization round trip: {original} -> {back}"
        )));
    }
    Ok(())
}
