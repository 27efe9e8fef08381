//! # SO(3) in double precision
//!
//! Rotations are stored as unit quaternions. The Lie algebra so(3) is identified with R³ via the
//! hat operator: a vector `v` is an axis-angle rotation whose direction is the axis and whose
//! magnitude is the angle in radians.
//!
//! Besides the [`SO3F64`] group type this module exposes the free functions used by the bundle
//! adjustment engine, which works with plain rotation matrices:
//!
//! - [`exp_so3`]: axis-angle vector to rotation matrix.
//! - [`log_so3`]: rotation matrix to unit axis and angle, rejecting non-rotations.
//! - [`check_special_orthogonal`]: validates `R^T R = I` and `det(R) = 1`.

use glam::{DMat3, DQuat, DVec3};

use crate::LieError;

const SMALL_ANGLE_EPSILON: f64 = 1.0e-12;

/// Tolerance used when validating rotation matrices.
pub const ROTATION_TOLERANCE: f64 = 1.0e-3;

/// A 3D rotation, stored as a unit quaternion.
///
/// `q` and `-q` represent the same rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SO3F64 {
    /// The unit quaternion.
    pub q: DQuat,
}

impl SO3F64 {
    /// Create a rotation from a 3x3 rotation matrix.
    pub fn from_matrix(mat: &DMat3) -> Self {
        Self {
            q: DQuat::from_mat3(mat).normalize(),
        }
    }

    /// The rotation as a 3x3 matrix.
    pub fn matrix(&self) -> DMat3 {
        DMat3::from_quat(self.q)
    }

    /// Lie algebra -> Lie group
    pub fn exp(v: DVec3) -> Self {
        let theta_sq = v.dot(v);
        let theta = theta_sq.sqrt();
        let theta_half = 0.5 * theta;

        let (w, b) = if theta < SMALL_ANGLE_EPSILON {
            // taylor expansion of cos(x/2) and sin(x/2)/x around 0
            (1.0 - theta_sq / 8.0, 0.5 - theta_sq / 48.0)
        } else {
            (theta_half.cos(), theta_half.sin() / theta)
        };

        let xyz = b * v;

        Self {
            q: DQuat::from_xyzw(xyz.x, xyz.y, xyz.z, w),
        }
    }

    /// Lie group -> Lie algebra
    pub fn log(&self) -> DVec3 {
        let mut w = self.q.w;
        let mut vec = DVec3::new(self.q.x, self.q.y, self.q.z);

        if w < 0.0 {
            w = -w;
            vec = -vec;
        }

        let theta = vec.length();

        if theta > SMALL_ANGLE_EPSILON {
            // atan2 keeps precision for angles close to pi
            let half_theta = theta.atan2(w);
            vec * (2.0 * half_theta / theta)
        } else {
            vec * (2.0 / w)
        }
    }
}

/// Build a rotation matrix from an axis-angle vector.
///
/// # Arguments
///
/// * `axis_angle` - The rotation axis scaled by the rotation angle in radians.
///
/// # Returns
///
/// The 3x3 rotation matrix `exp([axis_angle]x)`.
pub fn exp_so3(axis_angle: DVec3) -> DMat3 {
    SO3F64::exp(axis_angle).matrix()
}

/// Validate that `rot` is a rotation matrix.
///
/// Checks `R^T R = I` entry-wise and `det(R) = 1`, both with [`ROTATION_TOLERANCE`].
pub fn check_special_orthogonal(rot: &DMat3) -> Result<(), LieError> {
    if !rot.is_finite() {
        return Err(LieError::NotSpecialOrthogonal(format!(
            "non finite entries R={rot}"
        )));
    }

    let rtr = rot.transpose() * *rot;
    if !rtr.abs_diff_eq(DMat3::IDENTITY, ROTATION_TOLERANCE) {
        return Err(LieError::NotSpecialOrthogonal(format!(
            "failed Rt.R=I, R={rot}"
        )));
    }

    let det = rot.determinant();
    if (det - 1.0).abs() > ROTATION_TOLERANCE {
        return Err(LieError::NotSpecialOrthogonal(format!(
            "failed det(R)=1, actual det(R)={det} R={rot}"
        )));
    }

    Ok(())
}

/// Whether `rot` is a rotation matrix within [`ROTATION_TOLERANCE`].
pub fn is_special_orthogonal(rot: &DMat3) -> bool {
    check_special_orthogonal(rot).is_ok()
}

/// Decompose a rotation matrix into a unit axis and an angle.
///
/// # Arguments
///
/// * `rot` - The 3x3 rotation matrix.
///
/// # Returns
///
/// The unit rotation axis and the angle in radians, in `[0, pi]`.
///
/// # Errors
///
/// * [`LieError::NotSpecialOrthogonal`] if `rot` is not a rotation.
/// * [`LieError::DegenerateAngle`] if the angle is too small to define the axis.
pub fn log_so3(rot: &DMat3) -> Result<(DVec3, f64), LieError> {
    check_special_orthogonal(rot)?;

    let tangent = SO3F64::from_matrix(rot).log();
    let angle = tangent.length();
    if angle < SMALL_ANGLE_EPSILON {
        return Err(LieError::DegenerateAngle { angle });
    }

    Ok((tangent / angle, angle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_exp_identity() {
        let s = SO3F64::exp(DVec3::ZERO);
        assert_eq!(s.q, DQuat::IDENTITY);
        assert_eq!(exp_so3(DVec3::ZERO), DMat3::IDENTITY);
    }

    #[test]
    fn test_exp_permutes_axes() {
        // 120 degrees about (1,1,1) cycles x -> y -> z
        let axis = DVec3::ONE.normalize();
        let rot = exp_so3(axis * 2.0 * std::f64::consts::FRAC_PI_3);
        let y = rot * DVec3::X;
        assert_relative_eq!(y.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(y.y, 1.0, epsilon = 1e-12);
        assert_relative_eq!(y.z, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_log_exp() {
        let v = DVec3::new(0.1, -0.4, 0.25);
        let log = SO3F64::exp(v).log();
        assert_relative_eq!(log.x, v.x, epsilon = 1e-12);
        assert_relative_eq!(log.y, v.y, epsilon = 1e-12);
        assert_relative_eq!(log.z, v.z, epsilon = 1e-12);
    }

    #[test]
    fn test_log_so3() -> Result<(), LieError> {
        let w = DVec3::new(0.3, 0.2, -0.5);
        let (axis, angle) = log_so3(&exp_so3(w))?;
        assert_relative_eq!(angle, w.length(), epsilon = 1e-10);
        let back = axis * angle;
        assert_relative_eq!(back.x, w.x, epsilon = 1e-10);
        assert_relative_eq!(back.y, w.y, epsilon = 1e-10);
        assert_relative_eq!(back.z, w.z, epsilon = 1e-10);
        Ok(())
    }

    #[test]
    fn test_log_so3_near_pi() -> Result<(), LieError> {
        let w = DVec3::new(0.0, 0.0, std::f64::consts::PI - 1e-6);
        let (axis, angle) = log_so3(&exp_so3(w))?;
        assert_relative_eq!(angle, w.length(), epsilon = 1e-9);
        assert_relative_eq!(axis.z.abs(), 1.0, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn test_log_so3_rejects_identity() {
        assert!(matches!(
            log_so3(&DMat3::IDENTITY),
            Err(LieError::DegenerateAngle { .. })
        ));
    }

    #[test]
    fn test_log_so3_rejects_non_rotation() {
        let scaled = DMat3::from_diagonal(DVec3::new(2.0, 1.0, 1.0));
        assert!(matches!(
            log_so3(&scaled),
            Err(LieError::NotSpecialOrthogonal(_))
        ));

        let reflection = DMat3::from_diagonal(DVec3::new(1.0, 1.0, -1.0));
        assert!(!is_special_orthogonal(&reflection));
    }

    #[test]
    fn test_from_matrix_roundtrip() {
        let tangents = [
            DVec3::new(0.3, -0.2, 0.1),
            DVec3::new(-1.2, 0.4, 2.0),
            DVec3::new(0.0, 3.0, 0.0),
        ];
        for v in tangents {
            let m = exp_so3(v);
            assert!(is_special_orthogonal(&m));
            let back = SO3F64::from_matrix(&m).matrix();
            assert!(back.abs_diff_eq(m, 1e-12));
        }
    }
}
