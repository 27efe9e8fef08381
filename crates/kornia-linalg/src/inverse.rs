use glam::DMat3;

use crate::LinalgError;

/// Relative threshold on `|det| / max|a_ij|^3` below which a matrix is treated as singular.
pub const SINGULAR_THRESHOLD: f64 = 1.0e-13;

/// Invert a 3x3 matrix.
///
/// The determinant is compared against the cube of the largest absolute entry so the test does
/// not depend on the units of the matrix.
///
/// # Arguments
///
/// * `mat` - The matrix to invert.
///
/// # Returns
///
/// The inverse matrix, or [`LinalgError::SingularMatrix`] if `mat` is singular.
pub fn invert3x3(mat: &DMat3) -> Result<DMat3, LinalgError> {
    if !mat.is_finite() {
        return Err(LinalgError::NonFinite);
    }

    let det = mat.determinant();
    let max_abs = mat
        .to_cols_array()
        .iter()
        .fold(0.0f64, |acc, v| acc.max(v.abs()));

    if max_abs == 0.0 || det.abs() <= SINGULAR_THRESHOLD * max_abs.powi(3) {
        return Err(LinalgError::SingularMatrix { det });
    }

    let inv = mat.inverse();
    if !inv.is_finite() {
        return Err(LinalgError::SingularMatrix { det });
    }

    Ok(inv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;

    #[test]
    fn test_invert3x3() -> Result<(), LinalgError> {
        let m = DMat3::from_cols(
            DVec3::new(4.0, 1.0, 0.5),
            DVec3::new(1.0, 3.0, -0.2),
            DVec3::new(0.5, -0.2, 2.0),
        );
        let inv = invert3x3(&m)?;
        assert!((m * inv).abs_diff_eq(DMat3::IDENTITY, 1e-12));
        Ok(())
    }

    #[test]
    fn test_invert3x3_scale_invariant() -> Result<(), LinalgError> {
        let m = DMat3::from_diagonal(DVec3::new(1e-6, 2e-6, 3e-6));
        let inv = invert3x3(&m)?;
        assert!((m * inv).abs_diff_eq(DMat3::IDENTITY, 1e-9));
        Ok(())
    }

    #[test]
    fn test_invert3x3_singular() {
        let m = DMat3::from_cols(
            DVec3::new(1.0, 2.0, 3.0),
            DVec3::new(2.0, 4.0, 6.0),
            DVec3::new(0.0, 1.0, 1.0),
        );
        assert!(matches!(
            invert3x3(&m),
            Err(LinalgError::SingularMatrix { .. })
        ));
        assert!(invert3x3(&DMat3::ZERO).is_err());
    }

    #[test]
    fn test_invert3x3_non_finite() {
        let mut m = DMat3::IDENTITY;
        m.x_axis.x = f64::NAN;
        assert_eq!(invert3x3(&m), Err(LinalgError::NonFinite));
    }
}
