use faer::prelude::SpSolver;
use faer::{Mat, MatRef};

use crate::LinalgError;

/// Relative pivot magnitude below which the system is considered rank deficient.
const PIVOT_TOLERANCE: f64 = 1.0e-12;

/// Relative residual above which a computed solution is rejected.
const RESIDUAL_TOLERANCE: f64 = 1.0e-6;

/// Solve the square linear system `a * x = b`.
///
/// The system is factored with a fully pivoted LU decomposition. The solution is rejected when a
/// pivot is negligible compared to the largest one, when it contains non finite values, or when
/// it does not reproduce `b`.
///
/// # Arguments
///
/// * `a` - The square system matrix with shape (n, n).
/// * `b` - The right hand side with n entries.
///
/// # Returns
///
/// The solution vector `x` with n entries.
pub fn solve_linear_system(a: MatRef<'_, f64>, b: &[f64]) -> Result<Vec<f64>, LinalgError> {
    let n = a.nrows();
    if a.ncols() != n || b.len() != n {
        return Err(LinalgError::DimensionMismatch {
            rows: a.nrows(),
            cols: a.ncols(),
            rhs: b.len(),
        });
    }

    if n == 0 {
        return Ok(Vec::new());
    }

    let mut a_max = 0.0f64;
    for j in 0..n {
        for i in 0..n {
            let v = a.read(i, j);
            if !v.is_finite() {
                return Err(LinalgError::NonFinite);
            }
            a_max = a_max.max(v.abs());
        }
    }
    if b.iter().any(|v| !v.is_finite()) {
        return Err(LinalgError::NonFinite);
    }
    if a_max == 0.0 {
        return Err(LinalgError::SingularSystem { size: n });
    }

    let lu = a.full_piv_lu();

    let u = lu.compute_u();
    let pivots: Vec<f64> = (0..n).map(|i| u.read(i, i).abs()).collect();
    let pivot_max = pivots.iter().copied().fold(0.0f64, f64::max);
    let pivot_min = pivots.iter().copied().fold(f64::INFINITY, f64::min);
    if pivot_min.is_nan() || pivot_min <= PIVOT_TOLERANCE * pivot_max {
        return Err(LinalgError::SingularSystem { size: n });
    }

    let rhs = Mat::<f64>::from_fn(n, 1, |i, _| b[i]);
    let sol = lu.solve(&rhs);

    let x: Vec<f64> = (0..n).map(|i| sol.read(i, 0)).collect();
    if x.iter().any(|v| !v.is_finite()) {
        return Err(LinalgError::SingularSystem { size: n });
    }

    // || a * x - b || <= tol * (|a| |x| + |b|)
    let mut residual = 0.0f64;
    let mut scale = 0.0f64;
    for (i, bi) in b.iter().enumerate() {
        let mut ax = 0.0;
        let mut abs_ax = 0.0;
        for (j, xj) in x.iter().enumerate() {
            let aij = a.read(i, j);
            ax += aij * xj;
            abs_ax += (aij * xj).abs();
        }
        residual = residual.max((ax - bi).abs());
        scale = scale.max(abs_ax + bi.abs());
    }
    if residual > RESIDUAL_TOLERANCE * scale.max(f64::MIN_POSITIVE) {
        return Err(LinalgError::SingularSystem { size: n });
    }

    Ok(x)
}
