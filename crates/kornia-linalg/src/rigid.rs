//! Similarity alignment (Umeyama)

use glam::{DMat3, DVec3};

use crate::LinalgError;

/// Similarity transformation `dst = s * r * src + t`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity {
    /// Rotation.
    pub r: DMat3,
    /// Translation.
    pub t: DVec3,
    /// Isotropic scale.
    pub s: f64,
}

impl Similarity {
    /// Apply the transformation to a point.
    #[inline]
    pub fn transform_point(&self, p: DVec3) -> DVec3 {
        self.s * (self.r * p) + self.t
    }
}

/// Umeyama's least squares similarity estimation.
///
/// Finds the rotation, translation and scale minimizing `sum |dst_i - (s * R * src_i + t)|^2`.
///
/// # Arguments
///
/// * `src` - The source points.
/// * `dst` - The destination points, matched one to one with `src`.
///
/// # Returns
///
/// The estimated [`Similarity`].
pub fn umeyama(src: &[DVec3], dst: &[DVec3]) -> Result<Similarity, LinalgError> {
    if src.len() != dst.len() {
        return Err(LinalgError::MismatchedInputLengths);
    }
    if src.len() < 3 {
        return Err(LinalgError::NotEnoughPoints {
            got: src.len(),
            need: 3,
        });
    }
    let n = src.len() as f64;

    let mu_s = src.iter().copied().sum::<DVec3>() / n;
    let mu_d = dst.iter().copied().sum::<DVec3>() / n;

    // covariance H = 1/n * sum (dst_i - mu_d) * (src_i - mu_s)^T
    let mut h = faer::Mat::<f64>::zeros(3, 3);
    let mut var_s = 0.0;
    for (s, d) in src.iter().zip(dst.iter()) {
        let sc = (*s - mu_s).to_array();
        let dc = (*d - mu_d).to_array();
        var_s += (*s - mu_s).length_squared();
        for (r, dc_r) in dc.iter().enumerate() {
            for (c, sc_c) in sc.iter().enumerate() {
                h.write(r, c, h.read(r, c) + dc_r * sc_c / n);
            }
        }
    }
    var_s /= n;

    if !var_s.is_finite() || var_s <= f64::EPSILON {
        return Err(LinalgError::NotEnoughPoints {
            got: src.len(),
            need: 3,
        });
    }

    let svd = h.svd();
    let to_glam = |m: faer::MatRef<'_, f64>| {
        DMat3::from_cols(
            DVec3::new(m.read(0, 0), m.read(1, 0), m.read(2, 0)),
            DVec3::new(m.read(0, 1), m.read(1, 1), m.read(2, 1)),
            DVec3::new(m.read(0, 2), m.read(1, 2), m.read(2, 2)),
        )
    };
    let u = to_glam(svd.u());
    let v = to_glam(svd.v());
    let sigma = svd.s_diagonal();

    // reflection correction
    let d = if (u * v.transpose()).determinant() < 0.0 {
        -1.0
    } else {
        1.0
    };
    let correction = DMat3::from_diagonal(DVec3::new(1.0, 1.0, d));
    let r = u * correction * v.transpose();

    let trace = sigma.read(0) + sigma.read(1) + d * sigma.read(2);
    let s = trace / var_s;
    let t = mu_d - s * (r * mu_s);

    if !(r.is_finite() && t.is_finite() && s.is_finite()) {
        return Err(LinalgError::NonFinite);
    }

    Ok(Similarity { r, t, s })
}
