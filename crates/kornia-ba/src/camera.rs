use glam::{DMat3, DVec2, DVec3};
use kornia_lie::se3::SE3F64;
use serde::{Deserialize, Serialize};

/// Pinhole camera intrinsics in the homogeneous form of Kanatani.
///
/// The calibration matrix is
///
/// ```text
/// K = | fx  0  cx |
///     |  0 fy  cy |
///     |  0  0  f0 |
/// ```
///
/// and a camera point `x` projects to the pixel `f0 * (m.x / m.z, m.y / m.z)` with `m = K * x`.
/// `f0` is a scale keeping the homogeneous coordinates of the same order of magnitude; it cancels
/// out of the pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    /// Focal length along x in pixels.
    pub fx: f64,
    /// Focal length along y in pixels.
    pub fy: f64,
    /// Principal point x in pixels.
    pub cx: f64,
    /// Principal point y in pixels.
    pub cy: f64,
    /// Homogeneous scale.
    #[serde(default = "default_f0")]
    pub f0: f64,
}

fn default_f0() -> f64 {
    1.0
}

impl CameraIntrinsics {
    /// Create intrinsics with a unit homogeneous scale.
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            f0: default_f0(),
        }
    }

    /// Set the homogeneous scale.
    pub fn with_f0(mut self, f0: f64) -> Self {
        self.f0 = f0;
        self
    }

    /// The 3x3 calibration matrix.
    pub fn matrix(&self) -> DMat3 {
        DMat3::from_cols(
            DVec3::new(self.fx, 0.0, 0.0),
            DVec3::new(0.0, self.fy, 0.0),
            DVec3::new(self.cx, self.cy, self.f0),
        )
    }

    /// Project a point expressed in camera coordinates to pixels.
    #[inline]
    pub fn project(&self, p_cam: DVec3) -> DVec2 {
        let m = self.matrix() * p_cam;
        DVec2::new(m.x, m.y) * (self.f0 / m.z)
    }

    /// Rows of the 2x3 Jacobian of [`project`](Self::project) with respect to the camera point.
    #[inline]
    pub fn project_jacobian(&self, p_cam: DVec3) -> [DVec3; 2] {
        let k = self.matrix();
        let m = k * p_cam;
        let inv_z = 1.0 / m.z;
        let du_dm = DVec3::new(inv_z, 0.0, -m.x * inv_z * inv_z) * self.f0;
        let dv_dm = DVec3::new(0.0, inv_z, -m.y * inv_z * inv_z) * self.f0;
        // row * K == K^T * row
        let kt = k.transpose();
        [kt * du_dm, kt * dv_dm]
    }

    /// The 3x4 projection matrix `K * [R | T]` of a world-to-camera pose, row major.
    pub fn projection_matrix(&self, cam_from_world: &SE3F64) -> [[f64; 4]; 3] {
        let k = self.matrix();
        let kr = k * cam_from_world.r;
        let kt = k * cam_from_world.t;
        let mut p = [[0.0; 4]; 3];
        for (row, p_row) in p.iter_mut().enumerate() {
            p_row[0] = kr.x_axis[row];
            p_row[1] = kr.y_axis[row];
            p_row[2] = kr.z_axis[row];
            p_row[3] = kt[row];
        }
        p
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_project_f0_cancels() {
        let a = CameraIntrinsics::new(500.0, 480.0, 320.0, 240.0);
        let b = a.with_f0(600.0);
        let p = DVec3::new(0.3, -0.2, 2.0);
        let pa = a.project(p);
        let pb = b.project(p);
        assert_relative_eq!(pa.x, 500.0 * 0.15 + 320.0, epsilon = 1e-9);
        assert_relative_eq!(pa.y, -480.0 * 0.1 + 240.0, epsilon = 1e-9);
        assert_relative_eq!(pa.x, pb.x, epsilon = 1e-9);
        assert_relative_eq!(pa.y, pb.y, epsilon = 1e-9);
    }

    #[test]
    fn test_project_jacobian() {
        let cam = CameraIntrinsics::new(500.0, 480.0, 320.0, 240.0).with_f0(100.0);
        let p = DVec3::new(0.3, -0.2, 2.0);
        let jac = cam.project_jacobian(p);
        let eps = 1e-6;
        for k in 0..3 {
            let mut dp = DVec3::ZERO;
            dp[k] = eps;
            let num = (cam.project(p + dp) - cam.project(p - dp)) / (2.0 * eps);
            assert_relative_eq!(jac[0][k], num.x, epsilon = 1e-4);
            assert_relative_eq!(jac[1][k], num.y, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_projection_matrix() {
        let cam = CameraIntrinsics::new(500.0, 500.0, 320.0, 240.0);
        let pose = SE3F64::from_axis_angle(DVec3::new(0.0, 0.1, 0.0), DVec3::new(0.1, 0.0, 1.0));
        let x = DVec3::new(0.2, 0.4, 3.0);
        let p = cam.projection_matrix(&pose);
        let h: Vec<f64> = p
            .iter()
            .map(|row| row[0] * x.x + row[1] * x.y + row[2] * x.z + row[3])
            .collect();
        let expected = cam.project(pose.transform_point(x));
        assert_relative_eq!(cam.f0 * h[0] / h[2], expected.x, epsilon = 1e-9);
        assert_relative_eq!(cam.f0 * h[1] / h[2], expected.y, epsilon = 1e-9);
    }

    #[test]
    fn test_deserialize_default_f0() {
        let cam: CameraIntrinsics =
            serde_json::from_str(r#"{"fx": 1.0, "fy": 2.0, "cx": 3.0, "cy": 4.0}"#).unwrap();
        assert_eq!(cam.f0, 1.0);
    }
}
