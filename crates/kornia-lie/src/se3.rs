use glam::{DMat3, DVec3};

use crate::so3::SO3F64;

/// A rigid body transformation `x -> r * x + t`, the rotation stored as a matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SE3F64 {
    /// Rotation part.
    pub r: DMat3,
    /// Translation part.
    pub t: DVec3,
}

impl Default for SE3F64 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl SE3F64 {
    /// The identity transformation.
    pub const IDENTITY: Self = Self {
        r: DMat3::IDENTITY,
        t: DVec3::ZERO,
    };

    /// Create a transformation from a rotation matrix and a translation.
    pub fn new(r: DMat3, t: DVec3) -> Self {
        Self { r, t }
    }

    /// Create a transformation from an axis-angle rotation and a translation.
    pub fn from_axis_angle(axis_angle: DVec3, t: DVec3) -> Self {
        Self {
            r: SO3F64::exp(axis_angle).matrix(),
            t,
        }
    }

    /// The inverse transformation `x -> r^T * (x - t)`.
    pub fn inverse(&self) -> Self {
        let r_inv = self.r.transpose();
        Self {
            r: r_inv,
            t: -(r_inv * self.t),
        }
    }

    /// Apply the transformation to a point.
    #[inline]
    pub fn transform_point(&self, p: DVec3) -> DVec3 {
        self.r * p + self.t
    }

    /// Compose `self * other`, i.e. apply `other` first.
    pub fn compose(&self, other: &SE3F64) -> Self {
        Self {
            r: self.r * other.r,
            t: self.t + self.r * other.t,
        }
    }

    /// Relative transformation `a_from_b` given two transformations expressed in a common frame.
    ///
    /// # Arguments
    ///
    /// * `a_from_world` - Transformation from the common frame into frame `a`.
    /// * `b_from_world` - Transformation from the common frame into frame `b`.
    pub fn a_from_b(a_from_world: &SE3F64, b_from_world: &SE3F64) -> Self {
        a_from_world.compose(&b_from_world.inverse())
    }

    /// Whether every entry is finite.
    pub fn is_finite(&self) -> bool {
        self.r.is_finite() && self.t.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_identity() {
        let p = DVec3::new(1.0, -2.0, 3.0);
        assert_eq!(SE3F64::IDENTITY.transform_point(p), p);
        assert_eq!(SE3F64::default(), SE3F64::IDENTITY);
    }

    #[test]
    fn test_inverse() {
        let pose = SE3F64::from_axis_angle(DVec3::new(0.1, 0.2, 0.3), DVec3::new(1.0, 2.0, 3.0));
        let p = DVec3::new(0.5, -0.25, 4.0);
        let back = pose.inverse().transform_point(pose.transform_point(p));
        assert_relative_eq!(back.x, p.x, epsilon = 1e-12);
        assert_relative_eq!(back.y, p.y, epsilon = 1e-12);
        assert_relative_eq!(back.z, p.z, epsilon = 1e-12);

        let ident = pose.compose(&pose.inverse());
        assert!(ident.r.abs_diff_eq(DMat3::IDENTITY, 1e-12));
        assert!(ident.t.abs_diff_eq(DVec3::ZERO, 1e-12));
    }

    #[test]
    fn test_compose() {
        let a = SE3F64::from_axis_angle(DVec3::new(0.0, 0.0, 0.5), DVec3::new(1.0, 0.0, 0.0));
        let b = SE3F64::from_axis_angle(DVec3::new(0.2, 0.0, 0.0), DVec3::new(0.0, 1.0, 0.0));
        let p = DVec3::new(0.3, 0.1, -0.7);
        let lhs = a.compose(&b).transform_point(p);
        let rhs = a.transform_point(b.transform_point(p));
        assert_relative_eq!(lhs.x, rhs.x, epsilon = 1e-12);
        assert_relative_eq!(lhs.y, rhs.y, epsilon = 1e-12);
        assert_relative_eq!(lhs.z, rhs.z, epsilon = 1e-12);
    }

    #[test]
    fn test_a_from_b() {
        let a = SE3F64::from_axis_angle(DVec3::new(0.0, 0.4, 0.0), DVec3::new(1.0, 0.0, 2.0));
        let b = SE3F64::from_axis_angle(DVec3::new(0.1, 0.0, 0.0), DVec3::new(0.0, -1.0, 0.0));
        let a_from_b = SE3F64::a_from_b(&a, &b);
        let p_world = DVec3::new(1.0, 2.0, 3.0);
        let lhs = a_from_b.transform_point(b.transform_point(p_world));
        let rhs = a.transform_point(p_world);
        assert_relative_eq!(lhs.x, rhs.x, epsilon = 1e-12);
        assert_relative_eq!(lhs.y, rhs.y, epsilon = 1e-12);
        assert_relative_eq!(lhs.z, rhs.z, epsilon = 1e-12);
    }

    #[test]
    fn test_from_axis_angle() {
        let w = DVec3::new(0.3, -0.1, 0.2);
        let pose = SE3F64::from_axis_angle(w, DVec3::ZERO);
        let log = SO3F64::from_matrix(&pose.r).log();
        assert_relative_eq!(log.x, w.x, epsilon = 1e-12);
        assert_relative_eq!(log.y, w.y, epsilon = 1e-12);
        assert_relative_eq!(log.z, w.z, epsilon = 1e-12);
        assert!(pose.is_finite());
    }
}
