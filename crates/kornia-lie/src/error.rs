use thiserror::Error;

/// Errors raised by the Lie group utilities.
#[derive(Debug, Error, PartialEq)]
pub enum LieError {
    /// The matrix is not a rotation: `R^T R != I` or `det(R) != 1`.
    #[error("Matrix is not special orthogonal: {0}")]
    NotSpecialOrthogonal(String),

    /// The rotation angle is too close to zero to define a unique axis.
    #[error("Rotation angle {angle} is degenerate, the axis is undefined")]
    DegenerateAngle {
        /// The rotation angle in radians.
        angle: f64,
    },
}
