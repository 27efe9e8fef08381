use thiserror::Error;

/// Errors raised by the linear algebra routines.
#[derive(Debug, Error, PartialEq)]
pub enum LinalgError {
    /// The matrix is singular or too close to singular to invert.
    #[error("Matrix is singular, det = {det}")]
    SingularMatrix {
        /// The determinant of the matrix.
        det: f64,
    },

    /// The linear system has no unique solution.
    #[error("Linear system of size {size} is singular")]
    SingularSystem {
        /// The number of unknowns.
        size: usize,
    },

    /// The shapes of the system matrix and the right hand side disagree.
    #[error("Dimension mismatch: matrix is {rows}x{cols}, right hand side has {rhs} entries")]
    DimensionMismatch {
        /// Rows of the system matrix.
        rows: usize,
        /// Columns of the system matrix.
        cols: usize,
        /// Length of the right hand side.
        rhs: usize,
    },

    /// The input or the solution contains NaN or infinite values.
    #[error("Non finite values encountered")]
    NonFinite,

    /// Source and destination arrays must have the same length
    #[error("Source and destination arrays must have the same length")]
    MismatchedInputLengths,

    /// Not enough points to estimate the transformation.
    #[error("Not enough points: got {got}, need at least {need}")]
    NotEnoughPoints {
        /// Number of points provided.
        got: usize,
        /// Minimum number of points required.
        need: usize,
    },
}
