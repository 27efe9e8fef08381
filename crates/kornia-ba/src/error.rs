use kornia_linalg::LinalgError;
use thiserror::Error;

/// Fatal errors of a bundle adjustment invocation.
///
/// A convergence failure is not an error, it is reported through
/// [`BundleAdjustmentResult::success`](crate::BundleAdjustmentResult::success).
#[derive(Debug, Error)]
pub enum BundleAdjustmentError {
    /// Gauge fixing requires at least two frames.
    #[error("Bundle adjustment requires at least 2 frames, got {0}")]
    NotEnoughFrames(usize),

    /// None of the tracks has a triangulated world point with observations.
    #[error("No world point to optimize")]
    NoPoints,

    /// A track refers to a world point or a frame which does not exist.
    #[error("Track {track_id} is out of range: {reason}")]
    TrackOutOfRange {
        /// Identifier of the offending track.
        track_id: usize,
        /// Description of the inconsistency.
        reason: String,
    },

    /// The unity axis of the camera shift between frame 0 and frame 1 is zero.
    #[error("Cannot normalize the scene, camera shift {shift} along the unity axis is zero")]
    DegenerateGauge {
        /// The shift component along the unity axis.
        shift: f64,
    },

    /// The normalized scene does not satisfy the gauge constraints.
    #[error("Gauge constraint violated: {0}")]
    GaugeViolation(String),

    /// The 3x3 Hessian block of a point cannot be inverted.
    #[error(
        "Hessian block of point {track_id} is singular, \
         the point needs observations from at least 2 frames"
    )]
    SingularPointHessian {
        /// Identifier of the offending track.
        track_id: usize,
    },

    /// The derivatives contain NaN or infinite values.
    #[error("Non finite derivative: {0}")]
    NonFiniteDerivative(String),

    /// The correction vector contains NaN or infinite values.
    #[error("Non finite correction")]
    NonFiniteCorrection,

    /// The reduced frame system cannot be solved.
    #[error("Reduced frame system failed: {0}")]
    ReducedSystem(#[from] LinalgError),

    /// Analytic and finite difference derivatives disagree.
    #[error("Derivative mismatch at {what}: analytic {analytic}, finite difference {numeric}")]
    DerivativeMismatch {
        /// Which entry failed.
        what: String,
        /// Analytic value.
        analytic: f64,
        /// Finite difference estimate.
        numeric: f64,
    },

    /// The track cannot be triangulated.
    #[error("Cannot triangulate track {track_id}: {reason}")]
    Triangulation {
        /// Identifier of the offending track.
        track_id: usize,
        /// Description of the failure.
        reason: String,
    },
}
