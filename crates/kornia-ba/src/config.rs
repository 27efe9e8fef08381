use serde::{Deserialize, Serialize};

/// Component of frame 1's camera center fixed to the unity value by gauge normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnityAxis {
    /// The x component.
    X,
    /// The y component.
    Y,
}

impl UnityAxis {
    /// Index of the component in a 3-vector.
    pub fn index(&self) -> usize {
        match self {
            UnityAxis::X => 0,
            UnityAxis::Y => 1,
        }
    }
}

/// Tolerances used to compare analytic and finite difference derivatives.
///
/// Two values `a` and `b` agree when `|a - b| <= absolute + relative * |b|`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivativeTolerance {
    /// Relative tolerance.
    pub relative: f64,
    /// Absolute tolerance.
    pub absolute: f64,
}

impl Default for DerivativeTolerance {
    fn default() -> Self {
        Self {
            relative: 0.1,
            absolute: 0.1,
        }
    }
}

impl DerivativeTolerance {
    /// Whether the analytic value agrees with the numeric estimate.
    pub fn is_close(&self, analytic: f64, numeric: f64) -> bool {
        (analytic - numeric).abs() <= self.absolute + self.relative * numeric.abs()
    }
}

/// Parameters controlling the bundle adjustment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleAdjustmentConfig {
    /// The optimization converges when an accepted step changes the total error by less than this.
    pub min_error_change: f64,
    /// Component of frame 1's camera center fixed by gauge normalization.
    pub unity_axis: UnityAxis,
    /// Value of frame 1's camera center along `unity_axis` after normalization.
    pub unity_value: f64,
    /// Initial damping factor (lambda).
    pub initial_lambda: f64,
    /// Multiplier applied to lambda after a rejected step, divisor after an accepted one.
    pub lambda_factor: f64,
    /// The search for an improving step is abandoned after a rejected trial above this lambda.
    pub max_lambda: f64,
    /// Maximum number of accepted outer iterations.
    pub max_iterations: usize,
    /// Verify the analytic derivatives with finite differences every iteration.
    pub check_derivatives: bool,
    /// Step of the central finite differences.
    pub finite_diff_step: f64,
    /// Tolerances of the derivative check.
    pub derivative_tolerance: DerivativeTolerance,
}

impl Default for BundleAdjustmentConfig {
    fn default() -> Self {
        Self {
            min_error_change: 1e-3,
            unity_axis: UnityAxis::Y,
            unity_value: 1.0,
            initial_lambda: 1e-4,
            lambda_factor: 10.0,
            max_lambda: 1e6,
            max_iterations: 500,
            check_derivatives: false,
            finite_diff_step: 1e-5,
            derivative_tolerance: DerivativeTolerance::default(),
        }
    }
}

impl BundleAdjustmentConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the convergence threshold on the error change.
    pub fn with_min_error_change(mut self, min_error_change: f64) -> Self {
        self.min_error_change = min_error_change;
        self
    }

    /// Set the gauge unity axis and value.
    pub fn with_unity(mut self, axis: UnityAxis, value: f64) -> Self {
        self.unity_axis = axis;
        self.unity_value = value;
        self
    }

    /// Set initial lambda.
    pub fn with_initial_lambda(mut self, lambda: f64) -> Self {
        self.initial_lambda = lambda;
        self
    }

    /// Set maximum lambda.
    pub fn with_max_lambda(mut self, lambda: f64) -> Self {
        self.max_lambda = lambda;
        self
    }

    /// Set maximum iterations.
    pub fn with_max_iterations(mut self, max_iters: usize) -> Self {
        self.max_iterations = max_iters;
        self
    }

    /// Enable or disable the finite difference derivative check.
    pub fn with_check_derivatives(mut self, check: bool) -> Self {
        self.check_derivatives = check;
        self
    }
}
