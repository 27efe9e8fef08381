#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

mod error;
pub use error::LinalgError;

/// Closed form inversion of 3x3 matrices.
pub mod inverse;

/// Similarity alignment between point sets (Umeyama).
pub mod rigid;

/// Dense linear system solver.
pub mod solve;

pub use inverse::invert3x3;
pub use rigid::{umeyama, Similarity};
pub use solve::solve_linear_system;
