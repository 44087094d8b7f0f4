//! Numerical building blocks: least squares via SVD.

pub mod ols;

pub use ols::*;
