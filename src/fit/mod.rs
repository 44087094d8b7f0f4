//! Model fitting orchestration.
//!
//! Responsibilities:
//!
//! - fit the six models on one training table (`fitter`)
//! - compare them by nested F-tests, AIC and BIC (`compare`)
//! - turn coefficients into rate ratios (`effects`)
//! - predict over a covariate grid and join observations (`predict`)

pub mod compare;
pub mod effects;
pub mod fitter;
pub mod predict;

pub use compare::*;
pub use effects::*;
pub use fitter::*;
pub use predict::*;
