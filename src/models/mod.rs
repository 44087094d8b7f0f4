//! Log-linear model definitions.
//!
//! Models are plain data (`ModelKind` + factor levels) expanded into
//! design columns by pure functions, so fitting and prediction stay generic.

pub mod model;

pub use model::*;
