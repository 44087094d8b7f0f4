//! Data preparation: Lexis triangles -> cohort records -> rates -> covariates.
//!
//! Every function here is a pure transformation from one immutable record
//! collection to a new one. Failures carry the offending record key.

pub mod aggregate;
pub mod covariates;
pub mod rates;

pub use aggregate::*;
pub use covariates::*;
pub use rates::*;
