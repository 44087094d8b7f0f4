//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - Lexis record types (`ObservationRecord`, `AggregatedRecord`, `RateRecord`)
//! - the covariate row shared by fitting and prediction (`Covariates`)
//! - the six models (`ModelKind`) and run configuration (`AnalysisConfig`)

pub mod types;

pub use types::*;
