//! Derived regressors.
//!
//! `derive` is the only place that turns a cohort year into `time`, `post`
//! and `yst`. Training rows and prediction grid rows both go through it, so
//! the two can never drift apart.

use crate::domain::{CovariateScheme, Covariates, RateRecord, Sex};
use crate::error::PipelineError;
use crate::prep::rates::log_rate;

/// Covariates of one `(country, cohort, sex)` cell.
pub fn derive(code: &str, sex: Sex, cohort: i32, scheme: &CovariateScheme) -> Covariates {
    let since_threshold = cohort - scheme.threshold_year;
    Covariates {
        code: code.to_string(),
        cohort,
        sex,
        time: f64::from(cohort - scheme.origin_year),
        post: if since_threshold >= 0 { 1.0 } else { 0.0 },
        yst: f64::from(since_threshold.max(0)),
    }
}

/// One regression observation: covariates plus the log-rate response.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingRow {
    pub covariates: Covariates,
    pub log_rate: f64,
}

/// Build the training table from rate records.
///
/// Fails on the first record whose rate has no logarithm.
pub fn training_rows(
    rates: &[RateRecord],
    scheme: &CovariateScheme,
) -> Result<Vec<TrainingRow>, PipelineError> {
    rates
        .iter()
        .map(|r| {
            Ok(TrainingRow {
                covariates: derive(&r.key.code, r.key.sex, r.key.cohort, scheme),
                log_rate: log_rate(&r.key, r.rate)?,
            })
        })
        .collect()
}
