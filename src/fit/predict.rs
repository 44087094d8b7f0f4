//! Prediction over a synthetic covariate grid, joined with observations.
//!
//! Grid rows are derived with `prep::derive`, the same function that builds
//! training rows, so a cohort gets identical `time`/`post`/`yst` values in
//! both places.

use std::collections::HashMap;

use serde::Serialize;

use crate::domain::{CovariateScheme, Covariates, RateRecord, RecordKey, Sex};
use crate::fit::fitter::FittedModel;
use crate::prep::derive;

/// Cartesian product of countries, modelled sexes and cohorts `from..=to`.
///
/// Rows are ordered by country, then sex, then cohort.
pub fn build_grid(
    countries: &[String],
    from: i32,
    to: i32,
    scheme: &CovariateScheme,
) -> Vec<Covariates> {
    let mut grid = Vec::new();
    for code in countries {
        for sex in Sex::MODELLED {
            for cohort in from..=to {
                grid.push(derive(code, sex, cohort, scheme));
            }
        }
    }
    grid
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionRecord {
    pub covariates: Covariates,
    pub log_rate: f64,
    pub rate: f64,
}

pub fn predict_grid(fit: &FittedModel, grid: &[Covariates]) -> Vec<PredictionRecord> {
    let columns = fit.columns();
    let beta = fit.beta();
    grid.iter()
        .map(|c| {
            let log_rate = crate::models::linear_predictor(&columns, &beta, c);
            PredictionRecord {
                covariates: c.clone(),
                log_rate,
                rate: log_rate.exp(),
            }
        })
        .collect()
}

/// A grid prediction next to the observed rate of the same cell, if any.
#[derive(Debug, Clone, Serialize)]
pub struct PredictedVsObserved {
    pub key: RecordKey,
    pub prediction: PredictionRecord,
    pub observed_rate: Option<f64>,
}

/// Left join of predictions with observed rates on `(code, cohort, sex)`.
pub fn join_observed(
    predictions: &[PredictionRecord],
    observed: &[RateRecord],
) -> Vec<PredictedVsObserved> {
    let by_key: HashMap<&RecordKey, f64> = observed.iter().map(|r| (&r.key, r.rate)).collect();
    predictions
        .iter()
        .map(|p| {
            let key = RecordKey::new(p.covariates.code.clone(), p.covariates.cohort, p.covariates.sex);
            let observed_rate = by_key.get(&key).copied();
            PredictedVsObserved {
                key,
                prediction: p.clone(),
                observed_rate,
            }
        })
        .collect()
}
