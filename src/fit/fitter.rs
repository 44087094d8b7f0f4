//! Fit one rung of the model ladder.
//!
//! Given:
//! - training rows (covariates + log-rate)
//! - factor levels (reference country first)
//! - a `ModelKind`
//!
//! we build the design matrix, refuse designs that cannot be identified, solve
//! the OLS problem and attach the statistics the comparison step needs.

use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, StudentsT};
use tracing::{debug, warn};

use crate::domain::{Covariates, ModelKind};
use crate::error::PipelineError;
use crate::fit::compare::{aic, bic, gaussian_log_likelihood};
use crate::math::{OlsError, solve_least_squares};
use crate::models::{Column, FactorLevels, design_columns, fill_design_row, linear_predictor};
use crate::prep::TrainingRow;

/// One estimated coefficient with its R-style summary statistics.
#[derive(Debug, Clone, Serialize)]
pub struct Coefficient {
    pub column: Column,
    pub name: String,
    pub estimate: f64,
    pub std_error: f64,
    pub t_value: f64,
    /// Two-sided p-value of `estimate = 0`.
    pub p_value: f64,
}

/// A fitted model.
#[derive(Debug, Clone, Serialize)]
pub struct FittedModel {
    pub kind: ModelKind,
    /// Country levels the design was built with, reference first.
    pub countries: Vec<String>,
    pub coefficients: Vec<Coefficient>,
    pub rss: f64,
    pub n: usize,
    pub df_resid: usize,
    pub log_likelihood: f64,
    pub aic: f64,
    pub bic: f64,
}

impl FittedModel {
    pub fn reference(&self) -> &str {
        &self.countries[0]
    }

    pub fn columns(&self) -> Vec<Column> {
        self.coefficients.iter().map(|c| c.column.clone()).collect()
    }

    pub fn beta(&self) -> Vec<f64> {
        self.coefficients.iter().map(|c| c.estimate).collect()
    }

    /// Estimate for a column, if the model has it.
    pub fn coefficient(&self, column: &Column) -> Option<f64> {
        self.coefficients
            .iter()
            .find(|c| c.column == *column)
            .map(|c| c.estimate)
    }

    /// Predicted log-rate for a covariate row.
    pub fn predict(&self, covariates: &Covariates) -> f64 {
        linear_predictor(&self.columns(), &self.beta(), covariates)
    }

    /// Parameters counted by the information criteria: coefficients plus the
    /// residual variance.
    pub fn param_count(&self) -> usize {
        self.coefficients.len() + 1
    }
}

/// Fit a single model.
pub fn fit_model(
    kind: ModelKind,
    rows: &[TrainingRow],
    levels: &FactorLevels,
) -> Result<FittedModel, PipelineError> {
    if rows.is_empty() {
        return Err(PipelineError::InsufficientData(format!(
            "{kind}: no training rows"
        )));
    }
    if let Some(row) = rows
        .iter()
        .find(|r| !levels.countries.contains(&r.covariates.code))
    {
        return Err(PipelineError::Configuration(format!(
            "training row for {} is not among the modelled countries",
            row.covariates.code
        )));
    }

    let columns = design_columns(kind, levels);
    let n = rows.len();
    let p = columns.len();

    let mut x = DMatrix::<f64>::zeros(n, p);
    let mut y = DVector::<f64>::zeros(n);
    let mut row = vec![0.0; p];
    for (i, r) in rows.iter().enumerate() {
        fill_design_row(&columns, &r.covariates, &mut row);
        for (j, v) in row.iter().enumerate() {
            x[(i, j)] = *v;
        }
        y[i] = r.log_rate;
    }

    // An all-zero indicator column means an empty category (or no
    // post-threshold cohorts); report it by name rather than as a rank number.
    for (j, column) in columns.iter().enumerate() {
        if column.is_categorical() && x.column(j).iter().all(|v| *v == 0.0) {
            return Err(PipelineError::InsufficientData(format!(
                "{kind}: column {column} has no observations"
            )));
        }
    }

    let sol = solve_least_squares(&x, &y)
        .map_err(|e: OlsError| PipelineError::InsufficientData(format!("{kind}: {e}")))?;

    let t_dist = StudentsT::new(0.0, 1.0, sol.df_resid as f64)
        .map_err(|e| PipelineError::InsufficientData(format!("{kind}: {e}")))?;

    let coefficients = columns
        .into_iter()
        .zip(sol.beta.iter().zip(&sol.std_errors))
        .map(|(column, (&estimate, &std_error))| {
            let t_value = if std_error > 0.0 {
                estimate / std_error
            } else {
                f64::INFINITY
            };
            let p_value = if t_value.is_finite() {
                2.0 * t_dist.sf(t_value.abs())
            } else {
                0.0
            };
            Coefficient {
                name: column.to_string(),
                column,
                estimate,
                std_error,
                t_value,
                p_value,
            }
        })
        .collect::<Vec<_>>();

    let log_likelihood = gaussian_log_likelihood(sol.rss, sol.n);
    let k = coefficients.len() + 1;
    let fitted = FittedModel {
        kind,
        countries: levels.countries.clone(),
        coefficients,
        rss: sol.rss,
        n: sol.n,
        df_resid: sol.df_resid,
        log_likelihood,
        aic: aic(log_likelihood, k),
        bic: bic(log_likelihood, k, sol.n),
    };

    debug!(
        model = %kind,
        n = fitted.n,
        p = k - 1,
        rss = fitted.rss,
        aic = fitted.aic,
        bic = fitted.bic,
        "fitted model"
    );

    Ok(fitted)
}

/// A model left out because the training table cannot identify it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExcludedModel {
    pub kind: ModelKind,
    pub reason: String,
}

/// Outcome of fitting a set of models on one training table.
#[derive(Debug, Clone)]
pub struct LadderFit {
    pub fits: Vec<FittedModel>,
    pub excluded: Vec<ExcludedModel>,
}

/// Fit several models on the same training table, in order.
///
/// A model whose design is not identifiable (`InsufficientData`) is recorded
/// in `excluded` and the rest are still fitted. Any other error aborts.
pub fn fit_ladder(
    kinds: &[ModelKind],
    rows: &[TrainingRow],
    levels: &FactorLevels,
) -> Result<LadderFit, PipelineError> {
    let mut fits = Vec::with_capacity(kinds.len());
    let mut excluded = Vec::new();
    for &kind in kinds {
        match fit_model(kind, rows, levels) {
            Ok(fit) => fits.push(fit),
            Err(PipelineError::InsufficientData(reason)) => {
                warn!(model = %kind, %reason, "model excluded");
                excluded.push(ExcludedModel { kind, reason });
            }
            Err(e) => return Err(e),
        }
    }
    Ok(LadderFit { fits, excluded })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CovariateScheme, Sex};
    use crate::prep::derive;

    const SCHEME: CovariateScheme = CovariateScheme {
        origin_year: 2000,
        threshold_year: 2003,
    };

    /// 2 countries x 2 sexes x 5 cohorts with fixed integer deaths/exposures.
    fn tiny_rows() -> Vec<TrainingRow> {
        let deaths = [
            [30, 28, 27, 29, 25],
            [36, 35, 31, 33, 32],
            [22, 21, 20, 22, 19],
            [27, 26, 24, 25, 24],
        ];
        let cells = [
            ("SWE", Sex::Female),
            ("SWE", Sex::Male),
            ("NOR", Sex::Female),
            ("NOR", Sex::Male),
        ];
        let mut rows = Vec::new();
        for (cell, (code, sex)) in cells.iter().enumerate() {
            for (i, d) in deaths[cell].iter().enumerate() {
                let cohort = 2000 + i as i32;
                let exposures = 10_000.0 + 100.0 * i as f64;
                rows.push(TrainingRow {
                    covariates: derive(code, *sex, cohort, &SCHEME),
                    log_rate: (*d as f64 / exposures).ln(),
                });
            }
        }
        rows
    }

    fn levels() -> FactorLevels {
        FactorLevels::new("SWE", &["SWE".to_string(), "NOR".to_string()])
    }

    #[test]
    fn time_only_slope_matches_closed_form() {
        let rows = tiny_rows();
        let fit = fit_model(ModelKind::M1, &rows, &levels()).unwrap();

        let n = rows.len() as f64;
        let tbar = rows.iter().map(|r| r.covariates.time).sum::<f64>() / n;
        let ybar = rows.iter().map(|r| r.log_rate).sum::<f64>() / n;
        let sxy: f64 = rows
            .iter()
            .map(|r| (r.covariates.time - tbar) * (r.log_rate - ybar))
            .sum();
        let sxx: f64 = rows
            .iter()
            .map(|r| (r.covariates.time - tbar).powi(2))
            .sum();
        let slope = sxy / sxx;
        let intercept = ybar - slope * tbar;

        assert!((fit.coefficient(&Column::Time).unwrap() - slope).abs() < 1e-6);
        assert!((fit.coefficient(&Column::Intercept).unwrap() - intercept).abs() < 1e-6);
        assert_eq!(fit.df_resid, 18);
    }

    #[test]
    fn nested_models_never_increase_rss() {
        let rows = tiny_rows();
        let ladder = fit_ladder(&ModelKind::ALL, &rows, &levels()).unwrap();
        assert!(ladder.excluded.is_empty());
        let fits = ladder.fits;
        let rss = |k: ModelKind| fits.iter().find(|f| f.kind == k).unwrap().rss;
        for (base, extended) in [
            (ModelKind::M1, ModelKind::M2),
            (ModelKind::M2, ModelKind::M3),
            (ModelKind::M3, ModelKind::M4),
            (ModelKind::M4, ModelKind::M5),
            (ModelKind::M4, ModelKind::M6),
        ] {
            assert!(
                rss(extended) <= rss(base) + 1e-12,
                "{extended} rss {} > {base} rss {}",
                rss(extended),
                rss(base)
            );
        }
    }

    #[test]
    fn empty_country_is_insufficient_data() {
        let rows: Vec<TrainingRow> = tiny_rows()
            .into_iter()
            .filter(|r| r.covariates.code == "SWE")
            .collect();
        let err = fit_model(ModelKind::M3, &rows, &levels()).unwrap_err();
        match err {
            PipelineError::InsufficientData(msg) => assert!(msg.contains("codeNOR"), "{msg}"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn no_post_threshold_cohorts_is_insufficient_data() {
        let rows: Vec<TrainingRow> = tiny_rows()
            .into_iter()
            .filter(|r| r.covariates.post == 0.0)
            .collect();
        assert!(matches!(
            fit_model(ModelKind::M4, &rows, &levels()),
            Err(PipelineError::InsufficientData(_))
        ));
    }

    #[test]
    fn ladder_keeps_fitting_past_unidentifiable_models() {
        let rows: Vec<TrainingRow> = tiny_rows()
            .into_iter()
            .filter(|r| r.covariates.post == 0.0)
            .collect();
        let ladder = fit_ladder(&ModelKind::ALL, &rows, &levels()).unwrap();
        let fitted: Vec<ModelKind> = ladder.fits.iter().map(|f| f.kind).collect();
        let excluded: Vec<ModelKind> = ladder.excluded.iter().map(|e| e.kind).collect();
        assert_eq!(fitted, [ModelKind::M1, ModelKind::M2, ModelKind::M3]);
        assert_eq!(excluded, [ModelKind::M4, ModelKind::M5, ModelKind::M6]);
        assert!(ladder.excluded[0].reason.contains("post"), "{}", ladder.excluded[0].reason);
    }

    #[test]
    fn fitted_model_predicts_its_own_training_rows() {
        let rows = tiny_rows();
        let fit = fit_model(ModelKind::M3, &rows, &levels()).unwrap();
        let rss: f64 = rows
            .iter()
            .map(|r| (r.log_rate - fit.predict(&r.covariates)).powi(2))
            .sum();
        assert!((rss - fit.rss).abs() < 1e-10);
    }
}
