//! Model comparison: nested F-tests and information criteria.
//!
//! For every fitted model we compute:
//! - Gaussian log-likelihood `ll = -n/2 · (ln 2π + ln(RSS/n) + 1)`
//! - AIC = -2·ll + 2·k
//! - BIC = -2·ll + k·ln(n)
//!
//! with `k` = coefficients + 1 (the residual variance).
//!
//! For nested pairs we run the classic extra-sum-of-squares F-test.
//!
//! Selection is not automated: we report the best model under
//! each criterion, every model within a near-tie margin of it, and whether the
//! two criteria agree. The caller picks the model used downstream.

use serde::Serialize;
use statrs::distribution::{ContinuousCDF, FisherSnedecor};

use crate::domain::ModelKind;
use crate::error::PipelineError;
use crate::fit::fitter::{ExcludedModel, FittedModel};
use crate::models::{nests, term_groups};

/// Linear penalty per parameter in AIC.
const AIC_PENALTY: f64 = 2.0;

/// Floor for `RSS/n` so a perfect fit does not produce `ln(0)`.
const MIN_VARIANCE: f64 = 1e-300;

pub fn gaussian_log_likelihood(rss: f64, n: usize) -> f64 {
    let n_f = n as f64;
    let sigma2 = (rss / n_f).max(MIN_VARIANCE);
    -0.5 * n_f * ((2.0 * std::f64::consts::PI).ln() + sigma2.ln() + 1.0)
}

pub fn aic(log_likelihood: f64, k: usize) -> f64 {
    -2.0 * log_likelihood + AIC_PENALTY * k as f64
}

pub fn bic(log_likelihood: f64, k: usize, n: usize) -> f64 {
    -2.0 * log_likelihood + k as f64 * (n as f64).ln()
}

/// Extra-sum-of-squares F-test between two nested models.
#[derive(Debug, Clone, Serialize)]
pub struct NestedTest {
    pub base: ModelKind,
    pub extended: ModelKind,
    pub rss_base: f64,
    pub rss_extended: f64,
    /// Numerator degrees of freedom (extra coefficients).
    pub df_num: usize,
    /// Denominator degrees of freedom (residual df of the extended model).
    pub df_den: usize,
    pub f_statistic: f64,
    pub p_value: f64,
    pub significant: bool,
}

pub fn f_test(
    base: &FittedModel,
    extended: &FittedModel,
    alpha: f64,
) -> Result<NestedTest, PipelineError> {
    if !nests(base.kind, extended.kind)
        || base.n != extended.n
        || extended.df_resid >= base.df_resid
    {
        return Err(PipelineError::NotNested {
            base: base.kind.to_string(),
            extended: extended.kind.to_string(),
        });
    }

    let df_num = base.df_resid - extended.df_resid;
    let df_den = extended.df_resid;
    let gain = (base.rss - extended.rss).max(0.0);

    let (f_statistic, p_value) = if extended.rss <= 0.0 {
        if gain > 0.0 {
            (f64::INFINITY, 0.0)
        } else {
            (0.0, 1.0)
        }
    } else {
        let f = (gain / df_num as f64) / (extended.rss / df_den as f64);
        let dist = FisherSnedecor::new(df_num as f64, df_den as f64)
            .map_err(|e| PipelineError::InsufficientData(format!("F distribution: {e}")))?;
        (f, dist.sf(f))
    };

    Ok(NestedTest {
        base: base.kind,
        extended: extended.kind,
        rss_base: base.rss,
        rss_extended: extended.rss,
        df_num,
        df_den,
        f_statistic,
        p_value,
        significant: p_value < alpha,
    })
}

/// Penalized-fit scores of one model.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreRow {
    pub kind: ModelKind,
    pub k: usize,
    pub n: usize,
    pub log_likelihood: f64,
    pub aic: f64,
    pub delta_aic: f64,
    pub bic: f64,
    pub delta_bic: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    Aic,
    Bic,
}

/// Outcome under one criterion. Near ties are listed, never resolved.
#[derive(Debug, Clone, Serialize)]
pub struct Verdict {
    pub criterion: Criterion,
    pub best: ModelKind,
    /// Other models within the near-tie margin of `best`.
    pub near_ties: Vec<ModelKind>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Comparison {
    pub scores: Vec<ScoreRow>,
    pub tests: Vec<NestedTest>,
    pub aic: Verdict,
    pub bic: Verdict,
    /// Whether both criteria prefer the same model.
    pub criteria_agree: bool,
    /// Models that could not be fitted; they have no scores and no tests.
    pub excluded: Vec<ExcludedModel>,
}

impl Comparison {
    /// Attach the models the ladder had to leave out.
    pub fn with_excluded(mut self, excluded: Vec<ExcludedModel>) -> Self {
        self.excluded = excluded;
        self
    }

    /// Models a human has to choose between: every best or near-tied model.
    pub fn candidates(&self) -> Vec<ModelKind> {
        let mut out: Vec<ModelKind> = [self.aic.best, self.bic.best]
            .into_iter()
            .chain(self.aic.near_ties.iter().copied())
            .chain(self.bic.near_ties.iter().copied())
            .collect();
        out.sort();
        out.dedup();
        out
    }
}

/// Each fitted model paired with the fitted model one step below it on the
/// ladder (m5 and m6 both extend m4).
pub fn ladder_pairs(kinds: &[ModelKind]) -> Vec<(ModelKind, ModelKind)> {
    let mut pairs = Vec::new();
    for &extended in kinds {
        let depth = term_groups(extended).len();
        if let Some(&base) = kinds
            .iter()
            .find(|&&b| nests(b, extended) && term_groups(b).len() + 1 == depth)
        {
            pairs.push((base, extended));
        }
    }
    pairs
}

/// Score every fitted model and test each successive nested pair.
pub fn compare_models(
    fits: &[FittedModel],
    alpha: f64,
    near_tie: f64,
) -> Result<Comparison, PipelineError> {
    let Some(first) = fits.first() else {
        return Err(PipelineError::InsufficientData(
            "no fitted models to compare".to_string(),
        ));
    };
    if fits.iter().any(|f| f.n != first.n) {
        return Err(PipelineError::InsufficientData(
            "models were fitted on different samples".to_string(),
        ));
    }

    let min_aic = fits.iter().map(|f| f.aic).fold(f64::INFINITY, f64::min);
    let min_bic = fits.iter().map(|f| f.bic).fold(f64::INFINITY, f64::min);

    let scores: Vec<ScoreRow> = fits
        .iter()
        .map(|f| ScoreRow {
            kind: f.kind,
            k: f.param_count(),
            n: f.n,
            log_likelihood: f.log_likelihood,
            aic: f.aic,
            delta_aic: f.aic - min_aic,
            bic: f.bic,
            delta_bic: f.bic - min_bic,
        })
        .collect();

    let kinds: Vec<ModelKind> = fits.iter().map(|f| f.kind).collect();
    let mut tests = Vec::new();
    for (base, extended) in ladder_pairs(&kinds) {
        let b = fits.iter().find(|f| f.kind == base);
        let e = fits.iter().find(|f| f.kind == extended);
        if let (Some(b), Some(e)) = (b, e) {
            tests.push(f_test(b, e, alpha)?);
        }
    }

    let aic = verdict(Criterion::Aic, &scores, |s| s.delta_aic, near_tie);
    let bic = verdict(Criterion::Bic, &scores, |s| s.delta_bic, near_tie);
    let criteria_agree = aic.best == bic.best;

    Ok(Comparison {
        scores,
        tests,
        aic,
        bic,
        criteria_agree,
        excluded: Vec::new(),
    })
}

fn verdict(
    criterion: Criterion,
    scores: &[ScoreRow],
    delta: impl Fn(&ScoreRow) -> f64,
    near_tie: f64,
) -> Verdict {
    // Exact ties keep ladder order; they also show up in `near_ties`.
    let mut best = &scores[0];
    for s in &scores[1..] {
        if delta(s) < delta(best) {
            best = s;
        }
    }
    let near_ties = scores
        .iter()
        .filter(|s| s.kind != best.kind && delta(s) < near_tie)
        .map(|s| s.kind)
        .collect();
    Verdict {
        criterion,
        best: best.kind,
        near_ties,
    }
}
