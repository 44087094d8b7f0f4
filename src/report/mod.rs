//! Reporting utilities: prediction residuals and formatted terminal output.

pub mod format;

pub use format::*;

use crate::fit::PredictedVsObserved;

/// Log-scale agreement between grid predictions and observed rates.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidualSummary {
    /// Grid cells with a positive observed rate.
    pub n_observed: usize,
    pub rmse_log: f64,
    pub max_abs_log: f64,
    /// Cell with the largest absolute log residual, `code/cohort/sex`.
    pub worst: Option<String>,
}

/// Summarize `log(observed) - log(predicted)` over cells that have observations.
///
/// Zero observed rates have no log and are skipped.
pub fn residual_summary(rows: &[PredictedVsObserved]) -> ResidualSummary {
    let mut n = 0usize;
    let mut ss = 0.0;
    let mut max_abs = 0.0;
    let mut worst = None;
    for r in rows {
        let Some(obs) = r.observed_rate.filter(|v| *v > 0.0) else {
            continue;
        };
        let resid = obs.ln() - r.prediction.log_rate;
        n += 1;
        ss += resid * resid;
        if resid.abs() > max_abs {
            max_abs = resid.abs();
            worst = Some(r.key.to_string());
        }
    }
    ResidualSummary {
        n_observed: n,
        rmse_log: if n > 0 { (ss / n as f64).sqrt() } else { f64::NAN },
        max_abs_log: max_abs,
        worst,
    }
}
