//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the math/fitting code stays clean and testable
//! - output changes are localized

use crate::domain::AnalysisConfig;
use crate::fit::{Comparison, Effect, EffectKind, FittedModel, effects_of, has_country_specific_post};
use crate::io::SnapshotStats;
use crate::report::ResidualSummary;

/// Dataset section: what was loaded and what survived preparation.
pub fn format_data_summary(stats: &SnapshotStats, n_training: usize, config: &AnalysisConfig) -> String {
    let mut out = String::new();
    out.push_str("=== imr - infant mortality model ladder ===\n");
    out.push_str(&format!(
        "Snapshot: rows={} | countries={} | cohorts=[{}, {}]\n",
        stats.rows,
        stats.countries.len(),
        stats.cohort_min,
        stats.cohort_max
    ));
    out.push_str(&format!(
        "Modelled: n={} | cohorts >= {} | threshold={} | reference={}\n",
        n_training, config.start_year, config.threshold_year, config.reference
    ));
    let absent: Vec<&str> = config
        .countries
        .iter()
        .filter(|c| !stats.countries.contains(*c))
        .map(String::as_str)
        .collect();
    if !absent.is_empty() {
        out.push_str(&format!("Not in snapshot: {}\n", absent.join(", ")));
    }
    out
}

/// Scores, nested tests and per-criterion verdicts.
pub fn format_comparison(comparison: &Comparison, alpha: f64) -> String {
    let mut out = String::new();

    out.push_str("\nModels:\n");
    out.push_str(&format!(
        "  {:<4} {:>4} {:>12} {:>12} {:>9} {:>12} {:>9}\n",
        "id", "k", "logLik", "AIC", "dAIC", "BIC", "dBIC"
    ));
    for s in &comparison.scores {
        let aic_mark = if s.kind == comparison.aic.best { "*" } else { " " };
        let bic_mark = if s.kind == comparison.bic.best { "*" } else { " " };
        out.push_str(&format!(
            "  {:<4} {:>4} {:>12.3} {:>12.3} {:>8.3}{aic_mark} {:>12.3} {:>8.3}{bic_mark}\n",
            s.kind.id(),
            s.k,
            s.log_likelihood,
            s.aic,
            s.delta_aic,
            s.bic,
            s.delta_bic,
        ));
    }

    if !comparison.excluded.is_empty() {
        out.push_str("\nExcluded (not identifiable on this data):\n");
        for e in &comparison.excluded {
            out.push_str(&format!("  {:<4} {}\n", e.kind.id(), e.reason));
        }
    }

    if !comparison.tests.is_empty() {
        out.push_str(&format!("\nNested F-tests (alpha={alpha}):\n"));
        for t in &comparison.tests {
            out.push_str(&format!(
                "  {} -> {}  F({}, {}) = {:>9.3}  p = {:.4e}{}\n",
                t.base.id(),
                t.extended.id(),
                t.df_num,
                t.df_den,
                t.f_statistic,
                t.p_value,
                if t.significant { "  *" } else { "" }
            ));
        }
    }

    out.push_str("\nPreferred:\n");
    for v in [&comparison.aic, &comparison.bic] {
        let label = match v.criterion {
            crate::fit::Criterion::Aic => "AIC",
            crate::fit::Criterion::Bic => "BIC",
        };
        let ties = if v.near_ties.is_empty() {
            String::new()
        } else {
            let ids: Vec<&str> = v.near_ties.iter().map(|k| k.id()).collect();
            format!(" (near ties: {})", ids.join(", "))
        };
        out.push_str(&format!("  {label}: {}{ties}\n", v.best.id()));
    }
    if comparison.criteria_agree && comparison.candidates().len() == 1 {
        out.push_str("  Both criteria agree.\n");
    } else {
        let ids: Vec<&str> = comparison.candidates().iter().map(|k| k.id()).collect();
        out.push_str(&format!(
            "  Undecided between {}; pick one with --model.\n",
            ids.join(", ")
        ));
    }

    out
}

/// R-style coefficient table.
pub fn format_coefficients(fit: &FittedModel) -> String {
    let mut out = String::new();
    out.push_str(&format!("\nCoefficients of {} ({}):\n", fit.kind.id(), fit.kind.formula()));
    out.push_str(&format!(
        "  {:<18} {:>11} {:>10} {:>8} {:>10}\n",
        "term", "estimate", "std.err", "t", "p"
    ));
    for c in &fit.coefficients {
        out.push_str(&format!(
            "  {:<18} {:>11.5} {:>10.5} {:>8.2} {:>10.3e}\n",
            c.name, c.estimate, c.std_error, c.t_value, c.p_value
        ));
    }
    out.push_str(&format!(
        "  n={} | df={} | RSS={:.5}\n",
        fit.n, fit.df_resid, fit.rss
    ));
    out
}

/// Rate ratios grouped by effect kind.
pub fn format_effects(fit: &FittedModel, effects: &[Effect]) -> String {
    let mut out = String::new();
    if effects.is_empty() {
        out.push_str(&format!("\n{} has no categorical effects.\n", fit.kind.id()));
        return out;
    }

    let sections = [
        (EffectKind::Sex, "Sex (vs female)".to_string()),
        (EffectKind::Country, format!("Country (vs {})", fit.reference())),
        (
            EffectKind::PostThreshold,
            if has_country_specific_post(fit.kind) {
                "Post-threshold shift by country".to_string()
            } else {
                "Post-threshold shift (common)".to_string()
            },
        ),
        (EffectKind::PostTrend, "Post-threshold yearly change".to_string()),
    ];

    for (kind, title) in sections {
        let rows = effects_of(effects, kind);
        if rows.is_empty() {
            continue;
        }
        out.push_str(&format!("\n{title}:\n"));
        for e in rows {
            let marker = if e.is_reference { " (ref)" } else { "" };
            out.push_str(&format!(
                "  {:<10} x{:.4}  ({:+.2}%){marker}\n",
                e.label,
                e.multiplier,
                (e.multiplier - 1.0) * 100.0
            ));
        }
    }
    out
}

/// One-line fit quality of grid predictions against observations.
pub fn format_residual_summary(summary: &ResidualSummary) -> String {
    match &summary.worst {
        Some(worst) => format!(
            "\nObserved cells: {} | RMSE(log)={:.4} | max |resid|={:.4} at {}\n",
            summary.n_observed, summary.rmse_log, summary.max_abs_log, worst
        ),
        None => format!("\nObserved cells: {}\n", summary.n_observed),
    }
}
