//! Coefficients as multiplicative effects (rate ratios).
//!
//! On the log-rate scale a coefficient `b` is a rate ratio `exp(b)` relative
//! to the reference category.
//!
//! With the `post:code` interaction (m5) the post-threshold effect of a
//! country is the sum of the common `post` coefficient (which *is* the
//! reference country's effect) and the country's own interaction term:
//!
//! ```text
//! effect(reference) = exp(post)
//! effect(X)         = exp(post:codeX + post)
//! ```
//!
//! That rule lives in `post_threshold_effect` and nowhere else.

use serde::Serialize;

use crate::domain::{ModelKind, Sex};
use crate::fit::fitter::FittedModel;
use crate::models::{Column, TermGroup, term_groups};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    /// Sex rate ratio relative to females.
    Sex,
    /// Country rate ratio relative to the reference country.
    Country,
    /// Level shift from the threshold cohort onward.
    PostThreshold,
    /// Yearly multiplicative change after the threshold.
    PostTrend,
}

#[derive(Debug, Clone, Serialize)]
pub struct Effect {
    pub kind: EffectKind,
    /// Category label (`male`, `NOR`, ...).
    pub label: String,
    pub is_reference: bool,
    /// Log-scale value that was exponentiated.
    pub log_effect: f64,
    pub multiplier: f64,
}

/// Rate ratio of a log-scale coefficient.
pub fn multiplicative_effect(coefficient: f64) -> f64 {
    coefficient.exp()
}

/// Post-threshold rate ratio of one country under the `post:code` interaction.
///
/// `reference_post` is the `post` coefficient; `interaction` is the country's
/// `post:code<X>` coefficient, `None` for the reference country itself.
pub fn post_threshold_effect(reference_post: f64, interaction: Option<f64>) -> f64 {
    match interaction {
        Some(own) => multiplicative_effect(own + reference_post),
        None => multiplicative_effect(reference_post),
    }
}

/// All sex and country effects a fitted model supports.
pub fn interpret(fit: &FittedModel) -> Vec<Effect> {
    let groups = term_groups(fit.kind);
    let reference = fit.reference();
    let mut out = Vec::new();

    if groups.contains(&TermGroup::Sex) {
        for sex in Sex::MODELLED {
            let is_reference = sex == Sex::MODELLED[0];
            let log_effect = if is_reference {
                0.0
            } else {
                fit.coefficient(&Column::Sex(sex)).unwrap_or(0.0)
            };
            out.push(Effect {
                kind: EffectKind::Sex,
                label: sex.to_string(),
                is_reference,
                log_effect,
                multiplier: multiplicative_effect(log_effect),
            });
        }
    }

    if groups.contains(&TermGroup::Country) {
        for code in &fit.countries {
            let is_reference = code == reference;
            let log_effect = if is_reference {
                0.0
            } else {
                fit.coefficient(&Column::Country(code.clone())).unwrap_or(0.0)
            };
            out.push(Effect {
                kind: EffectKind::Country,
                label: code.clone(),
                is_reference,
                log_effect,
                multiplier: multiplicative_effect(log_effect),
            });
        }
    }

    if let Some(post) = fit.coefficient(&Column::Post) {
        let by_country = groups.contains(&TermGroup::PostByCountry);
        for code in &fit.countries {
            let is_reference = code == reference;
            let interaction = if by_country && !is_reference {
                fit.coefficient(&Column::PostByCountry(code.clone()))
            } else {
                None
            };
            let multiplier = post_threshold_effect(post, interaction);
            out.push(Effect {
                kind: EffectKind::PostThreshold,
                label: code.clone(),
                is_reference,
                log_effect: multiplier.ln(),
                multiplier,
            });
        }
    }

    if groups.contains(&TermGroup::TrendByCountry) {
        for code in &fit.countries {
            let log_effect = fit
                .coefficient(&Column::TrendByCountry(code.clone()))
                .unwrap_or(0.0);
            out.push(Effect {
                kind: EffectKind::PostTrend,
                label: code.clone(),
                is_reference: code == reference,
                log_effect,
                multiplier: multiplicative_effect(log_effect),
            });
        }
    }

    out
}

/// Effects of one kind, in level order.
pub fn effects_of(effects: &[Effect], kind: EffectKind) -> Vec<&Effect> {
    effects.iter().filter(|e| e.kind == kind).collect()
}

/// Whether a model reports country-specific post-threshold effects.
pub fn has_country_specific_post(kind: ModelKind) -> bool {
    term_groups(kind).contains(&TermGroup::PostByCountry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CovariateScheme, Covariates};
    use crate::fit::fitter::{Coefficient, fit_model};
    use crate::models::{FactorLevels, design_columns};
    use crate::prep::{TrainingRow, derive};

    fn coefficient(column: Column, estimate: f64) -> Coefficient {
        Coefficient {
            name: column.to_string(),
            column,
            estimate,
            std_error: 0.1,
            t_value: estimate / 0.1,
            p_value: 0.5,
        }
    }

    /// Hand-built m5 over SWE (reference), NOR and DNK.
    fn m5() -> FittedModel {
        let countries = vec!["SWE".to_string(), "NOR".to_string(), "DNK".to_string()];
        let levels = FactorLevels::new("SWE", &countries);
        let estimates = [-5.0, -0.03, 0.2, -0.1, 0.15, -0.25, 0.4, -0.3];
        let coefficients = design_columns(ModelKind::M5, &levels)
            .into_iter()
            .zip(estimates)
            .map(|(c, e)| coefficient(c, e))
            .collect();
        FittedModel {
            kind: ModelKind::M5,
            countries,
            coefficients,
            rss: 1.0,
            n: 100,
            df_resid: 92,
            log_likelihood: 0.0,
            aic: 0.0,
            bic: 0.0,
        }
    }

    fn post_effect(effects: &[Effect], label: &str) -> f64 {
        effects
            .iter()
            .find(|e| e.kind == EffectKind::PostThreshold && e.label == label)
            .map(|e| e.multiplier)
            .unwrap()
    }

    #[test]
    fn reference_post_effect_is_the_main_post_coefficient() {
        assert!((post_threshold_effect(-0.25, None) - (-0.25f64).exp()).abs() < 1e-15);
        let effects = interpret(&m5());
        assert!((post_effect(&effects, "SWE") - (-0.25f64).exp()).abs() < 1e-15);
    }

    #[test]
    fn nor_post_effect_adds_reference_post_coefficient() {
        assert!((post_threshold_effect(-0.25, Some(0.4)) - 0.15f64.exp()).abs() < 1e-15);
        let effects = interpret(&m5());
        assert!((post_effect(&effects, "NOR") - (0.4f64 - 0.25).exp()).abs() < 1e-15);
    }

    #[test]
    fn dnk_post_effect_adds_reference_post_coefficient() {
        let effects = interpret(&m5());
        assert!((post_effect(&effects, "DNK") - (-0.3f64 - 0.25).exp()).abs() < 1e-15);
    }

    #[test]
    fn reference_categories_have_unit_effect() {
        assert_eq!(multiplicative_effect(0.0), 1.0);
        let effects = interpret(&m5());
        for e in effects
            .iter()
            .filter(|e| e.is_reference && e.kind != EffectKind::PostThreshold)
        {
            assert_eq!(e.multiplier, 1.0, "{:?} {}", e.kind, e.label);
        }
        let male = effects
            .iter()
            .find(|e| e.kind == EffectKind::Sex && e.label == "male")
            .unwrap();
        assert!((male.multiplier - 0.2f64.exp()).abs() < 1e-15);
    }

    #[test]
    fn time_only_model_has_no_categorical_effects() {
        let mut fit = m5();
        fit.kind = ModelKind::M1;
        fit.coefficients.truncate(2);
        assert!(interpret(&fit).is_empty());
    }

    #[test]
    fn interaction_rule_agrees_with_linear_predictor_difference() {
        let scheme = CovariateScheme {
            origin_year: 2000,
            threshold_year: 2006,
        };
        let countries = vec!["SWE".to_string(), "NOR".to_string(), "DNK".to_string()];
        let levels = FactorLevels::new("SWE", &countries);
        let mut rows = Vec::new();
        for (ci, code) in countries.iter().enumerate() {
            for sex in Sex::MODELLED {
                for cohort in 2000..2010 {
                    let c = derive(code, sex, cohort, &scheme);
                    // Deterministic, non-collinear wiggle on top of a trend.
                    let wiggle = ((cohort * 7 + ci as i32 * 3) % 5) as f64 * 0.01;
                    let log_rate = -5.0 - 0.02 * c.time + 0.1 * ci as f64 - 0.2 * c.post * ci as f64
                        + if sex == Sex::Male { 0.15 } else { 0.0 }
                        + wiggle;
                    rows.push(TrainingRow {
                        covariates: c,
                        log_rate,
                    });
                }
            }
        }
        let fit = fit_model(ModelKind::M5, &rows, &levels).unwrap();
        let effects = interpret(&fit);

        for code in &countries {
            let post = derive(code, Sex::Female, 2008, &scheme);
            let pre = Covariates {
                post: 0.0,
                ..post.clone()
            };
            let direct = (fit.predict(&post) - fit.predict(&pre)).exp();
            let via_rule = post_effect(&effects, code);
            assert!(
                ((via_rule - direct) / direct).abs() < 1e-6,
                "{code}: rule {via_rule} vs direct {direct}"
            );
        }
        assert!(has_country_specific_post(fit.kind));
    }
}
