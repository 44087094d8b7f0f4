//! Design matrices for the six log-linear models.
//!
//! The fitter relies on two primitive operations:
//! - build a design row for a covariate row (for OLS)
//! - evaluate the linear predictor given coefficients (for predictions)
//!
//! Both go through the same `Column::value`, so a model can never be fitted
//! with one encoding and evaluated with another.
//!
//! Factor coding follows the usual treatment contrasts: the reference country
//! and `female` are absorbed into the intercept. The `code:yst` interaction of
//! m6 has no `yst` main effect, so it gets one column per country, the
//! reference included.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{Covariates, ModelKind, Sex};

/// One group of terms added by a step of the model ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermGroup {
    Time,
    Sex,
    Country,
    Post,
    PostByCountry,
    TrendByCountry,
}

/// Term groups of a model (the intercept is implicit).
pub fn term_groups(kind: ModelKind) -> &'static [TermGroup] {
    match kind {
        ModelKind::M1 => &[TermGroup::Time],
        ModelKind::M2 => &[TermGroup::Time, TermGroup::Sex],
        ModelKind::M3 => &[TermGroup::Time, TermGroup::Sex, TermGroup::Country],
        ModelKind::M4 => &[TermGroup::Time, TermGroup::Sex, TermGroup::Country, TermGroup::Post],
        ModelKind::M5 => &[
            TermGroup::Time,
            TermGroup::Sex,
            TermGroup::Country,
            TermGroup::Post,
            TermGroup::PostByCountry,
        ],
        ModelKind::M6 => &[
            TermGroup::Time,
            TermGroup::Sex,
            TermGroup::Country,
            TermGroup::Post,
            TermGroup::TrendByCountry,
        ],
    }
}

/// `true` when `extended`'s terms strictly contain `base`'s.
pub fn nests(base: ModelKind, extended: ModelKind) -> bool {
    let b = term_groups(base);
    let e = term_groups(extended);
    e.len() > b.len() && b.iter().all(|t| e.contains(t))
}

/// Factor levels, reference level first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactorLevels {
    pub countries: Vec<String>,
}

impl FactorLevels {
    /// Levels for a reference country and the remaining countries.
    pub fn new(reference: &str, countries: &[String]) -> Self {
        let mut levels = vec![reference.to_string()];
        levels.extend(countries.iter().filter(|c| c.as_str() != reference).cloned());
        Self { countries: levels }
    }

    pub fn reference(&self) -> &str {
        &self.countries[0]
    }

    fn non_reference(&self) -> impl Iterator<Item = &String> {
        self.countries.iter().skip(1)
    }
}

/// One column of a design matrix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "level", rename_all = "snake_case")]
pub enum Column {
    Intercept,
    Time,
    Sex(Sex),
    Country(String),
    Post,
    PostByCountry(String),
    TrendByCountry(String),
}

impl Column {
    /// Value of this column for a covariate row.
    pub fn value(&self, c: &Covariates) -> f64 {
        let indicator = |hit: bool| if hit { 1.0 } else { 0.0 };
        match self {
            Column::Intercept => 1.0,
            Column::Time => c.time,
            Column::Sex(level) => indicator(c.sex == *level),
            Column::Country(code) => indicator(c.code == *code),
            Column::Post => c.post,
            Column::PostByCountry(code) => c.post * indicator(c.code == *code),
            Column::TrendByCountry(code) => c.yst * indicator(c.code == *code),
        }
    }

    /// Whether the column is a 0/1 indicator (possibly scaled by an interaction).
    pub fn is_categorical(&self) -> bool {
        !matches!(self, Column::Intercept | Column::Time)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Column::Intercept => write!(f, "(Intercept)"),
            Column::Time => write!(f, "time"),
            Column::Sex(level) => write!(f, "sex{level}"),
            Column::Country(code) => write!(f, "code{code}"),
            Column::Post => write!(f, "post"),
            Column::PostByCountry(code) => write!(f, "post:code{code}"),
            Column::TrendByCountry(code) => write!(f, "code{code}:yst"),
        }
    }
}

/// Ordered design columns of a model.
pub fn design_columns(kind: ModelKind, levels: &FactorLevels) -> Vec<Column> {
    let mut columns = vec![Column::Intercept];
    for group in term_groups(kind) {
        match group {
            TermGroup::Time => columns.push(Column::Time),
            TermGroup::Sex => columns.extend(Sex::MODELLED[1..].iter().map(|s| Column::Sex(*s))),
            TermGroup::Country => {
                columns.extend(levels.non_reference().map(|c| Column::Country(c.clone())))
            }
            TermGroup::Post => columns.push(Column::Post),
            TermGroup::PostByCountry => {
                columns.extend(levels.non_reference().map(|c| Column::PostByCountry(c.clone())))
            }
            TermGroup::TrendByCountry => columns.extend(
                levels
                    .countries
                    .iter()
                    .map(|c| Column::TrendByCountry(c.clone())),
            ),
        }
    }
    columns
}

/// Fill a design row for the given columns.
///
/// `out` must have one slot per column; debug builds assert it.
pub fn fill_design_row(columns: &[Column], covariates: &Covariates, out: &mut [f64]) {
    debug_assert_eq!(out.len(), columns.len(), "design row length");
    for (slot, column) in out.iter_mut().zip(columns) {
        *slot = column.value(covariates);
    }
}

/// `xᵀβ` for one covariate row.
pub fn linear_predictor(columns: &[Column], beta: &[f64], covariates: &Covariates) -> f64 {
    columns
        .iter()
        .zip(beta)
        .map(|(column, b)| column.value(covariates) * b)
        .sum()
}
