//! Shared domain types.
//!
//! These types are intentionally kept small, typed and serializable so they can be:
//!
//! - used in-memory by every pipeline stage
//! - exported to CSV/JSON
//! - reloaded later for comparisons

use std::fmt;
use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Countries compared by default (HMD population codes).
pub const DEFAULT_COUNTRIES: [&str; 12] = [
    "SWE", "NOR", "DNK", "FIN", "GBRTENW", "FRATNP", "DEUTNP", "NLD", "BEL", "ESP", "ITA", "USA",
];

/// Baseline country for all country contrasts.
pub const DEFAULT_REFERENCE: &str = "SWE";

/// First cohort flagged as post-threshold.
pub const DEFAULT_THRESHOLD_YEAR: i32 = 2012;

/// Earliest cohort kept for modelling. Also the origin of the time covariate.
pub const DEFAULT_START_YEAR: i32 = 1970;

/// Sex as recorded in the Lexis datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Female,
    Male,
    Total,
}

impl Sex {
    /// Sexes that enter the models, reference level first.
    pub const MODELLED: [Sex; 2] = [Sex::Female, Sex::Male];

    pub fn as_str(self) -> &'static str {
        match self {
            Sex::Female => "female",
            Sex::Male => "male",
            Sex::Total => "total",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "female" | "f" => Some(Sex::Female),
            "male" | "m" => Some(Sex::Male),
            "total" | "t" | "both" => Some(Sex::Total),
            _ => None,
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lexis triangle of an age-0 observation.
///
/// `Lower` covers deaths in the calendar year of birth, `Upper` those in the
/// following calendar year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Triangle {
    Lower,
    Upper,
}

impl Triangle {
    pub fn as_str(self) -> &'static str {
        match self {
            Triangle::Lower => "lower",
            Triangle::Upper => "upper",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "lower" | "tl" => Some(Triangle::Lower),
            "upper" | "tu" => Some(Triangle::Upper),
            _ => None,
        }
    }

    /// Triangle implied by a cohort and the calendar year of observation.
    ///
    /// Returns `None` when the year precedes the cohort.
    pub fn from_years(cohort: i32, year: i32) -> Option<Self> {
        match year.cmp(&cohort) {
            std::cmp::Ordering::Equal => Some(Triangle::Lower),
            std::cmp::Ordering::Greater => Some(Triangle::Upper),
            std::cmp::Ordering::Less => None,
        }
    }
}

impl fmt::Display for Triangle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(country, cohort, sex)`: the grain of every downstream table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub code: String,
    pub cohort: i32,
    pub sex: Sex,
}

impl RecordKey {
    pub fn new(code: impl Into<String>, cohort: i32, sex: Sex) -> Self {
        Self {
            code: code.into(),
            cohort,
            sex,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.code, self.cohort, self.sex)
    }
}

/// One row of the long-format Lexis snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationRecord {
    pub code: String,
    pub cohort: i32,
    pub year: i32,
    pub sex: Sex,
    pub triangle: Triangle,
    pub deaths: f64,
    pub exposures: f64,
}

impl ObservationRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.code.clone(), self.cohort, self.sex)
    }
}

/// Lower + upper triangles of one key, summed.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedRecord {
    pub key: RecordKey,
    pub deaths: f64,
    pub exposures: f64,
}

/// Aggregated record with its derived mortality rate.
#[derive(Debug, Clone, PartialEq)]
pub struct RateRecord {
    pub key: RecordKey,
    pub deaths: f64,
    pub exposures: f64,
    pub rate: f64,
}

/// Derived regressors for one `(country, cohort, sex)` cell.
///
/// Only `prep::covariates::derive` builds these, for training rows and
/// prediction grid rows alike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Covariates {
    pub code: String,
    pub cohort: i32,
    pub sex: Sex,
    /// Years since the origin cohort.
    pub time: f64,
    /// 1.0 from the threshold cohort onward, else 0.0.
    pub post: f64,
    /// Years since the threshold cohort; 0.0 before it.
    pub yst: f64,
}

/// Parameters of the covariate derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CovariateScheme {
    pub origin_year: i32,
    pub threshold_year: i32,
}

/// The six nested regression models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// `log(rate) ~ time`
    M1,
    /// `+ sex`
    M2,
    /// `+ country`
    M3,
    /// `+ post`
    M4,
    /// `+ post:country`
    M5,
    /// `+ country:yst` (instead of `post:country`)
    M6,
}

impl ModelKind {
    pub const ALL: [ModelKind; 6] = [
        ModelKind::M1,
        ModelKind::M2,
        ModelKind::M3,
        ModelKind::M4,
        ModelKind::M5,
        ModelKind::M6,
    ];

    pub fn id(self) -> &'static str {
        match self {
            ModelKind::M1 => "m1",
            ModelKind::M2 => "m2",
            ModelKind::M3 => "m3",
            ModelKind::M4 => "m4",
            ModelKind::M5 => "m5",
            ModelKind::M6 => "m6",
        }
    }

    /// R-style formula for terminal output.
    pub fn formula(self) -> &'static str {
        match self {
            ModelKind::M1 => "log(rate) ~ time",
            ModelKind::M2 => "log(rate) ~ time + sex",
            ModelKind::M3 => "log(rate) ~ time + sex + code",
            ModelKind::M4 => "log(rate) ~ time + sex + code + post",
            ModelKind::M5 => "log(rate) ~ time + sex + code + post + post:code",
            ModelKind::M6 => "log(rate) ~ time + sex + code + post + code:yst",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub data_path: PathBuf,
    pub countries: Vec<String>,
    pub reference: String,
    pub threshold_year: i32,
    pub start_year: i32,
    pub origin_year: i32,

    /// Significance level used to flag nested F-tests.
    pub alpha: f64,
    /// Information-criterion distance under which models count as tied.
    pub near_tie: f64,

    /// Model used for effects and predictions (chosen by the user).
    pub model: ModelKind,
    /// Prediction grid cohort range; defaults to start year ..= last observed cohort.
    pub grid_from: Option<i32>,
    pub grid_to: Option<i32>,

    pub plot: bool,
    pub plot_width: usize,
    pub plot_height: usize,

    pub export_predictions: Option<PathBuf>,
    pub export_report: Option<PathBuf>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data/lexis_age0.csv"),
            countries: DEFAULT_COUNTRIES.iter().map(|c| c.to_string()).collect(),
            reference: DEFAULT_REFERENCE.to_string(),
            threshold_year: DEFAULT_THRESHOLD_YEAR,
            start_year: DEFAULT_START_YEAR,
            origin_year: DEFAULT_START_YEAR,
            alpha: 0.05,
            near_tie: 2.0,
            model: ModelKind::M5,
            grid_from: None,
            grid_to: None,
            plot: false,
            plot_width: 72,
            plot_height: 12,
            export_predictions: None,
            export_report: None,
        }
    }
}

impl AnalysisConfig {
    pub fn scheme(&self) -> CovariateScheme {
        CovariateScheme {
            origin_year: self.origin_year,
            threshold_year: self.threshold_year,
        }
    }

    /// Reject settings that would make every later stage meaningless.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.countries.is_empty() {
            return Err(PipelineError::Configuration("country list is empty".to_string()));
        }
        if !self.countries.iter().any(|c| c == &self.reference) {
            return Err(PipelineError::Configuration(format!(
                "reference country {} is not in the country list",
                self.reference
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for code in &self.countries {
            if !seen.insert(code.as_str()) {
                return Err(PipelineError::Configuration(format!(
                    "country {code} is listed twice"
                )));
            }
        }
        if self.threshold_year < self.start_year {
            return Err(PipelineError::Configuration(format!(
                "threshold year {} precedes start year {}",
                self.threshold_year, self.start_year
            )));
        }
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(PipelineError::Configuration(format!(
                "significance level must be in (0, 1), got {}",
                self.alpha
            )));
        }
        if !(self.near_tie.is_finite() && self.near_tie >= 0.0) {
            return Err(PipelineError::Configuration(format!(
                "near-tie margin must be >= 0, got {}",
                self.near_tie
            )));
        }
        if let (Some(from), Some(to)) = (self.grid_from, self.grid_to) {
            if to < from {
                return Err(PipelineError::Configuration(format!(
                    "grid range {from}..={to} is empty"
                )));
            }
        }
        Ok(())
    }
}
