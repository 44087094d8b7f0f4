//! Read/write comparison report JSON files.
//!
//! The report JSON is the "portable" record of a run:
//! - run metadata (reference, threshold, start year, countries)
//! - every fitted model with its coefficient table
//! - scores, nested tests and the per-criterion verdicts
//! - effects of the model the user chose

use std::fs::File;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{AnalysisConfig, ModelKind};
use crate::error::AppError;
use crate::fit::{Comparison, Effect, FittedModel};

/// Run metadata stored alongside the results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportMeta {
    pub tool: String,
    pub generated_at: DateTime<Utc>,
    pub reference: String,
    pub threshold_year: i32,
    pub start_year: i32,
    pub origin_year: i32,
    pub countries: Vec<String>,
    pub chosen_model: ModelKind,
}

impl ReportMeta {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            tool: "imr".to_string(),
            generated_at: Utc::now(),
            reference: config.reference.clone(),
            threshold_year: config.threshold_year,
            start_year: config.start_year,
            origin_year: config.origin_year,
            countries: config.countries.clone(),
            chosen_model: config.model,
        }
    }
}

#[derive(Debug, Serialize)]
struct ReportFile<'a> {
    meta: ReportMeta,
    models: &'a [FittedModel],
    comparison: &'a Comparison,
    effects: &'a [Effect],
}

/// Write a report JSON file.
pub fn write_report_json(
    path: &Path,
    config: &AnalysisConfig,
    models: &[FittedModel],
    comparison: &Comparison,
    effects: &[Effect],
) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create report JSON '{}': {e}", path.display())))?;

    let report = ReportFile {
        meta: ReportMeta::from_config(config),
        models,
        comparison,
        effects,
    };

    serde_json::to_writer_pretty(file, &report)
        .map_err(|e| AppError::new(2, format!("Failed to write report JSON: {e}")))?;

    Ok(())
}

#[derive(Deserialize)]
struct MetaOnly {
    meta: ReportMeta,
}

/// Read back the metadata of a report JSON file.
pub fn read_report_meta(path: &Path) -> Result<ReportMeta, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open report JSON '{}': {e}", path.display())))?;
    let parsed: MetaOnly =
        serde_json::from_reader(file).map_err(|e| AppError::new(2, format!("Invalid report JSON: {e}")))?;
    Ok(parsed.meta)
}
