//! Shared analysis pipeline used by every CLI command.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! snapshot -> selection -> triangle aggregation -> rates -> covariates
//! -> fit m1..m6 -> compare -> effects of the chosen model -> grid predictions
//!
//! The commands can then focus on presentation (which tables to print).

use tracing::info;

use crate::data::{SnapshotOrigin, resolve_snapshot};
use crate::domain::{AnalysisConfig, ModelKind, ObservationRecord, RateRecord};
use crate::error::{AppError, PipelineError};
use crate::fit::{
    Comparison, Effect, FittedModel, LadderFit, PredictedVsObserved, build_grid, compare_models,
    fit_ladder, interpret, join_observed, predict_grid,
};
use crate::io::SnapshotStats;
use crate::models::FactorLevels;
use crate::prep::{TrainingRow, aggregate_triangles, derive_rates, select_records, training_rows};

/// All computed outputs of a single run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub origin: SnapshotOrigin,
    pub stats: SnapshotStats,
    pub rates: Vec<RateRecord>,
    pub rows: Vec<TrainingRow>,
    pub fits: Vec<FittedModel>,
    pub comparison: Comparison,
    pub chosen: FittedModel,
    pub effects: Vec<Effect>,
    pub predictions: Vec<PredictedVsObserved>,
}

/// Load the cached snapshot and run the full analysis.
pub fn run_analysis(config: &AnalysisConfig) -> Result<RunOutput, AppError> {
    config.validate()?;
    let (records, origin) = resolve_snapshot(&config.data_path, &config.countries, None)?;
    run_analysis_with_records(config, &records, origin)
}

/// Run the analysis on records already in memory.
pub fn run_analysis_with_records(
    config: &AnalysisConfig,
    records: &[ObservationRecord],
    origin: SnapshotOrigin,
) -> Result<RunOutput, AppError> {
    config.validate()?;

    let stats = SnapshotStats::from_records(records)
        .ok_or_else(|| PipelineError::InsufficientData("snapshot has no rows".to_string()))?;
    info!(rows = stats.rows, countries = stats.countries.len(), "snapshot loaded");

    // 1) Prepare: filter, sum triangles, rates, covariates.
    let selected = select_records(records, &config.countries, config.start_year);
    let aggregated = aggregate_triangles(&selected)?;
    let rates = derive_rates(&aggregated)?;
    let scheme = config.scheme();
    let rows = training_rows(&rates, &scheme)?;
    info!(cells = rates.len(), "training table ready");

    // 2) Fit the whole ladder on one table so scores are comparable. Models
    //    the data cannot identify are left out of the comparison.
    let levels = FactorLevels::new(&config.reference, &config.countries);
    let LadderFit { fits, excluded } = fit_ladder(&ModelKind::ALL, &rows, &levels)?;
    if let Some(e) = excluded.iter().find(|e| e.kind == config.model) {
        return Err(PipelineError::InsufficientData(e.reason.clone()).into());
    }
    let comparison = compare_models(&fits, config.alpha, config.near_tie)?.with_excluded(excluded);
    info!(
        aic = comparison.aic.best.id(),
        bic = comparison.bic.best.id(),
        agree = comparison.criteria_agree,
        "models compared"
    );

    // 3) Interpret and predict with the user's model.
    let chosen = fits
        .iter()
        .find(|f| f.kind == config.model)
        .cloned()
        .ok_or_else(|| PipelineError::InsufficientData(format!("{} was not fitted", config.model)))?;
    let effects = interpret(&chosen);

    let last_observed = rates.iter().map(|r| r.key.cohort).max().unwrap_or(config.start_year);
    let from = config.grid_from.unwrap_or(config.start_year);
    let to = config.grid_to.unwrap_or(last_observed);
    if to < from {
        return Err(PipelineError::Configuration(format!("grid range {from}..={to} is empty")).into());
    }
    let grid = build_grid(&levels.countries, from, to, &scheme);
    let predictions = join_observed(&predict_grid(&chosen, &grid), &rates);
    info!(cells = predictions.len(), model = chosen.kind.id(), "grid predicted");

    Ok(RunOutput {
        origin,
        stats,
        rates,
        rows,
        fits,
        comparison,
        chosen,
        effects,
        predictions,
    })
}
