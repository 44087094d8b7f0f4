//! Command-line parsing for the infant mortality model ladder.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the modeling/math code.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{DEFAULT_REFERENCE, DEFAULT_START_YEAR, DEFAULT_THRESHOLD_YEAR, ModelKind};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "imr", version, about = "Infant mortality log-linear model ladder (HMD Lexis data)")]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). Logs go to stderr.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit m1..m6, print scores, nested F-tests and the AIC/BIC verdicts.
    Compare(CompareArgs),
    /// Print the coefficient table and rate ratios of one model.
    Effects(ModelArgs),
    /// Predict rates over a cohort grid, compare with observations, optionally plot/export.
    Predict(PredictArgs),
    /// Write a seeded synthetic Lexis snapshot (no network needed).
    Simulate(SimulateArgs),
    /// Print the metadata of a saved comparison report.
    Show(ShowArgs),
}

/// Options shared by every command that reads a snapshot.
#[derive(Debug, Args, Clone)]
pub struct DataArgs {
    /// Cached Lexis snapshot CSV.
    #[arg(long, default_value = "data/lexis_age0.csv")]
    pub data: PathBuf,

    /// Comma-separated HMD country codes (default: the 12 study countries).
    #[arg(long, value_delimiter = ',')]
    pub countries: Vec<String>,

    /// Reference country of the country factor.
    #[arg(long, default_value = DEFAULT_REFERENCE)]
    pub reference: String,

    /// First cohort with post = 1.
    #[arg(long, default_value_t = DEFAULT_THRESHOLD_YEAR)]
    pub threshold: i32,

    /// Earliest cohort kept for modelling.
    #[arg(long = "start-year", default_value_t = DEFAULT_START_YEAR)]
    pub start_year: i32,

    /// Cohort where `time` is zero (default: the start year).
    #[arg(long = "origin-year")]
    pub origin_year: Option<i32>,
}

#[derive(Debug, Args, Clone)]
pub struct CompareArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Significance level for nested F-tests.
    #[arg(long, default_value_t = 0.05)]
    pub alpha: f64,

    /// AIC/BIC distance under which models are reported as near ties.
    #[arg(long = "near-tie", default_value_t = 2.0)]
    pub near_tie: f64,

    /// Model whose effects are stored in the exported report.
    #[arg(long, value_enum, default_value_t = ModelKind::M5)]
    pub model: ModelKind,

    /// Export the comparison (models, scores, tests, effects) to JSON.
    #[arg(long = "export-report")]
    pub export_report: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct ModelArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Model to interpret. Pick it from `imr compare`; no model is chosen automatically.
    #[arg(long, value_enum, default_value_t = ModelKind::M5)]
    pub model: ModelKind,
}

#[derive(Debug, Args, Clone)]
pub struct PredictArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Model used for predictions.
    #[arg(long, value_enum, default_value_t = ModelKind::M5)]
    pub model: ModelKind,

    /// First grid cohort (default: the start year).
    #[arg(long)]
    pub from: Option<i32>,

    /// Last grid cohort (default: the last observed cohort).
    #[arg(long)]
    pub to: Option<i32>,

    /// Render ASCII panels in the terminal.
    #[arg(long)]
    pub plot: bool,

    /// Panel width (columns).
    #[arg(long, default_value_t = 72)]
    pub width: usize,

    /// Panel height (rows).
    #[arg(long, default_value_t = 12)]
    pub height: usize,

    /// Export predictions joined with observations to CSV.
    #[arg(long)]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct SimulateArgs {
    /// Output snapshot CSV.
    #[arg(long, default_value = "data/lexis_age0.csv")]
    pub out: PathBuf,

    /// Comma-separated country codes (default: the 12 study countries).
    #[arg(long, value_delimiter = ',')]
    pub countries: Vec<String>,

    #[arg(long, default_value = DEFAULT_REFERENCE)]
    pub reference: String,

    #[arg(long, default_value_t = DEFAULT_THRESHOLD_YEAR)]
    pub threshold: i32,

    #[arg(long = "first-cohort", default_value_t = DEFAULT_START_YEAR)]
    pub first_cohort: i32,

    #[arg(long = "last-cohort", default_value_t = 2020)]
    pub last_cohort: i32,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Births per sex and cohort in the reference country.
    #[arg(long, default_value_t = 50_000.0)]
    pub births: f64,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Report JSON produced by `imr compare --export-report`.
    #[arg(long, value_name = "JSON")]
    pub report: PathBuf,
}
