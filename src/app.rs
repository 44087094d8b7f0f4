//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - installs the log subscriber
//! - runs the analysis pipeline
//! - prints reports/plots
//! - writes optional exports

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{Command, CompareArgs, DataArgs, ModelArgs, PredictArgs, ShowArgs, SimulateArgs};
use crate::data::{SimulationConfig, simulate_snapshot};
use crate::domain::{AnalysisConfig, CovariateScheme, DEFAULT_COUNTRIES};
use crate::error::AppError;

pub mod pipeline;

/// Entry point for the `imr` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Compare(args) => handle_compare(args),
        Command::Effects(args) => handle_effects(args),
        Command::Predict(args) => handle_predict(args),
        Command::Simulate(args) => handle_simulate(args),
        Command::Show(args) => handle_show(args),
    }
}

/// Logs go to stderr so report output on stdout stays clean. `RUST_LOG` wins
/// over the `-v` count when set.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "imr=warn,infant_mortality=warn",
        1 => "imr=info,infant_mortality=info",
        2 => "imr=debug,infant_mortality=debug",
        _ => "imr=trace,infant_mortality=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // A second init (e.g. from tests) is harmless.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn handle_compare(args: CompareArgs) -> Result<(), AppError> {
    let mut config = config_from_data_args(&args.data);
    config.alpha = args.alpha;
    config.near_tie = args.near_tie;
    config.model = args.model;
    config.export_report = args.export_report.clone();

    let run = pipeline::run_analysis(&config)?;

    println!(
        "{}",
        crate::report::format_data_summary(&run.stats, run.rows.len(), &config)
    );
    println!("{}", crate::report::format_comparison(&run.comparison, config.alpha));

    if let Some(path) = &config.export_report {
        crate::io::write_report_json(path, &config, &run.fits, &run.comparison, &run.effects)?;
        info!(path = %path.display(), "report written");
    }
    Ok(())
}

fn handle_effects(args: ModelArgs) -> Result<(), AppError> {
    let mut config = config_from_data_args(&args.data);
    config.model = args.model;

    let run = pipeline::run_analysis(&config)?;

    println!("{}", crate::report::format_coefficients(&run.chosen));
    println!("{}", crate::report::format_effects(&run.chosen, &run.effects));
    Ok(())
}

fn handle_predict(args: PredictArgs) -> Result<(), AppError> {
    let mut config = config_from_data_args(&args.data);
    config.model = args.model;
    config.grid_from = args.from;
    config.grid_to = args.to;
    config.plot = args.plot;
    config.plot_width = args.width;
    config.plot_height = args.height;
    config.export_predictions = args.export.clone();

    let run = pipeline::run_analysis(&config)?;

    let summary = crate::report::residual_summary(&run.predictions);
    println!(
        "Predictions from {} over {} grid cells.",
        run.chosen.kind.id(),
        run.predictions.len()
    );
    println!("{}", crate::report::format_residual_summary(&summary));

    if config.plot {
        let plot = crate::plot::render_ascii_panels(
            &run.predictions,
            config.threshold_year,
            config.plot_width,
            config.plot_height,
        );
        println!("{plot}");
    }

    if let Some(path) = &config.export_predictions {
        crate::io::write_predictions_csv(path, &run.predictions)?;
        info!(path = %path.display(), rows = run.predictions.len(), "predictions written");
    }
    Ok(())
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let countries = country_list(&args.countries);
    let config = SimulationConfig {
        countries,
        reference: country_code(&args.reference),
        first_cohort: args.first_cohort,
        last_cohort: args.last_cohort,
        scheme: CovariateScheme {
            origin_year: args.first_cohort,
            threshold_year: args.threshold,
        },
        seed: args.seed,
        births: args.births,
        base_log_rate: -4.6,
        trend: -0.035,
        male_effect: 0.2,
        post_shift: -0.05,
    };
    let records = simulate_snapshot(&config)?;
    crate::io::save_snapshot(&args.out, &records)?;
    println!("Wrote {} rows to {}", records.len(), args.out.display());
    Ok(())
}

fn handle_show(args: ShowArgs) -> Result<(), AppError> {
    let meta = crate::io::read_report_meta(&args.report)?;
    println!("Report: {}", args.report.display());
    println!("  generated: {}", meta.generated_at.to_rfc3339());
    println!("  countries: {} (reference {})", meta.countries.join(", "), meta.reference);
    println!(
        "  threshold={} | start={} | origin={}",
        meta.threshold_year, meta.start_year, meta.origin_year
    );
    println!("  chosen model: {}", meta.chosen_model.id());
    Ok(())
}

/// Build the analysis configuration from the shared data options.
pub fn config_from_data_args(args: &DataArgs) -> AnalysisConfig {
    AnalysisConfig {
        data_path: args.data.clone(),
        countries: country_list(&args.countries),
        reference: country_code(&args.reference),
        threshold_year: args.threshold,
        start_year: args.start_year,
        origin_year: args.origin_year.unwrap_or(args.start_year),
        ..AnalysisConfig::default()
    }
}

/// HMD codes are upper case; accept any spelling on the command line.
fn country_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

fn country_list(raw: &[String]) -> Vec<String> {
    let codes: Vec<String> = raw
        .iter()
        .map(|c| country_code(c))
        .filter(|c| !c.is_empty())
        .collect();
    if codes.is_empty() {
        DEFAULT_COUNTRIES.iter().map(|c| c.to_string()).collect()
    } else {
        codes
    }
}
