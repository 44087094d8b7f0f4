use infant_mortality::app::pipeline::{run_analysis, run_analysis_with_records};
use infant_mortality::data::{SimulationConfig, SnapshotOrigin, simulate_snapshot};
use infant_mortality::domain::{AnalysisConfig, CovariateScheme, ModelKind, Sex};
use infant_mortality::fit::{EffectKind, effects_of};
use infant_mortality::io::{read_snapshot, save_snapshot, write_predictions};
use infant_mortality::models::Column;

const COUNTRIES: [&str; 3] = ["SWE", "NOR", "DNK"];

fn simulation() -> SimulationConfig {
    SimulationConfig {
        countries: COUNTRIES.iter().map(|c| c.to_string()).collect(),
        reference: "SWE".to_string(),
        first_cohort: 1995,
        last_cohort: 2018,
        scheme: CovariateScheme {
            origin_year: 1995,
            threshold_year: 2012,
        },
        seed: 2024,
        births: 100_000.0,
        base_log_rate: -4.8,
        trend: -0.03,
        male_effect: 0.2,
        post_shift: -0.1,
    }
}

fn config(data_path: std::path::PathBuf) -> AnalysisConfig {
    AnalysisConfig {
        data_path,
        countries: COUNTRIES.iter().map(|c| c.to_string()).collect(),
        reference: "SWE".to_string(),
        threshold_year: 2012,
        start_year: 1995,
        origin_year: 1995,
        ..AnalysisConfig::default()
    }
}

#[test]
fn end_to_end_on_simulated_snapshot() {
    let sim = simulation();
    let records = simulate_snapshot(&sim).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot").join("lexis.csv");
    save_snapshot(&path, &records).unwrap();

    let run = run_analysis(&config(path)).unwrap();
    assert_eq!(run.origin, SnapshotOrigin::Cache);

    // 3 countries x 2 sexes x 24 cohorts, totals dropped.
    assert_eq!(run.rows.len(), 3 * 2 * 24);
    assert_eq!(run.fits.len(), 6);
    assert_eq!(run.chosen.kind, ModelKind::M5);

    // Nested pairs never increase the residual sum of squares.
    for t in &run.comparison.tests {
        assert!(t.rss_extended <= t.rss_base + 1e-9, "{} -> {}", t.base, t.extended);
    }

    // m5 is the true specification; its slopes should land near the truth.
    let m5 = &run.chosen;
    let time = m5.coefficient(&Column::Time).unwrap();
    let male = m5.coefficient(&Column::Sex(Sex::Male)).unwrap();
    assert!((time - sim.trend).abs() < 0.005, "time = {time}");
    assert!((male - sim.male_effect).abs() < 0.03, "sexmale = {male}");

    // The post effect of NOR sums the reference shift and its interaction.
    let post = effects_of(&run.effects, EffectKind::PostThreshold);
    let nor = post.iter().find(|e| e.label == "NOR").unwrap();
    let truth = (sim.post_shift + sim.country_post_shift(1)).exp();
    assert!((nor.multiplier / truth - 1.0).abs() < 0.08);

    let pre = run
        .predictions
        .iter()
        .find(|p| p.key.code == "NOR" && p.key.cohort == 2011 && p.key.sex == Sex::Female)
        .unwrap();
    let mut switched = pre.prediction.covariates.clone();
    switched.post = 1.0;
    let ratio = (m5.predict(&switched) - m5.predict(&pre.prediction.covariates)).exp();
    assert!((ratio / nor.multiplier - 1.0).abs() < 1e-6);

    // Every grid cell inside the observed range has an observation.
    assert!(run.predictions.iter().all(|p| p.observed_rate.is_some()));
}

#[test]
fn grid_can_extend_past_observations() {
    let records = simulate_snapshot(&simulation()).unwrap();
    let mut cfg = config("unused.csv".into());
    cfg.model = ModelKind::M6;
    cfg.grid_from = Some(2015);
    cfg.grid_to = Some(2025);

    let run = run_analysis_with_records(&cfg, &records, SnapshotOrigin::Cache).unwrap();
    assert_eq!(run.chosen.kind, ModelKind::M6);
    assert_eq!(run.predictions.len(), 3 * 2 * 11);
    let unobserved = run.predictions.iter().filter(|p| p.observed_rate.is_none()).count();
    assert_eq!(unobserved, 3 * 2 * 7);

    let mut csv = Vec::new();
    write_predictions(&mut csv, &run.predictions).unwrap();
    let text = String::from_utf8(csv).unwrap();
    assert_eq!(text.lines().count(), 1 + run.predictions.len());
}

#[test]
fn snapshot_survives_a_csv_round_trip_before_fitting() {
    let records = simulate_snapshot(&simulation()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lexis.csv");
    save_snapshot(&path, &records).unwrap();
    let reloaded = read_snapshot(std::fs::File::open(&path).unwrap()).unwrap();
    assert_eq!(reloaded, records);
}

#[test]
fn country_missing_from_snapshot_fails_with_fit_error() {
    let records = simulate_snapshot(&simulation()).unwrap();
    let mut cfg = config("unused.csv".into());
    cfg.countries.push("FIN".to_string());

    let err = run_analysis_with_records(&cfg, &records, SnapshotOrigin::Cache).unwrap_err();
    assert_eq!(err.exit_code(), 4);
    assert!(err.to_string().contains("FIN"));
}

#[test]
fn missing_cache_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = run_analysis(&config(dir.path().join("absent.csv"))).unwrap_err();
    assert_eq!(err.exit_code(), 2);
}

fn two_countries_through(last_cohort: i32) -> (Vec<infant_mortality::domain::ObservationRecord>, AnalysisConfig) {
    let sim = SimulationConfig {
        countries: vec!["SWE".to_string(), "NOR".to_string()],
        last_cohort,
        ..simulation()
    };
    let mut cfg = config("unused.csv".into());
    cfg.countries = sim.countries.clone();
    (simulate_snapshot(&sim).unwrap(), cfg)
}

#[test]
fn threshold_at_last_cohort_excludes_only_m6() {
    // No cohort is past the threshold, so every code:yst column is zero.
    let (records, cfg) = two_countries_through(2012);

    let run = run_analysis_with_records(&cfg, &records, SnapshotOrigin::Cache).unwrap();
    assert_eq!(run.chosen.kind, ModelKind::M5);
    assert_eq!(run.fits.len(), 5);
    let excluded: Vec<ModelKind> = run.comparison.excluded.iter().map(|e| e.kind).collect();
    assert_eq!(excluded, [ModelKind::M6]);
    assert!(run.comparison.excluded[0].reason.contains(":yst"));
    assert!(run.comparison.scores.iter().all(|s| s.kind != ModelKind::M6));
    assert!(run.comparison.tests.iter().all(|t| t.extended != ModelKind::M6));
}

#[test]
fn threshold_past_the_data_still_serves_models_without_post() {
    let (records, mut cfg) = two_countries_through(2012);
    cfg.threshold_year = 2030;
    cfg.model = ModelKind::M3;

    let run = run_analysis_with_records(&cfg, &records, SnapshotOrigin::Cache).unwrap();
    assert_eq!(run.chosen.kind, ModelKind::M3);
    let excluded: Vec<ModelKind> = run.comparison.excluded.iter().map(|e| e.kind).collect();
    assert_eq!(excluded, [ModelKind::M4, ModelKind::M5, ModelKind::M6]);
    assert_eq!(run.comparison.tests.len(), 2);

    // Asking for a model the data cannot identify is still an error.
    cfg.model = ModelKind::M5;
    let err = run_analysis_with_records(&cfg, &records, SnapshotOrigin::Cache).unwrap_err();
    assert_eq!(err.exit_code(), 4);
    assert!(err.to_string().contains("m5"), "{err}");
}
