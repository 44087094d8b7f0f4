//! CSV snapshot ingest and validation.
//!
//! This module is responsible for turning the cached long-format Lexis
//! snapshot into typed `ObservationRecord`s that are safe to aggregate.
//!
//! Design goals:
//! - **Strict schema** for required columns (clear errors + exit code 2)
//! - **Strict rows**: a malformed row fails the load with its line number;
//!   a statistical pipeline must not quietly drop observations
//! - **Separation of concerns**: no aggregation or modelling logic here

use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use csv::StringRecord;
use tracing::info;

use crate::domain::{ObservationRecord, Sex, Triangle};
use crate::error::{AppError, PipelineError};

const REQUIRED_COLUMNS: [&str; 6] = ["code", "cohort", "year", "sex", "deaths", "exposures"];
const SNAPSHOT_HEADER: [&str; 7] = ["code", "cohort", "year", "sex", "tri_type", "deaths", "exposures"];

/// Summary stats about a loaded snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotStats {
    pub rows: usize,
    pub countries: BTreeSet<String>,
    pub cohort_min: i32,
    pub cohort_max: i32,
}

impl SnapshotStats {
    pub fn from_records(records: &[ObservationRecord]) -> Option<Self> {
        let cohort_min = records.iter().map(|r| r.cohort).min()?;
        let cohort_max = records.iter().map(|r| r.cohort).max()?;
        Some(Self {
            rows: records.len(),
            countries: records.iter().map(|r| r.code.clone()).collect(),
            cohort_min,
            cohort_max,
        })
    }
}

/// Load the cached snapshot from disk.
///
/// A missing file is a configuration error: there is no retry path.
pub fn load_snapshot(path: &Path) -> Result<Vec<ObservationRecord>, AppError> {
    if !path.exists() {
        return Err(PipelineError::Configuration(format!(
            "snapshot '{}' not found; run `imr simulate` or provide a cached HMD extract",
            path.display()
        ))
        .into());
    }
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open snapshot '{}': {e}", path.display())))?;
    let records = read_snapshot(file)?;
    info!(path = %path.display(), rows = records.len(), "loaded snapshot");
    Ok(records)
}

/// Parse a snapshot from any reader.
pub fn read_snapshot<R: Read>(reader: R) -> Result<Vec<ObservationRecord>, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read snapshot headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);

    for column in REQUIRED_COLUMNS {
        if !header_map.contains_key(column) {
            return Err(AppError::new(2, format!("Missing required column: `{column}`")));
        }
    }

    let mut records = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        // +2: header is line 1 and CSV lines are 1-based.
        let line = idx + 2;
        let record =
            result.map_err(|e| AppError::new(2, format!("Line {line}: CSV parse error: {e}")))?;
        let row = parse_row(&record, &header_map)
            .map_err(|e| AppError::new(2, format!("Line {line}: {e}")))?;
        records.push(row);
    }

    if records.is_empty() {
        return Err(AppError::new(2, "Snapshot contains no rows."));
    }

    Ok(records)
}

/// Write records in the snapshot schema (used for caches and simulated data).
pub fn write_snapshot<W: Write>(writer: W, records: &[ObservationRecord]) -> Result<(), AppError> {
    let mut w = csv::Writer::from_writer(writer);
    w.write_record(SNAPSHOT_HEADER)
        .map_err(|e| AppError::new(2, format!("Failed to write snapshot header: {e}")))?;
    for r in records {
        w.write_record([
            r.code.clone(),
            r.cohort.to_string(),
            r.year.to_string(),
            r.sex.to_string(),
            r.triangle.to_string(),
            r.deaths.to_string(),
            r.exposures.to_string(),
        ])
        .map_err(|e| AppError::new(2, format!("Failed to write snapshot row: {e}")))?;
    }
    w.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush snapshot: {e}")))?;
    Ok(())
}

/// Write a snapshot file, creating parent directories as needed.
pub fn save_snapshot(path: &Path, records: &[ObservationRecord]) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            AppError::new(2, format!("Failed to create '{}': {e}", parent.display()))
        })?;
    }
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create snapshot '{}': {e}", path.display())))?;
    write_snapshot(file, records)?;
    info!(path = %path.display(), rows = records.len(), "wrote snapshot");
    Ok(())
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports sometimes prefix the first header with a BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn parse_row(record: &StringRecord, header_map: &HashMap<String, usize>) -> Result<ObservationRecord, String> {
    let code = get_required(record, header_map, "code")?.to_string();
    let cohort = parse_year(get_required(record, header_map, "cohort")?, "cohort")?;
    let year = parse_year(get_required(record, header_map, "year")?, "year")?;

    let sex_raw = get_required(record, header_map, "sex")?;
    let sex = Sex::parse(sex_raw).ok_or_else(|| format!("Invalid `sex` value '{sex_raw}'."))?;

    let implied = Triangle::from_years(cohort, year)
        .ok_or_else(|| format!("Year {year} precedes cohort {cohort}."))?;
    let triangle = match get_optional(record, header_map, "tri_type") {
        None => implied,
        Some(raw) => {
            let t = Triangle::parse(raw).ok_or_else(|| format!("Invalid `tri_type` value '{raw}'."))?;
            if t != implied {
                return Err(format!(
                    "`tri_type` {t} contradicts cohort {cohort} / year {year} ({implied})."
                ));
            }
            t
        }
    };

    let deaths = parse_count(get_required(record, header_map, "deaths")?, "deaths")?;
    let exposures = parse_count(get_required(record, header_map, "exposures")?, "exposures")?;

    Ok(ObservationRecord {
        code,
        cohort,
        year,
        sex,
        triangle,
        deaths,
        exposures,
    })
}

fn get_required<'a>(
    record: &'a StringRecord,
    header_map: &HashMap<String, usize>,
    name: &str,
) -> Result<&'a str, String> {
    get_optional(record, header_map, name).ok_or_else(|| format!("Missing `{name}` value."))
}

fn get_optional<'a>(record: &'a StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Option<&'a str> {
    let idx = *header_map.get(name)?;
    let v = record.get(idx)?.trim();
    if v.is_empty() { None } else { Some(v) }
}

fn parse_year(raw: &str, name: &str) -> Result<i32, String> {
    if let Ok(v) = raw.parse::<i32>() {
        return Ok(v);
    }
    // Some exports write integral columns as floats ("1970.0").
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e6 => Ok(v as i32),
        _ => Err(format!("Invalid `{name}` value '{raw}'.")),
    }
}

fn parse_count(raw: &str, name: &str) -> Result<f64, String> {
    let v: f64 = raw
        .parse()
        .map_err(|_| format!("Invalid `{name}` value '{raw}'."))?;
    if !v.is_finite() || v < 0.0 {
        return Err(format!("`{name}` must be a finite non-negative number, got {raw}."));
    }
    Ok(v)
}
