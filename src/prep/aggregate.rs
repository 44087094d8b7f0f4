//! Collapse lower/upper Lexis triangles into one record per cohort.
//!
//! For age 0, a birth cohort is observed in two triangles: deaths in the
//! calendar year of birth (lower) and in the following year (upper). Summing
//! both gives the cohort's infant deaths and person-years of exposure.

use std::collections::BTreeMap;

use tracing::debug;

use crate::domain::{AggregatedRecord, ObservationRecord, RecordKey, Sex, Triangle};
use crate::error::PipelineError;

/// Keep the rows that enter the models.
///
/// Drops `total` sex rows, cohorts before `start_year` and countries not in
/// `countries`.
pub fn select_records(
    records: &[ObservationRecord],
    countries: &[String],
    start_year: i32,
) -> Vec<ObservationRecord> {
    let selected: Vec<ObservationRecord> = records
        .iter()
        .filter(|r| r.sex != Sex::Total)
        .filter(|r| r.cohort >= start_year)
        .filter(|r| countries.iter().any(|c| *c == r.code))
        .cloned()
        .collect();
    debug!(
        kept = selected.len(),
        dropped = records.len() - selected.len(),
        "selected observation records"
    );
    selected
}

#[derive(Default)]
struct TrianglePair {
    lower: Option<(f64, f64)>,
    upper: Option<(f64, f64)>,
}

/// Sum the two triangle records of every `(country, cohort, sex)` key.
///
/// Output is ordered by key. A key with one triangle missing, or with the
/// same triangle twice, fails the whole aggregation.
pub fn aggregate_triangles(
    records: &[ObservationRecord],
) -> Result<Vec<AggregatedRecord>, PipelineError> {
    let mut groups: BTreeMap<RecordKey, TrianglePair> = BTreeMap::new();

    for r in records {
        let key = r.key();
        let pair = groups.entry(key.clone()).or_default();
        let slot = match r.triangle {
            Triangle::Lower => &mut pair.lower,
            Triangle::Upper => &mut pair.upper,
        };
        if slot.is_some() {
            return Err(PipelineError::DuplicateTriangle {
                key,
                triangle: r.triangle,
            });
        }
        *slot = Some((r.deaths, r.exposures));
    }

    let mut out = Vec::with_capacity(groups.len());
    for (key, pair) in groups {
        let (lower, upper) = match (pair.lower, pair.upper) {
            (Some(lower), Some(upper)) => (lower, upper),
            (None, _) => {
                return Err(PipelineError::MissingTriangle {
                    key,
                    missing: Triangle::Lower,
                });
            }
            (_, None) => {
                return Err(PipelineError::MissingTriangle {
                    key,
                    missing: Triangle::Upper,
                });
            }
        };
        out.push(AggregatedRecord {
            key,
            deaths: lower.0 + upper.0,
            exposures: lower.1 + upper.1,
        });
    }

    Ok(out)
}
