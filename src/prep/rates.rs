//! Mortality rates and their checked logarithm.

use crate::domain::{AggregatedRecord, RateRecord, RecordKey};
use crate::error::PipelineError;

/// `deaths / exposures` for one aggregated record.
pub fn derive_rate(record: &AggregatedRecord) -> Result<RateRecord, PipelineError> {
    if record.exposures == 0.0 {
        return Err(PipelineError::DivideByZero {
            key: record.key.clone(),
        });
    }
    Ok(RateRecord {
        key: record.key.clone(),
        deaths: record.deaths,
        exposures: record.exposures,
        rate: record.deaths / record.exposures,
    })
}

/// Derive rates for a whole table, failing on the first zero exposure.
pub fn derive_rates(records: &[AggregatedRecord]) -> Result<Vec<RateRecord>, PipelineError> {
    records.iter().map(derive_rate).collect()
}

/// Natural log of a rate; zero-death cells have no log-rate.
pub fn log_rate(key: &RecordKey, rate: f64) -> Result<f64, PipelineError> {
    if !(rate > 0.0) || !rate.is_finite() {
        return Err(PipelineError::Domain {
            key: key.clone(),
            rate,
        });
    }
    Ok(rate.ln())
}
