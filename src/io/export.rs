//! Export grid predictions (joined with observations) to CSV.
//!
//! The export is meant to be easy to consume in spreadsheets or plotting scripts.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::error::AppError;
use crate::fit::PredictedVsObserved;

const HEADER: &str = "code,cohort,sex,time,post,yst,log_rate_pred,rate_pred,rate_obs";

/// Write joined predictions to a CSV writer.
pub fn write_predictions<W: Write>(mut out: W, rows: &[PredictedVsObserved]) -> Result<(), AppError> {
    writeln!(out, "{HEADER}")
        .map_err(|e| AppError::new(2, format!("Failed to write predictions header: {e}")))?;

    for r in rows {
        let c = &r.prediction.covariates;
        writeln!(
            out,
            "{},{},{},{},{},{},{:.10},{:.10e},{}",
            c.code,
            c.cohort,
            c.sex,
            c.time,
            c.post,
            c.yst,
            r.prediction.log_rate,
            r.prediction.rate,
            r.observed_rate.map(|v| format!("{v:.10e}")).unwrap_or_default(),
        )
        .map_err(|e| AppError::new(2, format!("Failed to write predictions row: {e}")))?;
    }

    out.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush predictions: {e}")))
}

/// Write joined predictions to a CSV file.
pub fn write_predictions_csv(path: &Path, rows: &[PredictedVsObserved]) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create export CSV '{}': {e}", path.display())))?;
    write_predictions(std::io::BufWriter::new(file), rows)
}
