use crate::domain::{RecordKey, Triangle};

/// Process-level error: an exit code plus a message for the terminal.
///
/// Exit codes: 2 configuration or input file, 3 data, 4 fitting,
/// 5 remote fetch (normally absorbed by the cache fallback).
#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

/// Domain errors raised by the data preparation and modelling stages.
///
/// Data errors always carry the offending `(country, cohort, sex)` key so the
/// caller can decide whether to drop or impute; nothing is recovered here.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    #[error("{key}: {missing} triangle record is missing")]
    MissingTriangle { key: RecordKey, missing: Triangle },

    #[error("{key}: more than one {triangle} triangle record")]
    DuplicateTriangle { key: RecordKey, triangle: Triangle },

    #[error("{key}: exposure is zero, rate is undefined")]
    DivideByZero { key: RecordKey },

    #[error("{key}: cannot take the log of non-positive rate {rate}")]
    Domain { key: RecordKey, rate: f64 },

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{extended} does not nest {base}")]
    NotNested { base: String, extended: String },
}

impl PipelineError {
    /// Exit code used when this error terminates the binary.
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::Configuration(_) => 2,
            PipelineError::MissingTriangle { .. }
            | PipelineError::DuplicateTriangle { .. }
            | PipelineError::DivideByZero { .. }
            | PipelineError::Domain { .. } => 3,
            PipelineError::InsufficientData(_) | PipelineError::NotNested { .. } => 4,
        }
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        AppError::new(err.exit_code(), err.to_string())
    }
}
