//! Error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RadarError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown severity: {0}")]
    UnknownSeverity(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type RadarResult<T> = Result<T, RadarError>;
