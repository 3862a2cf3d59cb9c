// src/error.rs

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors. Anything that reaches the caller as an `Error` aborts the
/// gating decision.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid threshold {0}: must be within [0, 100]")]
    InvalidThreshold(i64),

    #[error("invalid time window: from {from} is after to {to}")]
    InvalidTimeWindow {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },

    #[error("history unavailable: {0}")]
    HistoryUnavailable(String),

    #[error("failed to read coverage report {path}: {reason}")]
    CoverageReport { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Short, stable name of the error kind for CI output.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidThreshold(_) => "InvalidThreshold",
            Error::InvalidTimeWindow { .. } => "InvalidTimeWindow",
            Error::HistoryUnavailable(_) => "HistoryUnavailable",
            Error::CoverageReport { .. } => "CoverageReport",
            Error::Io(_) => "Io",
            Error::Json(_) => "Json",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
