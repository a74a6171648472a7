//! Error taxonomy for the risk pipeline.
//!
//! Each stage has its own error type so callers can decide which failures
//! are fatal. The nationwide path turns any of them into a failed run; the
//! regional path absorbs [`FetchError`] per region.

use std::path::PathBuf;
use thiserror::Error;

/// Failure talking to the seismic catalog.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection, timeout or body read failure.
    #[error("catalog request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The catalog answered with a non-success status.
    #[error("catalog returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response was not a GeoJSON feature collection.
    #[error("catalog response could not be decoded: {message}")]
    Decode { message: String },
}

impl FetchError {
    /// Whether a caller-side retry has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Transport(e) => e.is_timeout() || e.is_connect() || e.is_body(),
            FetchError::Status { status, .. } => *status == 429 || (500..600).contains(status),
            FetchError::Decode { .. } => false,
        }
    }
}

/// Raised when a feature vector is requested for an empty event list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot aggregate features from an empty event list")]
pub struct EmptyInputError;

/// The classifier rejected the feature row.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoringError {
    #[error("classifier expects {expected} features, got {actual}")]
    Arity { expected: usize, actual: usize },

    #[error("classifier returned an invalid probability: {0}")]
    InvalidProbability(f64),
}

/// Startup configuration problems. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{what} file not found: {}", path.display())]
    MissingFile { what: &'static str, path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid {what} in {}: {message}", path.display())]
    Malformed {
        what: &'static str,
        path: PathBuf,
        message: String,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Everything that can fail an analysis run.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("nationwide event fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("no earthquake events found in the national catalog for {window}")]
    NoEvents { window: String },

    #[error(transparent)]
    Empty(#[from] EmptyInputError),

    #[error("risk scoring failed (feature contract mismatch?): {0}")]
    Scoring(#[from] ScoringError),

    #[error("analysis did not finish within {seconds}s")]
    TimedOut { seconds: u64 },
}
