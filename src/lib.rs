//! Shared types, error taxonomy and module exports for kb-bench.
//!
//! The crate drives an HTTP system under test with parameterised request
//! mixes, folds per-request latencies into HDR histograms, evaluates the
//! result against per-category thresholds, and composes many such runs
//! into a crossover + weighted-scoring comparison.

pub mod catalog;
pub mod comparison;
pub mod dataset;
pub mod executor;
pub mod metrics;
pub mod report;
pub mod runner;
pub mod scoring;
pub mod thresholds;
pub mod workload;

use thiserror::Error;

pub type BenchResult<T> = std::result::Result<T, BenchError>;

/// Session-scoped errors. Per-request failures are never errors: they are
/// classified outcomes on the Observation and stay inside the executor.
#[derive(Debug, Error)]
pub enum BenchError {
    #[error("usage error: {0}")]
    Usage(String),

    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("preflight failed: {0}")]
    Preflight(String),

    #[error("interrupted")]
    Interrupted,

    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl BenchError {
    /// Process exit code: 64 for anything the caller can fix, 3 for an
    /// external interrupt, 70 for bugs on our side.
    pub fn exit_code(&self) -> i32 {
        match self {
            BenchError::Usage(_) | BenchError::InvalidPattern(_) | BenchError::Preflight(_) => 64,
            BenchError::Interrupted => 3,
            _ => 70,
        }
    }
}
