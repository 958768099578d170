use std::path::PathBuf;
use thiserror::Error;

/// Unified error type for the analysis pipeline. Nothing is recovered
/// locally; every variant propagates to the entry point, is logged, and
/// aborts the run.
#[derive(Debug, Error)]
pub enum TrimsightError {
    #[error("unable to find input at {path}")]
    InputNotFound { path: PathBuf },

    #[error("malformed FASTQ data: {message}")]
    Format { message: String },

    #[error("validation failed: {message}")]
    Validation { message: String },

    #[error("invalid argument: {message}")]
    Argument { message: String },

    #[error("no quality encoding scheme matches {path}")]
    Encoding { path: PathBuf },

    #[error("expected error curve fit failed: {message}")]
    CurveFit { message: String },

    #[error("internal invariant violated: {message}")]
    Invariant { message: String },

    #[error("plot rendering failed: {message}")]
    Plot { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to serialize results: {0}")]
    Json(#[from] serde_json::Error),
}

impl TrimsightError {
    pub(crate) fn format(message: impl Into<String>) -> Self {
        TrimsightError::Format { message: message.into() }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        TrimsightError::Validation { message: message.into() }
    }

    pub(crate) fn argument(message: impl Into<String>) -> Self {
        TrimsightError::Argument { message: message.into() }
    }

    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        TrimsightError::Invariant { message: message.into() }
    }
}

pub type Result<T> = std::result::Result<T, TrimsightError>;
