//! Error handling primitives shared across the core.
//!
//! Every failure is fatal for a run; the variants exist so the binary can map
//! them to stable exit codes and so alignment breaches are never confused with
//! plain I/O trouble.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Stable process exit codes, one per error family.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorCode {
    /// Success code used as a sentinel.
    Ok = 0,
    /// Invalid or incomplete configuration.
    Config = 1,
    /// Dataset content did not match what the reader was asked for.
    Data = 2,
    /// Model artefact could not be loaded or failed during inference.
    Model = 3,
    /// Two streams or two arrays that must line up did not.
    Alignment = 4,
    /// Filesystem or serialisation failure.
    Io = 5,
}

/// Contract breaches between the pipeline and its collaborators.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AlignmentError {
    #[error("batch {batch}: data stream has {primary} samples, metadata stream has {meta}")]
    BatchSizeMismatch {
        batch: usize,
        primary: usize,
        meta: usize,
    },

    #[error("batch {batch}: {stream} stream ended before the other one")]
    StreamExhausted { batch: usize, stream: &'static str },

    #[error("batch {batch}: output '{name}' was not present in the first batch")]
    UnknownOutput { batch: usize, name: String },

    #[error("batch {batch}: output '{name}' is missing")]
    MissingOutput { batch: usize, name: String },

    #[error("batch {batch}: metadata field '{name}' is not expected")]
    UnknownField { batch: usize, name: String },

    #[error("batch {batch}: metadata field '{name}' is missing")]
    MissingField { batch: usize, name: String },

    #[error("'{name}': expected {expected} samples, found {found}")]
    LengthMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("model declares {declared} outputs but returned {returned}")]
    OutputCount { declared: usize, returned: usize },

    #[error("prediction and label sets differ: {0}")]
    KeyMismatch(String),
}

/// Canonical error type for the crate.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("data error: {0}")]
    Data(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("alignment violation: {0}")]
    Alignment(#[from] AlignmentError),

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("report error: {0}")]
    Csv(#[from] csv::Error),

    #[error("array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("invalid replicate pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Result alias used throughout the crate.
pub type EvalResult<T> = Result<T, EvalError>;

impl EvalError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn data(msg: impl Into<String>) -> Self {
        Self::Data(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    /// Attach the offending path to an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Exit code reported by the binary for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            EvalError::Config(_) | EvalError::Pattern(_) => ErrorCode::Config,
            EvalError::Data(_) | EvalError::Shape(_) => ErrorCode::Data,
            EvalError::Model(_) => ErrorCode::Model,
            EvalError::Alignment(_) => ErrorCode::Alignment,
            EvalError::Io { .. } | EvalError::Json(_) | EvalError::Csv(_) => ErrorCode::Io,
        }
    }
}
