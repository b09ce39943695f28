//! Error types for the merge pipeline.

use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Which part of the grid definition disagreed with the reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchField {
    Dimensions,
    GeoTransform,
    Crs,
}

impl fmt::Display for MismatchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MismatchField::Dimensions => "dimensions",
            MismatchField::GeoTransform => "geotransform",
            MismatchField::Crs => "crs",
        };
        f.write_str(name)
    }
}

/// A candidate grid that cannot be stacked onto the reference.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{field} mismatch on {key}: reference {reference}, candidate {candidate}")]
pub struct MismatchError {
    pub field: MismatchField,
    pub reference: String,
    pub candidate: String,
    /// Source key of the candidate
    pub key: String,
}

/// An object that was fetched but could not be turned into a grid.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("malformed input {key}: {reason}")]
pub struct MalformedInput {
    pub key: String,
    pub reason: String,
}

/// Errors that end a run or reject it before it starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MergeError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Mismatch(#[from] MismatchError),

    #[error("duplicate band for valid time {valid_time} from {key}")]
    DuplicateBand {
        valid_time: DateTime<Utc>,
        key: String,
    },

    #[error("encode failed: {0}")]
    Encode(String),

    #[error("artifact verification failed: {0}")]
    Verification(String),

    #[error("no bands assembled out of {expected} expected")]
    NoBands { expected: usize },

    #[error("run cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for merge operations.
pub type Result<T> = std::result::Result<T, MergeError>;
