//! Error types for grid construction.

use thiserror::Error;

/// Result type alias using GridError.
pub type GridResult<T> = Result<T, GridError>;

/// Errors raised when a grid is assembled from inconsistent parts.
#[derive(Debug, Error, PartialEq)]
pub enum GridError {
    #[error("Grid has zero extent ({width}x{height})")]
    Empty { width: usize, height: usize },

    #[error("Sample count mismatch: expected {expected} ({width}x{height}), got {actual}")]
    SampleCount {
        width: usize,
        height: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid geotransform: {0}")]
    InvalidGeoTransform(String),
}
