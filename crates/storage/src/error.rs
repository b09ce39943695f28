use thiserror::Error;

/// Failure reading or writing an object.
///
/// The split between `NotFound` and `Transient` drives retry decisions:
/// only transient failures are worth another attempt.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StorageError {
    #[error("object not found: {key}")]
    NotFound { key: String },

    #[error("transient failure on {key}: {message}")]
    Transient { key: String, message: String },

    #[error("storage configuration error: {0}")]
    Config(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Transient { .. })
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
