//! Error types for raster encoding.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RasterError {
    /// Nothing to write.
    #[error("raster has no bands")]
    Empty,

    /// Bands passed to one encoder call disagree on grid or CRS.
    #[error("band {band} does not match the first band: {reason}")]
    InconsistentBands { band: usize, reason: String },

    /// A band lacks what the codec needs (e.g. its encoded message).
    #[error("band {band} cannot be encoded: {reason}")]
    MissingData { band: usize, reason: String },

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Band metadata could not be read back.
    #[error("invalid band metadata: {0}")]
    InvalidMetadata(String),

    #[error("unsupported CRS: {0}")]
    UnsupportedCrs(String),
}

impl From<quick_xml::Error> for RasterError {
    fn from(err: quick_xml::Error) -> Self {
        Self::InvalidMetadata(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RasterError>;
