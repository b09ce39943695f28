//! Raster codecs for merged band stacks.
//!
//! An encoder receives the bands of a merged raster in output order and
//! writes them to an open file. Georeferencing comes from the first band;
//! every other band must share its grid and CRS.

pub mod error;
pub mod geokeys;
pub mod geotiff;
pub mod grib2_concat;
pub mod metadata;

use std::fs::File;

use merge_common::Grid;
use serde::{Deserialize, Serialize};

pub use error::{RasterError, Result};
pub use geotiff::{read_geotiff, read_geotiff_from, GeoTiffBand, GeoTiffEncoder};
pub use grib2_concat::Grib2ConcatEncoder;
pub use metadata::BandTags;

/// A raster codec.
pub trait RasterEncoder: Send + Sync {
    /// Short format name for logs.
    fn name(&self) -> &'static str;

    /// File extension without the dot.
    fn extension(&self) -> &'static str;

    /// Write `bands` in order to `out`.
    fn encode(&self, bands: &[Grid], out: &mut File) -> Result<()>;
}

/// Output formats selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    GeoTiff,
    Grib2,
}

impl OutputFormat {
    pub fn encoder(&self) -> Box<dyn RasterEncoder> {
        match self {
            OutputFormat::GeoTiff => Box::new(GeoTiffEncoder::new()),
            OutputFormat::Grib2 => Box::new(Grib2ConcatEncoder::new()),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "geotiff" | "tif" | "tiff" => Ok(OutputFormat::GeoTiff),
            "grib2" | "grb2" => Ok(OutputFormat::Grib2),
            other => Err(format!("unknown output format: {}", other)),
        }
    }
}

/// Reject an empty stack or bands whose grid differs from the first.
pub(crate) fn check_bands(bands: &[Grid]) -> Result<()> {
    let first = bands.first().ok_or(RasterError::Empty)?;
    for (i, grid) in bands.iter().enumerate().skip(1) {
        if grid.width() != first.width() || grid.height() != first.height() {
            return Err(RasterError::InconsistentBands {
                band: i + 1,
                reason: format!(
                    "{}x{} vs {}x{}",
                    grid.width(),
                    grid.height(),
                    first.width(),
                    first.height()
                ),
            });
        }
        if !grid.spec.geotransform.bit_eq(&first.spec.geotransform) || grid.spec.crs != first.spec.crs
        {
            return Err(RasterError::InconsistentBands {
                band: i + 1,
                reason: "georeferencing differs".to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("GeoTIFF".parse::<OutputFormat>().unwrap(), OutputFormat::GeoTiff);
        assert_eq!("grb2".parse::<OutputFormat>().unwrap(), OutputFormat::Grib2);
        assert!("png".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::default().encoder().extension(), "tif");
    }
}
