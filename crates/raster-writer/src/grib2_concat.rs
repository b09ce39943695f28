//! GRIB2 re-emission: the encoded source messages, concatenated in band
//! order. The result is itself a valid multi-message GRIB2 file.

use std::fs::File;
use std::io::Write;

use merge_common::Grid;
use tracing::debug;

use crate::error::{RasterError, Result};
use crate::{check_bands, RasterEncoder};

#[derive(Debug, Default, Clone, Copy)]
pub struct Grib2ConcatEncoder;

impl Grib2ConcatEncoder {
    pub fn new() -> Self {
        Self
    }

    pub fn write_to<W: Write>(&self, bands: &[Grid], mut out: W) -> Result<()> {
        check_bands(bands)?;

        for (i, grid) in bands.iter().enumerate() {
            if grid.message.is_empty() {
                return Err(RasterError::MissingData {
                    band: i + 1,
                    reason: "no encoded GRIB2 message attached".to_string(),
                });
            }
            out.write_all(&grid.message)?;
            debug!(band = i + 1, bytes = grid.message.len(), "Appended GRIB2 message");
        }
        out.flush()?;
        Ok(())
    }
}

impl RasterEncoder for Grib2ConcatEncoder {
    fn name(&self) -> &'static str {
        "grib2"
    }

    fn extension(&self) -> &'static str {
        "grb2"
    }

    fn encode(&self, bands: &[Grid], out: &mut File) -> Result<()> {
        self.write_to(bands, out)
    }
}
