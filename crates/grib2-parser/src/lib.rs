//! GRIB2 parser (WMO FM 92 GRIB Edition 2).
//!
//! [`Grib2Reader`] walks the messages of a GRIB2 file; each [`Grib2Message`]
//! exposes its decoded sections, its valid time and a georeferenced
//! [`Grid`] with north-up samples.

pub mod geometry;
pub mod sections;
pub mod tables;
pub mod unpacking;

use std::sync::OnceLock;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use merge_common::{Grid, GridError, GridSpec, ScanMode};
use thiserror::Error;
use tracing::trace;

use sections::{
    Bitmap, DataRepresentation, DataSection, GridDefinition, Identification, Indicator,
    ProductDefinition,
};
pub use tables::{Grib2Tables, LevelDescription};

#[derive(Debug, Error)]
pub enum Grib2Error {
    #[error("Invalid GRIB2 format: {0}")]
    InvalidFormat(String),

    #[error("Invalid section {section}: {reason}")]
    InvalidSection { section: u8, reason: String },

    #[error("Unpacking failed: {0}")]
    UnpackingError(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Invalid grid geometry: {0}")]
    Geometry(String),

    #[error(transparent)]
    Grid(#[from] GridError),
}

pub type Result<T> = std::result::Result<T, Grib2Error>;

fn ncep_tables() -> &'static Grib2Tables {
    static TABLES: OnceLock<Grib2Tables> = OnceLock::new();
    TABLES.get_or_init(Grib2Tables::ncep)
}

/// One GRIB2 message with its sections decoded.
#[derive(Debug, Clone)]
pub struct Grib2Message {
    pub indicator: Indicator,
    pub identification: Identification,
    pub grid_definition: GridDefinition,
    pub product_definition: ProductDefinition,
    pub data_representation: DataRepresentation,
    pub bitmap: Bitmap,
    pub data_section: DataSection,
    /// Encoded bytes of the whole message, `GRIB` through `7777`.
    pub raw: Bytes,
}

impl Grib2Message {
    /// Decode the sections of a single complete message.
    pub fn parse(raw: Bytes) -> Result<Self> {
        let indicator = sections::parse_indicator(&raw)?;
        if indicator.message_length as usize != raw.len() {
            return Err(Grib2Error::InvalidFormat(format!(
                "message declares {} bytes, got {}",
                indicator.message_length,
                raw.len()
            )));
        }
        if !raw.ends_with(b"7777") {
            return Err(Grib2Error::InvalidFormat(
                "message does not end with 7777".to_string(),
            ));
        }

        Ok(Self {
            identification: sections::parse_identification(&raw)?,
            grid_definition: sections::parse_grid_definition(&raw)?,
            product_definition: sections::parse_product_definition(&raw)?,
            data_representation: sections::parse_data_representation(&raw)?,
            bitmap: sections::parse_bitmap(&raw)?,
            data_section: sections::parse_data_section(&raw)?,
            indicator,
            raw,
        })
    }

    /// Parameter short name from the built-in NCEP tables.
    pub fn parameter(&self) -> String {
        self.parameter_with(ncep_tables())
    }

    pub fn parameter_with(&self, tables: &Grib2Tables) -> String {
        tables.get_parameter_name(
            self.indicator.discipline,
            self.product_definition.parameter_category,
            self.product_definition.parameter_number,
        )
    }

    pub fn level(&self) -> String {
        self.level_with(ncep_tables())
    }

    pub fn level_with(&self, tables: &Grib2Tables) -> String {
        tables.get_level_description(
            self.product_definition.level_type,
            self.product_definition.scaled_level(),
        )
    }

    /// Reference time plus forecast offset.
    pub fn valid_time(&self) -> Result<DateTime<Utc>> {
        let offset = self.product_definition.forecast_offset().ok_or_else(|| {
            Grib2Error::Unsupported(format!(
                "forecast time unit {}",
                self.product_definition.time_unit
            ))
        })?;
        self.identification
            .reference_time
            .checked_add_signed(offset)
            .ok_or_else(|| Grib2Error::InvalidSection {
                section: 4,
                reason: format!(
                    "forecast time {} (unit {}) overflows the calendar",
                    self.product_definition.forecast_time, self.product_definition.time_unit
                ),
            })
    }

    pub fn grid_dims(&self) -> (usize, usize) {
        (
            self.grid_definition.nx as usize,
            self.grid_definition.ny as usize,
        )
    }

    pub fn grid_spec(&self) -> Result<GridSpec> {
        geometry::grid_spec(&self.grid_definition)
    }

    /// Unpack values in the message's own scan order. Missing points are NaN.
    pub fn unpack_data(&self) -> Result<Vec<f32>> {
        let (nx, ny) = self.grid_dims();
        let expected = nx * ny;

        let values = if self.data_representation.template == 0 {
            unpacking::unpack_simple(
                &self.data_section.data,
                expected,
                &self.data_representation,
                Some(&self.bitmap),
            )?
        } else {
            trace!(
                template = self.data_representation.template,
                "Falling back to grib crate for unpacking"
            );
            unpacking::unpack_with_grib_crate(&self.raw)?
        };

        if values.len() != expected {
            return Err(Grib2Error::UnpackingError(format!(
                "unpacked {} values for a {}x{} grid",
                values.len(),
                nx,
                ny
            )));
        }
        Ok(values)
    }

    /// Decode into a north-up [`Grid`], names resolved through `tables`.
    pub fn to_grid(&self, tables: &Grib2Tables) -> Result<Grid> {
        let spec = self.grid_spec()?;
        let scan = ScanMode::from_grib2_flag(self.grid_definition.scanning_mode);
        let samples = scan.to_north_up(&self.unpack_data()?, spec.width, spec.height);
        let nodata = self.bitmap.is_present().then_some(f32::NAN);

        Ok(Grid::new(spec, self.valid_time()?, self.parameter_with(tables), samples)?
            .with_level(self.level_with(tables))
            .with_nodata(nodata)
            .with_message(self.raw.clone()))
    }
}

/// Sequential reader over the messages of a GRIB2 file.
pub struct Grib2Reader {
    data: Bytes,
    offset: usize,
}

impl Grib2Reader {
    pub fn new(data: Bytes) -> Self {
        Self { data, offset: 0 }
    }

    /// Next message, or `None` once no further `GRIB` marker exists.
    pub fn next_message(&mut self) -> Result<Option<Grib2Message>> {
        let start = match find_magic(&self.data[self.offset.min(self.data.len())..]) {
            Some(pos) => self.offset + pos,
            None => {
                self.offset = self.data.len();
                return Ok(None);
            }
        };

        let indicator = sections::parse_indicator(&self.data[start..])?;
        let end = usize::try_from(indicator.message_length)
            .ok()
            .and_then(|len| start.checked_add(len))
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                Grib2Error::InvalidFormat(format!(
                    "message at offset {} declares {} bytes past end of data",
                    start, indicator.message_length
                ))
            })?;

        self.offset = end;
        Grib2Message::parse(self.data.slice(start..end)).map(Some)
    }

    /// Read every remaining message.
    pub fn messages(&mut self) -> Result<Vec<Grib2Message>> {
        let mut out = Vec::new();
        while let Some(msg) = self.next_message()? {
            out.push(msg);
        }
        Ok(out)
    }
}

fn find_magic(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"GRIB")
}
