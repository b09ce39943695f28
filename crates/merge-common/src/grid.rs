//! Grid specifications and decoded bands.

use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GridError, GridResult};

/// Affine mapping from pixel space to CRS coordinates.
///
/// `origin_x`/`origin_y` locate the outer corner of the top-left pixel;
/// `pixel_height` is negative for north-up rasters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// Build a north-up transform from the centre of the top-left pixel.
    pub fn from_first_center(center_x: f64, center_y: f64, dx: f64, dy: f64) -> Self {
        Self {
            origin_x: center_x - dx / 2.0,
            origin_y: center_y + dy / 2.0,
            pixel_width: dx,
            pixel_height: -dy,
        }
    }

    /// GDAL ordering: `[x0, dx, row_rot, y0, col_rot, dy]`.
    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            0.0,
            self.origin_y,
            0.0,
            self.pixel_height,
        ]
    }

    /// Exact equality on every component, `-0.0 != 0.0` included.
    pub fn bit_eq(&self, other: &Self) -> bool {
        self.origin_x.to_bits() == other.origin_x.to_bits()
            && self.origin_y.to_bits() == other.origin_y.to_bits()
            && self.pixel_width.to_bits() == other.pixel_width.to_bits()
            && self.pixel_height.to_bits() == other.pixel_height.to_bits()
    }

    fn check(&self) -> GridResult<()> {
        let parts = [
            self.origin_x,
            self.origin_y,
            self.pixel_width,
            self.pixel_height,
        ];
        if parts.iter().any(|v| !v.is_finite()) {
            return Err(GridError::InvalidGeoTransform(format!(
                "non-finite component in {}",
                self
            )));
        }
        if self.pixel_width == 0.0 || self.pixel_height == 0.0 {
            return Err(GridError::InvalidGeoTransform(format!(
                "zero pixel size in {}",
                self
            )));
        }
        Ok(())
    }
}

impl fmt::Display for GeoTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "origin=({}, {}) pixel=({}, {})",
            self.origin_x, self.origin_y, self.pixel_width, self.pixel_height
        )
    }
}

/// Coordinate reference identifier.
///
/// Stored as a PROJ string so that two grids compare equal only when every
/// projection parameter, earth shape included, is identical.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CrsId(String);

impl CrsId {
    pub fn new(definition: impl Into<String>) -> Self {
        Self(definition.into())
    }

    /// Geographic lat/lon on a sphere of the given radius.
    pub fn geographic(earth_radius: f64) -> Self {
        Self(format!(
            "+proj=longlat +a={} +b={} +no_defs",
            earth_radius, earth_radius
        ))
    }

    /// Lambert conformal conic on a sphere.
    pub fn lambert_conformal(
        lat_0: f64,
        lon_0: f64,
        lat_1: f64,
        lat_2: f64,
        earth_radius: f64,
    ) -> Self {
        Self(format!(
            "+proj=lcc +lat_0={} +lon_0={} +lat_1={} +lat_2={} +x_0=0 +y_0=0 +a={} +b={} +units=m +no_defs",
            lat_0, lon_0, lat_1, lat_2, earth_radius, earth_radius
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CrsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The spatial footprint of a grid: everything the merge requires to be
/// identical across bands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    /// Number of columns
    pub width: usize,
    /// Number of rows
    pub height: usize,
    pub geotransform: GeoTransform,
    pub crs: CrsId,
}

impl GridSpec {
    pub fn new(width: usize, height: usize, geotransform: GeoTransform, crs: CrsId) -> Self {
        Self {
            width,
            height,
            geotransform,
            crs,
        }
    }

    /// Total number of grid points.
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    /// Check if grid is empty.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// One decoded band.
///
/// Samples are row-major, north-up, west to east, regardless of the scan
/// order of the message they were decoded from.
#[derive(Debug, Clone)]
pub struct Grid {
    pub spec: GridSpec,
    pub valid_time: DateTime<Utc>,
    /// Parameter short name (e.g. "TMP")
    pub parameter: String,
    /// Level description (e.g. "2 m above ground")
    pub level: String,
    pub samples: Vec<f32>,
    pub nodata: Option<f32>,
    /// Object key the grid was fetched from
    pub source_key: String,
    /// The encoded message the samples were unpacked from
    pub message: Bytes,
}

impl Grid {
    pub fn new(
        spec: GridSpec,
        valid_time: DateTime<Utc>,
        parameter: impl Into<String>,
        samples: Vec<f32>,
    ) -> GridResult<Self> {
        if spec.is_empty() {
            return Err(GridError::Empty {
                width: spec.width,
                height: spec.height,
            });
        }
        spec.geotransform.check()?;
        if samples.len() != spec.len() {
            return Err(GridError::SampleCount {
                width: spec.width,
                height: spec.height,
                expected: spec.len(),
                actual: samples.len(),
            });
        }

        Ok(Self {
            spec,
            valid_time,
            parameter: parameter.into(),
            level: String::new(),
            samples,
            nodata: None,
            source_key: String::new(),
            message: Bytes::new(),
        })
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_nodata(mut self, nodata: Option<f32>) -> Self {
        self.nodata = nodata;
        self
    }

    pub fn with_source_key(mut self, key: impl Into<String>) -> Self {
        self.source_key = key.into();
        self
    }

    pub fn with_message(mut self, message: Bytes) -> Self {
        self.message = message;
        self
    }

    pub fn width(&self) -> usize {
        self.spec.width
    }

    pub fn height(&self) -> usize {
        self.spec.height
    }

    /// Sample at `(col, row)`, `None` outside the grid.
    pub fn value(&self, col: usize, row: usize) -> Option<f32> {
        if col >= self.spec.width || row >= self.spec.height {
            return None;
        }
        self.samples.get(row * self.spec.width + col).copied()
    }
}

/// Scan mode flags for grid data ordering.
///
/// Based on GRIB2 scanning mode (Flag Table 3.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanMode {
    /// +i direction: false = +x (east), true = -x (west)
    pub i_negative: bool,
    /// +j direction: false = -y (south), true = +y (north)
    pub j_positive: bool,
    /// Adjacent points: false = i direction, true = j direction
    pub j_consecutive: bool,
    /// Row scan direction alternates
    pub alternating_rows: bool,
}

impl ScanMode {
    /// Data starts at top-left, rows go west to east, north to south.
    pub fn standard() -> Self {
        Self {
            i_negative: false,
            j_positive: false,
            j_consecutive: false,
            alternating_rows: false,
        }
    }

    /// Create from GRIB2 flag byte.
    pub fn from_grib2_flag(flag: u8) -> Self {
        Self {
            i_negative: (flag & 0x80) != 0,
            j_positive: (flag & 0x40) != 0,
            j_consecutive: (flag & 0x20) != 0,
            alternating_rows: (flag & 0x10) != 0,
        }
    }

    /// Reorder samples stored in this scan mode into north-up row-major order.
    ///
    /// `nx` is the number of points along a parallel, `ny` along a meridian.
    pub fn to_north_up(&self, samples: &[f32], nx: usize, ny: usize) -> Vec<f32> {
        let mut out = vec![f32::NAN; nx * ny];
        let line_len = if self.j_consecutive { ny } else { nx };

        for (idx, &value) in samples.iter().enumerate().take(nx * ny) {
            let line = idx / line_len;
            let mut pos = idx % line_len;
            if self.alternating_rows && line % 2 == 1 {
                pos = line_len - 1 - pos;
            }
            let (i, j) = if self.j_consecutive {
                (line, pos)
            } else {
                (pos, line)
            };

            let col = if self.i_negative { nx - 1 - i } else { i };
            let row = if self.j_positive { ny - 1 - j } else { j };
            out[row * nx + col] = value;
        }
        out
    }
}

impl Default for ScanMode {
    fn default() -> Self {
        Self::standard()
    }
}
