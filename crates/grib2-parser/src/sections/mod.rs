//! GRIB2 section parsing.
//!
//! Every function here takes the bytes of one complete message (starting at
//! the `GRIB` magic) and returns the decoded section. Sections are located by
//! walking the length-prefixed section chain after Section 0.

use crate::Grib2Error;
use bytes::Bytes;
use chrono::{DateTime, Duration, NaiveDate, Utc};

/// Section 0: Indicator Section (16 bytes)
#[derive(Debug, Clone)]
pub struct Indicator {
    pub discipline: u8,
    pub edition: u8,
    pub message_length: u64,
}

/// Section 1: Identification Section
#[derive(Debug, Clone)]
pub struct Identification {
    pub center: u16,
    pub sub_center: u16,
    pub table_version: u8,
    pub local_table_version: u8,
    pub significance_of_reference_time: u8,
    pub reference_time: DateTime<Utc>,
    pub production_status: u8,
    pub data_type: u8,
}

/// Figure of the earth from Code Table 3.2, reduced to a sphere radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EarthShape {
    pub code: u8,
    pub radius: f64,
}

impl EarthShape {
    fn from_template(gd: &[u8]) -> Result<Self, Grib2Error> {
        let code = gd[0];
        let radius = match code {
            0 => 6_367_470.0,
            1 => {
                let scale = gd[1] as i32;
                let value = read_u32(&gd[2..6]) as f64;
                value / 10f64.powi(scale)
            }
            6 => 6_371_229.0,
            8 => 6_371_200.0,
            other => {
                return Err(Grib2Error::Unsupported(format!(
                    "shape of the earth code {}",
                    other
                )))
            }
        };
        Ok(Self { code, radius })
    }
}

/// Projection-specific part of the grid definition.
#[derive(Debug, Clone, PartialEq)]
pub enum GridProjection {
    /// Template 3.0. Angles in degrees.
    LatLon {
        la1: f64,
        lo1: f64,
        la2: f64,
        lo2: f64,
        di: f64,
        dj: f64,
    },
    /// Template 3.30. Angles in degrees, increments in metres.
    LambertConformal {
        la1: f64,
        lo1: f64,
        lad: f64,
        lov: f64,
        dx: f64,
        dy: f64,
        latin1: f64,
        latin2: f64,
        projection_centre: u8,
    },
}

/// Section 3: Grid Definition Section
#[derive(Debug, Clone)]
pub struct GridDefinition {
    pub template: u16,
    pub num_data_points: u32,
    pub earth: EarthShape,
    pub nx: u32,
    pub ny: u32,
    pub scanning_mode: u8,
    pub projection: GridProjection,
}

/// Section 4: Product Definition Section
#[derive(Debug, Clone)]
pub struct ProductDefinition {
    pub template: u16,
    pub parameter_category: u8,
    pub parameter_number: u8,
    pub time_unit: u8,
    pub forecast_time: u32,
    pub level_type: u8,
    pub level_scale: i8,
    pub level_value: u32,
}

impl ProductDefinition {
    /// Forecast offset as a duration, `None` for an unknown time unit.
    pub fn forecast_offset(&self) -> Option<Duration> {
        let t = self.forecast_time as i64;
        match self.time_unit {
            0 => Some(Duration::minutes(t)),
            1 => Some(Duration::hours(t)),
            2 => Some(Duration::days(t)),
            10 => Some(Duration::hours(3 * t)),
            11 => Some(Duration::hours(6 * t)),
            12 => Some(Duration::hours(12 * t)),
            13 => Some(Duration::seconds(t)),
            _ => None,
        }
    }

    /// Level value with the scale factor applied.
    pub fn scaled_level(&self) -> f64 {
        self.level_value as f64 / 10f64.powi(self.level_scale as i32)
    }
}

/// Section 5: Data Representation Section
#[derive(Debug, Clone)]
pub struct DataRepresentation {
    pub num_data_points: u32,
    pub template: u16,
    pub reference_value: f32,
    pub binary_scale_factor: i16,
    pub decimal_scale_factor: i16,
    pub bits_per_value: u8,
    pub original_data_type: u8,
}

/// Section 6: Bitmap Section
#[derive(Debug, Clone)]
pub struct Bitmap {
    pub indicator: u8,
    pub data: Bytes,
}

impl Bitmap {
    pub fn is_present(&self) -> bool {
        self.indicator == 0
    }
}

/// Section 7: Data Section
#[derive(Debug, Clone)]
pub struct DataSection {
    pub data: Bytes,
}

// ===== Parsing Functions =====

/// Parse Section 0 (Indicator) from start of message
pub fn parse_indicator(data: &[u8]) -> Result<Indicator, Grib2Error> {
    if data.len() < 16 {
        return Err(Grib2Error::InvalidFormat(
            "Not enough data for indicator section".to_string(),
        ));
    }

    if &data[0..4] != b"GRIB" {
        return Err(Grib2Error::InvalidFormat(
            "Invalid GRIB magic bytes".to_string(),
        ));
    }

    // Octet 7 discipline, octet 8 edition, octets 9-16 total length
    let discipline = data[6];
    let edition = data[7];

    if edition != 2 {
        return Err(Grib2Error::InvalidFormat(format!(
            "Expected GRIB edition 2, got {}",
            edition
        )));
    }

    let message_length = u64::from_be_bytes([
        data[8], data[9], data[10], data[11], data[12], data[13], data[14], data[15],
    ]);

    Ok(Indicator {
        discipline,
        edition,
        message_length,
    })
}

/// Parse Section 1 (Identification)
pub fn parse_identification(data: &[u8]) -> Result<Identification, Grib2Error> {
    let sec = section_slice(data, 1)?;
    if sec.len() < 21 {
        return Err(Grib2Error::InvalidSection {
            section: 1,
            reason: "Not enough data".to_string(),
        });
    }

    let s = &sec[5..];
    let year = u16::from_be_bytes([s[7], s[8]]);
    let (month, day, hour, minute, second) = (s[9], s[10], s[11], s[12], s[13]);

    let reference_time = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
        .and_then(|date| date.and_hms_opt(hour as u32, minute as u32, second as u32))
        .ok_or_else(|| Grib2Error::InvalidSection {
            section: 1,
            reason: format!(
                "Invalid date: {}-{:02}-{:02} {:02}:{:02}:{:02}",
                year, month, day, hour, minute, second
            ),
        })?;

    Ok(Identification {
        center: u16::from_be_bytes([s[0], s[1]]),
        sub_center: u16::from_be_bytes([s[2], s[3]]),
        table_version: s[4],
        local_table_version: s[5],
        significance_of_reference_time: s[6],
        reference_time: DateTime::<Utc>::from_naive_utc_and_offset(reference_time, Utc),
        production_status: s[14],
        data_type: s[15],
    })
}

/// Parse Section 3 (Grid Definition). Templates 3.0 and 3.30 are supported.
pub fn parse_grid_definition(data: &[u8]) -> Result<GridDefinition, Grib2Error> {
    let sec = section_slice(data, 3)?;
    if sec.len() < 14 {
        return Err(Grib2Error::InvalidSection {
            section: 3,
            reason: "Not enough data".to_string(),
        });
    }

    let num_data_points = read_u32(&sec[6..10]);
    let template = u16::from_be_bytes([sec[12], sec[13]]);
    let gd = &sec[14..];

    let need = match template {
        0 => 58,
        30 => 59,
        other => {
            return Err(Grib2Error::Unsupported(format!(
                "grid definition template 3.{}",
                other
            )))
        }
    };
    if gd.len() < need {
        return Err(Grib2Error::InvalidSection {
            section: 3,
            reason: format!("Template 3.{} needs {} bytes, got {}", template, need, gd.len()),
        });
    }

    let earth = EarthShape::from_template(gd)?;
    let nx = read_u32(&gd[16..20]);
    let ny = read_u32(&gd[20..24]);

    let (projection, scanning_mode) = if template == 0 {
        let basic_angle = read_u32(&gd[24..28]);
        let subdivisions = read_u32(&gd[28..32]);
        // 0 or all-ones means the default unit of 1e-6 degree
        let unit = if basic_angle == 0 || subdivisions == u32::MAX || subdivisions == 0 {
            1e-6
        } else {
            basic_angle as f64 / subdivisions as f64
        };
        let proj = GridProjection::LatLon {
            la1: read_i32_sm(&gd[32..36]) as f64 * unit,
            lo1: read_i32_sm(&gd[36..40]) as f64 * unit,
            la2: read_i32_sm(&gd[41..45]) as f64 * unit,
            lo2: read_i32_sm(&gd[45..49]) as f64 * unit,
            di: read_u32(&gd[49..53]) as f64 * unit,
            dj: read_u32(&gd[53..57]) as f64 * unit,
        };
        (proj, gd[57])
    } else {
        let proj = GridProjection::LambertConformal {
            la1: read_i32_sm(&gd[24..28]) as f64 * 1e-6,
            lo1: read_i32_sm(&gd[28..32]) as f64 * 1e-6,
            lad: read_i32_sm(&gd[33..37]) as f64 * 1e-6,
            lov: read_i32_sm(&gd[37..41]) as f64 * 1e-6,
            dx: read_u32(&gd[41..45]) as f64 * 1e-3,
            dy: read_u32(&gd[45..49]) as f64 * 1e-3,
            projection_centre: gd[49],
            latin1: read_i32_sm(&gd[51..55]) as f64 * 1e-6,
            latin2: read_i32_sm(&gd[55..59]) as f64 * 1e-6,
        };
        (proj, gd[50])
    };

    Ok(GridDefinition {
        template,
        num_data_points,
        earth,
        nx,
        ny,
        scanning_mode,
        projection,
    })
}

/// Parse Section 4 (Product Definition). Templates 4.0 through 4.15 share
/// the layout of the leading fields read here.
pub fn parse_product_definition(data: &[u8]) -> Result<ProductDefinition, Grib2Error> {
    let sec = section_slice(data, 4)?;
    if sec.len() < 28 {
        return Err(Grib2Error::InvalidSection {
            section: 4,
            reason: "Not enough data".to_string(),
        });
    }

    let template = u16::from_be_bytes([sec[7], sec[8]]);
    if template > 15 {
        return Err(Grib2Error::Unsupported(format!(
            "product definition template 4.{}",
            template
        )));
    }

    Ok(ProductDefinition {
        template,
        parameter_category: sec[9],
        parameter_number: sec[10],
        time_unit: sec[17],
        forecast_time: read_u32(&sec[18..22]),
        level_type: sec[22],
        level_scale: sec[23] as i8,
        level_value: read_u32(&sec[24..28]),
    })
}

/// Parse Section 5 (Data Representation)
pub fn parse_data_representation(data: &[u8]) -> Result<DataRepresentation, Grib2Error> {
    let sec = section_slice(data, 5)?;
    if sec.len() < 21 {
        return Err(Grib2Error::InvalidSection {
            section: 5,
            reason: "Not enough data".to_string(),
        });
    }

    // Templates 5.0, 5.2, 5.3, 5.40 and 5.41 all open with R, E, D, nbits
    let t = &sec[11..];
    Ok(DataRepresentation {
        num_data_points: read_u32(&sec[5..9]),
        template: u16::from_be_bytes([sec[9], sec[10]]),
        reference_value: f32::from_be_bytes([t[0], t[1], t[2], t[3]]),
        binary_scale_factor: read_i16_sm(&t[4..6]),
        decimal_scale_factor: read_i16_sm(&t[6..8]),
        bits_per_value: t[8],
        original_data_type: t[9],
    })
}

/// Parse Section 6 (Bitmap). Indicator 255 means no bitmap applies.
pub fn parse_bitmap(data: &[u8]) -> Result<Bitmap, Grib2Error> {
    let sec = section_slice(data, 6)?;
    if sec.len() < 6 {
        return Err(Grib2Error::InvalidSection {
            section: 6,
            reason: "Not enough data".to_string(),
        });
    }

    let indicator = sec[5];
    if indicator != 0 && indicator != 255 {
        return Err(Grib2Error::Unsupported(format!(
            "bitmap indicator {}",
            indicator
        )));
    }

    Ok(Bitmap {
        indicator,
        data: Bytes::copy_from_slice(&sec[6..]),
    })
}

/// Parse Section 7 (Data)
pub fn parse_data_section(data: &[u8]) -> Result<DataSection, Grib2Error> {
    let sec = section_slice(data, 7)?;
    Ok(DataSection {
        data: Bytes::copy_from_slice(&sec[5..]),
    })
}

// ===== Helper Functions =====

/// Slice of one section, header included, bounded by its declared length.
fn section_slice(data: &[u8], section_num: u8) -> Result<&[u8], Grib2Error> {
    let offset = find_section(data, section_num)?;
    let len = read_u32(&data[offset..offset + 4]) as usize;
    Ok(&data[offset..offset + len])
}

/// Find a section by number within a message
fn find_section(data: &[u8], section_num: u8) -> Result<usize, Grib2Error> {
    let mut offset = 16; // After Section 0

    loop {
        if offset + 4 <= data.len() && &data[offset..offset + 4] == b"7777" {
            return Err(Grib2Error::InvalidSection {
                section: section_num,
                reason: "Reached end of message without finding section".to_string(),
            });
        }
        if offset + 5 > data.len() {
            return Err(Grib2Error::InvalidSection {
                section: section_num,
                reason: "Section not found".to_string(),
            });
        }

        let section_length = read_u32(&data[offset..offset + 4]) as usize;
        if section_length < 5 || offset + section_length > data.len() {
            return Err(Grib2Error::InvalidSection {
                section: section_num,
                reason: "Invalid section length".to_string(),
            });
        }

        if data[offset + 4] == section_num {
            return Ok(offset);
        }

        offset += section_length;
    }
}

pub(crate) fn read_u32(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

/// GRIB2 stores signed integers as sign-and-magnitude, not two's complement.
pub fn read_i32_sm(b: &[u8]) -> i32 {
    let raw = read_u32(b);
    let magnitude = (raw & 0x7FFF_FFFF) as i32;
    if raw & 0x8000_0000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

pub fn read_i16_sm(b: &[u8]) -> i16 {
    let raw = u16::from_be_bytes([b[0], b[1]]);
    let magnitude = (raw & 0x7FFF) as i16;
    if raw & 0x8000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}
