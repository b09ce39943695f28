//! GeoTIFF GeoKey directory built from a PROJ-style CRS string.
//!
//! Only the two CRS forms produced by the GRIB2 decoder are understood:
//! `+proj=longlat` and `+proj=lcc`, both on a sphere. Everything is
//! written as user-defined (32767) codes with explicit parameters, plus
//! the original PROJ string as citation.

use std::collections::HashMap;

use merge_common::CrsId;

use crate::error::{RasterError, Result};

const USER_DEFINED: u16 = 32767;
const DOUBLE_PARAMS_TAG: u16 = 34736;
const ASCII_PARAMS_TAG: u16 = 34737;

// GeoKey ids
const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GT_CITATION: u16 = 1026;
const GEOGRAPHIC_TYPE: u16 = 2048;
const GEOG_GEODETIC_DATUM: u16 = 2050;
const GEOG_ANGULAR_UNITS: u16 = 2054;
const GEOG_ELLIPSOID: u16 = 2056;
const GEOG_SEMI_MAJOR_AXIS: u16 = 2057;
const GEOG_SEMI_MINOR_AXIS: u16 = 2058;
const PROJECTED_CS_TYPE: u16 = 3072;
const PROJECTION: u16 = 3074;
const PROJ_COORD_TRANS: u16 = 3075;
const PROJ_LINEAR_UNITS: u16 = 3076;
const PROJ_STD_PARALLEL_1: u16 = 3078;
const PROJ_STD_PARALLEL_2: u16 = 3079;
const PROJ_FALSE_ORIGIN_LONG: u16 = 3084;
const PROJ_FALSE_ORIGIN_LAT: u16 = 3085;
const PROJ_FALSE_ORIGIN_EASTING: u16 = 3086;
const PROJ_FALSE_ORIGIN_NORTHING: u16 = 3087;

/// Contents of the three GeoKey tags.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoKeys {
    pub directory: Vec<u16>,
    pub doubles: Vec<f64>,
    pub ascii: String,
}

enum KeyValue {
    Short(u16),
    Double(f64),
    Ascii(String),
}

/// Split `+key=value` tokens; flags without a value map to an empty string.
fn parse_proj(crs: &str) -> HashMap<&str, &str> {
    crs.split_whitespace()
        .filter_map(|tok| tok.strip_prefix('+'))
        .map(|tok| tok.split_once('=').unwrap_or((tok, "")))
        .collect()
}

fn param(params: &HashMap<&str, &str>, crs: &CrsId, name: &str) -> Result<f64> {
    params
        .get(name)
        .and_then(|v| v.parse::<f64>().ok())
        .ok_or_else(|| RasterError::UnsupportedCrs(format!("{} lacks +{}", crs, name)))
}

pub fn geokeys_for(crs: &CrsId) -> Result<GeoKeys> {
    let params = parse_proj(crs.as_str());
    let a = param(&params, crs, "a")?;
    let b = params
        .get("b")
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(a);

    let mut keys: Vec<(u16, KeyValue)> = vec![
        (GT_RASTER_TYPE, KeyValue::Short(1)), // PixelIsArea
        (GT_CITATION, KeyValue::Ascii(crs.as_str().to_string())),
        (GEOGRAPHIC_TYPE, KeyValue::Short(USER_DEFINED)),
        (GEOG_GEODETIC_DATUM, KeyValue::Short(USER_DEFINED)),
        (GEOG_ANGULAR_UNITS, KeyValue::Short(9102)), // degree
        (GEOG_ELLIPSOID, KeyValue::Short(USER_DEFINED)),
        (GEOG_SEMI_MAJOR_AXIS, KeyValue::Double(a)),
        (GEOG_SEMI_MINOR_AXIS, KeyValue::Double(b)),
    ];

    match params.get("proj").copied() {
        Some("longlat") => {
            keys.push((GT_MODEL_TYPE, KeyValue::Short(2)));
        }
        Some("lcc") => {
            keys.push((GT_MODEL_TYPE, KeyValue::Short(1)));
            keys.extend([
                (PROJECTED_CS_TYPE, KeyValue::Short(USER_DEFINED)),
                (PROJECTION, KeyValue::Short(USER_DEFINED)),
                (PROJ_COORD_TRANS, KeyValue::Short(8)), // LambertConfConic_2SP
                (PROJ_LINEAR_UNITS, KeyValue::Short(9001)), // metre
                (PROJ_STD_PARALLEL_1, KeyValue::Double(param(&params, crs, "lat_1")?)),
                (PROJ_STD_PARALLEL_2, KeyValue::Double(param(&params, crs, "lat_2")?)),
                (PROJ_FALSE_ORIGIN_LONG, KeyValue::Double(param(&params, crs, "lon_0")?)),
                (PROJ_FALSE_ORIGIN_LAT, KeyValue::Double(param(&params, crs, "lat_0")?)),
                (PROJ_FALSE_ORIGIN_EASTING, KeyValue::Double(0.0)),
                (PROJ_FALSE_ORIGIN_NORTHING, KeyValue::Double(0.0)),
            ]);
        }
        other => {
            return Err(RasterError::UnsupportedCrs(format!(
                "projection {:?} in {}",
                other, crs
            )))
        }
    }

    keys.sort_by_key(|(id, _)| *id);

    let mut directory = vec![1, 1, 0, keys.len() as u16];
    let mut doubles = Vec::new();
    let mut ascii = String::new();
    for (id, value) in keys {
        match value {
            KeyValue::Short(v) => directory.extend([id, 0, 1, v]),
            KeyValue::Double(v) => {
                directory.extend([id, DOUBLE_PARAMS_TAG, 1, doubles.len() as u16]);
                doubles.push(v);
            }
            KeyValue::Ascii(s) => {
                let offset = ascii.len() as u16;
                ascii.push_str(&s);
                ascii.push('|');
                directory.extend([id, ASCII_PARAMS_TAG, (s.len() + 1) as u16, offset]);
            }
        }
    }

    Ok(GeoKeys {
        directory,
        doubles,
        ascii,
    })
}
