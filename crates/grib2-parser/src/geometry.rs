//! Grid definition to georeferenced [`GridSpec`].
//!
//! The geotransform is derived from the first grid point and the scan
//! direction, so that the resulting spec always describes a north-up raster
//! whose samples have been passed through [`ScanMode::to_north_up`].

use merge_common::{CrsId, GeoTransform, GridSpec, ScanMode};
use projection::LambertConformal;

use crate::sections::{GridDefinition, GridProjection};
use crate::Grib2Error;

/// Longitudes above 180 are folded into [-180, 180].
pub fn normalize_longitude(lon: f64) -> f64 {
    if lon > 180.0 {
        lon - 360.0
    } else {
        lon
    }
}

pub fn grid_spec(def: &GridDefinition) -> Result<GridSpec, Grib2Error> {
    let nx = def.nx as usize;
    let ny = def.ny as usize;
    if nx == 0 || ny == 0 {
        return Err(Grib2Error::Geometry(format!("empty grid {}x{}", nx, ny)));
    }
    let scan = ScanMode::from_grib2_flag(def.scanning_mode);

    let (first_x, first_y, dx, dy, crs) = match &def.projection {
        GridProjection::LatLon {
            la1, lo1, di, dj, ..
        } => (
            normalize_longitude(*lo1),
            *la1,
            *di,
            *dj,
            CrsId::geographic(def.earth.radius),
        ),
        GridProjection::LambertConformal {
            la1,
            lo1,
            lad,
            lov,
            dx,
            dy,
            latin1,
            latin2,
            ..
        } => {
            let lov = normalize_longitude(*lov);
            let proj = LambertConformal::new(*lad, lov, *latin1, *latin2, def.earth.radius)
                .map_err(|e| Grib2Error::Geometry(e.to_string()))?;
            let (x, y) = proj.project(*la1, normalize_longitude(*lo1));
            (
                x,
                y,
                *dx,
                *dy,
                CrsId::lambert_conformal(*lad, lov, *latin1, *latin2, def.earth.radius),
            )
        }
    };

    if !(dx > 0.0 && dy > 0.0) {
        return Err(Grib2Error::Geometry(format!(
            "non-positive grid increments dx={} dy={}",
            dx, dy
        )));
    }

    // First point is south-west when j scans north, east edge when i scans west
    let top_y = if scan.j_positive {
        first_y + (ny - 1) as f64 * dy
    } else {
        first_y
    };
    let left_x = if scan.i_negative {
        first_x - (nx - 1) as f64 * dx
    } else {
        first_x
    };

    Ok(GridSpec::new(
        nx,
        ny,
        GeoTransform::from_first_center(left_x, top_y, dx, dy),
        crs,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sections::EarthShape;

    fn latlon(scanning_mode: u8) -> GridDefinition {
        GridDefinition {
            template: 0,
            num_data_points: 12,
            earth: EarthShape {
                code: 6,
                radius: 6_371_229.0,
            },
            nx: 4,
            ny: 3,
            scanning_mode,
            projection: GridProjection::LatLon {
                la1: 40.0,
                lo1: 250.0,
                la2: 42.0,
                lo2: 253.0,
                di: 1.0,
                dj: 1.0,
            },
        }
    }

    #[test]
    fn test_latlon_north_scanning() {
        let spec = grid_spec(&latlon(0x40)).unwrap();
        assert_eq!((spec.width, spec.height), (4, 3));
        // First point is the south-west corner; top row centre is 42N
        assert_eq!(spec.geotransform.origin_x, -110.5);
        assert_eq!(spec.geotransform.origin_y, 42.5);
        assert_eq!(spec.geotransform.pixel_height, -1.0);
    }

    #[test]
    fn test_latlon_south_scanning() {
        let spec = grid_spec(&latlon(0x00)).unwrap();
        assert_eq!(spec.geotransform.origin_y, 40.5);
    }

    #[test]
    fn test_lambert_origin_is_projected_first_point() {
        let def = GridDefinition {
            template: 30,
            num_data_points: 4,
            earth: EarthShape {
                code: 6,
                radius: 6_371_229.0,
            },
            nx: 2,
            ny: 2,
            scanning_mode: 0x40,
            projection: GridProjection::LambertConformal {
                la1: 25.0,
                lo1: 265.0,
                lad: 25.0,
                lov: 265.0,
                dx: 2540.0,
                dy: 2540.0,
                latin1: 25.0,
                latin2: 25.0,
                projection_centre: 0,
            },
        };
        let spec = grid_spec(&def).unwrap();
        // First point sits on the projection origin, so it projects to (0, 0)
        assert!((spec.geotransform.origin_x + 1270.0).abs() < 1e-6);
        assert!((spec.geotransform.origin_y - 3810.0).abs() < 1e-6);
        assert!(spec.crs.as_str().starts_with("+proj=lcc"));
        assert!(spec.crs.as_str().contains("+lon_0=-95"));
    }

    #[test]
    fn test_zero_increment_rejected() {
        let mut def = latlon(0x40);
        def.projection = GridProjection::LatLon {
            la1: 40.0,
            lo1: 250.0,
            la2: 42.0,
            lo2: 253.0,
            di: 0.0,
            dj: 1.0,
        };
        assert!(matches!(grid_spec(&def), Err(Grib2Error::Geometry(_))));
    }
}
