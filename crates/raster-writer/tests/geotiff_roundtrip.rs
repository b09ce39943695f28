use std::fs::File;

use chrono::{Duration, TimeZone, Utc};
use merge_common::{CrsId, GeoTransform, Grid, GridSpec};
use raster_writer::{read_geotiff, GeoTiffEncoder, OutputFormat, RasterEncoder, RasterError};
use test_utils::{create_band_values, create_grid_with_nans, temp_test_dir};

const WIDTH: usize = 16;
const HEIGHT: usize = 12;

fn spec() -> GridSpec {
    GridSpec::new(
        WIDTH,
        HEIGHT,
        GeoTransform::from_first_center(-2_763_204.5, 1_571_148.0, 2539.703, 2539.703),
        CrsId::lambert_conformal(25.0, -95.0, 25.0, 25.0, 6_371_229.0),
    )
}

fn band(index: usize) -> Grid {
    let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    Grid::new(
        spec(),
        t0 + Duration::hours(index as i64),
        "TMP",
        create_band_values(WIDTH, HEIGHT, index),
    )
    .unwrap()
    .with_level("2 m above ground")
    .with_source_key(format!("rtma2p5.20240301/rtma2p5.t{:02}z.2dvaranl_ndfd.grb2", index))
}

#[test]
fn test_valid_time_tags_in_file_order() {
    let dir = temp_test_dir();
    let path = dir.path().join("merged.tif");
    let bands = vec![band(0), band(1), band(2)];

    let mut file = File::create(&path).unwrap();
    GeoTiffEncoder::new().encode(&bands, &mut file).unwrap();
    drop(file);

    let read = read_geotiff(&path).unwrap();
    let times: Vec<_> = read.iter().map(|b| b.tags.valid_time.as_str()).collect();
    assert_eq!(
        times,
        vec![
            "2024-03-01T00:00:00Z",
            "2024-03-01T01:00:00Z",
            "2024-03-01T02:00:00Z"
        ]
    );

    let indices: Vec<_> = read.iter().map(|b| b.tags.band).collect();
    assert_eq!(indices, vec![1, 2, 3]);
    assert_eq!(read[2].tags.level, "2 m above ground");
    assert_eq!(read[2].samples, bands[2].samples);
}

#[test]
fn test_nan_samples_survive() {
    let dir = temp_test_dir();
    let path = dir.path().join("holes.tif");
    let grid = Grid::new(
        spec(),
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
        "TMP",
        create_grid_with_nans(WIDTH, HEIGHT, &[(2, 3)]),
    )
    .unwrap()
    .with_nodata(Some(f32::NAN));

    let mut file = File::create(&path).unwrap();
    GeoTiffEncoder::new().encode(&[grid], &mut file).unwrap();
    drop(file);

    let read = read_geotiff(&path).unwrap();
    assert!(read[0].value(2, 3).unwrap().is_nan());
    assert_eq!(read[0].value(0, 0), Some(0.0));
}

#[test]
fn test_mismatched_bands_rejected() {
    let dir = temp_test_dir();
    let mut other = band(1);
    other.spec.geotransform.origin_x += 1.0;

    let mut file = File::create(dir.path().join("bad.tif")).unwrap();
    let err = GeoTiffEncoder::new()
        .encode(&[band(0), other], &mut file)
        .unwrap_err();
    assert!(matches!(err, RasterError::InconsistentBands { band: 2, .. }));
}

#[test]
fn test_grib2_format_requires_messages() {
    let dir = temp_test_dir();
    let mut file = File::create(dir.path().join("merged.grb2")).unwrap();
    let err = OutputFormat::Grib2
        .encoder()
        .encode(&[band(0)], &mut file)
        .unwrap_err();
    assert!(matches!(err, RasterError::MissingData { band: 1, .. }));
}
