//! Reader tests against synthetic messages from `test_utils::Grib2Builder`.

use bytes::Bytes;
use chrono::{TimeZone, Utc};
use grib2_parser::sections::GridProjection;
use grib2_parser::{Grib2Error, Grib2Message, Grib2Reader, Grib2Tables};
use test_utils::{
    assert_approx_eq, concat_messages, create_grid_with_nans, create_temperature_grid,
    require_test_file, Grib2Builder,
};

fn read_single(bytes: Vec<u8>) -> Grib2Message {
    let mut reader = Grib2Reader::new(Bytes::from(bytes));
    let msg = reader
        .next_message()
        .expect("Should parse")
        .expect("Should have message");
    assert!(reader.next_message().unwrap().is_none());
    msg
}

#[test]
fn test_lambert_sections_decode() {
    let msg = read_single(Grib2Builder::new_rtma().with_gradient(270.0, 300.0).build());

    assert_eq!(msg.indicator.discipline, 0);
    assert_eq!(msg.identification.center, 7);
    assert_eq!(msg.grid_definition.template, 30);
    assert_eq!(msg.grid_dims(), (8, 6));
    assert_eq!(msg.grid_definition.earth.radius, 6_371_229.0);

    match msg.grid_definition.projection {
        GridProjection::LambertConformal {
            la1,
            lo1,
            lad,
            lov,
            dx,
            latin1,
            ..
        } => {
            assert_approx_eq!(la1, 19.229, 1e-9);
            assert_approx_eq!(lo1, 233.723448, 1e-9);
            assert_approx_eq!(lad, 25.0, 1e-9);
            assert_approx_eq!(lov, 265.0, 1e-9);
            assert_approx_eq!(dx, 2539.703, 1e-9);
            assert_approx_eq!(latin1, 25.0, 1e-9);
        }
        ref other => panic!("expected Lambert projection, got {:?}", other),
    }
}

#[test]
fn test_parameter_and_level_names() {
    let msg = read_single(
        Grib2Builder::new_rtma()
            .with_parameter(0, 6)
            .with_level(103, 2)
            .build(),
    );
    assert_eq!(msg.parameter(), "DPT");
    assert_eq!(msg.level(), "2 m above ground");

    let mut tables = Grib2Tables::new();
    tables.add_parameter(0, 0, 6, "DEWPOINT".to_string());
    assert_eq!(msg.parameter_with(&tables), "DEWPOINT");
}

#[test]
fn test_valid_time_adds_forecast_offset() {
    let msg = read_single(
        Grib2Builder::new_rtma()
            .with_reference_time(2024, 3, 1, 12, 0)
            .with_forecast(0, 15)
            .build(),
    );
    assert_eq!(
        msg.valid_time().unwrap(),
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 15, 0).unwrap()
    );
}

#[test]
fn test_unknown_time_unit_is_unsupported() {
    let msg = read_single(Grib2Builder::new_rtma().with_forecast(254, 1).build());
    assert!(matches!(msg.valid_time(), Err(Grib2Error::Unsupported(_))));
}

#[test]
fn test_to_grid_returns_north_up_samples() {
    let values = create_temperature_grid(8, 6);
    let msg = read_single(
        Grib2Builder::new_rtma()
            .with_data_north_up(values.clone())
            .build(),
    );

    let grid = msg.to_grid(&Grib2Tables::ncep()).unwrap();
    assert_eq!(grid.width(), 8);
    assert_eq!(grid.height(), 6);
    assert_eq!(grid.parameter, "TMP");
    assert!(grid.nodata.is_none());
    for (got, want) in grid.samples.iter().zip(&values) {
        assert_approx_eq!(*got, *want, 1e-3);
    }
    assert_eq!(grid.message.len(), msg.raw.len());
}

#[test]
fn test_bitmap_holes_become_nan() {
    let mut values = create_grid_with_nans(10, 10, &[(3, 4)]);
    values[0] = 5.0;
    let msg = read_single(Grib2Builder::new_latlon().with_data_north_up(values).build());

    let grid = msg.to_grid(&Grib2Tables::ncep()).unwrap();
    assert!(grid.value(3, 4).unwrap().is_nan());
    assert_approx_eq!(grid.value(0, 0).unwrap(), 5.0, 1e-3);
    assert!(grid.nodata.unwrap().is_nan());
}

#[test]
fn test_latlon_geotransform() {
    let msg = read_single(Grib2Builder::new_latlon().build());
    let spec = msg.grid_spec().unwrap();

    // First point 45N 230E, scanning south
    assert_approx_eq!(spec.geotransform.origin_x, -130.5, 1e-9);
    assert_approx_eq!(spec.geotransform.origin_y, 45.5, 1e-9);
    assert_eq!(spec.geotransform.pixel_width, 1.0);
    assert_eq!(spec.geotransform.pixel_height, -1.0);
    assert!(spec.crs.as_str().starts_with("+proj=longlat"));
}

#[test]
fn test_negative_first_point_roundtrips() {
    let msg = read_single(Grib2Builder::new_latlon().with_first_point(-10.5, -20.25).build());
    match msg.grid_definition.projection {
        GridProjection::LatLon { la1, lo1, .. } => {
            assert_approx_eq!(la1, -10.5, 1e-9);
            assert_approx_eq!(lo1, -20.25, 1e-9);
        }
        ref other => panic!("expected lat/lon projection, got {:?}", other),
    }
}

#[test]
fn test_multiple_messages_in_order() {
    let file = concat_messages(&[
        Grib2Builder::new_rtma().with_parameter(0, 0).build(),
        Grib2Builder::new_rtma().with_parameter(0, 6).build(),
        Grib2Builder::new_rtma().with_parameter(2, 0).build(),
    ]);

    let messages = Grib2Reader::new(Bytes::from(file)).messages().unwrap();
    let names: Vec<_> = messages.iter().map(|m| m.parameter()).collect();
    assert_eq!(names, vec!["TMP", "DPT", "WDIR"]);
}

#[test]
fn test_leading_garbage_is_skipped() {
    let mut file = b"junk before".to_vec();
    file.extend(Grib2Builder::new_rtma().build());
    let messages = Grib2Reader::new(Bytes::from(file)).messages().unwrap();
    assert_eq!(messages.len(), 1);
}

#[test]
fn test_truncated_message_is_error() {
    let mut bytes = Grib2Builder::new_rtma().with_gradient(0.0, 10.0).build();
    bytes.truncate(bytes.len() - 10);
    let mut reader = Grib2Reader::new(Bytes::from(bytes));
    assert!(matches!(
        reader.next_message(),
        Err(Grib2Error::InvalidFormat(_))
    ));
}

#[test]
fn test_empty_input_has_no_messages() {
    let mut reader = Grib2Reader::new(Bytes::new());
    assert!(reader.next_message().unwrap().is_none());
}

#[test]
fn test_unsupported_earth_shape() {
    let bytes = Grib2Builder::new_rtma().with_earth_shape(3).build();
    let mut reader = Grib2Reader::new(Bytes::from(bytes));
    assert!(matches!(
        reader.next_message(),
        Err(Grib2Error::Unsupported(_))
    ));
}

#[test]
fn test_forecast_offset_past_the_calendar_is_an_error() {
    let msg = read_single(Grib2Builder::new_rtma().with_forecast(12, u32::MAX).build());
    assert!(matches!(
        msg.valid_time(),
        Err(Grib2Error::InvalidSection { section: 4, .. })
    ));
    assert!(msg.to_grid(&Grib2Tables::ncep()).is_err());

    let msg = read_single(Grib2Builder::new_rtma().with_forecast(1, 6).build());
    assert_eq!(
        msg.valid_time().unwrap(),
        Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap()
    );
}

#[test]
fn test_real_rtma_file() {
    let path = require_test_file!("rtma2p5_ru.t1200z.2dvaranl_ndfd.grb2");
    let data = std::fs::read(path).unwrap();
    let messages = Grib2Reader::new(Bytes::from(data)).messages().unwrap();
    assert!(!messages.is_empty());

    let grid = messages[0].to_grid(&Grib2Tables::ncep()).unwrap();
    assert_eq!((grid.width(), grid.height()), (2145, 1377));
}
