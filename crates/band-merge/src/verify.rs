//! Read-back check of a written artifact.

use std::path::Path;

use bytes::Bytes;
use grib2_parser::{Grib2Reader, Grib2Tables};
use merge_common::{format_valid_time, Grid};
use raster_writer::{read_geotiff, OutputFormat};
use tracing::debug;

use crate::assembler::MergedRaster;
use crate::error::{MergeError, Result};

/// Points per axis of the sample lattice.
const LATTICE: usize = 32;
const TOLERANCE: f32 = 1e-5;

/// Re-read `path` and compare it with the raster it was written from: band
/// count, valid-time tags in order, and a fixed lattice of sample values.
pub fn verify_artifact(path: &Path, format: OutputFormat, raster: &MergedRaster) -> Result<()> {
    match format {
        OutputFormat::GeoTiff => verify_geotiff(path, raster),
        OutputFormat::Grib2 => verify_grib2(path, raster),
    }
}

fn verify_geotiff(path: &Path, raster: &MergedRaster) -> Result<()> {
    let bands = read_geotiff(path).map_err(|e| fail(format!("unreadable GeoTIFF: {}", e)))?;
    check_count(bands.len(), raster)?;

    for (i, (read, source)) in bands.iter().zip(raster.bands()).enumerate() {
        let expected = format_valid_time(&source.valid_time);
        if read.tags.valid_time != expected || read.tags.band != i + 1 {
            return Err(fail(format!(
                "band {} tagged {} #{}, expected {} #{}",
                i + 1,
                read.tags.valid_time,
                read.tags.band,
                expected,
                i + 1
            )));
        }
        if (read.width, read.height) != (source.width(), source.height()) {
            return Err(fail(format!(
                "band {} is {}x{}, expected {}x{}",
                i + 1,
                read.width,
                read.height,
                source.width(),
                source.height()
            )));
        }
        check_lattice(i + 1, source, |col, row| read.value(col, row))?;
    }

    debug!(path = %path.display(), bands = bands.len(), "Verified GeoTIFF");
    Ok(())
}

fn verify_grib2(path: &Path, raster: &MergedRaster) -> Result<()> {
    let data = std::fs::read(path).map_err(|e| fail(format!("unreadable artifact: {}", e)))?;
    let messages = Grib2Reader::new(Bytes::from(data))
        .messages()
        .map_err(|e| fail(format!("unreadable GRIB2: {}", e)))?;
    check_count(messages.len(), raster)?;

    let tables = Grib2Tables::ncep();
    for (i, (message, source)) in messages.iter().zip(raster.bands()).enumerate() {
        let grid = message
            .to_grid(&tables)
            .map_err(|e| fail(format!("band {} does not decode: {}", i + 1, e)))?;
        if grid.valid_time != source.valid_time {
            return Err(fail(format!(
                "band {} valid at {}, expected {}",
                i + 1,
                format_valid_time(&grid.valid_time),
                format_valid_time(&source.valid_time)
            )));
        }
        check_lattice(i + 1, source, |col, row| grid.value(col, row))?;
    }

    debug!(path = %path.display(), bands = messages.len(), "Verified GRIB2");
    Ok(())
}

fn check_count(found: usize, raster: &MergedRaster) -> Result<()> {
    if found != raster.len() {
        return Err(fail(format!(
            "artifact has {} bands, raster has {}",
            found,
            raster.len()
        )));
    }
    Ok(())
}

/// Up to `LATTICE` evenly spaced indices covering `0..n`, ends included.
fn lattice(n: usize) -> Vec<usize> {
    if n <= LATTICE {
        return (0..n).collect();
    }
    (0..LATTICE).map(|i| i * (n - 1) / (LATTICE - 1)).collect()
}

fn check_lattice<F>(band: usize, source: &Grid, read: F) -> Result<()>
where
    F: Fn(usize, usize) -> Option<f32>,
{
    for &row in &lattice(source.height()) {
        for &col in &lattice(source.width()) {
            let want = source.value(col, row);
            let got = read(col, row);
            let same = match (want, got) {
                (Some(a), Some(b)) if a.is_nan() || b.is_nan() => a.is_nan() && b.is_nan(),
                (Some(a), Some(b)) => (a - b).abs() <= TOLERANCE,
                _ => false,
            };
            if !same {
                return Err(fail(format!(
                    "band {} sample ({}, {}) is {:?}, expected {:?}",
                    band, col, row, got, want
                )));
            }
        }
    }
    Ok(())
}

fn fail(reason: String) -> MergeError {
    MergeError::Verification(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use merge_common::{CrsId, GeoTransform, GridSpec};
    use raster_writer::GeoTiffEncoder;
    use std::fs::File;

    fn raster(hours: &[u32]) -> MergedRaster {
        hours.iter().fold(MergedRaster::new(), |r, &h| {
            let mut samples: Vec<f32> = (0..40 * 36).map(|v| v as f32 + h as f32).collect();
            samples[7] = f32::NAN;
            let grid = Grid::new(
                GridSpec::new(
                    40,
                    36,
                    GeoTransform::new(-130.0, 50.0, 0.25, -0.25),
                    CrsId::geographic(6_371_229.0),
                ),
                Utc.with_ymd_and_hms(2024, 3, 1, h, 0, 0).unwrap(),
                "TMP",
                samples,
            )
            .unwrap();
            r.append(grid).unwrap()
        })
    }

    fn write(path: &Path, raster: &MergedRaster) {
        let mut file = File::create(path).unwrap();
        GeoTiffEncoder::new().write_to(raster.bands(), &mut file).unwrap();
    }

    #[test]
    fn test_lattice_covers_ends() {
        let idx = lattice(2145);
        assert_eq!(idx.len(), 32);
        assert_eq!(idx[0], 0);
        assert_eq!(idx[31], 2144);
        assert_eq!(lattice(5), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_matching_geotiff_passes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ok.tif");
        let r = raster(&[0, 1, 2]);
        write(&path, &r);
        verify_artifact(&path, OutputFormat::GeoTiff, &r).unwrap();
    }

    #[test]
    fn test_band_count_mismatch_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.tif");
        write(&path, &raster(&[0, 1]));
        let err = verify_artifact(&path, OutputFormat::GeoTiff, &raster(&[0, 1, 2])).unwrap_err();
        assert!(matches!(err, MergeError::Verification(_)));
    }

    #[test]
    fn test_value_mismatch_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shifted.tif");
        // Same band with its first sample nudged
        write(&path, &raster(&[1]));
        let mut expected = raster(&[1]).into_bands();
        expected[0].samples[0] += 0.5;
        let expected = MergedRaster::new().append(expected.remove(0)).unwrap();
        assert!(verify_artifact(&path, OutputFormat::GeoTiff, &expected).is_err());
    }

    #[test]
    fn test_missing_file_fails() {
        let err = verify_artifact(
            Path::new("/nonexistent/merged.tif"),
            OutputFormat::GeoTiff,
            &raster(&[0]),
        )
        .unwrap_err();
        assert!(matches!(err, MergeError::Verification(_)));
    }
}
