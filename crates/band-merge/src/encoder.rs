//! Atomic artifact writing.
//!
//! The raster is encoded into a temporary file beside the destination,
//! optionally verified, and renamed over the destination only when every
//! step succeeded. A temporary file that is dropped is deleted, so an
//! aborted or failed encode leaves nothing behind.

use std::path::{Path, PathBuf};

use raster_writer::OutputFormat;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::assembler::MergedRaster;
use crate::error::{MergeError, Result};
use crate::verify::verify_artifact;

#[derive(Debug, Clone, Copy)]
pub struct OutputEncoder {
    format: OutputFormat,
    verify: bool,
}

impl OutputEncoder {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            verify: true,
        }
    }

    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Write `raster` to `destination`. Blocking; run it off the async
    /// runtime.
    pub fn encode(
        &self,
        raster: &MergedRaster,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        if raster.is_empty() {
            return Err(MergeError::Encode("raster has no bands".to_string()));
        }

        let parent = match destination.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let codec = self.format.encoder();

        let mut tmp = tempfile::Builder::new()
            .prefix(".merge-")
            .suffix(".part")
            .tempfile_in(parent)
            .map_err(|e| {
                MergeError::Encode(format!("cannot write in {}: {}", parent.display(), e))
            })?;

        codec
            .encode(raster.bands(), tmp.as_file_mut())
            .map_err(|e| MergeError::Encode(e.to_string()))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| MergeError::Encode(e.to_string()))?;

        if self.verify {
            verify_artifact(tmp.path(), self.format, raster)?;
        }

        if cancel.is_cancelled() {
            return Err(MergeError::Cancelled);
        }

        tmp.persist(destination).map_err(|e| {
            MergeError::Encode(format!(
                "cannot move artifact to {}: {}",
                destination.display(),
                e.error
            ))
        })?;

        info!(
            path = %destination.display(),
            format = codec.name(),
            bands = raster.len(),
            "Wrote merged raster"
        );
        Ok(destination.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use merge_common::{CrsId, GeoTransform, Grid, GridSpec};
    use raster_writer::read_geotiff;

    fn raster() -> MergedRaster {
        (0..3).fold(MergedRaster::new(), |r, h| {
            let grid = Grid::new(
                GridSpec::new(
                    6,
                    4,
                    GeoTransform::new(-100.0, 40.0, 0.5, -0.5),
                    CrsId::geographic(6_371_229.0),
                ),
                Utc.with_ymd_and_hms(2024, 3, 1, h, 0, 0).unwrap(),
                "TMP",
                vec![h as f32; 24],
            )
            .unwrap();
            r.append(grid).unwrap()
        })
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_writes_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("merged.tif");
        let path = OutputEncoder::new(OutputFormat::GeoTiff)
            .encode(&raster(), &dest, &CancellationToken::new())
            .unwrap();

        assert_eq!(path, dest);
        assert_eq!(entries(dir.path()), vec!["merged.tif"]);
        assert_eq!(read_geotiff(&dest).unwrap().len(), 3);
    }

    #[test]
    fn test_empty_raster_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = OutputEncoder::new(OutputFormat::GeoTiff)
            .encode(
                &MergedRaster::new(),
                &dir.path().join("merged.tif"),
                &CancellationToken::new(),
            )
            .unwrap_err();
        assert!(matches!(err, MergeError::Encode(_)));
        assert!(entries(dir.path()).is_empty());
    }

    #[test]
    fn test_unwritable_destination() {
        let dir = tempfile::tempdir().unwrap();
        let err = OutputEncoder::new(OutputFormat::GeoTiff)
            .encode(
                &raster(),
                &dir.path().join("missing/merged.tif"),
                &CancellationToken::new(),
            )
            .unwrap_err();
        assert!(matches!(err, MergeError::Encode(_)));
    }

    #[test]
    fn test_cancelled_encode_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = OutputEncoder::new(OutputFormat::GeoTiff)
            .encode(&raster(), &dir.path().join("merged.tif"), &cancel)
            .unwrap_err();
        assert_eq!(err, MergeError::Cancelled);
        assert!(entries(dir.path()).is_empty());
    }

    #[test]
    fn test_existing_artifact_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("merged.tif");
        std::fs::write(&dest, b"stale").unwrap();

        OutputEncoder::new(OutputFormat::GeoTiff)
            .with_verify(false)
            .encode(&raster(), &dest, &CancellationToken::new())
            .unwrap();
        assert_eq!(read_geotiff(&dest).unwrap().len(), 3);
    }
}
