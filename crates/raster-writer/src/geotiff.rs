//! Multi-band GeoTIFF codec.
//!
//! The raster is one image directory with a 32-bit float sample per band
//! and `PlanarConfiguration = 2`, each band stored as a single uncompressed
//! strip. Georeferencing (pixel scale, tiepoint, GeoKeys) is shared by all
//! bands; per-band tags live in the GDAL metadata tag.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

use merge_common::Grid;
use tiff::decoder::Decoder;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;
use tracing::debug;

use crate::error::{RasterError, Result};
use crate::geokeys::geokeys_for;
use crate::metadata::{self, BandTags};
use crate::{check_bands, RasterEncoder};

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GEO_DOUBLE_PARAMS: u16 = 34736;
const GEO_ASCII_PARAMS: u16 = 34737;
const GDAL_METADATA: u16 = 42112;
const GDAL_NODATA: u16 = 42113;

const NO_COMPRESSION: u16 = 1;
const BLACK_IS_ZERO: u16 = 1;
const PLANAR: u16 = 2;
const IEEE_FLOAT: u16 = 3;
const UNSPECIFIED_EXTRA: u16 = 0;

/// One band read back from a GeoTIFF.
#[derive(Debug, Clone)]
pub struct GeoTiffBand {
    pub width: usize,
    pub height: usize,
    pub tags: BandTags,
    pub samples: Vec<f32>,
}

impl GeoTiffBand {
    pub fn value(&self, col: usize, row: usize) -> Option<f32> {
        if col >= self.width || row >= self.height {
            return None;
        }
        self.samples.get(row * self.width + col).copied()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GeoTiffEncoder;

impl GeoTiffEncoder {
    pub fn new() -> Self {
        Self
    }

    /// Write `bands` to any seekable sink.
    pub fn write_to<W: Write + Seek>(&self, bands: &[Grid], out: W) -> Result<()> {
        check_bands(bands)?;

        let first = &bands[0];
        let count = bands.len();
        let samples_per_pixel = u16::try_from(count).map_err(|_| {
            RasterError::InvalidMetadata(format!("{} bands exceed the TIFF sample limit", count))
        })?;
        let (width, height) = (first.width() as u32, first.height() as u32);
        let strip_bytes = u32::try_from(first.samples.len() * 4).map_err(|_| too_large())?;

        let [origin_x, pixel_width, _, origin_y, _, pixel_height] =
            first.spec.geotransform.to_gdal();
        let pixel_scale = [pixel_width, -pixel_height, 0.0];
        let tiepoint = [0.0, 0.0, 0.0, origin_x, origin_y, 0.0];
        let geokeys = geokeys_for(&first.spec.crs)?;

        let tags: Vec<BandTags> = bands
            .iter()
            .enumerate()
            .map(|(i, grid)| BandTags::for_grid(i + 1, grid))
            .collect();
        let gdal_metadata = metadata::to_xml(&tags)?;

        let mut encoder = TiffEncoder::new(out)?;
        let mut dir = encoder.new_directory()?;

        let mut offsets = Vec::with_capacity(count);
        for (i, grid) in bands.iter().enumerate() {
            let offset = dir.write_data(&grid.samples[..])?;
            offsets.push(u32::try_from(offset).map_err(|_| too_large())?);
            debug!(band = i + 1, valid_time = %grid.valid_time, "Wrote GeoTIFF band");
        }

        dir.write_tag(Tag::ImageWidth, width)?;
        dir.write_tag(Tag::ImageLength, height)?;
        dir.write_tag(Tag::BitsPerSample, &vec![32u16; count][..])?;
        dir.write_tag(Tag::Compression, NO_COMPRESSION)?;
        dir.write_tag(Tag::PhotometricInterpretation, BLACK_IS_ZERO)?;
        dir.write_tag(Tag::StripOffsets, &offsets[..])?;
        dir.write_tag(Tag::SamplesPerPixel, samples_per_pixel)?;
        dir.write_tag(Tag::RowsPerStrip, height)?;
        dir.write_tag(Tag::StripByteCounts, &vec![strip_bytes; count][..])?;
        dir.write_tag(Tag::PlanarConfiguration, PLANAR)?;
        if count > 1 {
            dir.write_tag(Tag::ExtraSamples, &vec![UNSPECIFIED_EXTRA; count - 1][..])?;
        }
        dir.write_tag(Tag::SampleFormat, &vec![IEEE_FLOAT; count][..])?;
        dir.write_tag(Tag::Unknown(MODEL_PIXEL_SCALE), &pixel_scale[..])?;
        dir.write_tag(Tag::Unknown(MODEL_TIEPOINT), &tiepoint[..])?;
        dir.write_tag(Tag::Unknown(GEO_KEY_DIRECTORY), &geokeys.directory[..])?;
        dir.write_tag(Tag::Unknown(GEO_DOUBLE_PARAMS), &geokeys.doubles[..])?;
        dir.write_tag(Tag::Unknown(GEO_ASCII_PARAMS), geokeys.ascii.as_str())?;
        dir.write_tag(Tag::Unknown(GDAL_METADATA), gdal_metadata.as_str())?;
        if let Some(nodata) = first.nodata {
            dir.write_tag(Tag::Unknown(GDAL_NODATA), nodata.to_string().as_str())?;
        }
        dir.finish()?;

        Ok(())
    }
}

impl RasterEncoder for GeoTiffEncoder {
    fn name(&self) -> &'static str {
        "geotiff"
    }

    fn extension(&self) -> &'static str {
        "tif"
    }

    fn encode(&self, bands: &[Grid], out: &mut File) -> Result<()> {
        self.write_to(bands, out)
    }
}

fn too_large() -> RasterError {
    RasterError::InvalidMetadata("raster exceeds the 4 GiB classic TIFF limit".to_string())
}

/// Where the bands of a planar float image live.
struct Layout {
    width: usize,
    height: usize,
    offsets: Vec<u64>,
    byte_counts: Vec<u64>,
    tags: Vec<BandTags>,
}

fn read_layout<R: Read + Seek>(reader: R) -> Result<Layout> {
    let mut decoder = Decoder::new(reader)?;
    let (width, height) = decoder.dimensions()?;
    let samples = usize::from(
        decoder
            .find_tag_unsigned::<u16>(Tag::SamplesPerPixel)?
            .unwrap_or(1),
    );

    let planar = decoder
        .find_tag_unsigned::<u16>(Tag::PlanarConfiguration)?
        .unwrap_or(1);
    if samples > 1 && planar != PLANAR {
        return Err(RasterError::InvalidMetadata(
            "interleaved samples are not supported".to_string(),
        ));
    }
    let compression = decoder
        .find_tag_unsigned::<u16>(Tag::Compression)?
        .unwrap_or(NO_COMPRESSION);
    if compression != NO_COMPRESSION {
        return Err(RasterError::InvalidMetadata(format!(
            "compression {} is not supported",
            compression
        )));
    }
    let bits = decoder.get_tag_u16_vec(Tag::BitsPerSample)?;
    let formats = decoder.get_tag_u16_vec(Tag::SampleFormat)?;
    if bits.iter().any(|&b| b != 32) || formats.iter().any(|&f| f != IEEE_FLOAT) {
        return Err(RasterError::InvalidMetadata(
            "samples are not 32-bit float".to_string(),
        ));
    }

    let offsets = decoder.get_tag_u64_vec(Tag::StripOffsets)?;
    let byte_counts = decoder.get_tag_u64_vec(Tag::StripByteCounts)?;
    if offsets.len() != samples || byte_counts.len() != samples {
        return Err(RasterError::InvalidMetadata(format!(
            "expected one strip per band, found {} strips for {} bands",
            offsets.len(),
            samples
        )));
    }

    let xml = decoder.get_tag_ascii_string(Tag::Unknown(GDAL_METADATA))?;
    let tags = metadata::from_xml(xml.trim_end_matches('\0'), samples)?;

    Ok(Layout {
        width: width as usize,
        height: height as usize,
        offsets,
        byte_counts,
        tags,
    })
}

/// Read every band of a GeoTIFF written by [`GeoTiffEncoder`].
pub fn read_geotiff(path: &Path) -> Result<Vec<GeoTiffBand>> {
    read_geotiff_from(BufReader::new(File::open(path)?))
}

pub fn read_geotiff_from<R: Read + Seek>(mut reader: R) -> Result<Vec<GeoTiffBand>> {
    let mut order = [0u8; 2];
    reader.read_exact(&mut order)?;
    let little_endian = match &order {
        b"II" => true,
        b"MM" => false,
        _ => return Err(RasterError::InvalidMetadata("not a TIFF file".to_string())),
    };
    reader.seek(SeekFrom::Start(0))?;

    let layout = read_layout(&mut reader)?;
    let expected = (layout.width * layout.height * 4) as u64;

    let mut bands = Vec::with_capacity(layout.tags.len());
    for ((offset, byte_count), tags) in layout
        .offsets
        .iter()
        .zip(&layout.byte_counts)
        .zip(layout.tags)
    {
        if *byte_count != expected {
            return Err(RasterError::InvalidMetadata(format!(
                "band {} strip holds {} bytes, expected {}",
                tags.band, byte_count, expected
            )));
        }

        let mut raw = vec![0u8; expected as usize];
        reader.seek(SeekFrom::Start(*offset))?;
        reader.read_exact(&mut raw)?;
        let samples = raw
            .chunks_exact(4)
            .map(|b| {
                let b = [b[0], b[1], b[2], b[3]];
                if little_endian {
                    f32::from_le_bytes(b)
                } else {
                    f32::from_be_bytes(b)
                }
            })
            .collect();

        bands.push(GeoTiffBand {
            width: layout.width,
            height: layout.height,
            tags,
            samples,
        });
    }

    Ok(bands)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use merge_common::{CrsId, GeoTransform, GridSpec};
    use std::io::Cursor;

    fn grid(hour: u32, fill: f32) -> Grid {
        let spec = GridSpec::new(
            3,
            2,
            GeoTransform::new(-100.0, 2000.0, 2500.0, -2500.0),
            CrsId::lambert_conformal(25.0, -95.0, 25.0, 25.0, 6371229.0),
        );
        Grid::new(
            spec,
            Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap(),
            "TMP",
            vec![fill; 6],
        )
        .unwrap()
    }

    #[test]
    fn test_roundtrip_in_memory() {
        let bands = vec![grid(0, 1.0), grid(1, 2.0)];
        let mut buf = Cursor::new(Vec::new());
        GeoTiffEncoder::new().write_to(&bands, &mut buf).unwrap();

        buf.set_position(0);
        let read = read_geotiff_from(buf).unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read[0].tags.band, 1);
        assert_eq!(read[1].tags.valid_time, "2024-03-01T01:00:00Z");
        assert_eq!((read[1].width, read[1].height), (3, 2));
        assert_eq!(read[1].samples, vec![2.0; 6]);
    }

    #[test]
    fn test_empty_rejected() {
        let mut buf = Cursor::new(Vec::new());
        assert!(matches!(
            GeoTiffEncoder::new().write_to(&[], &mut buf),
            Err(RasterError::Empty)
        ));
    }

    #[test]
    fn test_bands_are_samples_of_one_image() {
        let bands = vec![grid(0, 1.0), grid(1, 2.0), grid(2, 3.0)];
        let mut buf = Cursor::new(Vec::new());
        GeoTiffEncoder::new().write_to(&bands, &mut buf).unwrap();

        buf.set_position(0);
        let mut decoder = Decoder::new(buf).unwrap();
        assert_eq!(decoder.dimensions().unwrap(), (3, 2));
        assert_eq!(
            decoder.get_tag_unsigned::<u16>(Tag::SamplesPerPixel).unwrap(),
            3
        );
        assert_eq!(
            decoder
                .get_tag_unsigned::<u16>(Tag::PlanarConfiguration)
                .unwrap(),
            PLANAR
        );
        assert_eq!(decoder.get_tag_u16_vec(Tag::ExtraSamples).unwrap(), vec![0, 0]);
        assert!(!decoder.more_images());

        let xml = decoder
            .get_tag_ascii_string(Tag::Unknown(GDAL_METADATA))
            .unwrap();
        assert!(xml.contains(r#"<Item name="VALID_TIME" sample="2">2024-03-01T02:00:00Z</Item>"#));
    }

    #[test]
    fn test_georeferencing_follows_geotransform() {
        let mut buf = Cursor::new(Vec::new());
        GeoTiffEncoder::new()
            .write_to(&[grid(0, 1.0)], &mut buf)
            .unwrap();

        buf.set_position(0);
        let mut decoder = Decoder::new(buf).unwrap();
        assert_eq!(
            decoder
                .get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE))
                .unwrap(),
            vec![2500.0, 2500.0, 0.0]
        );
        assert_eq!(
            decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_TIEPOINT)).unwrap(),
            vec![0.0, 0.0, 0.0, -100.0, 2000.0, 0.0]
        );
        assert!(decoder.find_tag(Tag::ExtraSamples).unwrap().is_none());
    }

    #[test]
    fn test_not_a_tiff_rejected() {
        let err = read_geotiff_from(Cursor::new(b"GRIB....".to_vec())).unwrap_err();
        assert!(matches!(err, RasterError::InvalidMetadata(_)));
    }
}
