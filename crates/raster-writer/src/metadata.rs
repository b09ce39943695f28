//! Per-band tags stored as GDAL metadata XML (TIFF tag 42112).
//!
//! Each band becomes a set of `<Item name=".." sample="i">` entries, with
//! `sample` the 0-based band index, so GDAL and rasterio expose them as band
//! metadata. The valid time doubles as the band description.

use std::collections::BTreeMap;

use merge_common::{format_valid_time, Grid};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{RasterError, Result};

const VALID_TIME: &str = "VALID_TIME";
const PARAMETER: &str = "PARAMETER";
const LEVEL: &str = "LEVEL";
const SOURCE_KEY: &str = "SOURCE_KEY";

/// Metadata of one band.
#[derive(Debug, Clone, PartialEq)]
pub struct BandTags {
    /// 1-based position in the raster
    pub band: usize,
    /// `YYYY-MM-DDTHH:MM:SSZ`
    pub valid_time: String,
    pub parameter: String,
    pub level: String,
    pub source_key: String,
}

impl BandTags {
    pub fn for_grid(band: usize, grid: &Grid) -> Self {
        Self {
            band,
            valid_time: format_valid_time(&grid.valid_time),
            parameter: grid.parameter.clone(),
            level: grid.level.clone(),
            source_key: grid.source_key.clone(),
        }
    }
}

/// Serialize `tags` in band order.
pub(crate) fn to_xml(tags: &[BandTags]) -> Result<String> {
    let mut writer = Writer::new(Vec::new());
    writer.write_event(Event::Start(BytesStart::new("GDALMetadata")))?;

    for (sample, band) in tags.iter().enumerate() {
        let sample = sample.to_string();
        write_item(&mut writer, "DESCRIPTION", &sample, Some("description"), &band.valid_time)?;
        write_item(&mut writer, VALID_TIME, &sample, None, &band.valid_time)?;
        write_item(&mut writer, PARAMETER, &sample, None, &band.parameter)?;
        if !band.level.is_empty() {
            write_item(&mut writer, LEVEL, &sample, None, &band.level)?;
        }
        if !band.source_key.is_empty() {
            write_item(&mut writer, SOURCE_KEY, &sample, None, &band.source_key)?;
        }
    }

    writer.write_event(Event::End(BytesEnd::new("GDALMetadata")))?;
    String::from_utf8(writer.into_inner())
        .map_err(|e| RasterError::InvalidMetadata(e.to_string()))
}

fn write_item(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    sample: &str,
    role: Option<&str>,
    value: &str,
) -> Result<()> {
    let mut start = BytesStart::new("Item");
    start.push_attribute(("name", name));
    start.push_attribute(("sample", sample));
    if let Some(role) = role {
        start.push_attribute(("role", role));
    }
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Text(BytesText::new(value)))?;
    writer.write_event(Event::End(BytesEnd::new("Item")))?;
    Ok(())
}

/// Parse the tags of `samples` bands. Items without a `sample` attribute
/// belong to the dataset and are ignored.
pub(crate) fn from_xml(xml: &str, samples: usize) -> Result<Vec<BandTags>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut items: Vec<BTreeMap<String, String>> = vec![BTreeMap::new(); samples];
    let mut current: Option<(usize, String)> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"Item" => {
                let mut name = None;
                let mut sample = None;
                for attr in e.attributes() {
                    let attr = attr.map_err(|e| RasterError::InvalidMetadata(e.to_string()))?;
                    let value = attr.unescape_value()?.into_owned();
                    match attr.key.as_ref() {
                        b"name" => name = Some(value),
                        b"sample" => sample = Some(value),
                        _ => {}
                    }
                }
                current = match (name, sample) {
                    (Some(name), Some(sample)) => {
                        let index: usize = sample.parse().map_err(|_| {
                            RasterError::InvalidMetadata(format!("bad sample index {:?}", sample))
                        })?;
                        if index >= samples {
                            return Err(RasterError::InvalidMetadata(format!(
                                "item for sample {} but the image has {}",
                                index, samples
                            )));
                        }
                        Some((index, name))
                    }
                    _ => None,
                };
            }
            Event::Text(t) => {
                if let Some((index, name)) = &current {
                    items[*index].insert(name.clone(), t.unescape()?.into_owned());
                }
            }
            Event::End(e) if e.name().as_ref() == b"Item" => current = None,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    items
        .into_iter()
        .enumerate()
        .map(|(index, mut item)| {
            let valid_time = item.remove(VALID_TIME).ok_or_else(|| {
                RasterError::InvalidMetadata(format!("band {} has no valid time", index + 1))
            })?;
            Ok(BandTags {
                band: index + 1,
                valid_time,
                parameter: item.remove(PARAMETER).unwrap_or_default(),
                level: item.remove(LEVEL).unwrap_or_default(),
                source_key: item.remove(SOURCE_KEY).unwrap_or_default(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(band: usize, hour: u32) -> BandTags {
        BandTags {
            band,
            valid_time: format!("2024-03-01T{:02}:00:00Z", hour),
            parameter: "TMP".to_string(),
            level: String::new(),
            source_key: format!("rtma2p5.20240301/rtma2p5.t{:02}z.2dvaranl_ndfd.grb2", hour),
        }
    }

    #[test]
    fn test_items_are_per_sample() {
        let xml = to_xml(&[tags(1, 0), tags(2, 1)]).unwrap();
        assert!(xml.starts_with("<GDALMetadata>"));
        assert!(xml.contains(
            r#"<Item name="DESCRIPTION" sample="1" role="description">2024-03-01T01:00:00Z</Item>"#
        ));
        assert!(xml.contains(r#"<Item name="PARAMETER" sample="0">TMP</Item>"#));
        assert!(!xml.contains("LEVEL"));

        let read = from_xml(&xml, 2).unwrap();
        assert_eq!(read, vec![tags(1, 0), tags(2, 1)]);
    }

    #[test]
    fn test_escaped_values() {
        let mut band = tags(1, 0);
        band.level = "0 <-> 10 cm & below".to_string();
        let xml = to_xml(&[band.clone()]).unwrap();
        assert!(xml.contains("&lt;-&gt;"));
        assert_eq!(from_xml(&xml, 1).unwrap()[0].level, band.level);
    }

    #[test]
    fn test_dataset_items_ignored() {
        let xml = r#"<GDALMetadata>
            <Item name="AREA_OR_POINT">Area</Item>
            <Item name="VALID_TIME" sample="0">2024-03-01T00:00:00Z</Item>
        </GDALMetadata>"#;
        let read = from_xml(xml, 1).unwrap();
        assert_eq!(read[0].valid_time, "2024-03-01T00:00:00Z");
        assert_eq!(read[0].parameter, "");
    }

    #[test]
    fn test_missing_band_or_bad_sample_rejected() {
        let xml = r#"<GDALMetadata><Item name="VALID_TIME" sample="0">x</Item></GDALMetadata>"#;
        assert!(matches!(
            from_xml(xml, 2),
            Err(RasterError::InvalidMetadata(_))
        ));
        let xml = r#"<GDALMetadata><Item name="VALID_TIME" sample="5">x</Item></GDALMetadata>"#;
        assert!(from_xml(xml, 1).is_err());
    }
}
