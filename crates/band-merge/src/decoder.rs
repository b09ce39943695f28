//! Raw object bytes to a single band.

use std::io::Read;

use bytes::Bytes;
use grib2_parser::{Grib2Message, Grib2Reader, Grib2Tables};
use merge_common::Grid;
use tracing::{debug, warn};

use crate::config::ParameterSelector;
use crate::error::MalformedInput;
use crate::locator::ObjectKey;

/// Turns the bytes of one object into the selected band.
pub trait GridDecoder: Send + Sync {
    fn decode(
        &self,
        key: &ObjectKey,
        bytes: Bytes,
        selector: &ParameterSelector,
    ) -> Result<Grid, MalformedInput>;
}

/// GRIB2 decoder; gunzips `.gz` keys first.
#[derive(Debug, Clone)]
pub struct Grib2GridDecoder {
    tables: Grib2Tables,
}

impl Default for Grib2GridDecoder {
    fn default() -> Self {
        Self::new(Grib2Tables::ncep())
    }
}

impl Grib2GridDecoder {
    pub fn new(tables: Grib2Tables) -> Self {
        Self { tables }
    }

    fn select(
        &self,
        key: &ObjectKey,
        data: Bytes,
        selector: &ParameterSelector,
    ) -> Result<Grib2Message, MalformedInput> {
        let malformed = |reason: String| MalformedInput {
            key: key.key.clone(),
            reason,
        };
        let mut reader = Grib2Reader::new(data);

        match selector {
            ParameterSelector::Message { message } => {
                let mut seen = 0;
                while let Some(msg) = reader.next_message().map_err(|e| malformed(e.to_string()))? {
                    seen += 1;
                    if seen == *message {
                        return Ok(msg);
                    }
                }
                Err(malformed(format!(
                    "message {} requested but object holds {}",
                    message, seen
                )))
            }
            ParameterSelector::Parameter { .. } => {
                let mut selected = None;
                let mut matches = 0;
                while let Some(msg) = reader.next_message().map_err(|e| malformed(e.to_string()))? {
                    let parameter = msg.parameter_with(&self.tables);
                    let level = msg.level_with(&self.tables);
                    if selector.matches(&parameter, &level) {
                        matches += 1;
                        if selected.is_none() {
                            selected = Some(msg);
                        }
                    }
                }
                if matches > 1 {
                    debug!(
                        key = %key.key,
                        matches,
                        "Several messages match the selector, using the first"
                    );
                }
                selected.ok_or_else(|| malformed(format!("no message matches {}", selector)))
            }
        }
    }
}

impl GridDecoder for Grib2GridDecoder {
    fn decode(
        &self,
        key: &ObjectKey,
        bytes: Bytes,
        selector: &ParameterSelector,
    ) -> Result<Grid, MalformedInput> {
        let data = if key.is_gzipped() {
            decompress_gzip(&bytes).map_err(|reason| MalformedInput {
                key: key.key.clone(),
                reason,
            })?
        } else {
            bytes
        };

        let message = self.select(key, data, selector)?;
        let grid = message
            .to_grid(&self.tables)
            .map_err(|e| MalformedInput {
                key: key.key.clone(),
                reason: e.to_string(),
            })?
            .with_source_key(key.key.clone());

        if grid.valid_time != key.nominal_time {
            warn!(
                key = %key.key,
                valid_time = %grid.valid_time,
                nominal_time = %key.nominal_time,
                "Decoded valid time differs from the cycle named by the key"
            );
        }

        debug!(
            key = %key.key,
            parameter = %grid.parameter,
            level = %grid.level,
            width = grid.width(),
            height = grid.height(),
            "Decoded band"
        );
        Ok(grid)
    }
}

pub fn decompress_gzip(data: &[u8]) -> Result<Bytes, String> {
    let mut decoder = flate2::read::GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| format!("gzip: {}", e))?;
    Ok(Bytes::from(decompressed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use test_utils::{concat_messages, Grib2Builder};

    fn key(name: &str) -> ObjectKey {
        ObjectKey {
            key: name.to_string(),
            index: 0,
            offset: Duration::zero(),
            nominal_time: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
        }
    }

    fn three_parameters() -> Bytes {
        Bytes::from(concat_messages(&[
            Grib2Builder::new_rtma().with_parameter(0, 0).build(),
            Grib2Builder::new_rtma()
                .with_parameter(0, 6)
                .with_constant_value(5.0)
                .build(),
            Grib2Builder::new_rtma()
                .with_parameter(0, 6)
                .with_level(1, 0)
                .build(),
        ]))
    }

    #[test]
    fn test_select_by_message_number() {
        let grid = Grib2GridDecoder::default()
            .decode(&key("a.grb2"), three_parameters(), &ParameterSelector::message(2))
            .unwrap();
        assert_eq!(grid.parameter, "DPT");
        assert_eq!(grid.source_key, "a.grb2");
        assert!(!grid.message.is_empty());
    }

    #[test]
    fn test_message_number_out_of_range() {
        let err = Grib2GridDecoder::default()
            .decode(&key("a.grb2"), three_parameters(), &ParameterSelector::message(4))
            .unwrap_err();
        assert!(err.reason.contains("holds 3"));
    }

    #[test]
    fn test_select_first_parameter_match() {
        let grid = Grib2GridDecoder::default()
            .decode(&key("a.grb2"), three_parameters(), &ParameterSelector::parameter("DPT"))
            .unwrap();
        assert_eq!(grid.level, "2 m above ground");
        assert!((grid.samples[0] - 5.0).abs() < 1e-3);
    }

    #[test]
    fn test_select_parameter_and_level() {
        let selector = ParameterSelector::parameter("DPT").with_level("surface");
        let grid = Grib2GridDecoder::default()
            .decode(&key("a.grb2"), three_parameters(), &selector)
            .unwrap();
        assert_eq!(grid.level, "surface");
    }

    #[test]
    fn test_no_match_is_malformed() {
        let err = Grib2GridDecoder::default()
            .decode(&key("a.grb2"), three_parameters(), &ParameterSelector::parameter("GUST"))
            .unwrap_err();
        assert_eq!(err.key, "a.grb2");
    }

    #[test]
    fn test_garbage_is_malformed() {
        let err = Grib2GridDecoder::default()
            .decode(
                &key("a.grb2"),
                Bytes::from_static(b"GRIB but not really"),
                &ParameterSelector::message(1),
            )
            .unwrap_err();
        assert_eq!(err.key, "a.grb2");
    }

    #[test]
    fn test_gzipped_object() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&three_parameters()).unwrap();
        let compressed = Bytes::from(encoder.finish().unwrap());

        let grid = Grib2GridDecoder::default()
            .decode(&key("a.grb2.gz"), compressed, &ParameterSelector::message(1))
            .unwrap();
        assert_eq!(grid.parameter, "TMP");
    }

    #[test]
    fn test_decompress_gzip_invalid() {
        assert!(decompress_gzip(b"not gzip data").is_err());
    }
}
