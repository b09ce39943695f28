//! Object key enumeration for one 24 hour window.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Timelike, Utc};

use crate::config::RunRequest;
use crate::error::Result;

/// One source object, in the order the locator produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    pub key: String,
    /// Position in the window, from 0
    pub index: usize,
    /// Offset from 00:00 UTC of the run date
    pub offset: Duration,
    /// Cycle time the key names
    pub nominal_time: DateTime<Utc>,
}

impl ObjectKey {
    /// Last path component, used when retaining downloads.
    pub fn file_name(&self) -> &str {
        Path::new(&self.key)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.key)
    }

    pub fn is_gzipped(&self) -> bool {
        self.key.ends_with(".gz")
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Keys for every step of the request's day, ascending in time.
///
/// Offsets run from 00:00 to `24h - step`:
/// `{prefix}.{YYYYMMDD}/{prefix}.t{HH|HHMM}z.{product}`.
pub fn enumerate(request: &RunRequest) -> Result<Vec<ObjectKey>> {
    request.check()?;

    let dataset = request.dataset();
    let prefix = dataset.prefix();
    let day = request.date().format("%Y%m%d").to_string();
    let midnight = Utc.from_utc_datetime(&request.date().and_time(NaiveTime::MIN));
    let step = request.time_step().as_chrono();

    let keys = (0..request.expected_bands())
        .map(|index| {
            let offset = step * index as i32;
            let nominal_time = midnight + offset;
            let cycle = if dataset.has_minute_cycles() {
                format!("{:02}{:02}", nominal_time.hour(), nominal_time.minute())
            } else {
                format!("{:02}", nominal_time.hour())
            };
            ObjectKey {
                key: format!(
                    "{prefix}.{day}/{prefix}.t{cycle}z.{product}",
                    product = request.product()
                ),
                index,
                offset,
                nominal_time,
            }
        })
        .collect();

    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatasetVariant, ParameterSelector, TimeStep};
    use chrono::NaiveDate;

    fn request(dataset: DatasetVariant, step: TimeStep) -> RunRequest {
        RunRequest::new(
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            dataset,
            step,
            ParameterSelector::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_hourly_keys() {
        let keys = enumerate(&request(DatasetVariant::Rtma2p5, TimeStep::hours(1))).unwrap();
        assert_eq!(keys.len(), 24);
        assert_eq!(
            keys[0].key,
            "rtma2p5.20240301/rtma2p5.t00z.2dvaranl_ndfd.grb2"
        );
        assert_eq!(
            keys[13].key,
            "rtma2p5.20240301/rtma2p5.t13z.2dvaranl_ndfd.grb2"
        );
        assert_eq!(
            keys[23].nominal_time,
            Utc.with_ymd_and_hms(2024, 3, 1, 23, 0, 0).unwrap()
        );
        assert_eq!(keys[13].offset, Duration::hours(13));
        assert_eq!(keys[13].file_name(), "rtma2p5.t13z.2dvaranl_ndfd.grb2");
    }

    #[test]
    fn test_rapid_update_keys_carry_minutes() {
        let keys = enumerate(&request(DatasetVariant::Rtma2p5Ru, TimeStep::minutes(15))).unwrap();
        assert_eq!(keys.len(), 96);
        assert_eq!(
            keys[1].key,
            "rtma2p5_ru.20240301/rtma2p5_ru.t0015z.2dvaranl_ndfd.grb2"
        );
        assert_eq!(
            keys[95].key,
            "rtma2p5_ru.20240301/rtma2p5_ru.t2345z.2dvaranl_ndfd.grb2"
        );
    }

    #[test]
    fn test_alaska_product() {
        let keys = enumerate(&request(DatasetVariant::AkRtma, TimeStep::hours(6))).unwrap();
        let names: Vec<_> = keys.iter().map(|k| k.key.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "akrtma.20240301/akrtma.t00z.2dvaranl_ndfd_3p0.grb2",
                "akrtma.20240301/akrtma.t06z.2dvaranl_ndfd_3p0.grb2",
                "akrtma.20240301/akrtma.t12z.2dvaranl_ndfd_3p0.grb2",
                "akrtma.20240301/akrtma.t18z.2dvaranl_ndfd_3p0.grb2",
            ]
        );
    }

    #[test]
    fn test_indices_ascend() {
        let keys = enumerate(&request(DatasetVariant::HiRtma, TimeStep::hours(2))).unwrap();
        for (i, pair) in keys.windows(2).enumerate() {
            assert_eq!(pair[0].index, i);
            assert!(pair[0].nominal_time < pair[1].nominal_time);
        }
    }

    #[test]
    fn test_pure() {
        let r = request(DatasetVariant::PrRtma, TimeStep::hours(3));
        assert_eq!(enumerate(&r).unwrap(), enumerate(&r).unwrap());
    }
}
