//! Run configuration.
//!
//! A [`RunConfig`] is what the YAML file and CLI flags describe; a
//! [`RunRequest`] is the validated, immutable subset that drives the
//! locator. Invalid combinations are rejected here, before any I/O.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveDate;
use raster_writer::OutputFormat;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use storage::ObjectStorageConfig;

use crate::error::{MergeError, Result};

const MINUTES_PER_DAY: u32 = 24 * 60;

/// RTMA products published under `s3://noaa-rtma-pds`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatasetVariant {
    /// CONUS 2.5 km, hourly
    #[serde(rename = "rtma2p5")]
    Rtma2p5,
    /// CONUS 2.5 km rapid update, every 15 minutes
    #[serde(rename = "rtma2p5_ru")]
    Rtma2p5Ru,
    /// Alaska 3 km, hourly
    #[serde(rename = "akrtma")]
    AkRtma,
    /// Hawaii, hourly
    #[serde(rename = "hirtma")]
    HiRtma,
    /// Puerto Rico, hourly
    #[serde(rename = "prrtma")]
    PrRtma,
}

impl DatasetVariant {
    pub const ALL: [DatasetVariant; 5] = [
        DatasetVariant::Rtma2p5,
        DatasetVariant::Rtma2p5Ru,
        DatasetVariant::AkRtma,
        DatasetVariant::HiRtma,
        DatasetVariant::PrRtma,
    ];

    /// Directory and file name prefix.
    pub fn prefix(&self) -> &'static str {
        match self {
            DatasetVariant::Rtma2p5 => "rtma2p5",
            DatasetVariant::Rtma2p5Ru => "rtma2p5_ru",
            DatasetVariant::AkRtma => "akrtma",
            DatasetVariant::HiRtma => "hirtma",
            DatasetVariant::PrRtma => "prrtma",
        }
    }

    /// Native publishing interval in minutes.
    pub fn cadence_minutes(&self) -> u32 {
        match self {
            DatasetVariant::Rtma2p5Ru => 15,
            _ => 60,
        }
    }

    /// Whether cycle times carry minutes (`t1215z`) or only hours (`t12z`).
    pub fn has_minute_cycles(&self) -> bool {
        self.cadence_minutes() < 60
    }

    pub fn default_product(&self) -> &'static str {
        match self {
            DatasetVariant::AkRtma => "2dvaranl_ndfd_3p0.grb2",
            _ => "2dvaranl_ndfd.grb2",
        }
    }
}

impl fmt::Display for DatasetVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

impl FromStr for DatasetVariant {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        DatasetVariant::ALL
            .into_iter()
            .find(|d| d.prefix() == wanted)
            .ok_or_else(|| MergeError::InvalidRequest(format!("unknown dataset variant: {}", s)))
    }
}

/// Interval between consecutive bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeStep(u32);

impl TimeStep {
    pub fn minutes(minutes: u32) -> Self {
        Self(minutes)
    }

    /// Saturates; an out-of-range step is rejected by request validation.
    pub fn hours(hours: u32) -> Self {
        Self(hours.saturating_mul(60))
    }

    pub fn as_minutes(&self) -> u32 {
        self.0
    }

    pub fn as_chrono(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.0 as i64)
    }
}

impl fmt::Display for TimeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 % 60 == 0 {
            write!(f, "{}h", self.0 / 60)
        } else {
            write!(f, "{}m", self.0)
        }
    }
}

/// Accepts `15m`, `1h`, `01:30` or a bare number of minutes.
impl FromStr for TimeStep {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || MergeError::InvalidRequest(format!("invalid time step: {:?}", s));

        let minutes = if let Some(h) = s.strip_suffix('h') {
            h.trim()
                .parse::<u32>()
                .ok()
                .and_then(|h| h.checked_mul(60))
                .ok_or_else(invalid)?
        } else if let Some(m) = s.strip_suffix('m') {
            m.trim().parse::<u32>().map_err(|_| invalid())?
        } else if let Some((h, m)) = s.split_once(':') {
            let h: u32 = h.parse().map_err(|_| invalid())?;
            let m: u32 = m.parse().map_err(|_| invalid())?;
            if m >= 60 {
                return Err(invalid());
            }
            h.checked_mul(60)
                .and_then(|h| h.checked_add(m))
                .ok_or_else(invalid)?
        } else {
            s.parse::<u32>().map_err(|_| invalid())?
        };

        Ok(TimeStep(minutes))
    }
}

impl Serialize for TimeStep {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeStep {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Minutes(u32),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Minutes(m) => Ok(TimeStep(m)),
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Which GRIB2 message of a multi-message object becomes the band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterSelector {
    /// 1-based message number in file order
    Message { message: usize },
    /// First message whose parameter short name (and level, if given) matches
    Parameter {
        parameter: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        level: Option<String>,
    },
}

impl ParameterSelector {
    pub fn message(number: usize) -> Self {
        ParameterSelector::Message { message: number }
    }

    pub fn parameter(name: impl Into<String>) -> Self {
        ParameterSelector::Parameter {
            parameter: name.into(),
            level: None,
        }
    }

    pub fn with_level(self, level: impl Into<String>) -> Self {
        match self {
            ParameterSelector::Parameter { parameter, .. } => ParameterSelector::Parameter {
                parameter,
                level: Some(level.into()),
            },
            other => other,
        }
    }

    /// Does a message with this parameter and level match?
    pub fn matches(&self, parameter: &str, level: &str) -> bool {
        match self {
            ParameterSelector::Message { .. } => false,
            ParameterSelector::Parameter {
                parameter: want,
                level: want_level,
            } => {
                want.eq_ignore_ascii_case(parameter)
                    && want_level
                        .as_deref()
                        .map_or(true, |l| l.eq_ignore_ascii_case(level))
            }
        }
    }

    /// Short form used in output file names.
    pub fn label(&self) -> String {
        match self {
            ParameterSelector::Message { message } => format!("msg{}", message),
            ParameterSelector::Parameter { parameter, .. } => parameter.to_ascii_uppercase(),
        }
    }

    fn check(&self) -> Result<()> {
        match self {
            ParameterSelector::Message { message: 0 } => Err(MergeError::InvalidRequest(
                "message numbers start at 1".to_string(),
            )),
            ParameterSelector::Parameter { parameter, .. } if parameter.trim().is_empty() => Err(
                MergeError::InvalidRequest("empty parameter name".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

impl Default for ParameterSelector {
    fn default() -> Self {
        ParameterSelector::message(1)
    }
}

impl fmt::Display for ParameterSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterSelector::Message { message } => write!(f, "message:{}", message),
            ParameterSelector::Parameter {
                parameter,
                level: None,
            } => f.write_str(parameter),
            ParameterSelector::Parameter {
                parameter,
                level: Some(level),
            } => write!(f, "{}:{}", parameter, level),
        }
    }
}

/// `9` or `message:9` select by number; `TMP` or `TMP:2 m above ground` by
/// parameter.
impl FromStr for ParameterSelector {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let number = s.strip_prefix("message:").unwrap_or(s);
        let selector = if let Ok(n) = number.trim().parse::<usize>() {
            ParameterSelector::message(n)
        } else {
            match s.split_once(':') {
                Some((name, level)) => {
                    ParameterSelector::parameter(name.trim()).with_level(level.trim())
                }
                None => ParameterSelector::parameter(s),
            }
        };
        selector.check()?;
        Ok(selector)
    }
}

/// Validated description of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    date: NaiveDate,
    dataset: DatasetVariant,
    time_step: TimeStep,
    selector: ParameterSelector,
    product: String,
}

impl RunRequest {
    pub fn new(
        date: NaiveDate,
        dataset: DatasetVariant,
        time_step: TimeStep,
        selector: ParameterSelector,
    ) -> Result<Self> {
        let request = Self {
            date,
            dataset,
            time_step,
            selector,
            product: dataset.default_product().to_string(),
        };
        request.check()?;
        Ok(request)
    }

    /// Override the product file name suffix.
    pub fn with_product(mut self, product: impl Into<String>) -> Result<Self> {
        let product = product.into();
        if product.trim().is_empty() || product.contains('/') {
            return Err(MergeError::InvalidRequest(format!(
                "invalid product name: {:?}",
                product
            )));
        }
        self.product = product;
        Ok(self)
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn dataset(&self) -> DatasetVariant {
        self.dataset
    }

    pub fn time_step(&self) -> TimeStep {
        self.time_step
    }

    pub fn selector(&self) -> &ParameterSelector {
        &self.selector
    }

    pub fn product(&self) -> &str {
        &self.product
    }

    /// Number of bands in a complete run.
    pub fn expected_bands(&self) -> usize {
        (MINUTES_PER_DAY / self.time_step.as_minutes()) as usize
    }

    pub(crate) fn check(&self) -> Result<()> {
        let step = self.time_step.as_minutes();
        if step == 0 || step > MINUTES_PER_DAY || MINUTES_PER_DAY % step != 0 {
            return Err(MergeError::InvalidRequest(format!(
                "time step {} does not evenly divide 24h",
                self.time_step
            )));
        }

        let cadence = self.dataset.cadence_minutes();
        if step % cadence != 0 {
            return Err(MergeError::InvalidRequest(format!(
                "time step {} is not a multiple of the {} cadence ({}m)",
                self.time_step, self.dataset, cadence
            )));
        }

        self.selector.check()
    }
}

/// Retry settings for one object fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt, in seconds
    #[serde(default = "default_initial_delay", with = "duration_secs")]
    pub initial_delay: Duration,

    /// Backoff cap, in seconds
    #[serde(default = "default_max_delay", with = "duration_secs")]
    pub max_delay: Duration,

    /// Timeout of a single attempt, in seconds
    #[serde(default = "default_attempt_timeout", with = "duration_secs")]
    pub attempt_timeout: Duration,
}

fn default_max_attempts() -> u32 {
    4
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_attempt_timeout() -> Duration {
    Duration::from_secs(120)
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            attempt_timeout: default_attempt_timeout(),
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Where and how the merged raster is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Explicit artifact path; derived from the request when unset
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Directory for derived artifact names
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,

    #[serde(default)]
    pub format: OutputFormat,

    /// Re-read the artifact before publishing it
    #[serde(default = "default_verify")]
    pub verify: bool,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_verify() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: None,
            dir: default_output_dir(),
            format: OutputFormat::default(),
            verify: default_verify(),
        }
    }
}

/// Everything a run needs, as loaded from YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Usually supplied on the command line
    #[serde(default)]
    pub date: Option<NaiveDate>,

    #[serde(default = "default_dataset")]
    pub dataset: DatasetVariant,

    #[serde(default = "default_time_step")]
    pub time_step: TimeStep,

    #[serde(default)]
    pub selector: ParameterSelector,

    /// Product suffix override (e.g. `2dvarges_ndfd.grb2`)
    #[serde(default)]
    pub product: Option<String>,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub store: ObjectStorageConfig,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// Keep a copy of every fetched object here
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
}

fn default_dataset() -> DatasetVariant {
    DatasetVariant::Rtma2p5
}

fn default_time_step() -> TimeStep {
    TimeStep::hours(1)
}

fn default_max_concurrent_fetches() -> usize {
    4
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            date: None,
            dataset: default_dataset(),
            time_step: default_time_step(),
            selector: ParameterSelector::default(),
            product: None,
            output: OutputConfig::default(),
            store: ObjectStorageConfig::default(),
            retry: RetryPolicy::default(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            download_dir: None,
        }
    }
}

impl RunConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: RunConfig = serde_yaml::from_str(yaml)
            .map_err(|e| MergeError::Config(format!("invalid run configuration: {}", e)))?;
        config.check()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| MergeError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_yaml_str(&yaml)
    }

    /// Settings that are not part of the request itself.
    pub fn check(&self) -> Result<()> {
        if self.max_concurrent_fetches == 0 {
            return Err(MergeError::Config(
                "max_concurrent_fetches must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(MergeError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.attempt_timeout.is_zero() {
            return Err(MergeError::Config(
                "retry.attempt_timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the validated request.
    pub fn request(&self) -> Result<RunRequest> {
        let date = self
            .date
            .ok_or_else(|| MergeError::InvalidRequest("no date given".to_string()))?;
        let request = RunRequest::new(date, self.dataset, self.time_step, self.selector.clone())?;
        match &self.product {
            Some(product) => request.with_product(product.clone()),
            None => Ok(request),
        }
    }

    /// Artifact path: the explicit one, or
    /// `{dir}/{prefix}_{YYYYMMDD}_{selector}_MERGED.{ext}`.
    pub fn destination(&self, request: &RunRequest) -> PathBuf {
        if let Some(path) = &self.output.path {
            return path.clone();
        }
        let name = format!(
            "{}_{}_{}_MERGED.{}",
            request.dataset().prefix(),
            request.date().format("%Y%m%d"),
            request.selector().label(),
            self.output.format.encoder().extension()
        );
        self.output.dir.join(name)
    }
}
