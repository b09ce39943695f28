//! Band alignment and merge pipeline.
//!
//! Turns one day of single-band GRIB2 analysis files into a multi-band
//! raster. The [`locator`] names the objects, the [`fetcher`] and
//! [`decoder`] turn them into grids, the [`validator`] and [`assembler`]
//! stack them, and the [`encoder`] writes the artifact. [`Pipeline`] drives
//! one run and reports a [`RunResult`].

pub mod assembler;
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod fetcher;
pub mod locator;
pub mod pipeline;
pub mod validator;
pub mod verify;

pub use assembler::MergedRaster;
pub use config::{
    DatasetVariant, OutputConfig, ParameterSelector, RetryPolicy, RunConfig, RunRequest, TimeStep,
};
pub use decoder::{Grib2GridDecoder, GridDecoder};
pub use encoder::OutputEncoder;
pub use error::{MalformedInput, MergeError, MismatchError, MismatchField, Result};
pub use fetcher::{BandFetcher, FetchOutcome};
pub use locator::{enumerate, ObjectKey};
pub use pipeline::{KeyOutcome, KeyReport, Pipeline, RunResult, RunState, RunStatus};
pub use validator::validate;
pub use verify::verify_artifact;
