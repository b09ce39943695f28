//! Common types shared across the band-merge workspace.
//!
//! A [`Grid`] is one decoded band: its spatial footprint ([`GridSpec`]),
//! the time it is valid for, the parameter it carries and its samples.

pub mod error;
pub mod grid;
pub mod time;

pub use error::{GridError, GridResult};
pub use grid::{CrsId, GeoTransform, Grid, GridSpec, ScanMode};
pub use time::format_valid_time;
