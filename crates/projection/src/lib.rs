//! Coordinate reference system transformations.
//!
//! Implements the projections GRIB2 grid templates need, from scratch and
//! without external dependencies.

pub mod lambert;

pub use lambert::{LambertConformal, ProjectionError};
