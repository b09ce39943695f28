//! Ordered accumulation of validated bands.

use chrono::{DateTime, Utc};
use merge_common::{Grid, GridSpec};

use crate::error::{MergeError, Result};

/// Bands in insertion order, all on the grid of the first.
#[derive(Debug, Clone, Default)]
pub struct MergedRaster {
    bands: Vec<Grid>,
}

impl MergedRaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grid every later band is compared against.
    pub fn reference(&self) -> Option<&GridSpec> {
        self.bands.first().map(|g| &g.spec)
    }

    /// Add a validated band. A second band for the same valid time is an
    /// error.
    pub fn append(mut self, grid: Grid) -> Result<Self> {
        if self.bands.iter().any(|b| b.valid_time == grid.valid_time) {
            return Err(MergeError::DuplicateBand {
                valid_time: grid.valid_time,
                key: grid.source_key,
            });
        }
        self.bands.push(grid);
        Ok(self)
    }

    pub fn bands(&self) -> &[Grid] {
        &self.bands
    }

    pub fn into_bands(self) -> Vec<Grid> {
        self.bands
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    pub fn valid_times(&self) -> Vec<DateTime<Utc>> {
        self.bands.iter().map(|b| b.valid_time).collect()
    }
}
