//! Valid-time formatting used for band tags.

use chrono::{DateTime, Utc};

/// Canonical tag form, e.g. `2024-03-01T13:00:00Z`.
pub fn format_valid_time(t: &DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
