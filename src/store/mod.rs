//! SQLite snapshot storage.
//!
//! Persists snapshots to a single append-only table:
//! - snapshots: id, timestamp (unix millis, indexed), total_size,
//!   file_types (json object), folders (json array)
//!
//! Supports:
//! - Appending a snapshot after every successful scan
//! - Latest snapshot and time-windowed history queries
//! - Listing and loading snapshots by ID for reports and diffs

pub mod diff;
pub mod snapshot;

use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::Error;

pub use snapshot::Store;

/// Named lookback window for history queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    Day,
    #[default]
    Week,
    Month,
    Year,
}

impl Timeframe {
    pub const ALL: [Timeframe; 4] = [Timeframe::Day, Timeframe::Week, Timeframe::Month, Timeframe::Year];

    pub fn window(self) -> Duration {
        match self {
            Timeframe::Day => Duration::days(1),
            Timeframe::Week => Duration::days(7),
            Timeframe::Month => Duration::days(30),
            Timeframe::Year => Duration::days(365),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::Day => "day",
            Timeframe::Week => "week",
            Timeframe::Month => "month",
            Timeframe::Year => "year",
        }
    }
}

impl FromStr for Timeframe {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(Timeframe::Day),
            "week" => Ok(Timeframe::Week),
            "month" => Ok(Timeframe::Month),
            "year" => Ok(Timeframe::Year),
            other => Err(Error::InvalidTimeframe(other.to_string())),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
