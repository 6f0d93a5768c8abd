//! Line output for measurements
//!
//! Each measurement becomes one comma separated line:
//! `<timestamp>,<pm25>,<pm10>` with both values at two decimal places.

use crate::aggregator::Measurement;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt::Write as _;
use std::io::{self, Write};

/// How timestamps are rendered in the output line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampMode {
    /// RFC 3339, e.g. `2024-01-01T00:00:00Z`
    #[default]
    Rfc3339,
    /// Seconds since 1970-01-01 00:00:00 UTC
    Unix,
}

impl TimestampMode {
    /// Render a timestamp in this mode
    pub fn render(&self, timestamp: &DateTime<Utc>) -> String {
        match self {
            TimestampMode::Rfc3339 => timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            TimestampMode::Unix => timestamp.timestamp().to_string(),
        }
    }
}

/// Renders measurements as CSV lines
#[derive(Debug, Clone, Copy, Default)]
pub struct LineFormatter {
    mode: TimestampMode,
}

impl LineFormatter {
    /// Create a formatter for the given timestamp mode
    pub fn new(mode: TimestampMode) -> Self {
        Self { mode }
    }

    /// Timestamp mode in use
    pub fn mode(&self) -> TimestampMode {
        self.mode
    }

    /// Format a measurement as a newline terminated line
    ///
    /// A measurement without a timestamp (no successful reading in the
    /// burst) leaves the first field empty.
    pub fn format(&self, measurement: &Measurement) -> String {
        debug_assert!(
            measurement.pm25.is_finite() && measurement.pm10.is_finite(),
            "non-finite measurement: {:?}",
            measurement
        );

        let timestamp = measurement
            .timestamp
            .as_ref()
            .map(|ts| self.mode.render(ts))
            .unwrap_or_default();

        let mut line = String::with_capacity(timestamp.len() + 16);
        line.push_str(&timestamp);
        // Writing into a String cannot fail
        let _ = writeln!(line, ",{:.2},{:.2}", measurement.pm25, measurement.pm10);
        line
    }

    /// Format a measurement and write it to `out`, flushing afterwards
    pub fn write_to<W: Write + ?Sized>(
        &self,
        out: &mut W,
        measurement: &Measurement,
    ) -> io::Result<()> {
        out.write_all(self.format(measurement).as_bytes())?;
        out.flush()
    }
}
