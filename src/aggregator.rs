//! Burst aggregation
//!
//! A [`Burst`] collects the successful readings of one measurement cycle and
//! reduces them to a single [`Measurement`].
//!
//! The sums are always divided by the configured burst size, not by the
//! number of readings that actually succeeded. A burst with failed reads
//! therefore reports a value biased towards zero. This matches the
//! behaviour downstream consumers of the CSV output already rely on.

use crate::device::Reading;
use chrono::{DateTime, Utc};
use std::num::NonZeroU32;

/// One averaged measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// Averaged PM2.5 concentration in µg/m³
    pub pm25: f64,
    /// Averaged PM10 concentration in µg/m³
    pub pm10: f64,
    /// Timestamp of the last successful reading, if any succeeded
    pub timestamp: Option<DateTime<Utc>>,
}

/// Accumulates the readings of one burst
#[derive(Debug, Clone)]
pub struct Burst {
    samples: NonZeroU32,
    pm25_sum: f64,
    pm10_sum: f64,
    last_timestamp: Option<DateTime<Utc>>,
    successful: u32,
}

impl Burst {
    /// Start a burst of `samples` budgeted reads
    pub fn new(samples: NonZeroU32) -> Self {
        Self {
            samples,
            pm25_sum: 0.0,
            pm10_sum: 0.0,
            last_timestamp: None,
            successful: 0,
        }
    }

    /// Add a successful reading
    pub fn add(&mut self, reading: Reading) {
        self.pm25_sum += reading.pm25;
        self.pm10_sum += reading.pm10;
        self.last_timestamp = Some(reading.timestamp);
        self.successful += 1;
    }

    /// Number of readings added so far
    pub fn successful(&self) -> u32 {
        self.successful
    }

    /// Configured burst size
    pub fn samples(&self) -> NonZeroU32 {
        self.samples
    }

    /// Reduce the burst to a measurement
    pub fn finish(&self) -> Measurement {
        let n = f64::from(self.samples.get());
        Measurement {
            pm25: self.pm25_sum / n,
            pm10: self.pm10_sum / n,
            timestamp: self.last_timestamp,
        }
    }
}

/// Average a slice of successful readings over a burst of `samples`
pub fn aggregate(samples: NonZeroU32, readings: &[Reading]) -> Measurement {
    let mut burst = Burst::new(samples);
    for reading in readings {
        burst.add(*reading);
    }
    burst.finish()
}
