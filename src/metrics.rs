//! Prometheus gauges for the latest measurement.
//!
//! The [`MetricsSink`] owns its own registry with exactly two gauges, `pm25`
//! and `pm10`. The scheduler is the only writer; HTTP handlers read through
//! [`MetricsSink::snapshot`] and [`MetricsSink::encode`]. Both gauges are
//! written and gathered under one lock, so a reader never sees values from
//! two different cycles.

use crate::aggregator::Measurement;
use crate::error::{Error, Result};
use prometheus::{Encoder, Gauge, Registry, TextEncoder};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Metric name for the PM2.5 gauge
pub const PM25_GAUGE: &str = "pm25";
/// Metric name for the PM10 gauge
pub const PM10_GAUGE: &str = "pm10";

/// A consistent view of both gauges
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaugeSnapshot {
    /// Latest averaged PM2.5 value
    pub pm25: f64,
    /// Latest averaged PM10 value
    pub pm10: f64,
    /// Number of updates published so far
    pub updates: u64,
}

/// Holds the two most recent measurement values
pub struct MetricsSink {
    registry: Registry,
    pm25: Gauge,
    pm10: Gauge,
    latest: RwLock<Option<GaugeSnapshot>>,
}

impl MetricsSink {
    /// Create a sink with a fresh registry
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let pm25 = Gauge::new(PM25_GAUGE, "Data from PM2.5 sensor")?;
        let pm10 = Gauge::new(PM10_GAUGE, "Data from PM10 sensor")?;
        registry.register(Box::new(pm25.clone()))?;
        registry.register(Box::new(pm10.clone()))?;

        Ok(Self {
            registry,
            pm25,
            pm10,
            latest: RwLock::new(None),
        })
    }

    /// Overwrite both gauges with the values of `measurement`
    pub fn update(&self, measurement: &Measurement) {
        let mut latest = self.write_lock();
        let updates = latest.map(|s| s.updates).unwrap_or(0) + 1;

        self.pm25.set(measurement.pm25);
        self.pm10.set(measurement.pm10);
        *latest = Some(GaugeSnapshot {
            pm25: measurement.pm25,
            pm10: measurement.pm10,
            updates,
        });
    }

    /// Latest published values, `None` before the first update
    pub fn snapshot(&self) -> Option<GaugeSnapshot> {
        *self.read_lock()
    }

    /// Encode both gauges in Prometheus text format
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = {
            let _guard = self.read_lock();
            self.registry.gather()
        };

        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| {
            Error::Metrics(prometheus::Error::Msg(format!("non UTF-8 exposition: {e}")))
        })
    }

    /// Content type of [`MetricsSink::encode`] output
    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }

    // A poisoned lock still holds a complete pair: both gauges are set
    // before the snapshot is replaced.
    fn read_lock(&self) -> RwLockReadGuard<'_, Option<GaugeSnapshot>> {
        self.latest.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, Option<GaugeSnapshot>> {
        self.latest.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for MetricsSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsSink")
            .field("latest", &self.snapshot())
            .finish()
    }
}
