//! Device abstraction for particulate matter sensors
//!
//! The scheduler talks to the sensor only through the [`Device`] trait, so
//! any serial sensor (or a scripted fake in tests) can be driven by it.
//! Opening is a constructor on the concrete type and closing happens on
//! drop, which releases the handle on every exit path.

use crate::error::DeviceError;
use chrono::{DateTime, Utc};

/// A single raw reading from the sensor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// PM2.5 concentration in µg/m³
    pub pm25: f64,
    /// PM10 concentration in µg/m³
    pub pm10: f64,
    /// When the reading was taken
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    /// Create a new reading
    pub fn new(pm25: f64, pm10: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            pm25,
            pm10,
            timestamp,
        }
    }
}

/// Capabilities the scheduler needs from a sensor
pub trait Device {
    /// Query whether the sensor is in working mode
    fn is_awake(&mut self) -> Result<bool, DeviceError>;

    /// Put the sensor into working mode (fan and laser on)
    fn wake(&mut self) -> Result<(), DeviceError>;

    /// Put the sensor into sleep mode
    fn sleep(&mut self) -> Result<(), DeviceError>;

    /// Read the next measurement reported by the sensor
    fn read(&mut self) -> Result<Reading, DeviceError>;
}

impl<D: Device + ?Sized> Device for Box<D> {
    fn is_awake(&mut self) -> Result<bool, DeviceError> {
        (**self).is_awake()
    }

    fn wake(&mut self) -> Result<(), DeviceError> {
        (**self).wake()
    }

    fn sleep(&mut self) -> Result<(), DeviceError> {
        (**self).sleep()
    }

    fn read(&mut self) -> Result<Reading, DeviceError> {
        (**self).read()
    }
}
