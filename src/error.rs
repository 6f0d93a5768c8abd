//! Error types for the SDS011 reader
//!
//! Fatal errors abort the process before or outside the measurement loop.
//! [`DeviceError`] covers a single device call and is usually recovered
//! from by the scheduler.

use thiserror::Error;

/// Result type alias for SDS011 operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type; every variant is fatal to the process
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The serial port could not be opened
    #[error("Cannot open device at {path}: {source}")]
    DeviceOpen {
        path: String,
        #[source]
        source: DeviceError,
    },

    /// The device could not be released cleanly
    #[error("Cannot close device: {0}")]
    DeviceClose(#[source] DeviceError),

    /// Writing a measurement line failed
    #[error("Output error: {0}")]
    Output(#[from] std::io::Error),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Errors from a single device call
#[derive(Error, Debug)]
pub enum DeviceError {
    /// I/O error on the serial line
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port configuration error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Invalid frame checksum
    #[error("Invalid checksum: expected 0x{expected:02x}, got 0x{actual:02x}")]
    InvalidChecksum { expected: u8, actual: u8 },

    /// Malformed frame
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Reply to a different command than the one sent
    #[error("Unexpected reply: expected command 0x{expected:02x}, got 0x{actual:02x}")]
    UnexpectedReply { expected: u8, actual: u8 },

    /// No complete frame before the deadline
    #[error("Timed out after {timeout_ms}ms waiting for the sensor")]
    Timeout { timeout_ms: u64 },
}
