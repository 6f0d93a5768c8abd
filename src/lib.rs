//! # SDS011 - particulate matter measurement scheduler
//!
//! Samples a Nova SDS011 sensor over a serial line, averages a burst of
//! readings into one measurement, prints it as a CSV line and optionally
//! publishes the latest values as Prometheus gauges.
//!
//! ## Quick Start
//!
//! ```rust
//! use sds011::fake::{FakeDevice, ManualClock};
//! use sds011::{Config, Reading, Scheduler, Shutdown};
//! use chrono::{TimeZone, Utc};
//!
//! let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
//! let device = FakeDevice::awake().with_reading(Reading::new(12.345, 8.0, ts));
//!
//! let mut scheduler = Scheduler::new(device, &Config::default(), ManualClock::new(), Vec::new());
//! scheduler.run_cycle(&Shutdown::new()).unwrap();
//!
//! assert_eq!(scheduler.output().as_slice(), b"2024-01-01T00:00:00Z,12.35,8.00\n");
//! ```
//!
//! ## Modules
//!
//! - [`device`]: Device capability trait and raw readings
//! - [`driver`]: SDS011 serial protocol driver
//! - [`aggregator`]: Burst averaging
//! - [`output`]: CSV line formatting
//! - [`metrics`]: Prometheus gauges for the latest measurement
//! - [`scheduler`]: The measurement loop
//! - [`clock`]: Time source and shutdown signal
//! - [`config`]: Runtime configuration
//! - [`fake`]: Scripted device and manual clock for tests

// Modules
pub mod aggregator;
pub mod clock;
pub mod config;
pub mod device;
pub mod driver;
pub mod error;
pub mod fake;
pub mod metrics;
pub mod output;
pub mod scheduler;

// Re-exports for convenient access
pub use aggregator::{aggregate, Burst, Measurement};
pub use clock::{Clock, Shutdown, SystemClock};
pub use config::{parse_duration, parse_listen_address, Config};
pub use device::{Device, Reading};
pub use driver::Sds011;
pub use error::{DeviceError, Error, Result};
pub use metrics::{GaugeSnapshot, MetricsSink};
pub use output::{LineFormatter, TimestampMode};
pub use scheduler::{CycleReport, PowerState, Scheduler};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
