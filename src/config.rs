//! Configuration types for the SDS011 reader

use crate::error::{Error, Result};
use crate::output::TimestampMode;
use std::net::{SocketAddr, ToSocketAddrs};
use std::num::NonZeroU32;
use std::time::Duration;

/// Default serial port path
pub const DEFAULT_PORT_PATH: &str = "/dev/ttyUSB0";

/// Intervals at or below this run back to back with the sensor kept awake
pub const SLEEP_THRESHOLD: Duration = Duration::from_secs(1);

/// Reader configuration, fixed for the process lifetime
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Serial port the sensor is attached to
    pub port_path: String,

    /// Readings averaged into one measurement
    pub samples: NonZeroU32,

    /// Time between the starts of two measurement cycles (zero = no pause)
    pub interval: Duration,

    /// Timestamp rendering in the output line
    pub timestamp_mode: TimestampMode,

    /// Address for the metrics endpoint; `None` disables it
    pub listen_address: Option<SocketAddr>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port_path: DEFAULT_PORT_PATH.to_string(),
            samples: NonZeroU32::MIN,
            interval: Duration::ZERO,
            timestamp_mode: TimestampMode::Rfc3339,
            listen_address: None,
        }
    }
}

impl Config {
    /// Create a configuration for a specific port
    pub fn with_port(port_path: impl Into<String>) -> Self {
        Self {
            port_path: port_path.into(),
            ..Default::default()
        }
    }

    /// Create a configuration with a measurement interval
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    /// Check the configuration before the loop starts
    pub fn validate(&self) -> Result<()> {
        if self.port_path.trim().is_empty() {
            return Err(Error::Config("port path must not be empty".to_string()));
        }
        Ok(())
    }

    /// Whether the sensor is put to sleep between cycles
    pub fn duty_cycled(&self) -> bool {
        self.interval > SLEEP_THRESHOLD
    }
}

/// Parse a duration such as `0`, `500ms`, `30s`, `15m`, `1h20m` or `1.5h`.
///
/// Valid units are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let s = input.trim();
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(Error::Config("empty duration".to_string()));
    }

    let invalid = |reason: &str| Error::Config(format!("invalid duration {input:?}: {reason}"));

    let mut rest = s;
    let mut total_nanos = 0f64;
    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_end == 0 {
            return Err(invalid("expected a number"));
        }
        let value: f64 = rest[..num_end]
            .parse()
            .map_err(|_| invalid("bad number"))?;
        rest = &rest[num_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let nanos_per_unit = match &rest[..unit_end] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            "" => return Err(invalid("missing unit")),
            _ => return Err(invalid("unknown unit")),
        };
        rest = &rest[unit_end..];
        total_nanos += value * nanos_per_unit;
    }

    if !total_nanos.is_finite() || total_nanos > u64::MAX as f64 {
        return Err(invalid("out of range"));
    }
    Ok(Duration::from_nanos(total_nanos.round() as u64))
}

/// Parse a listen address; `:port` listens on all interfaces and a blank
/// address disables the metrics endpoint.
pub fn parse_listen_address(input: &str) -> Result<Option<SocketAddr>> {
    let s = input.trim();
    if s.is_empty() {
        return Ok(None);
    }
    let candidate = if s.starts_with(':') {
        format!("0.0.0.0{s}")
    } else {
        s.to_string()
    };

    candidate
        .to_socket_addrs()
        .map_err(|e| Error::Config(format!("invalid listen address {input:?}: {e}")))?
        .next()
        .map(Some)
        .ok_or_else(|| Error::Config(format!("listen address {input:?} resolved to nothing")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.port_path, "/dev/ttyUSB0");
        assert_eq!(config.samples.get(), 1);
        assert_eq!(config.interval, Duration::ZERO);
        assert_eq!(config.timestamp_mode, TimestampMode::Rfc3339);
        assert!(config.listen_address.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_port_rejected() {
        let config = Config::with_port("  ");
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_duty_cycle_threshold() {
        assert!(!Config::with_interval(Duration::ZERO).duty_cycled());
        assert!(!Config::with_interval(Duration::from_secs(1)).duty_cycled());
        assert!(Config::with_interval(Duration::from_millis(1001)).duty_cycled());
        assert!(Config::with_interval(Duration::from_secs(30)).duty_cycled());
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("0s").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("15m").unwrap(), Duration::from_secs(900));
        assert_eq!(parse_duration("1h20m").unwrap(), Duration::from_secs(4800));
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("250us").unwrap(), Duration::from_micros(250));
        assert_eq!(parse_duration("10ns").unwrap(), Duration::from_nanos(10));
    }

    #[test]
    fn test_parse_duration_errors() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("30").is_err());
        assert!(parse_duration("5x").is_err());
        assert!(parse_duration("-5s").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration(".s").is_err());
    }

    #[test]
    fn test_parse_listen_address() {
        let addr = parse_listen_address(":9100").unwrap();
        assert_eq!(addr, Some(SocketAddr::from(([0, 0, 0, 0], 9100))));

        let addr = parse_listen_address("127.0.0.1:8080").unwrap();
        assert_eq!(addr, Some(SocketAddr::from(([127, 0, 0, 1], 8080))));

        assert!(parse_listen_address("nonsense").is_err());
        assert!(parse_listen_address("127.0.0.1:notaport").is_err());
    }

    #[test]
    fn test_blank_listen_address_disables_metrics() {
        assert_eq!(parse_listen_address("").unwrap(), None);
        assert_eq!(parse_listen_address("   ").unwrap(), None);
    }
}
