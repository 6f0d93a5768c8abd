// SDS011 Reader - Command line arguments
// Licensed under the Apache License, Version 2.0.

use clap::Parser;
use sds011::config::DEFAULT_PORT_PATH;
use sds011::{Config, TimestampMode};
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::time::Duration;

/// Reads data from an SDS011 sensor and writes it to stdout as CSV.
///
/// The columns are: a timestamp (RFC3339 unless --unix is given), the
/// PM2.5 level and the PM10 level, both in µg/m³.
#[derive(Parser, Debug)]
#[command(author, version)]
pub struct Args {
    /// Measurement interval (e.g. 30s, 15m, 1h20m); 0 measures continuously
    #[arg(short, long, default_value = "0", value_parser = parse_interval)]
    pub interval: Duration,

    /// Serial port path
    #[arg(short, long, alias = "port_path", default_value = DEFAULT_PORT_PATH)]
    pub port_path: String,

    /// Number of samples per measurement
    #[arg(short, long, default_value = "1")]
    pub samples: NonZeroU32,

    /// Print timestamps as seconds since 1970-01-01 00:00:00 UTC
    #[arg(short, long)]
    pub unix: bool,

    /// Address to serve Prometheus metrics on (e.g. :9100); disabled if unset or empty
    #[arg(short, long, value_parser = parse_address)]
    pub listen_address: Option<ListenAddress>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Convert into the library configuration
    pub fn to_config(&self) -> Config {
        Config {
            port_path: self.port_path.clone(),
            samples: self.samples,
            interval: self.interval,
            timestamp_mode: if self.unix {
                TimestampMode::Unix
            } else {
                TimestampMode::Rfc3339
            },
            listen_address: self.listen_address.and_then(|addr| addr.0),
        }
    }
}

fn parse_interval(s: &str) -> Result<Duration, String> {
    sds011::parse_duration(s).map_err(|e| e.to_string())
}

/// A parsed `--listen-address`; `None` when the value was blank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenAddress(Option<SocketAddr>);

fn parse_address(s: &str) -> Result<ListenAddress, String> {
    sds011::parse_listen_address(s)
        .map(ListenAddress)
        .map_err(|e| e.to_string())
}
