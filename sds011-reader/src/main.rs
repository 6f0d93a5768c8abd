// SDS011 Reader - Particulate matter reader and Prometheus exporter
// Licensed under the Apache License, Version 2.0.

//! # SDS011 Reader
//!
//! Reads an SDS011 sensor, writes one CSV line per measurement to stdout and
//! optionally serves the latest values as Prometheus gauges.
//!
//! ## Usage
//!
//! ```bash
//! # Average 5 readings every 15 minutes
//! sds011-reader --port-path /dev/ttyUSB0 --samples 5 --interval 15m
//!
//! # Also expose pm25/pm10 on http://0.0.0.0:9100/metrics
//! sds011-reader --interval 1m --listen-address :9100
//! ```

mod cli;
mod error;
mod server;

use clap::Parser;
use cli::Args;
use error::ReaderError;
use sds011::{MetricsSink, Scheduler, Sds011, Shutdown};
use server::AppState;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(&args.log_level);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Log to stderr; stdout carries the measurements.
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Metrics server running in the background.
struct MetricsServer {
    handle: JoinHandle<Result<(), ReaderError>>,
    stop: oneshot::Sender<()>,
}

async fn run(args: Args) -> Result<(), ReaderError> {
    let config = args.to_config();
    config.validate()?;

    info!("SDS011 Reader v{}", env!("CARGO_PKG_VERSION"));

    // Metrics are a capability decided once at startup
    let (sink, mut metrics_server) = match config.listen_address {
        Some(addr) => {
            let sink = Arc::new(MetricsSink::new()?);
            let listener = server::bind(addr).await?;
            let state = Arc::new(AppState::new(Arc::clone(&sink), &config));
            let (stop, stop_rx) = oneshot::channel();
            let handle = tokio::spawn(server::serve(listener, state, stop_rx));
            (Some(sink), Some(MetricsServer { handle, stop }))
        }
        None => {
            info!("No listen address given, metrics disabled");
            (None, None)
        }
    };

    let device = Sds011::open(&config.port_path)?;

    let shutdown = Shutdown::new();
    let loop_shutdown = shutdown.clone();
    let loop_config = config.clone();
    let mut measurements = tokio::task::spawn_blocking(move || -> sds011::Result<()> {
        let mut scheduler = Scheduler::with_stdout(device, &loop_config);
        if let Some(sink) = sink {
            scheduler = scheduler.with_metrics(sink);
        }
        let result = scheduler.run(&loop_shutdown);
        let closed = scheduler.into_device().close();
        result.and(closed)
    });

    let server_done = async {
        match metrics_server.as_mut() {
            Some(s) => (&mut s.handle).await,
            None => std::future::pending().await,
        }
    };

    let outcome = tokio::select! {
        result = &mut measurements => Some(result),
        result = server_done => {
            shutdown.trigger();
            let err = match result {
                Ok(Ok(())) => ReaderError::Server(std::io::Error::other("server exited")),
                Ok(Err(e)) => e,
                Err(e) => ReaderError::Join(e),
            };
            // Let the loop release the device before reporting
            if let Err(e) = measurements.await {
                warn!("Measurement loop aborted during shutdown: {}", e);
            }
            return Err(err);
        }
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("Shutdown requested"),
                Err(e) => warn!("Cannot listen for Ctrl-C ({}), stopping", e),
            }
            shutdown.trigger();
            None
        }
    };

    let result = match outcome {
        Some(result) => result,
        None => tokio::select! {
            result = &mut measurements => result,
            Ok(()) = tokio::signal::ctrl_c() => {
                // A serial read in progress cannot be cancelled, and the
                // runtime would wait for it on drop
                error!("Interrupted again, exiting without closing the sensor");
                std::process::exit(1);
            }
        },
    };

    if let Some(server) = metrics_server {
        let _ = server.stop.send(());
        server.handle.await??;
    }

    result??;
    info!("Shutdown complete");
    Ok(())
}
