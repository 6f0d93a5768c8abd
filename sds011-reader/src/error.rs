// SDS011 Reader - Startup and shutdown errors
// Licensed under the Apache License, Version 2.0.

//! Errors that end the process with a non-zero exit code.

use std::net::SocketAddr;
use thiserror::Error;

/// Fatal reader errors
#[derive(Error, Debug)]
pub enum ReaderError {
    /// Error from the measurement library
    #[error(transparent)]
    Core(#[from] sds011::Error),

    /// Metrics listener could not be bound
    #[error("Cannot listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Metrics server stopped with an error
    #[error("Metrics server failed: {0}")]
    Server(#[source] std::io::Error),

    /// Measurement loop panicked
    #[error("Measurement loop aborted: {0}")]
    Join(#[from] tokio::task::JoinError),
}
