//! Endpoint error types.

use std::time::Duration;

use thiserror::Error;

/// Failure to bring an endpoint up.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// `serve` or `connect` was called on an endpoint that is already running.
    #[error("endpoint {0} is already running")]
    AlreadyRunning(String),
    /// The server could not bind its listening socket.
    #[error("failed to bind {address}: {source}")]
    Bind {
        /// Address that was requested.
        address: String,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },
    /// The client handshake failed.
    #[error("failed to connect to {uri}: {reason}")]
    Connect {
        /// Target URI.
        uri: String,
        /// Transport error text.
        reason: String,
    },
    /// The client handshake did not complete in time.
    #[error("connection to {uri} timed out after {timeout:?}")]
    ConnectTimeout {
        /// Target URI.
        uri: String,
        /// Timeout that elapsed.
        timeout: Duration,
    },
    /// Threads or the runtime could not be created.
    #[error("failed to start endpoint: {0}")]
    Io(#[from] std::io::Error),
}
