//! Figure construction errors.

use figlink_ws::EndpointError;
use thiserror::Error;

/// Failure to bring a figure's servers up.
#[derive(Debug, Error)]
pub enum FigureError {
    /// The WebSocket server could not start.
    #[error("websocket server: {0}")]
    Endpoint(#[from] EndpointError),

    /// The HTTP server could not bind.
    #[error("failed to bind http server on {address}: {source}")]
    HttpBind {
        /// Address that was requested.
        address: String,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// Thread or runtime setup failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
