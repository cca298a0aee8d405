//! Browser-specific error types.

use figlink_ws::EndpointError;
use thiserror::Error;

/// Errors from launching or steering a browser.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// The browser process could not be started or exited immediately.
    #[error("failed to launch browser: {context}")]
    LaunchFailed {
        /// What went wrong during launch.
        context: String,
    },

    /// No Chromium-family executable was found.
    #[error("Chromium not found, install chromium or google-chrome or set CHROME_PATH")]
    ChromeNotFound,

    /// The DevTools HTTP endpoint was unreachable or answered unexpectedly.
    #[error("DevTools endpoint on port {port}: {context}")]
    DevTools {
        /// Remote debugging port.
        port: u16,
        /// What went wrong.
        context: String,
    },

    /// The DevTools WebSocket could not be opened.
    #[error("DevTools websocket: {0}")]
    Endpoint(#[from] EndpointError),

    /// A DevTools command was rejected.
    #[error("CDP error: {0}")]
    Cdp(String),

    /// Operation timed out.
    #[error("timed out after {timeout_ms}ms: {context}")]
    Timeout {
        /// How long we waited.
        timeout_ms: u64,
        /// What we were waiting for.
        context: String,
    },

    /// Filesystem error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
