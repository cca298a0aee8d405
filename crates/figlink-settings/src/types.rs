//! Settings sections for a figure session.

use std::time::Duration;

pub use figlink_core::logging::LogFormat;
use serde::{Deserialize, Serialize};

/// Complete settings for a figure: transport, HTTP frontend, RPC timing,
/// browser management and logging.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FigureSettings {
    /// WebSocket transport.
    pub websocket: WebsocketSettings,
    /// Static HTTP server for the browser frontend.
    pub http: HttpSettings,
    /// RPC call and connection timing.
    pub rpc: RpcSettings,
    /// Browser launching and downloads.
    pub browser: BrowserSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// WebSocket transport settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebsocketSettings {
    /// Address the server binds to. Empty means all interfaces.
    pub bind_address: String,
    /// Server port. `0` picks a free port.
    pub port: u16,
    /// How long a client waits for the handshake before giving up.
    pub connect_timeout_ms: u64,
    /// Per-peer outbound queue capacity in messages.
    pub outbound_queue: usize,
    /// Grace period for connection tasks to drain on shutdown.
    pub shutdown_grace_ms: u64,
}

impl Default for WebsocketSettings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 0,
            connect_timeout_ms: 5_000,
            outbound_queue: 1_024,
            shutdown_grace_ms: 1_000,
        }
    }
}

impl WebsocketSettings {
    /// Client handshake timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Shutdown drain timeout.
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// HTTP frontend settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpSettings {
    /// Address the HTTP server binds to.
    pub bind_address: String,
    /// HTTP port. `0` picks a free port.
    pub port: u16,
    /// Directory holding the browser frontend. `None` uses the bundled page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webapp_dir: Option<String>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 0,
            webapp_dir: None,
        }
    }
}

/// RPC timing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcSettings {
    /// Bounded wait for each remote call.
    pub call_timeout_ms: u64,
    /// Length of one wait for the first frontend connection.
    pub connection_wait_ms: u64,
    /// Number of connection waits before giving up. `None` retries forever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_connection_attempts: Option<u32>,
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            call_timeout_ms: 200,
            connection_wait_ms: 3_000,
            max_connection_attempts: None,
        }
    }
}

impl RpcSettings {
    /// Per-call timeout.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// One connection wait.
    pub fn connection_wait(&self) -> Duration {
        Duration::from_millis(self.connection_wait_ms)
    }
}

/// Browser launching and download handling.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BrowserSettings {
    /// `DevTools` port of a headless browser.
    pub remote_debugging_port: u16,
    /// Delay after launching a headless browser before talking to `DevTools`.
    pub startup_delay_ms: u64,
    /// How long to wait for a downloaded image to appear.
    pub download_timeout_ms: u64,
    /// Poll interval while waiting for a download.
    pub download_poll_ms: u64,
    /// Download directory for headless mode. `None` uses the user's default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_dir: Option<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            remote_debugging_port: 9_222,
            startup_delay_ms: 1_000,
            download_timeout_ms: 5_000,
            download_poll_ms: 100,
            download_dir: None,
        }
    }
}

impl BrowserSettings {
    /// Startup delay.
    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    /// Download wait timeout.
    pub fn download_timeout(&self) -> Duration {
        Duration::from_millis(self.download_timeout_ms)
    }

    /// Download poll interval.
    pub fn download_poll(&self) -> Duration {
        Duration::from_millis(self.download_poll_ms)
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// `compact` lines or one JSON object per event.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Compact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = FigureSettings::default();
        assert_eq!(s.websocket.bind_address, "0.0.0.0");
        assert_eq!(s.websocket.port, 0);
        assert_eq!(s.rpc.call_timeout(), Duration::from_millis(200));
        assert_eq!(s.rpc.connection_wait(), Duration::from_secs(3));
        assert!(s.rpc.max_connection_attempts.is_none());
        assert_eq!(s.browser.remote_debugging_port, 9222);
        assert_eq!(s.browser.startup_delay(), Duration::from_secs(1));
        assert_eq!(s.browser.download_timeout(), Duration::from_secs(5));
        assert_eq!(s.browser.download_poll(), Duration::from_millis(100));
        assert_eq!(s.logging.level, "warn");
        assert_eq!(s.logging.format, LogFormat::Compact);
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(FigureSettings::default()).unwrap();
        assert_eq!(json["rpc"]["callTimeoutMs"], 200);
        assert_eq!(json["browser"]["remoteDebuggingPort"], 9222);
        assert_eq!(json["websocket"]["bindAddress"], "0.0.0.0");
        assert!(json["http"].get("webappDir").is_none());
    }

    #[test]
    fn partial_section_fills_defaults() {
        let rpc: RpcSettings = serde_json::from_str(r#"{"callTimeoutMs": 50}"#).unwrap();
        assert_eq!(rpc.call_timeout_ms, 50);
        assert_eq!(rpc.connection_wait_ms, 3_000);
    }
}
