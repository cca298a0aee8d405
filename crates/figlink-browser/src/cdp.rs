//! The one DevTools command we need: `Page.setDownloadBehavior`.

use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use figlink_ws::{WebsocketClient, WebsocketEndpoint};
use serde_json::{Value, json};
use tracing::{debug, trace};

use crate::error::BrowserError;

/// Id of the single command sent per DevTools connection.
const COMMAND_ID: u64 = 1;

/// Point the browser's downloads at `dir`.
///
/// Reads the target list from `http://localhost:<port>/json`, connects to
/// the last target's `webSocketDebuggerUrl` and sends
/// `Page.setDownloadBehavior`, waiting up to `timeout` for the reply.
pub fn set_download_directory(
    dir: &Path,
    debugging_port: u16,
    timeout: Duration,
) -> Result<(), BrowserError> {
    let dir = std::path::absolute(dir)?;
    let deadline = Instant::now() + timeout;
    let url = fetch_debugger_url(debugging_port, timeout)?;
    debug!(%url, dir = %dir.display(), "setting download directory");

    let client = WebsocketClient::new("devtools");
    client.connect(&url)?;
    let (tx, rx) = mpsc::channel();
    client.register_callback(
        "devtools_reply",
        Arc::new(move |message: &str| {
            let _ = tx.send(message.to_owned());
        }),
    );

    let command = download_behavior_command(&dir);
    if !client.send(&command.to_string()) {
        return Err(BrowserError::Cdp("failed to send Page.setDownloadBehavior".into()));
    }

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let Ok(message) = rx.recv_timeout(remaining) else {
            return Err(BrowserError::Timeout {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                context: "Page.setDownloadBehavior".into(),
            });
        };
        trace!(%message, "DevTools message");
        let Ok(reply) = serde_json::from_str::<Value>(&message) else {
            continue;
        };
        if reply["id"].as_u64() != Some(COMMAND_ID) {
            continue;
        }
        if let Some(error) = reply.get("error") {
            return Err(BrowserError::Cdp(
                error["message"].as_str().map_or_else(|| error.to_string(), str::to_owned),
            ));
        }
        return Ok(());
    }
}

/// The `Page.setDownloadBehavior` command for `dir`.
pub fn download_behavior_command(dir: &Path) -> Value {
    json!({
        "id": COMMAND_ID,
        "method": "Page.setDownloadBehavior",
        "params": {
            "behavior": "allow",
            "downloadPath": dir.to_string_lossy(),
        },
    })
}

/// The last target's `webSocketDebuggerUrl` from a `/json` listing.
pub fn debugger_url(targets: &Value) -> Option<String> {
    targets
        .as_array()?
        .last()?
        .get("webSocketDebuggerUrl")?
        .as_str()
        .map(str::to_owned)
}

fn fetch_debugger_url(port: u16, timeout: Duration) -> Result<String, BrowserError> {
    let devtools = |context: String| BrowserError::DevTools { port, context };
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| devtools(e.to_string()))?;
    let response = client
        .get(format!("http://localhost:{port}/json"))
        .send()
        .map_err(|e| devtools(e.to_string()))?;
    if !response.status().is_success() {
        return Err(devtools(format!("status {}", response.status())));
    }
    let targets: Value = response.json().map_err(|e| devtools(e.to_string()))?;
    debugger_url(&targets).ok_or_else(|| devtools("no target with a webSocketDebuggerUrl".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_shape() {
        let command = download_behavior_command(Path::new("/tmp/out"));
        assert_eq!(command["id"], 1);
        assert_eq!(command["method"], "Page.setDownloadBehavior");
        assert_eq!(command["params"]["behavior"], "allow");
        assert_eq!(command["params"]["downloadPath"], "/tmp/out");
    }

    #[test]
    fn last_target_is_used() {
        let targets = json!([
            {"type": "page", "webSocketDebuggerUrl": "ws://localhost:9222/devtools/page/A"},
            {"type": "page", "webSocketDebuggerUrl": "ws://localhost:9222/devtools/page/B"}
        ]);
        assert_eq!(
            debugger_url(&targets).as_deref(),
            Some("ws://localhost:9222/devtools/page/B")
        );
    }

    #[test]
    fn missing_url_is_none() {
        assert_eq!(debugger_url(&json!([])), None);
        assert_eq!(debugger_url(&json!([{"type": "page"}])), None);
        assert_eq!(debugger_url(&json!({"not": "a list"})), None);
    }

    #[test]
    fn unreachable_devtools_fails() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let result = set_download_directory(Path::new("/tmp"), port, Duration::from_millis(500));
        assert!(matches!(result, Err(BrowserError::DevTools { .. })));
    }
}
