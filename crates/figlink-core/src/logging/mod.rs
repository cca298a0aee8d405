//! Structured logging with `tracing`.
//!
//! Components never install a global subscriber themselves. Each one captures
//! the dispatcher that is current when it is constructed ([`current_dispatch`])
//! and re-installs it on the threads it spawns ([`spawn_with_dispatch`]). A
//! process that called [`init_subscriber`] gets all background logs; a test
//! that called [`capture_logs`] sees the logs of the components it built; with
//! neither, logging is a no-op.

pub mod test_utils;

pub use test_utils::{CapturedEvent, CapturedLogs, capture_logs};

use std::io;
use std::thread::JoinHandle;

use serde::{Deserialize, Serialize};
use tracing::Dispatch;

/// Line format of the global subscriber.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable single-line output.
    #[default]
    Compact,
    /// One JSON object per event, for log collectors.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Initialize the global tracing subscriber with compact stderr output.
///
/// Call once at application startup. Subsequent calls are no-ops.
/// `RUST_LOG` takes precedence over `level` when set.
pub fn init_subscriber(level: &str) {
    init_subscriber_with_format(level, LogFormat::Compact);
}

/// Like [`init_subscriber`], writing stderr lines in `format`.
pub fn init_subscriber_with_format(level: &str, format: LogFormat) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    // try_init is a no-op if a global subscriber is already set
    let _ = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().with_current_span(false).try_init(),
    };
}

/// The dispatcher active on the calling thread.
pub fn current_dispatch() -> Dispatch {
    tracing::dispatcher::get_default(Clone::clone)
}

/// Spawn a named OS thread that logs through `dispatch`.
pub fn spawn_with_dispatch<F, T>(
    name: impl Into<String>,
    dispatch: Dispatch,
    f: F,
) -> io::Result<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    std::thread::Builder::new()
        .name(name.into())
        .spawn(move || tracing::dispatcher::with_default(&dispatch, f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::Level;

    #[test]
    fn init_subscriber_does_not_panic() {
        init_subscriber("warn");
        init_subscriber("debug");
        init_subscriber_with_format("info", LogFormat::Json);
    }

    #[test]
    fn log_format_parses_names() {
        assert_eq!("json".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("Compact".parse::<LogFormat>(), Ok(LogFormat::Compact));
        assert!("pretty".parse::<LogFormat>().is_err());
        assert_eq!(LogFormat::default(), LogFormat::Compact);
    }

    #[test]
    fn log_format_serializes_lowercase() {
        assert_eq!(serde_json::to_value(LogFormat::Json).unwrap(), "json");
        let format: LogFormat = serde_json::from_value(serde_json::json!("compact")).unwrap();
        assert_eq!(format, LogFormat::Compact);
    }

    #[test]
    fn spawned_thread_inherits_captured_dispatch() {
        let (logs, _guard) = capture_logs();
        let handle = spawn_with_dispatch("log-worker", current_dispatch(), || {
            tracing::warn!(attempt = 7, "from background");
        })
        .unwrap();
        handle.join().unwrap();

        assert!(logs.has_event(Level::WARN, "from background"));
    }

    #[test]
    fn plain_thread_does_not_inherit_thread_local_dispatch() {
        let (logs, _guard) = capture_logs();
        std::thread::spawn(|| tracing::warn!("lost"))
            .join()
            .unwrap();
        assert!(!logs.has_message("lost"));
    }

    #[test]
    fn spawned_thread_carries_name() {
        let handle = spawn_with_dispatch("named-worker", current_dispatch(), || {
            std::thread::current().name().map(str::to_owned)
        })
        .unwrap();
        assert_eq!(handle.join().unwrap().as_deref(), Some("named-worker"));
    }
}
