//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`FigureSettings::default()`]
//! 2. If `~/.figlink/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `FIGLINK_*` environment variable overrides (highest priority)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::FigureSettings;

/// Resolve the path to the settings file (`~/.figlink/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".figlink").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<FigureSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<FigureSettings> {
    let defaults = serde_json::to_value(FigureSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: FigureSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Lay a user settings document over the serialized defaults.
///
/// Sections present in `overlay` replace only the keys they name, so a file
/// holding `{"browser": {"downloadDir": ".."}}` keeps every other browser
/// default. Explicit `null`s leave the default in place. Arrays and scalars
/// replace whatever `base` held.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    let Value::Object(overrides) = overlay else {
        return overlay;
    };
    let Value::Object(mut section) = base else {
        return Value::Object(overrides);
    };
    for (key, value) in overrides.into_iter().filter(|(_, value)| !value.is_null()) {
        let value = match section.remove(&key) {
            Some(default) => deep_merge(default, value),
            None => value,
        };
        let _ = section.insert(key, value);
    }
    Value::Object(section)
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are ignored with a warning.
pub fn apply_env_overrides(settings: &mut FigureSettings) {
    // ── WebSocket ───────────────────────────────────────────────────
    if let Some(v) = read_env_string("FIGLINK_WS_BIND") {
        settings.websocket.bind_address = v;
    }
    if let Some(v) = read_env_u16("FIGLINK_WS_PORT", 0, 65535) {
        settings.websocket.port = v;
    }
    if let Some(v) = read_env_u64("FIGLINK_WS_CONNECT_TIMEOUT_MS", 100, 600_000) {
        settings.websocket.connect_timeout_ms = v;
    }

    // ── HTTP ────────────────────────────────────────────────────────
    if let Some(v) = read_env_u16("FIGLINK_HTTP_PORT", 0, 65535) {
        settings.http.port = v;
    }
    if let Some(v) = read_env_string("FIGLINK_WEBAPP_DIR") {
        settings.http.webapp_dir = Some(v);
    }

    // ── RPC ─────────────────────────────────────────────────────────
    if let Some(v) = read_env_u64("FIGLINK_RPC_TIMEOUT_MS", 1, 600_000) {
        settings.rpc.call_timeout_ms = v;
    }
    if let Some(v) = read_env_u64("FIGLINK_CONNECTION_WAIT_MS", 1, 600_000) {
        settings.rpc.connection_wait_ms = v;
    }

    // ── Browser ─────────────────────────────────────────────────────
    if let Some(v) = read_env_u16("FIGLINK_DEBUGGING_PORT", 1, 65535) {
        settings.browser.remote_debugging_port = v;
    }
    if let Some(v) = read_env_string("FIGLINK_DOWNLOAD_DIR") {
        settings.browser.download_dir = Some(v);
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_env_string("FIGLINK_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_string("FIGLINK_LOG_FORMAT") {
        match v.parse() {
            Ok(format) => settings.logging.format = format,
            Err(err) => tracing::warn!(key = "FIGLINK_LOG_FORMAT", error = %err, "ignoring"),
        }
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers ─────────────────────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    let val = std::env::var(name).ok()?;
    let result = parse_u16_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}
