//! # figlink-settings
//!
//! Configuration for figure sessions, loaded from three layers (in priority
//! order):
//! 1. **Compiled defaults**: [`FigureSettings::default()`]
//! 2. **User file**: `~/.figlink/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `FIGLINK_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::sync::OnceLock;

static SETTINGS: OnceLock<FigureSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// Loaded on first call; falls back to compiled defaults if the file cannot
/// be read or parsed.
pub fn get_settings() -> &'static FigureSettings {
    SETTINGS.get_or_init(|| match load_settings() {
        Ok(settings) => settings,
        Err(error) => {
            tracing::warn!(%error, "failed to load settings, using defaults");
            FigureSettings::default()
        }
    })
}

/// Initialize the global settings with a specific value.
///
/// Returns the settings back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: FigureSettings) -> std::result::Result<(), FigureSettings> {
    SETTINGS.set(settings)
}
