//! # figlink-browser
//!
//! The browser side of a figure's lifecycle:
//!
//! - [`chrome`]: Chromium discovery and display detection
//! - [`launcher`]: desktop browser via `xdg-open`, headless Chromium guard
//! - [`cdp`]: DevTools `Page.setDownloadBehavior`
//! - [`downloads`]: default download directory and completion polling

#![deny(unsafe_code)]

pub mod cdp;
pub mod chrome;
pub mod downloads;
pub mod error;
pub mod launcher;

pub use cdp::set_download_directory;
pub use chrome::{find_chromium, is_display_available};
pub use downloads::{default_download_directory, wait_for_file};
pub use error::BrowserError;
pub use launcher::{HeadlessBrowser, launch_headless, open_browser};
