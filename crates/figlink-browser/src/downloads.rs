//! Download directory resolution and completion polling.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

/// The user's download directory.
///
/// Asks `xdg-user-dir DOWNLOAD`, then falls back to `$HOME/Downloads`, then
/// `/tmp`.
pub fn default_download_directory() -> PathBuf {
    let xdg = Command::new("xdg-user-dir")
        .arg("DOWNLOAD")
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).into_owned());
    resolve_download_directory(xdg.as_deref(), std::env::var_os("HOME").as_deref())
}

/// Pick the download directory from `xdg-user-dir` output and `$HOME`.
pub fn resolve_download_directory(xdg_output: Option<&str>, home: Option<&OsStr>) -> PathBuf {
    if let Some(dir) = xdg_output.map(str::trim).filter(|dir| !dir.is_empty()) {
        return PathBuf::from(dir);
    }
    match home {
        Some(home) if !home.is_empty() => Path::new(home).join("Downloads"),
        _ => PathBuf::from("/tmp"),
    }
}

/// Poll every `poll` until `path` exists. Returns `false` after `timeout`.
pub fn wait_for_file(path: &Path, timeout: Duration, poll: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if path.exists() {
            debug!(path = %path.display(), "file present");
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        trace!(path = %path.display(), "waiting for file");
        std::thread::sleep(poll.min(deadline - now));
    }
}
