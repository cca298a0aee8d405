//! Spawning the desktop browser and headless Chromium.

use std::path::Path;
use std::process::{Child, Command, Stdio};

use tracing::{debug, warn};

use crate::chrome::find_chromium;
use crate::error::BrowserError;

/// Flags passed to headless Chromium ahead of the debugging port and URL.
const HEADLESS_FLAGS: &[&str] = &[
    "--headless",
    "--disable-gpu",
    "--no-sandbox",
    "--disable-dev-shm-usage",
    "--disable-extensions",
    "--enable-features=NetworkService,NetworkServiceInProcess",
];

/// Open `url` in the desktop browser via `xdg-open`.
///
/// The opener runs detached; only a launcher that cannot start or exits
/// with an error status right away counts as a failure.
pub fn open_browser(url: &str) -> Result<(), BrowserError> {
    open_with("xdg-open", url)
}

fn open_with(opener: &str, url: &str) -> Result<(), BrowserError> {
    let mut child = quiet(Command::new(opener).arg(url))
        .spawn()
        .map_err(|e| BrowserError::LaunchFailed {
            context: format!("{opener}: {e}"),
        })?;

    if let Some(status) = child.try_wait()? {
        if !status.success() {
            return Err(BrowserError::LaunchFailed {
                context: format!("{opener} exited with {status}"),
            });
        }
        return Ok(());
    }

    // Reap the opener once it hands off to the browser.
    let spawned = std::thread::Builder::new()
        .name("browser-opener".into())
        .spawn(move || {
            let _ = child.wait();
        });
    if let Err(error) = spawned {
        warn!(%error, "failed to spawn opener reaper thread");
    }
    debug!(url, "opened desktop browser");
    Ok(())
}

/// Arguments for a headless Chromium showing `url`.
pub fn headless_args(url: &str, debugging_port: u16) -> Vec<String> {
    HEADLESS_FLAGS
        .iter()
        .map(|flag| (*flag).to_owned())
        .chain([
            format!("--remote-debugging-port={debugging_port}"),
            url.to_owned(),
        ])
        .collect()
}

/// Launch headless Chromium on `url` with DevTools on `debugging_port`.
pub fn launch_headless(url: &str, debugging_port: u16) -> Result<HeadlessBrowser, BrowserError> {
    let binary = find_chromium().ok_or(BrowserError::ChromeNotFound)?;
    launch_headless_with(&binary, url, debugging_port)
}

/// [`launch_headless`] with an explicit binary.
pub fn launch_headless_with(
    binary: &Path,
    url: &str,
    debugging_port: u16,
) -> Result<HeadlessBrowser, BrowserError> {
    let mut child = quiet(Command::new(binary).args(headless_args(url, debugging_port)))
        .spawn()
        .map_err(|e| BrowserError::LaunchFailed {
            context: format!("{}: {e}", binary.display()),
        })?;

    if let Some(status) = child.try_wait()? {
        return Err(BrowserError::LaunchFailed {
            context: format!("{} exited early with {status}", binary.display()),
        });
    }

    debug!(pid = child.id(), binary = %binary.display(), debugging_port, "headless browser started");
    Ok(HeadlessBrowser {
        child: Some(child),
        debugging_port,
    })
}

fn quiet(command: &mut Command) -> &mut Command {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
}

/// A running headless browser. Killed and reaped on drop.
#[derive(Debug)]
pub struct HeadlessBrowser {
    child: Option<Child>,
    debugging_port: u16,
}

impl HeadlessBrowser {
    /// OS process id, `None` once killed.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Remote debugging port the browser was started with.
    pub fn debugging_port(&self) -> u16 {
        self.debugging_port
    }

    /// Whether the process is still alive.
    pub fn is_running(&mut self) -> bool {
        self.child
            .as_mut()
            .is_some_and(|child| matches!(child.try_wait(), Ok(None)))
    }

    /// Kill and reap the process. Idempotent.
    pub fn kill(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        debug!(pid = child.id(), "killing headless browser");
        if let Err(error) = child.kill() {
            debug!(%error, "kill failed, process already gone");
        }
        let _ = child.wait();
    }
}

impl Drop for HeadlessBrowser {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let file = dir.join(name);
        std::fs::write(&file, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o755)).unwrap();
        file
    }

    #[test]
    fn headless_args_end_with_port_and_url() {
        let args = headless_args("http://localhost:8000", 9333);
        assert_eq!(args[0], "--headless");
        assert!(args.contains(&"--no-sandbox".to_owned()));
        assert_eq!(args[args.len() - 2], "--remote-debugging-port=9333");
        assert_eq!(args[args.len() - 1], "http://localhost:8000");
    }

    #[test]
    fn missing_opener_fails() {
        let result = open_with("/nonexistent/xdg-open", "http://localhost:1");
        assert_matches!(result, Err(BrowserError::LaunchFailed { .. }));
    }

    #[test]
    fn headless_browser_is_killed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let fake = script(dir.path(), "fake-chromium", "exec sleep 30");

        let mut browser = launch_headless_with(&fake, "http://localhost:1", 9444).unwrap();
        assert_eq!(browser.debugging_port(), 9444);
        assert!(browser.pid().is_some());
        assert!(browser.is_running());

        browser.kill();
        assert!(browser.pid().is_none());
        assert!(!browser.is_running());
        browser.kill();
    }

    #[test]
    fn unlaunchable_binary_fails() {
        let result = launch_headless_with(Path::new("/nonexistent/chromium"), "http://x", 1);
        assert_matches!(result, Err(BrowserError::LaunchFailed { .. }));
    }
}
