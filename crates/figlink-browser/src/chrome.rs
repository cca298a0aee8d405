//! Chromium binary discovery and display detection.

use std::ffi::OsStr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Executable names tried on `PATH`, in priority order.
pub const CANDIDATES: &[&str] = &["chromium", "google-chrome", "chromium-browser"];

/// Find a Chromium-family binary.
///
/// Search order:
/// 1. `CHROME_PATH` environment variable
/// 2. [`CANDIDATES`] on `PATH`
pub fn find_chromium() -> Option<PathBuf> {
    find_chromium_in(
        std::env::var_os("CHROME_PATH").as_deref(),
        std::env::var_os("PATH").as_deref(),
    )
}

/// [`find_chromium`] against explicit `CHROME_PATH` and `PATH` values.
pub fn find_chromium_in(chrome_path: Option<&OsStr>, path: Option<&OsStr>) -> Option<PathBuf> {
    if let Some(explicit) = chrome_path {
        let explicit = PathBuf::from(explicit);
        if is_executable(&explicit) {
            return Some(explicit);
        }
        tracing::debug!(path = %explicit.display(), "CHROME_PATH set but not executable, falling through");
    }

    let dirs: Vec<PathBuf> = path.map(|p| std::env::split_paths(p).collect()).unwrap_or_default();
    CANDIDATES.iter().find_map(|name| {
        dirs.iter().map(|dir| dir.join(name)).find(|candidate| {
            let found = is_executable(candidate);
            if found {
                tracing::debug!(path = %candidate.display(), "found Chromium binary");
            }
            found
        })
    })
}

/// Whether a graphical session is available for a desktop browser.
pub fn is_display_available() -> bool {
    display_available_from(
        std::env::var_os("DISPLAY").as_deref(),
        std::env::var_os("WAYLAND_DISPLAY").as_deref(),
    )
}

/// [`is_display_available`] against explicit variable values.
pub fn display_available_from(display: Option<&OsStr>, wayland: Option<&OsStr>) -> bool {
    [display, wayland]
        .into_iter()
        .flatten()
        .any(|value| !value.is_empty())
}

/// Check if a path exists and is executable.
fn is_executable(path: &Path) -> bool {
    path.is_file()
        && path
            .metadata()
            .map(|m| m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    fn write_executable(dir: &Path, name: &str) -> PathBuf {
        let file = dir.join(name);
        std::fs::write(&file, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o755)).unwrap();
        file
    }

    #[test]
    fn explicit_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let fake = write_executable(dir.path(), "my-chrome");
        let other = tempfile::tempdir().unwrap();
        let _ = write_executable(other.path(), "chromium");

        let found = find_chromium_in(Some(fake.as_os_str()), Some(other.path().as_os_str()));
        assert_eq!(found, Some(fake));
    }

    #[test]
    fn explicit_non_executable_falls_through_to_path() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("plain");
        std::fs::write(&plain, "not a binary").unwrap();
        std::fs::set_permissions(&plain, std::fs::Permissions::from_mode(0o644)).unwrap();
        let bin = tempfile::tempdir().unwrap();
        let chromium = write_executable(bin.path(), "chromium-browser");

        let found = find_chromium_in(Some(plain.as_os_str()), Some(bin.path().as_os_str()));
        assert_eq!(found, Some(chromium));
    }

    #[test]
    fn candidate_order_is_respected_across_path_entries() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let _ = write_executable(first.path(), "google-chrome");
        let chromium = write_executable(second.path(), "chromium");

        let path: OsString = std::env::join_paths([first.path(), second.path()]).unwrap();
        assert_eq!(find_chromium_in(None, Some(&path)), Some(chromium));
    }

    #[test]
    fn nothing_found_on_empty_path() {
        let empty = tempfile::tempdir().unwrap();
        assert_eq!(find_chromium_in(None, Some(empty.path().as_os_str())), None);
        assert_eq!(find_chromium_in(None, None), None);
    }

    #[test]
    fn display_detection() {
        assert!(!display_available_from(None, None));
        assert!(!display_available_from(Some(OsStr::new("")), None));
        assert!(display_available_from(Some(OsStr::new(":0")), None));
        assert!(display_available_from(None, Some(OsStr::new("wayland-0"))));
    }
}
