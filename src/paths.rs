//! Directory resolution for configuration and persisted state.
//!
//! Inside a macOS `.app` bundle the working directory is unpredictable, so
//! user directories come from the `dirs` crate there. During development
//! (`cargo run`) everything lives under the working directory.

use std::path::{Path, PathBuf};

const APP_DIR: &str = "skywalk";

/// Returns `true` when the running binary lives inside a macOS `.app` bundle
/// (the executable path contains `*.app/Contents/MacOS/`).
pub fn is_bundled() -> bool {
    std::env::current_exe()
        .ok()
        .is_some_and(|exe| is_bundle_executable(&exe))
}

fn is_bundle_executable(exe: &Path) -> bool {
    exe.ancestors().any(|dir| {
        dir.file_name().is_some_and(|n| n == "MacOS")
            && dir
                .parent()
                .and_then(Path::file_name)
                .is_some_and(|n| n == "Contents")
    })
}

fn working_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Configuration directory.
///
/// - **Bundled**: `<config dir>/skywalk/`
/// - **Dev**: current working directory
pub fn config_dir() -> PathBuf {
    if is_bundled() {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(APP_DIR)
    } else {
        working_dir()
    }
}

/// Data directory for persisted session state (last known location).
///
/// - **Bundled**: `<data dir>/skywalk/`
/// - **Dev**: `<cwd>/tmp/`
pub fn data_dir() -> PathBuf {
    if is_bundled() {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(APP_DIR)
    } else {
        working_dir().join("tmp")
    }
}

/// Ensure a directory exists, creating it and all parents if necessary.
/// Returns the path unchanged for chaining.
pub fn ensure_dir(path: &Path) -> &Path {
    let _ = std::fs::create_dir_all(path);
    path
}
