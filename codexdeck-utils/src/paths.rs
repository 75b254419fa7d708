//! Path utilities for codexdeck
//!
//! Handles XDG Base Directory specification compliance for data, state,
//! and log directories.

use directories::ProjectDirs;
use std::path::PathBuf;

/// Application identifier for XDG directories
const APP_NAME: &str = "codexdeck";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", APP_NAME)
}

/// Get the data directory (persistent data like the workspace registry)
///
/// Location: `$XDG_DATA_HOME/codexdeck` or `~/.local/share/codexdeck`
pub fn data_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.data_local_dir().to_path_buf())
        .unwrap_or_else(fallback_data_dir)
}

/// Get the state directory (logs and other rebuildable state)
///
/// Location: `$XDG_STATE_HOME/codexdeck` or `~/.local/state/codexdeck`
pub fn state_dir() -> PathBuf {
    project_dirs()
        .and_then(|p| p.state_dir().map(|d| d.to_path_buf()))
        .unwrap_or_else(fallback_state_dir)
}

/// Get the log directory
///
/// Location: `$XDG_STATE_HOME/codexdeck/log`
pub fn log_dir() -> PathBuf {
    state_dir().join("log")
}

/// Get the workspace registry file path
///
/// Location: `$XDG_DATA_HOME/codexdeck/workspaces.json`
pub fn workspaces_file() -> PathBuf {
    data_dir().join("workspaces.json")
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &PathBuf) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

// Fallback implementations when ProjectDirs is unavailable

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

fn fallback_state_dir() -> PathBuf {
    home_dir().join(".local").join("state").join(APP_NAME)
}

fn fallback_data_dir() -> PathBuf {
    home_dir().join(".local").join("share").join(APP_NAME)
}
