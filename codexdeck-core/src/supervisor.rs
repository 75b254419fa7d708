//! Agent process supervision
//!
//! Resolves which codex binary to run, checks it actually works with a short
//! `--version` preflight, and spawns the long-lived subprocess with piped
//! standard streams. Binaries installed by user-level package managers are
//! found through an augmented PATH even when the inherited environment does
//! not include them.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{debug, info};

use codexdeck_utils::{DeckError, Result};

/// Bound on the `--version` preflight
pub const PREFLIGHT_TIMEOUT: Duration = Duration::from_secs(5);

/// Command name used when neither an override nor a default is configured
pub const DEFAULT_BINARY: &str = "codex";

/// Resolve the binary to run.
///
/// A non-empty override (after trimming) takes precedence over the default;
/// an empty or whitespace-only override is treated as absent.
pub fn resolve_binary(override_binary: Option<&str>, default: &str) -> String {
    if let Some(value) = override_binary {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let default = default.trim();
    if default.is_empty() {
        DEFAULT_BINARY.to_string()
    } else {
        default.to_string()
    }
}

/// Directories appended to the search path for bare command names.
///
/// Covers the usual user-local install locations that GUI app environments
/// do not inherit.
fn extra_search_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(home) = std::env::var_os("HOME") {
        let home = PathBuf::from(home);
        dirs.push(home.join(".local").join("bin"));
        dirs.push(home.join(".cargo").join("bin"));
        dirs.push(home.join(".bun").join("bin"));
        dirs.push(home.join(".npm-global").join("bin"));
    }
    dirs.push(PathBuf::from("/usr/local/bin"));
    dirs.push(PathBuf::from("/opt/homebrew/bin"));
    dirs
}

/// The inherited PATH with the extra search dirs appended (deduplicated)
pub fn augmented_path() -> OsString {
    let mut paths = std::env::var_os("PATH")
        .map(|value| std::env::split_paths(&value).collect::<Vec<_>>())
        .unwrap_or_default();

    for dir in extra_search_dirs() {
        if !paths.iter().any(|candidate| candidate == &dir) {
            paths.push(dir);
        }
    }

    std::env::join_paths(paths).unwrap_or_else(|_| OsString::from(""))
}

fn base_command(binary: &str) -> Command {
    let mut cmd = Command::new(binary);
    // Bare command names are resolved by the OS against this PATH;
    // paths containing a separator bypass the search entirely.
    cmd.env("PATH", augmented_path());
    cmd
}

fn map_spawn_error(binary: &str, err: std::io::Error) -> DeckError {
    if err.kind() == std::io::ErrorKind::NotFound {
        DeckError::BinaryNotFound(binary.to_string())
    } else {
        DeckError::spawn(format!("{binary}: {err}"))
    }
}

/// Run `<binary> --version` with a short timeout.
///
/// Returns the version line on success. A missing binary, a non-zero exit,
/// and a hang each map to their own error so connect failures stay
/// actionable.
pub async fn preflight(binary: &str) -> Result<String> {
    let mut cmd = base_command(binary);
    cmd.arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let output = match tokio::time::timeout(PREFLIGHT_TIMEOUT, cmd.output()).await {
        Err(_) => {
            return Err(DeckError::PreflightTimeout {
                binary: binary.to_string(),
                seconds: PREFLIGHT_TIMEOUT.as_secs(),
            })
        }
        Ok(Err(err)) => return Err(map_spawn_error(binary, err)),
        Ok(Ok(output)) => output,
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DeckError::BinaryFailed {
            binary: binary.to_string(),
            detail: stderr.trim().to_string(),
        });
    }

    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    debug!(binary, version = %version, "preflight ok");
    Ok(version)
}

/// Spawn the long-running agent subprocess with all three pipes wired.
///
/// Does not block; protocol readiness is established later by the
/// initialize handshake.
pub fn spawn_agent(binary: &str, cwd: &Path) -> Result<Child> {
    let mut cmd = base_command(binary);
    cmd.current_dir(cwd)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let child = cmd.spawn().map_err(|err| map_spawn_error(binary, err))?;
    info!(binary, cwd = %cwd.display(), pid = child.id(), "agent spawned");
    Ok(child)
}
