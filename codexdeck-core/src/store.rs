//! Workspace store
//!
//! Persists the registry's workspace entries as a JSON document so the set of
//! known workspaces survives restarts. The file lives under the app data dir
//! (`workspaces.json`) unless the embedder points the store elsewhere, which
//! the tests do with a temp dir.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use codexdeck_utils::{paths, DeckError, Result};

use crate::registry::WorkspaceEntry;

pub struct WorkspaceStore {
    path: PathBuf,
}

impl WorkspaceStore {
    /// Store backed by the platform data directory
    pub fn default_location() -> Result<Self> {
        Ok(Self::at(paths::workspaces_file()))
    }

    /// Store backed by an explicit file path
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all persisted entries; a missing file is an empty registry
    pub fn load(&self) -> Result<Vec<WorkspaceEntry>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no workspace file yet");
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(DeckError::FileRead {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let entries: Vec<WorkspaceEntry> = serde_json::from_str(&raw)?;
        debug!(count = entries.len(), "loaded workspace entries");
        Ok(entries)
    }

    /// Persist the full entry set, replacing the file atomically
    pub fn save(&self, entries: &[WorkspaceEntry]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            paths::ensure_dir(&parent.to_path_buf()).map_err(|source| DeckError::FileWrite {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let rendered = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, rendered).map_err(|source| DeckError::FileWrite {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| DeckError::FileWrite {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }
}
