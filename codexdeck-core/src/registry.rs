//! Workspace and session registry
//!
//! Maps workspace ids to their persisted entries and, when connected, to a
//! live [`Session`]. All state sits behind one `parking_lot::Mutex` with
//! short critical sections; process teardown and disk writes always happen
//! after the lock is released.
//!
//! Removing a workspace cascades: worktree children lose their sessions and
//! entries before the parent does, so a child never outlives the checkout it
//! was created from.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use codexdeck_protocol::{AppServerEvent, JsonValue};
use codexdeck_utils::{DeckError, Result};

use crate::session::{Session, SessionConfig};
use crate::store::WorkspaceStore;
use crate::supervisor;

/// How a workspace came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WorkspaceKind {
    /// A checkout the user added directly
    Primary,
    /// A git worktree created under a primary workspace
    Worktree,
}

/// One persisted workspace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceEntry {
    pub id: String,
    pub name: String,
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_override: Option<String>,
    pub kind: WorkspaceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub settings: HashMap<String, JsonValue>,
}

impl WorkspaceEntry {
    /// A fresh primary workspace with a generated id
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            path: path.into(),
            binary_override: None,
            kind: WorkspaceKind::Primary,
            parent_id: None,
            settings: HashMap::new(),
        }
    }

    /// A worktree child of an existing workspace
    pub fn worktree(name: impl Into<String>, path: impl Into<PathBuf>, parent_id: impl Into<String>) -> Self {
        Self {
            kind: WorkspaceKind::Worktree,
            parent_id: Some(parent_id.into()),
            ..Self::new(name, path)
        }
    }
}

/// An entry plus its derived connection state, as handed to list callers
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceDescriptor {
    #[serde(flatten)]
    pub entry: WorkspaceEntry,
    pub connected: bool,
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<String, WorkspaceEntry>,
    sessions: HashMap<String, Arc<Session>>,
}

pub struct Registry {
    config: SessionConfig,
    store: WorkspaceStore,
    state: Mutex<RegistryState>,
    events: mpsc::UnboundedSender<AppServerEvent>,
}

impl Registry {
    /// Build a registry, loading persisted entries from the store
    pub fn new(
        config: SessionConfig,
        store: WorkspaceStore,
        events: mpsc::UnboundedSender<AppServerEvent>,
    ) -> Result<Self> {
        let entries = store
            .load()?
            .into_iter()
            .map(|entry| (entry.id.clone(), entry))
            .collect();
        Ok(Self {
            config,
            store,
            state: Mutex::new(RegistryState {
                entries,
                sessions: HashMap::new(),
            }),
            events,
        })
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entries with their derived connected flag, ordered by id
    pub fn list(&self) -> Vec<WorkspaceDescriptor> {
        let state = self.state.lock();
        let mut out: Vec<WorkspaceDescriptor> = state
            .entries
            .values()
            .map(|entry| WorkspaceDescriptor {
                entry: entry.clone(),
                connected: state
                    .sessions
                    .get(&entry.id)
                    .map(|s| s.is_connected())
                    .unwrap_or(false),
            })
            .collect();
        drop(state);
        out.sort_by(|a, b| a.entry.id.cmp(&b.entry.id));
        out
    }

    pub fn get(&self, workspace_id: &str) -> Option<WorkspaceEntry> {
        self.state.lock().entries.get(workspace_id).cloned()
    }

    /// Add or replace an entry and persist the new set
    pub fn upsert(&self, entry: WorkspaceEntry) -> Result<()> {
        let snapshot = {
            let mut state = self.state.lock();
            state.entries.insert(entry.id.clone(), entry);
            entry_snapshot(&state)
        };
        self.store.save(&snapshot)
    }

    /// Remove a workspace and every worktree child it has.
    ///
    /// Children are torn down before the parent. Returns the removed ids in
    /// teardown order so callers can cascade their own per-workspace state.
    pub fn remove_workspace(&self, workspace_id: &str) -> Result<Vec<String>> {
        let (removed, sessions, snapshot) = {
            let mut state = self.state.lock();
            if !state.entries.contains_key(workspace_id) {
                return Err(DeckError::WorkspaceNotFound(workspace_id.to_string()));
            }

            let mut removed: Vec<String> = state
                .entries
                .values()
                .filter(|entry| entry.parent_id.as_deref() == Some(workspace_id))
                .map(|entry| entry.id.clone())
                .collect();
            removed.sort();
            removed.push(workspace_id.to_string());

            let mut sessions = Vec::new();
            for id in &removed {
                state.entries.remove(id);
                if let Some(session) = state.sessions.remove(id) {
                    sessions.push(session);
                }
            }
            (removed, sessions, entry_snapshot(&state))
        };

        for session in sessions {
            session.shutdown();
        }
        self.store.save(&snapshot)?;
        info!(workspace = workspace_id, count = removed.len(), "workspace removed");
        Ok(removed)
    }

    /// The live session for a workspace, if connected
    pub fn session(&self, workspace_id: &str) -> Option<Arc<Session>> {
        self.state.lock().sessions.get(workspace_id).cloned()
    }

    pub fn require_session(&self, workspace_id: &str) -> Result<Arc<Session>> {
        self.session(workspace_id)
            .ok_or_else(|| DeckError::SessionNotFound(workspace_id.to_string()))
    }

    /// Connect a workspace, spawning and initializing its agent session.
    ///
    /// Idempotent: a workspace that is already connected gets its existing
    /// session back without touching the subprocess.
    pub async fn connect(self: &Arc<Self>, workspace_id: &str) -> Result<Arc<Session>> {
        let entry = self
            .get(workspace_id)
            .ok_or_else(|| DeckError::WorkspaceNotFound(workspace_id.to_string()))?;
        if let Some(existing) = self.session(workspace_id) {
            return Ok(existing);
        }

        let binary = supervisor::resolve_binary(
            entry.binary_override.as_deref(),
            &self.config.default_binary,
        );

        let registry = Arc::downgrade(self);
        let exit_id = entry.id.clone();
        let session = Session::spawn(
            workspace_id,
            &binary,
            &entry.path,
            &self.config,
            self.events.clone(),
            move || {
                if let Some(registry) = registry.upgrade() {
                    registry.on_session_exit(&exit_id);
                }
            },
        )
        .await?;
        session.initialize().await?;

        // Another connect may have won while we were spawning; keep the
        // first session that landed in the map.
        let raced = {
            let mut state = self.state.lock();
            match state.sessions.get(workspace_id) {
                Some(existing) => Some(existing.clone()),
                None => {
                    state.sessions.insert(workspace_id.to_string(), session.clone());
                    None
                }
            }
        };
        if let Some(existing) = raced {
            warn!(workspace = workspace_id, "concurrent connect, discarding duplicate session");
            session.shutdown();
            return Ok(existing);
        }

        Ok(session)
    }

    /// Tear down a workspace's live session; returns false if none existed
    pub fn disconnect(&self, workspace_id: &str) -> bool {
        let session = self.state.lock().sessions.remove(workspace_id);
        match session {
            Some(session) => {
                session.shutdown();
                true
            }
            None => false,
        }
    }

    /// Invoked by a session's dispatch loop when its subprocess goes away
    fn on_session_exit(&self, workspace_id: &str) {
        let removed = self.state.lock().sessions.remove(workspace_id).is_some();
        if removed {
            info!(workspace = workspace_id, "session ended, workspace disconnected");
        }
    }
}

fn entry_snapshot(state: &RegistryState) -> Vec<WorkspaceEntry> {
    let mut entries: Vec<WorkspaceEntry> = state.entries.values().cloned().collect();
    entries.sort_by(|a, b| a.id.cmp(&b.id));
    entries
}
