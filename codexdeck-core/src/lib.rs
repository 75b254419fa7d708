//! codexdeck-core
//!
//! Orchestrates one long-lived codex agent subprocess per workspace and a set
//! of interactive terminal sessions, exposing both to a presentation layer
//! through two event channels.
//!
//! The moving parts:
//! - [`supervisor`] resolves and preflights the agent binary, then spawns it
//! - [`transport`] frames the newline-delimited JSON streams
//! - [`rpc`] correlates requests with responses and enforces timeouts
//! - [`router`] classifies incoming frames and fans events out
//! - [`session`] ties one subprocess, its loops, and its handshake together
//! - [`registry`] maps workspace ids to entries and live sessions
//! - [`terminal`] multiplexes pseudo-terminals keyed by workspace + terminal

pub mod registry;
pub mod router;
pub mod rpc;
pub mod session;
pub mod store;
pub mod supervisor;
pub mod terminal;
pub mod transport;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use codexdeck_protocol::{AppServerEvent, JsonValue, TerminalEvent};
use codexdeck_utils::Result;

pub use registry::{Registry, WorkspaceDescriptor, WorkspaceEntry, WorkspaceKind};
pub use session::{Session, SessionConfig};
pub use store::WorkspaceStore;
pub use terminal::{TerminalKey, TerminalManager};

/// Top-level handle composing the session registry and the terminal
/// multiplexer. This is the surface a presentation layer embeds.
pub struct Orchestrator {
    registry: Arc<Registry>,
    terminals: Arc<TerminalManager>,
}

impl Orchestrator {
    /// Build an orchestrator around a workspace store.
    ///
    /// Returns the orchestrator plus the two event streams the presentation
    /// layer subscribes to: agent protocol events and terminal events.
    pub fn new(
        config: SessionConfig,
        store: WorkspaceStore,
    ) -> Result<(
        Self,
        mpsc::UnboundedReceiver<AppServerEvent>,
        mpsc::UnboundedReceiver<TerminalEvent>,
    )> {
        let (app_tx, app_rx) = mpsc::unbounded_channel();
        let (term_tx, term_rx) = mpsc::unbounded_channel();

        let registry = Arc::new(Registry::new(config, store, app_tx)?);
        let terminals = Arc::new(TerminalManager::new(term_tx));

        info!(workspaces = registry.len(), "orchestrator ready");

        Ok((
            Self {
                registry,
                terminals,
            },
            app_rx,
            term_rx,
        ))
    }

    /// The workspace/session registry
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The terminal multiplexer
    pub fn terminals(&self) -> &Arc<TerminalManager> {
        &self.terminals
    }

    /// List workspace entries with their derived connected flag
    pub fn list_workspaces(&self) -> Vec<WorkspaceDescriptor> {
        self.registry.list()
    }

    /// Add or replace a workspace entry
    pub fn upsert_workspace(&self, entry: WorkspaceEntry) -> Result<()> {
        self.registry.upsert(entry)
    }

    /// Remove a workspace, cascading to its worktree children.
    ///
    /// Child sessions and terminals are torn down before the parent's.
    pub fn remove_workspace(&self, workspace_id: &str) -> Result<()> {
        let removed = self.registry.remove_workspace(workspace_id)?;
        for id in &removed {
            self.terminals.close_workspace(id);
        }
        Ok(())
    }

    /// Connect a workspace, spawning its agent session if absent
    pub async fn connect(&self, workspace_id: &str) -> Result<Arc<Session>> {
        self.registry.connect(workspace_id).await
    }

    /// Disconnect a workspace's live session, if any
    pub fn disconnect(&self, workspace_id: &str) -> bool {
        self.registry.disconnect(workspace_id)
    }

    /// Send a request on a connected workspace's session
    pub async fn request(
        &self,
        workspace_id: &str,
        method: &str,
        params: JsonValue,
    ) -> Result<JsonValue> {
        let session = self.registry.require_session(workspace_id)?;
        session.request(method, params).await
    }

    /// Send a notification on a connected workspace's session
    pub async fn notify(
        &self,
        workspace_id: &str,
        method: &str,
        params: Option<JsonValue>,
    ) -> Result<()> {
        let session = self.registry.require_session(workspace_id)?;
        session.notify(method, params).await
    }

    /// Reply to a server-initiated request on a workspace's session
    pub async fn respond(&self, workspace_id: &str, id: u64, result: JsonValue) -> Result<()> {
        let session = self.registry.require_session(workspace_id)?;
        session.respond(id, result).await
    }

    /// Open (or reuse) a terminal for a workspace
    pub fn open_terminal(
        &self,
        workspace_id: &str,
        terminal_id: &str,
        cols: u16,
        rows: u16,
    ) -> Result<()> {
        let cwd = self.workspace_path(workspace_id)?;
        self.terminals.open(
            TerminalKey::new(workspace_id, terminal_id),
            &cwd,
            cols,
            rows,
        )
    }

    /// Write input to a terminal
    pub fn write_terminal(&self, workspace_id: &str, terminal_id: &str, data: &str) -> Result<()> {
        self.terminals
            .write(&TerminalKey::new(workspace_id, terminal_id), data)
    }

    /// Resize a terminal
    pub fn resize_terminal(
        &self,
        workspace_id: &str,
        terminal_id: &str,
        cols: u16,
        rows: u16,
    ) -> Result<()> {
        self.terminals
            .resize(&TerminalKey::new(workspace_id, terminal_id), cols, rows)
    }

    /// Close a terminal; unknown keys are a no-op
    pub fn close_terminal(&self, workspace_id: &str, terminal_id: &str) {
        self.terminals
            .close(&TerminalKey::new(workspace_id, terminal_id));
    }

    fn workspace_path(&self, workspace_id: &str) -> Result<PathBuf> {
        self.registry
            .get(workspace_id)
            .map(|entry| entry.path)
            .ok_or_else(|| {
                codexdeck_utils::DeckError::WorkspaceNotFound(workspace_id.to_string())
            })
    }
}
