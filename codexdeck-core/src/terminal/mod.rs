//! Terminal multiplexer
//!
//! Manages interactive shell sessions on pseudo-terminals, keyed by
//! workspace + terminal id. Each terminal gets a blocking reader task that
//! decodes output through [`Utf8CarryDecoder`] and pushes it onto the shared
//! terminal event channel. An exit event is emitted exactly once, when the
//! shell goes away on its own; an explicit close is silent.

mod utf8;

pub use utf8::Utf8CarryDecoder;

use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use codexdeck_protocol::{TerminalEvent, TerminalExitEvent, TerminalOutputEvent};
use codexdeck_utils::{DeckError, Result};

const READ_BUF_SIZE: usize = 4096;

/// Composite key for one terminal
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TerminalKey {
    pub workspace_id: String,
    pub terminal_id: String,
}

impl TerminalKey {
    pub fn new(workspace_id: impl Into<String>, terminal_id: impl Into<String>) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            terminal_id: terminal_id.into(),
        }
    }
}

/// Per-terminal state. The writer and master sit behind their own locks so
/// pty I/O never happens under the shared table mutex; a write that blocks
/// on a full kernel buffer stalls only its own terminal.
struct TerminalHandle {
    master: Arc<Mutex<Box<dyn MasterPty + Send>>>,
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    child: Box<dyn Child + Send + Sync>,
}

impl TerminalHandle {
    fn shutdown(mut self) {
        // Already-exited children report an error here; nothing to do
        if let Err(err) = self.child.kill() {
            debug!(%err, "terminal child kill skipped");
        }
        let _ = self.child.wait();
    }
}

pub struct TerminalManager {
    events: mpsc::UnboundedSender<TerminalEvent>,
    terminals: Mutex<HashMap<TerminalKey, TerminalHandle>>,
}

impl TerminalManager {
    pub fn new(events: mpsc::UnboundedSender<TerminalEvent>) -> Self {
        Self {
            events,
            terminals: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.terminals.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Open a shell terminal for the key; a key that is already open is left
    /// alone.
    pub fn open(self: &Arc<Self>, key: TerminalKey, cwd: &Path, cols: u16, rows: u16) -> Result<()> {
        if self.terminals.lock().contains_key(&key) {
            return Ok(());
        }

        let pty = native_pty_system();
        let pair = pty
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|err| DeckError::pty(err.to_string()))?;

        let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/bash".to_string());
        let mut cmd = CommandBuilder::new(&shell);
        cmd.cwd(cwd);
        cmd.env("TERM", "xterm-256color");
        cmd.env("LANG", "en_US.UTF-8");

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|err| DeckError::pty(err.to_string()))?;
        // The slave side belongs to the child now
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|err| DeckError::pty(err.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|err| DeckError::pty(err.to_string()))?;

        let handle = TerminalHandle {
            master: Arc::new(Mutex::new(pair.master)),
            writer: Arc::new(Mutex::new(writer)),
            child,
        };

        {
            let mut terminals = self.terminals.lock();
            if terminals.contains_key(&key) {
                // Lost a race with a concurrent open for the same key
                drop(terminals);
                handle.shutdown();
                return Ok(());
            }
            terminals.insert(key.clone(), handle);
        }

        info!(
            workspace = %key.workspace_id,
            terminal = %key.terminal_id,
            %shell,
            "terminal opened"
        );
        self.spawn_reader(key, reader);
        Ok(())
    }

    /// Write input bytes to a terminal. A dead pty tears the terminal down.
    pub fn write(&self, key: &TerminalKey, data: &str) -> Result<()> {
        // Clone the writer handle out, then drop the table lock before any
        // I/O so a blocked pty cannot stall unrelated terminals.
        let writer = {
            let terminals = self.terminals.lock();
            let handle = terminals.get(key).ok_or_else(|| DeckError::TerminalIo {
                terminal_id: key.terminal_id.clone(),
                detail: "terminal not open".to_string(),
            })?;
            handle.writer.clone()
        };

        let write_result = {
            let mut writer = writer.lock();
            writer
                .write_all(data.as_bytes())
                .and_then(|_| writer.flush())
        };

        if let Err(err) = write_result {
            warn!(
                workspace = %key.workspace_id,
                terminal = %key.terminal_id,
                %err,
                "terminal write failed, closing"
            );
            if let Some(handle) = self.take(key) {
                handle.shutdown();
            }
            return Err(DeckError::TerminalIo {
                terminal_id: key.terminal_id.clone(),
                detail: err.to_string(),
            });
        }
        Ok(())
    }

    /// Resize a terminal's pty
    pub fn resize(&self, key: &TerminalKey, cols: u16, rows: u16) -> Result<()> {
        let master = {
            let terminals = self.terminals.lock();
            let handle = terminals.get(key).ok_or_else(|| DeckError::TerminalIo {
                terminal_id: key.terminal_id.clone(),
                detail: "terminal not open".to_string(),
            })?;
            handle.master.clone()
        };

        let master = master.lock();
        master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|err| DeckError::pty(err.to_string()))
    }

    /// Close a terminal without an exit event; unknown keys are a no-op
    pub fn close(&self, key: &TerminalKey) {
        if let Some(handle) = self.take(key) {
            handle.shutdown();
            info!(
                workspace = %key.workspace_id,
                terminal = %key.terminal_id,
                "terminal closed"
            );
        }
    }

    /// Close every terminal belonging to a workspace
    pub fn close_workspace(&self, workspace_id: &str) {
        let keys: Vec<TerminalKey> = {
            let terminals = self.terminals.lock();
            terminals
                .keys()
                .filter(|key| key.workspace_id == workspace_id)
                .cloned()
                .collect()
        };
        for key in keys {
            self.close(&key);
        }
    }

    fn take(&self, key: &TerminalKey) -> Option<TerminalHandle> {
        self.terminals.lock().remove(key)
    }

    fn spawn_reader(self: &Arc<Self>, key: TerminalKey, mut reader: Box<dyn Read + Send>) {
        let manager = Arc::downgrade(self);
        let events = self.events.clone();

        tokio::task::spawn_blocking(move || {
            let mut decoder = Utf8CarryDecoder::new();
            let mut buf = [0u8; READ_BUF_SIZE];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        let text = decoder.decode(&buf[..n]);
                        if !text.is_empty() {
                            let _ = events.send(TerminalEvent::Output(TerminalOutputEvent {
                                workspace_id: key.workspace_id.clone(),
                                terminal_id: key.terminal_id.clone(),
                                data: text,
                            }));
                        }
                    }
                    Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                    Err(err) => {
                        debug!(
                            terminal = %key.terminal_id,
                            %err,
                            "terminal read ended"
                        );
                        break;
                    }
                }
            }

            let tail = decoder.flush();
            if !tail.is_empty() {
                let _ = events.send(TerminalEvent::Output(TerminalOutputEvent {
                    workspace_id: key.workspace_id.clone(),
                    terminal_id: key.terminal_id.clone(),
                    data: tail,
                }));
            }

            // Still present in the map means the shell exited on its own;
            // an explicit close already removed the entry and stays silent.
            if let Some(manager) = manager.upgrade() {
                if let Some(handle) = manager.take(&key) {
                    handle.shutdown();
                    let _ = events.send(TerminalEvent::Exit(TerminalExitEvent {
                        workspace_id: key.workspace_id.clone(),
                        terminal_id: key.terminal_id.clone(),
                    }));
                }
            }
        });
    }
}
