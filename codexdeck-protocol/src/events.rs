//! Events surfaced to the presentation layer
//!
//! Every protocol frame a session forwards is wrapped with its workspace id
//! so subscribers can demultiplex a single event stream. Terminal output and
//! exit travel on their own channel with a composite key.

use serde::{Deserialize, Serialize};

use crate::value::JsonValue;

/// One protocol event from an agent session, tagged with its workspace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppServerEvent {
    pub workspace_id: String,
    pub message: JsonValue,
}

impl AppServerEvent {
    pub fn new(workspace_id: impl Into<String>, message: JsonValue) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            message,
        }
    }
}

/// Decoded output from one terminal session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalOutputEvent {
    pub workspace_id: String,
    pub terminal_id: String,
    pub data: String,
}

/// Emitted once when a terminal's child process exits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalExitEvent {
    pub workspace_id: String,
    pub terminal_id: String,
}

/// Terminal event stream item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TerminalEvent {
    Output(TerminalOutputEvent),
    Exit(TerminalExitEvent),
}
