//! Error types for codexdeck
//!
//! Provides a unified error type used across all codexdeck crates.

use std::path::PathBuf;

/// Main error type for codexdeck operations
#[derive(Debug, thiserror::Error)]
pub enum DeckError {
    // === IO Errors ===

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    // === Agent Spawn Errors ===

    #[error("codex binary not found on PATH: {0}")]
    BinaryNotFound(String),

    #[error("codex binary {binary} failed its version check: {detail}")]
    BinaryFailed { binary: String, detail: String },

    #[error("codex binary {binary} did not answer --version within {seconds}s")]
    PreflightTimeout { binary: String, seconds: u64 },

    #[error("Failed to spawn process: {0}")]
    ProcessSpawn(String),

    // === Protocol Errors ===

    #[error("initialize handshake timed out after {seconds}s")]
    HandshakeTimeout { seconds: u64 },

    #[error("session has not completed the initialize handshake")]
    NotInitialized,

    #[error("Failed to write to agent stdin: {0}")]
    WriteFailed(String),

    #[error("request {method} (id {id}) timed out after {seconds}s")]
    RequestTimeout {
        method: String,
        id: u64,
        seconds: u64,
    },

    #[error("session closed before a response arrived")]
    SessionClosed,

    // === Registry Errors ===

    #[error("Workspace not found: {0}")]
    WorkspaceNotFound(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    // === Terminal Errors ===

    #[error("PTY error: {0}")]
    Pty(String),

    #[error("Terminal write failed for {terminal_id}: {detail}")]
    TerminalIo {
        terminal_id: String,
        detail: String,
    },

    // === Serialization Errors ===

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeckError {
    /// Create a PTY error
    pub fn pty(msg: impl Into<String>) -> Self {
        Self::Pty(msg.into())
    }

    /// Create a process spawn error
    pub fn spawn(msg: impl Into<String>) -> Self {
        Self::ProcessSpawn(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error is fatal to the whole connection attempt rather
    /// than to a single request
    pub fn is_connect_fatal(&self) -> bool {
        matches!(
            self,
            Self::BinaryNotFound(_)
                | Self::BinaryFailed { .. }
                | Self::PreflightTimeout { .. }
                | Self::ProcessSpawn(_)
                | Self::HandshakeTimeout { .. }
        )
    }
}

/// Result type alias using DeckError
pub type Result<T> = std::result::Result<T, DeckError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DeckError::BinaryNotFound("codex".into());
        assert_eq!(err.to_string(), "codex binary not found on PATH: codex");

        let err = DeckError::RequestTimeout {
            method: "thread/start".into(),
            id: 4,
            seconds: 15,
        };
        assert_eq!(
            err.to_string(),
            "request thread/start (id 4) timed out after 15s"
        );
    }

    #[test]
    fn test_connect_fatal_classification() {
        assert!(DeckError::HandshakeTimeout { seconds: 15 }.is_connect_fatal());
        assert!(DeckError::BinaryNotFound("codex".into()).is_connect_fatal());
        assert!(!DeckError::RequestTimeout {
            method: "m".into(),
            id: 1,
            seconds: 15
        }
        .is_connect_fatal());
        assert!(!DeckError::SessionClosed.is_connect_fatal());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "not found");
        let err: DeckError = io_err.into();
        assert!(matches!(err, DeckError::Io(_)));
    }
}
