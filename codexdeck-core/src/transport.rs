//! Session transport and line framing
//!
//! Outgoing frames are serialized to one JSON line and written through a
//! single async mutex so concurrent senders never interleave bytes. Incoming
//! bytes are framed by `LinesCodec` on dedicated reader tasks, one for stdout
//! and one for stderr; each reader owns its buffer and pushes decoded frames
//! through a channel, so no byte buffer is ever shared across tasks.
//!
//! A line that fails to decode as JSON never kills the stream. It is turned
//! into a [`TransportEvent::ParseError`] and forwarded like any other event.

use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use codexdeck_protocol::JsonValue;
use codexdeck_utils::{DeckError, Result};

/// One item produced by a session's reader loops
#[derive(Debug)]
pub enum TransportEvent {
    /// A decoded protocol frame from stdout
    Frame(JsonValue),
    /// A stdout line that was not valid JSON
    ParseError { error: String, raw: String },
    /// One line from the agent's stderr
    Stderr(String),
    /// The stdout stream ended; the subprocess is gone
    Eof,
}

/// Owns the agent's stdin and serializes all outgoing frames
pub struct Transport {
    stdin: tokio::sync::Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
}

impl Transport {
    pub fn new(stdin: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            stdin: tokio::sync::Mutex::new(Box::new(stdin)),
        }
    }

    /// Write one frame as a single JSON line.
    ///
    /// The line and its trailing newline go out in one buffered write under
    /// the stdin lock, so concurrent callers cannot interleave. A dead pipe
    /// surfaces as [`DeckError::WriteFailed`]; writes are never retried.
    pub async fn write_frame(&self, frame: &JsonValue) -> Result<()> {
        let mut line = frame.to_line();
        line.push('\n');

        let mut stdin = self.stdin.lock().await;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| DeckError::WriteFailed(e.to_string()))?;
        stdin
            .flush()
            .await
            .map_err(|e| DeckError::WriteFailed(e.to_string()))?;
        Ok(())
    }
}

/// Spawn the stdout reader loop.
///
/// Every newline-terminated chunk is trimmed, decoded, and forwarded; blank
/// lines are skipped. The loop ends on cancellation or end of stream, at
/// which point a single [`TransportEvent::Eof`] is emitted.
pub fn spawn_stdout_reader(
    stdout: impl AsyncRead + Send + Unpin + 'static,
    tx: mpsc::UnboundedSender<TransportEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = FramedRead::new(stdout, LinesCodec::new());
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("stdout reader cancelled");
                    return;
                }
                item = lines.next() => match item {
                    Some(Ok(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        let event = match JsonValue::parse(line) {
                            Ok(frame) => TransportEvent::Frame(frame),
                            Err(err) => TransportEvent::ParseError {
                                error: err.to_string(),
                                raw: line.to_string(),
                            },
                        };
                        if tx.send(event).is_err() {
                            return;
                        }
                    }
                    Some(Err(err)) => {
                        warn!(error = %err, "stdout framing error");
                        let _ = tx.send(TransportEvent::Eof);
                        return;
                    }
                    None => {
                        let _ = tx.send(TransportEvent::Eof);
                        return;
                    }
                }
            }
        }
    })
}

/// Spawn the stderr reader loop.
///
/// Stderr is line-framed the same way but never treated as protocol
/// traffic; each line becomes a [`TransportEvent::Stderr`] diagnostic.
pub fn spawn_stderr_reader(
    stderr: impl AsyncRead + Send + Unpin + 'static,
    tx: mpsc::UnboundedSender<TransportEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = FramedRead::new(stderr, LinesCodec::new());
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                item = lines.next() => match item {
                    Some(Ok(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        if tx.send(TransportEvent::Stderr(line)).is_err() {
                            return;
                        }
                    }
                    // stderr ending does not mean the protocol is down
                    Some(Err(_)) | None => return,
                }
            }
        }
    })
}
