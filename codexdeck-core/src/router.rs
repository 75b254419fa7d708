//! Incoming event routing
//!
//! One router per session. Transport events flow through [`Router::dispatch`]
//! which resolves responses against the RPC pending table and forwards
//! everything the presentation layer should see, tagged with the workspace
//! id. Stderr lines and undecodable frames are wrapped as synthetic
//! notifications so subscribers handle them on the same stream.
//!
//! The router also carries the handshake gate: outbound traffic other than
//! the initialize exchange is refused until [`Router::mark_connected`] runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use codexdeck_protocol::{frames, AppServerEvent, IncomingFrame};
use codexdeck_utils::{DeckError, Result};

use crate::rpc::RpcClient;
use crate::transport::TransportEvent;

/// What the dispatch loop should do after one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Continue,
    /// The agent's stdout reached end of stream; tear the session down
    Closed,
}

pub struct Router {
    workspace_id: String,
    rpc: Arc<RpcClient>,
    events: mpsc::UnboundedSender<AppServerEvent>,
    connected: AtomicBool,
}

impl Router {
    pub fn new(
        workspace_id: impl Into<String>,
        rpc: Arc<RpcClient>,
        events: mpsc::UnboundedSender<AppServerEvent>,
    ) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            rpc,
            events,
            connected: AtomicBool::new(false),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Refuse traffic until the initialize handshake has completed
    pub fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(DeckError::NotInitialized)
        }
    }

    /// Open the gate and announce the session to subscribers
    pub fn mark_connected(&self) {
        if !self.connected.swap(true, Ordering::SeqCst) {
            self.forward(frames::connected_event(&self.workspace_id));
        }
    }

    /// Route one transport event
    pub fn dispatch(&self, event: TransportEvent) -> Dispatch {
        match event {
            TransportEvent::Frame(frame) => {
                match IncomingFrame::classify(frame) {
                    IncomingFrame::Response { id, frame } => {
                        if !self.rpc.resolve(id, frame) {
                            debug!(
                                workspace = %self.workspace_id,
                                id,
                                "dropping response with no pending request"
                            );
                        }
                    }
                    IncomingFrame::ServerRequest { frame, .. }
                    | IncomingFrame::Notification { frame, .. } => {
                        self.forward(frame);
                    }
                    IncomingFrame::Unclassified { frame } => {
                        // Valid JSON that fits no protocol role still reaches
                        // subscribers, as a diagnostic carrying the raw frame
                        warn!(
                            workspace = %self.workspace_id,
                            frame = %frame,
                            "frame with no id or method"
                        );
                        self.forward(frames::parse_error_event(
                            "frame has no id or method",
                            &frame.to_line(),
                        ));
                    }
                }
                Dispatch::Continue
            }
            TransportEvent::ParseError { error, raw } => {
                warn!(workspace = %self.workspace_id, %error, "undecodable frame from agent");
                self.forward(frames::parse_error_event(&error, &raw));
                Dispatch::Continue
            }
            TransportEvent::Stderr(line) => {
                self.forward(frames::stderr_event(&line));
                Dispatch::Continue
            }
            TransportEvent::Eof => Dispatch::Closed,
        }
    }

    fn forward(&self, message: codexdeck_protocol::JsonValue) {
        // A closed receiver means the embedder shut down; nothing to do
        let _ = self
            .events
            .send(AppServerEvent::new(self.workspace_id.clone(), message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    use codexdeck_protocol::JsonValue;

    use crate::transport::Transport;

    fn fixture() -> (
        Arc<Router>,
        Arc<RpcClient>,
        mpsc::UnboundedReceiver<AppServerEvent>,
    ) {
        let (stdin, server) = tokio::io::duplex(64 * 1024);
        std::mem::forget(server);
        let rpc = Arc::new(RpcClient::new(Arc::new(Transport::new(stdin))));
        let (tx, rx) = mpsc::unbounded_channel();
        let router = Arc::new(Router::new("ws1", rpc.clone(), tx));
        (router, rpc, rx)
    }

    fn frame(value: serde_json::Value) -> TransportEvent {
        TransportEvent::Frame(JsonValue::new(value))
    }

    #[tokio::test]
    async fn test_response_resolves_pending_request() {
        let (router, rpc, mut rx) = fixture();

        let handle = tokio::spawn({
            let rpc = rpc.clone();
            async move {
                rpc.request("m", JsonValue::null(), Duration::from_secs(2))
                    .await
            }
        });
        while rpc.pending_ids().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(
            router.dispatch(frame(json!({"id": 1, "result": {"ok": true}}))),
            Dispatch::Continue
        );
        let response = handle.await.unwrap().unwrap();
        assert_eq!(response.get("result"), Some(&json!({"ok": true})));

        // Responses never reach the event stream
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_notification_and_server_request_are_forwarded() {
        let (router, _rpc, mut rx) = fixture();

        router.dispatch(frame(json!({"method": "codex/event", "params": {"k": 1}})));
        router.dispatch(frame(json!({"id": 9, "method": "applyPatchApproval", "params": {}})));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.workspace_id, "ws1");
        assert_eq!(
            event.message.get("method").and_then(|v| v.as_str()),
            Some("codex/event")
        );

        let event = rx.try_recv().unwrap();
        assert_eq!(event.message.get("id").and_then(|v| v.as_u64()), Some(9));
    }

    #[tokio::test]
    async fn test_unclassified_frame_becomes_diagnostic() {
        let (router, _rpc, mut rx) = fixture();
        router.dispatch(frame(json!({"data": 42})));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.workspace_id, "ws1");
        assert_eq!(
            event.message.get("method").and_then(|v| v.as_str()),
            Some(frames::PARSE_ERROR_METHOD)
        );
        // The raw frame rides along for debugging
        assert_eq!(
            event
                .message
                .get("params")
                .and_then(|p| p.get("raw"))
                .and_then(|v| v.as_str()),
            Some("{\"data\":42}")
        );
    }

    #[tokio::test]
    async fn test_parse_error_and_stderr_become_synthetic_events() {
        let (router, _rpc, mut rx) = fixture();

        router.dispatch(TransportEvent::ParseError {
            error: "expected value".into(),
            raw: "not json".into(),
        });
        router.dispatch(TransportEvent::Stderr("warning: slow".into()));

        let event = rx.try_recv().unwrap();
        assert_eq!(
            event.message.get("method").and_then(|v| v.as_str()),
            Some(frames::PARSE_ERROR_METHOD)
        );
        assert_eq!(
            event
                .message
                .get("params")
                .and_then(|p| p.get("raw"))
                .and_then(|v| v.as_str()),
            Some("not json")
        );

        let event = rx.try_recv().unwrap();
        assert_eq!(
            event.message.get("method").and_then(|v| v.as_str()),
            Some(frames::STDERR_METHOD)
        );
    }

    #[tokio::test]
    async fn test_gate_opens_once_and_announces() {
        let (router, _rpc, mut rx) = fixture();

        assert!(matches!(
            router.ensure_connected(),
            Err(DeckError::NotInitialized)
        ));

        router.mark_connected();
        router.mark_connected();
        assert!(router.ensure_connected().is_ok());

        let event = rx.try_recv().unwrap();
        assert_eq!(
            event.message.get("method").and_then(|v| v.as_str()),
            Some(frames::CONNECTED_METHOD)
        );
        // Second mark is a no-op
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_eof_requests_teardown() {
        let (router, _rpc, _rx) = fixture();
        assert_eq!(router.dispatch(TransportEvent::Eof), Dispatch::Closed);
    }
}
