//! Request/response correlation
//!
//! Assigns monotonically increasing request ids scoped to one session and
//! bridges each outstanding request to its caller through a one-shot channel
//! stored in the pending table. Exactly one of {response, timeout, session
//! teardown} resolves a caller; whichever happens first wins and the others
//! find the table slot already empty.
//!
//! The pending table lock is only ever held to insert or remove an entry.
//! All I/O happens outside it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use codexdeck_protocol::{frames, JsonValue};
use codexdeck_utils::{DeckError, Result};

use crate::transport::Transport;

/// Correlates outgoing requests with incoming responses for one session
pub struct RpcClient {
    transport: Arc<Transport>,
    /// Next request id; starts at 1, never reused within a session
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<JsonValue>>>,
}

impl RpcClient {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self {
            transport,
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Send a request and suspend until its response, a timeout, or session
    /// teardown resolves it.
    ///
    /// The resolved value is the full response frame; callers pick out
    /// `result` or `error` themselves.
    pub async fn request(
        &self,
        method: &str,
        params: JsonValue,
        timeout: Duration,
    ) -> Result<JsonValue> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let frame = frames::request(id, method, params);
        if let Err(err) = self.transport.write_frame(&frame).await {
            self.pending.lock().remove(&id);
            return Err(err);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            // Sender dropped without a value: the session was torn down
            Ok(Err(_)) => Err(DeckError::SessionClosed),
            Err(_) => {
                // Free the slot so a late response is discarded, not delivered
                self.pending.lock().remove(&id);
                Err(DeckError::RequestTimeout {
                    method: method.to_string(),
                    id,
                    seconds: timeout.as_secs(),
                })
            }
        }
    }

    /// Send a notification; no id is assigned and no reply is awaited
    pub async fn notify(&self, method: &str, params: Option<JsonValue>) -> Result<()> {
        self.transport
            .write_frame(&frames::notification(method, params))
            .await
    }

    /// Reply to a server-initiated request; no pending-table interaction
    pub async fn respond(&self, id: u64, result: JsonValue) -> Result<()> {
        self.transport
            .write_frame(&frames::response(id, result))
            .await
    }

    /// Resolve a pending request from an incoming response frame.
    ///
    /// Returns false when no request with that id is outstanding (already
    /// resolved, timed out, or never ours); the frame is then discarded by
    /// the caller.
    pub fn resolve(&self, id: u64, frame: JsonValue) -> bool {
        let sender = self.pending.lock().remove(&id);
        match sender {
            Some(sender) => {
                // A dropped receiver just means the caller gave up racing us
                let _ = sender.send(frame);
                true
            }
            None => {
                debug!(id, "response for unknown request id discarded");
                false
            }
        }
    }

    /// Fail every outstanding request immediately.
    ///
    /// Called on session teardown so in-flight callers resolve with
    /// `SessionClosed` instead of waiting for their individual timers.
    pub fn fail_all_pending(&self) {
        let drained: Vec<_> = {
            let mut pending = self.pending.lock();
            pending.drain().collect()
        };
        if !drained.is_empty() {
            debug!(count = drained.len(), "failing pending requests on teardown");
        }
        // Dropping the senders resolves each receiver with an error
    }

    /// Ids currently outstanding (test and diagnostics surface)
    pub fn pending_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.pending.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> Arc<RpcClient> {
        // Writes land in a duplex buffer nobody reads; large enough that
        // they never block in these tests.
        let (stdin, _server) = tokio::io::duplex(64 * 1024);
        std::mem::forget(_server);
        Arc::new(RpcClient::new(Arc::new(Transport::new(stdin))))
    }

    fn response_frame(id: u64, tag: &str) -> JsonValue {
        JsonValue::new(json!({"id": id, "result": {"tag": tag}}))
    }

    fn result_tag(frame: &JsonValue) -> String {
        frame
            .get("result")
            .and_then(|r| r.get("tag"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }

    #[tokio::test]
    async fn test_ids_are_monotonic_from_one() {
        let rpc = client();

        let a = tokio::spawn({
            let rpc = rpc.clone();
            async move {
                rpc.request("a", JsonValue::null(), Duration::from_secs(2))
                    .await
            }
        });

        // Wait for the first request to register
        while rpc.pending_ids().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(rpc.pending_ids(), vec![1]);

        rpc.resolve(1, response_frame(1, "first"));
        let frame = a.await.unwrap().unwrap();
        assert_eq!(result_tag(&frame), "first");
    }

    #[tokio::test]
    async fn test_out_of_order_responses_reach_their_callers() {
        let rpc = client();
        let n = 8u64;

        let mut handles = Vec::new();
        for i in 0..n {
            let rpc = rpc.clone();
            handles.push(tokio::spawn(async move {
                let frame = rpc
                    .request(&format!("m{i}"), JsonValue::null(), Duration::from_secs(5))
                    .await
                    .unwrap();
                (i, frame)
            }));
        }

        while rpc.pending_ids().len() < n as usize {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        // Ids 1..=n were assigned in spawn order; deliver responses reversed
        for id in (1..=n).rev() {
            assert!(rpc.resolve(id, response_frame(id, &format!("tag{id}"))));
        }

        for handle in handles {
            let (i, frame) = handle.await.unwrap();
            // Caller i sent the (i+1)-th request
            assert_eq!(result_tag(&frame), format!("tag{}", i + 1));
        }
        assert!(rpc.pending_ids().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_frees_pending_slot() {
        let rpc = client();
        let err = rpc
            .request("slow", JsonValue::null(), Duration::from_millis(20))
            .await
            .unwrap_err();

        assert!(matches!(err, DeckError::RequestTimeout { id: 1, .. }));
        assert!(rpc.pending_ids().is_empty());

        // A late response is discarded, not delivered
        assert!(!rpc.resolve(1, response_frame(1, "late")));
    }

    #[tokio::test]
    async fn test_resolution_is_exactly_once() {
        let rpc = client();

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
        assert!(rpc.resolve(1, response_frame(1, "only")));
        // Second resolution finds the slot empty
        assert!(!rpc.resolve(1, response_frame(1, "dup")));

        assert_eq!(result_tag(&handle.await.unwrap().unwrap()), "only");
    }

    #[tokio::test]
    async fn test_fail_all_pending_resolves_with_session_closed() {
        let rpc = client();

        let mut handles = Vec::new();
        for _ in 0..3 {
            let rpc = rpc.clone();
            handles.push(tokio::spawn(async move {
                rpc.request("m", JsonValue::null(), Duration::from_secs(10))
                    .await
            }));
        }
        while rpc.pending_ids().len() < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        rpc.fail_all_pending();

        for handle in handles {
            assert!(matches!(
                handle.await.unwrap(),
                Err(DeckError::SessionClosed)
            ));
        }
        assert!(rpc.pending_ids().is_empty());
    }

    #[tokio::test]
    async fn test_notify_has_no_pending_entry() {
        let rpc = client();
        rpc.notify("ping", None).await.unwrap();
        rpc.respond(4, JsonValue::new(json!({"ok": true})))
            .await
            .unwrap();
        assert!(rpc.pending_ids().is_empty());
    }
}
