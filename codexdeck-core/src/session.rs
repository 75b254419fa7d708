//! Agent session lifecycle
//!
//! A [`Session`] owns one agent subprocess: its stdin transport, the reader
//! loops on stdout and stderr, the RPC correlator, and the router that fans
//! incoming traffic out to subscribers. Spawning and the initialize handshake
//! are separate steps so the registry can decide what a half-open session
//! means; [`Session::shutdown`] is idempotent and safe from any context.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use codexdeck_protocol::{AppServerEvent, JsonValue};
use codexdeck_utils::{DeckError, Result};

use crate::router::{Dispatch, Router};
use crate::rpc::RpcClient;
use crate::supervisor;
use crate::transport::{self, Transport};

/// Tunables shared by every session the registry spawns
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Binary used when a workspace has no override
    pub default_binary: String,
    /// Deadline for the initialize request
    pub handshake_timeout: Duration,
    /// Deadline applied to every ordinary request
    pub request_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_binary: supervisor::DEFAULT_BINARY.to_string(),
            handshake_timeout: Duration::from_secs(15),
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// One live agent subprocess bound to a workspace
pub struct Session {
    workspace_id: String,
    rpc: Arc<RpcClient>,
    router: Arc<Router>,
    cancel: CancellationToken,
    child: Mutex<Option<Child>>,
    request_timeout: Duration,
    handshake_timeout: Duration,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("workspace_id", &self.workspace_id)
            .field("request_timeout", &self.request_timeout)
            .field("handshake_timeout", &self.handshake_timeout)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Preflight the binary, spawn the subprocess, and start the I/O loops.
    ///
    /// The returned session has not completed its handshake; every call
    /// except [`Session::initialize`] is refused until it has. `on_exit`
    /// runs once, after teardown, when the subprocess side goes away.
    pub async fn spawn(
        workspace_id: &str,
        binary: &str,
        cwd: &Path,
        config: &SessionConfig,
        events: mpsc::UnboundedSender<AppServerEvent>,
        on_exit: impl FnOnce() + Send + 'static,
    ) -> Result<Arc<Self>> {
        let version = supervisor::preflight(binary).await?;
        info!(workspace = workspace_id, binary, %version, "agent preflight ok");

        let mut child = supervisor::spawn_agent(binary, cwd)?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DeckError::internal("agent stdin was not piped"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DeckError::internal("agent stdout was not piped"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DeckError::internal("agent stderr was not piped"))?;

        let rpc = Arc::new(RpcClient::new(Arc::new(Transport::new(stdin))));
        let router = Arc::new(Router::new(workspace_id, rpc.clone(), events));
        let cancel = CancellationToken::new();

        let (tx, mut rx) = mpsc::unbounded_channel();
        transport::spawn_stdout_reader(stdout, tx.clone(), cancel.child_token());
        transport::spawn_stderr_reader(stderr, tx, cancel.child_token());

        let session = Arc::new(Self {
            workspace_id: workspace_id.to_string(),
            rpc,
            router,
            cancel,
            child: Mutex::new(Some(child)),
            request_timeout: config.request_timeout,
            handshake_timeout: config.handshake_timeout,
        });

        let dispatcher = session.clone();
        tokio::spawn(async move {
            // Both reader tasks hold a sender; recv yields None only after
            // they are gone, which also covers cancellation.
            while let Some(event) = rx.recv().await {
                if dispatcher.router.dispatch(event) == Dispatch::Closed {
                    break;
                }
            }
            debug!(workspace = %dispatcher.workspace_id, "agent stream ended");
            dispatcher.shutdown();
            on_exit();
        });

        Ok(session)
    }

    /// Run the initialize handshake and open the session gate.
    ///
    /// On any failure the session is torn down; callers should drop it.
    pub async fn initialize(&self) -> Result<()> {
        let params = JsonValue::new(json!({
            "clientInfo": {
                "name": "codexdeck",
                "version": env!("CARGO_PKG_VERSION"),
            }
        }));

        let response = match self
            .rpc
            .request("initialize", params, self.handshake_timeout)
            .await
        {
            Ok(response) => response,
            Err(DeckError::RequestTimeout { seconds, .. }) => {
                self.shutdown();
                return Err(DeckError::HandshakeTimeout { seconds });
            }
            Err(err) => {
                self.shutdown();
                return Err(err);
            }
        };

        if let Some(error) = response.get("error") {
            self.shutdown();
            return Err(DeckError::internal(format!(
                "agent rejected initialize: {error}"
            )));
        }

        self.rpc.notify("initialized", None).await?;
        self.router.mark_connected();
        info!(workspace = %self.workspace_id, "session initialized");
        Ok(())
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    /// Whether the initialize handshake has completed
    pub fn is_connected(&self) -> bool {
        self.router.is_connected()
    }

    /// Send a request; refused before the handshake completes
    pub async fn request(&self, method: &str, params: JsonValue) -> Result<JsonValue> {
        self.router.ensure_connected()?;
        self.rpc.request(method, params, self.request_timeout).await
    }

    /// Send a notification; refused before the handshake completes
    pub async fn notify(&self, method: &str, params: Option<JsonValue>) -> Result<()> {
        self.router.ensure_connected()?;
        self.rpc.notify(method, params).await
    }

    /// Reply to a server-initiated request
    pub async fn respond(&self, id: u64, result: JsonValue) -> Result<()> {
        self.router.ensure_connected()?;
        self.rpc.respond(id, result).await
    }

    /// Stop the I/O loops, fail in-flight requests, and kill the subprocess.
    ///
    /// Safe to call more than once; later calls find nothing left to do.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.rpc.fail_all_pending();

        let child = self.child.lock().take();
        if let Some(mut child) = child {
            if let Err(err) = child.start_kill() {
                // Already exited is the common case here
                debug!(workspace = %self.workspace_id, %err, "agent kill skipped");
            }
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        if let Err(err) = child.wait().await {
                            warn!(%err, "failed to reap agent subprocess");
                        }
                    });
                }
                Err(_) => {
                    // Final-Arc drop on a non-runtime thread; reap inline so
                    // the killed child does not linger as a zombie. SIGKILL
                    // lands quickly, the bound is a safety valve.
                    for _ in 0..50 {
                        match child.try_wait() {
                            Ok(Some(_)) | Err(_) => break,
                            Ok(None) => std::thread::sleep(Duration::from_millis(10)),
                        }
                    }
                }
            }
            info!(workspace = %self.workspace_id, "session shut down");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}
