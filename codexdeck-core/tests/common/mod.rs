#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc;

use codexdeck_core::{SessionConfig, WorkspaceEntry, WorkspaceKind, WorkspaceStore};
use codexdeck_protocol::AppServerEvent;

/// Scripted stand-in for the agent binary. Speaks just enough of the wire
/// protocol to drive the handshake and a few canned methods.
const FAKE_AGENT: &str = r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "fakecodex 0.1.0"
  exit 0
fi
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
  method=$(printf '%s' "$line" | sed -n 's/.*"method":"\([^"]*\)".*/\1/p')
  case "$method" in
    initialize)
      printf '{"id":%s,"result":{"agent":"fake"}}\n' "$id"
      ;;
    initialized)
      printf '{"method":"codex/event","params":{"kind":"ready"}}\n'
      echo "fake agent ready" >&2
      ;;
    echo)
      printf '{"id":%s,"result":{"echoed":true}}\n' "$id"
      ;;
    garble)
      echo "this is not json"
      printf '{"id":%s,"result":{}}\n' "$id"
      ;;
    stall)
      ;;
    quit)
      exit 0
      ;;
  esac
done
"#;

/// Variant that completes preflight but never answers any request
const MUTE_AGENT: &str = r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "mute 0.1.0"
  exit 0
fi
cat > /dev/null
"#;

#[cfg(unix)]
fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

#[cfg(unix)]
pub fn fake_agent(dir: &Path) -> PathBuf {
    write_script(dir, "fake-codex", FAKE_AGENT)
}

#[cfg(unix)]
pub fn mute_agent(dir: &Path) -> PathBuf {
    write_script(dir, "mute-codex", MUTE_AGENT)
}

pub fn workspace_entry(id: &str, path: &Path, binary: &Path) -> WorkspaceEntry {
    WorkspaceEntry {
        id: id.to_string(),
        name: id.to_string(),
        path: path.to_path_buf(),
        binary_override: Some(binary.to_string_lossy().into_owned()),
        kind: WorkspaceKind::Primary,
        parent_id: None,
        settings: HashMap::new(),
    }
}

pub fn worktree_entry(id: &str, parent: &str, path: &Path, binary: &Path) -> WorkspaceEntry {
    WorkspaceEntry {
        parent_id: Some(parent.to_string()),
        kind: WorkspaceKind::Worktree,
        ..workspace_entry(id, path, binary)
    }
}

pub fn test_config() -> SessionConfig {
    SessionConfig {
        handshake_timeout: Duration::from_secs(10),
        request_timeout: Duration::from_secs(10),
        ..SessionConfig::default()
    }
}

pub fn store_in(dir: &Path) -> WorkspaceStore {
    WorkspaceStore::at(dir.join("workspaces.json"))
}

/// Receive events until one with the given method appears
pub async fn wait_for_method(
    rx: &mut mpsc::UnboundedReceiver<AppServerEvent>,
    method: &str,
) -> AppServerEvent {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if event.message.get("method").and_then(|v| v.as_str()) == Some(method) {
                return event;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {method} event"))
}
