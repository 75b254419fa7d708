//! Workspace removal cascade across sessions, terminals, and the store

#![cfg(unix)]

mod common;

use std::time::Duration;

use codexdeck_core::Orchestrator;
use codexdeck_utils::DeckError;

use common::{fake_agent, store_in, test_config, workspace_entry, worktree_entry};

#[tokio::test]
async fn test_removing_a_parent_tears_down_the_whole_family() {
    let dir = tempfile::tempdir().unwrap();
    eprintln!("CHECKPOINT 1 (after line 16)");
    let agent = fake_agent(dir.path());
    eprintln!("CHECKPOINT 2 (after line 17)");
    let (orch, _app_rx, _term_rx) = Orchestrator::new(test_config(), store_in(dir.path())).unwrap();
    eprintln!("CHECKPOINT 3 (after line 18)");

    orch.upsert_workspace(workspace_entry("parent", dir.path(), &agent))
        .unwrap();
    eprintln!("CHECKPOINT 4 (after line 21)");
    orch.upsert_workspace(worktree_entry("wt", "parent", dir.path(), &agent))
        .unwrap();
    eprintln!("CHECKPOINT 5 (after line 23)");
    orch.upsert_workspace(workspace_entry("other", dir.path(), &agent))
        .unwrap();
    eprintln!("CHECKPOINT 6 (after line 25)");

    orch.connect("parent").await.unwrap();
    eprintln!("CHECKPOINT 7 (after line 27)");
    orch.connect("wt").await.unwrap();
    eprintln!("CHECKPOINT 8 (after line 28)");
    orch.open_terminal("parent", "t1", 80, 24).unwrap();
    eprintln!("CHECKPOINT 9 (after line 29)");
    orch.open_terminal("wt", "t1", 80, 24).unwrap();
    eprintln!("CHECKPOINT 10 (after line 30)");
    orch.open_terminal("other", "t1", 80, 24).unwrap();
    eprintln!("CHECKPOINT 11 (after line 31)");

    orch.remove_workspace("parent").unwrap();
    eprintln!("CHECKPOINT 12 (after line 33)");

    // Entries: the unrelated workspace is the only survivor
    let listed = orch.list_workspaces();
    eprintln!("CHECKPOINT 13 (after line 36)");
    assert_eq!(listed.len(), 1);
    eprintln!("CHECKPOINT 14 (after line 37)");
    assert_eq!(listed[0].entry.id, "other");
    eprintln!("CHECKPOINT 15 (after line 38)");

    // Sessions: both the parent's and the child's are gone
    assert!(orch.registry().session("parent").is_none());
    eprintln!("CHECKPOINT 16 (after line 41)");
    assert!(orch.registry().session("wt").is_none());
    eprintln!("CHECKPOINT 17 (after line 42)");

    // Terminals: only the unrelated workspace's remains
    assert_eq!(orch.terminals().len(), 1);
    eprintln!("CHECKPOINT 18 (after line 45)");

    assert!(matches!(
        orch.connect("wt").await,
        Err(DeckError::WorkspaceNotFound(_))
    ));
    eprintln!("CHECKPOINT 19 (after line 50)");
}

#[tokio::test]
async fn test_removal_is_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let agent = fake_agent(dir.path());

    {
        let (orch, _app_rx, _term_rx) =
            Orchestrator::new(test_config(), store_in(dir.path())).unwrap();
        orch.upsert_workspace(workspace_entry("parent", dir.path(), &agent))
            .unwrap();
        orch.upsert_workspace(worktree_entry("wt", "parent", dir.path(), &agent))
            .unwrap();
        orch.upsert_workspace(workspace_entry("keep", dir.path(), &agent))
            .unwrap();
        orch.remove_workspace("parent").unwrap();
    }

    // A fresh orchestrator over the same store sees only the survivor
    let (orch, _app_rx, _term_rx) = Orchestrator::new(test_config(), store_in(dir.path())).unwrap();
    let listed = orch.list_workspaces();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].entry.id, "keep");
}

#[tokio::test]
async fn test_removed_sessions_stop_answering() {
    let dir = tempfile::tempdir().unwrap();
    let agent = fake_agent(dir.path());
    // Short request deadline so a write that lands in a dead pipe's buffer
    // still resolves quickly.
    let config = codexdeck_core::SessionConfig {
        request_timeout: Duration::from_millis(500),
        ..test_config()
    };
    let (orch, _app_rx, _term_rx) = Orchestrator::new(config, store_in(dir.path())).unwrap();

    orch.upsert_workspace(workspace_entry("ws", dir.path(), &agent))
        .unwrap();
    let session = orch.connect("ws").await.unwrap();
    orch.remove_workspace("ws").unwrap();

    // The held handle was shut down by the removal
    let err = session
        .request("echo", codexdeck_protocol::JsonValue::null())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DeckError::SessionClosed | DeckError::WriteFailed(_) | DeckError::RequestTimeout { .. }
    ));

    // Give teardown a moment, then confirm nothing lingers
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(orch.registry().session("ws").is_none());
    assert!(orch.terminals().is_empty());
}
