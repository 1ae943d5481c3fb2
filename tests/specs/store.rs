// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Extension-metadata scenarios: URL stickiness and crash recovery.

use mux_core::{FakeClock, WorkspaceId};
use mux_store::{AgentStatus, ExtensionMetadataService};

fn status(emoji: &str, message: &str, url: Option<&str>) -> AgentStatus {
    AgentStatus {
        emoji: emoji.to_string(),
        message: message.to_string(),
        url: url.map(str::to_string),
    }
}

#[tokio::test]
async fn status_url_sticks_through_updates_and_clears() {
    let dir = tempfile::tempdir().unwrap();
    let service = ExtensionMetadataService::new(
        dir.path().join("extensionMetadata.json"),
        FakeClock::new(),
    );
    service.initialize().await.unwrap();
    let w = WorkspaceId::new("w");

    service.set_agent_status(&w, Some(status("🔧", "A", Some("U")))).await.unwrap();
    service.set_agent_status(&w, Some(status("✅", "B", None))).await.unwrap();

    let current = service.get(&w).unwrap().agent_status.unwrap();
    assert_eq!((current.emoji.as_str(), current.message.as_str()), ("✅", "B"));
    assert_eq!(current.url.as_deref(), Some("U"));

    service.set_agent_status(&w, None).await.unwrap();
    service.set_agent_status(&w, Some(status("🧪", "C", None))).await.unwrap();

    let current = service.get(&w).unwrap().agent_status.unwrap();
    assert_eq!((current.emoji.as_str(), current.message.as_str()), ("🧪", "C"));
    assert_eq!(current.url.as_deref(), Some("U"));
}

#[tokio::test]
async fn restart_recovers_stuck_streaming_flags() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("extensionMetadata.json");

    // First run leaves a workspace "streaming" (simulated crash: no clean
    // shutdown, flag stays true on disk).
    {
        let service = ExtensionMetadataService::new(path.clone(), FakeClock::new());
        service.initialize().await.unwrap();
        service.set_streaming(&WorkspaceId::new("w"), true).await.unwrap();
    }

    // Second run clears it during initialize.
    let service = ExtensionMetadataService::new(path, FakeClock::new());
    service.initialize().await.unwrap();
    assert!(!service.get(&WorkspaceId::new("w")).unwrap().streaming);
}

#[tokio::test]
async fn state_survives_restart_and_orders_by_recency() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("extensionMetadata.json");
    let clock = FakeClock::new();

    {
        let service = ExtensionMetadataService::new(path.clone(), clock.clone());
        service.initialize().await.unwrap();
        service.update_recency(&WorkspaceId::new("first")).await.unwrap();
        clock.advance(std::time::Duration::from_millis(5));
        service.update_recency(&WorkspaceId::new("second")).await.unwrap();
    }

    let service = ExtensionMetadataService::new(path, clock);
    service.initialize().await.unwrap();
    let ids: Vec<String> = service.all_snapshots().keys().map(|k| k.to_string()).collect();
    assert_eq!(ids, vec!["second", "first"]);
}
