// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn ids(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|s| s.to_string()).collect()
}

// --- initial backfill ---

#[test]
fn pristine_state_skips_backfill() {
    let inputs = BackfillInputs::default();
    assert!(!should_run_initial_backfill(&inputs));
}

#[test]
fn events_without_watermarks_backfill() {
    let inputs = BackfillInputs {
        event_count: 5,
        watermark_count: 0,
        live_workspace_ids: ids(&["a"]),
        session_workspace_ids: ids(&["a"]),
        ..Default::default()
    };
    assert!(should_run_initial_backfill(&inputs));
}

#[test]
fn zero_live_workspaces_rebuild_only_to_purge() {
    // Leftover rows from deleted workspaces.
    let stale = BackfillInputs {
        watermark_count: 2,
        watermark_workspace_ids: ids(&["gone-1", "gone-2"]),
        has_any_watermark_at_or_above_zero: true,
        ..Default::default()
    };
    assert!(should_run_initial_backfill(&stale));

    let leftover_events =
        BackfillInputs { event_count: 7, ..Default::default() };
    assert!(should_run_initial_backfill(&leftover_events));

    let truly_empty = BackfillInputs::default();
    assert!(!should_run_initial_backfill(&truly_empty));
}

#[test]
fn session_workspace_without_watermark_backfills() {
    let inputs = BackfillInputs {
        event_count: 10,
        watermark_count: 1,
        live_workspace_ids: ids(&["a", "b"]),
        session_workspace_ids: ids(&["a", "b"]),
        watermark_workspace_ids: ids(&["a"]),
        has_any_watermark_at_or_above_zero: true,
        ..Default::default()
    };
    assert!(should_run_initial_backfill(&inputs));
}

#[test]
fn watermark_for_deleted_workspace_backfills() {
    let inputs = BackfillInputs {
        event_count: 10,
        watermark_count: 2,
        live_workspace_ids: ids(&["a"]),
        session_workspace_ids: ids(&["a"]),
        watermark_workspace_ids: ids(&["a", "deleted"]),
        has_any_watermark_at_or_above_zero: true,
        ..Default::default()
    };
    assert!(should_run_initial_backfill(&inputs));
}

#[test]
fn wiped_events_table_backfills() {
    let inputs = BackfillInputs {
        event_count: 0,
        watermark_count: 1,
        live_workspace_ids: ids(&["a"]),
        session_workspace_ids: ids(&["a"]),
        watermark_workspace_ids: ids(&["a"]),
        has_any_watermark_at_or_above_zero: true,
        ..Default::default()
    };
    assert!(should_run_initial_backfill(&inputs));
}

#[test]
fn fully_covered_state_skips_backfill() {
    let inputs = BackfillInputs {
        event_count: 100,
        watermark_count: 2,
        live_workspace_ids: ids(&["a", "b"]),
        session_workspace_ids: ids(&["a", "b"]),
        watermark_workspace_ids: ids(&["a", "b"]),
        has_any_watermark_at_or_above_zero: true,
        ..Default::default()
    };
    assert!(!should_run_initial_backfill(&inputs));
}

// --- sync plan ---

#[test]
fn empty_state_is_noop() {
    let plan = decide_sync_plan(&SyncInputs::default());
    assert_eq!(plan, SyncPlan::Noop);
}

#[test]
fn events_without_watermarks_full_rebuild() {
    let plan = decide_sync_plan(&SyncInputs {
        event_count: 10,
        watermark_count: 0,
        known_workspace_ids: ids(&["a"]),
        ..Default::default()
    });
    assert_eq!(plan, SyncPlan::FullRebuild);
}

#[test]
fn watermarks_without_events_full_rebuild() {
    let plan = decide_sync_plan(&SyncInputs {
        event_count: 0,
        watermark_count: 1,
        known_workspace_ids: ids(&["a"]),
        watermark_workspace_ids: ids(&["a"]),
        has_any_watermark_at_or_above_zero: true,
    });
    assert_eq!(plan, SyncPlan::FullRebuild);
}

#[test]
fn uncovered_workspace_is_ingested_incrementally() {
    let plan = decide_sync_plan(&SyncInputs {
        event_count: 1,
        watermark_count: 1,
        known_workspace_ids: ids(&["a", "b"]),
        watermark_workspace_ids: ids(&["a"]),
        has_any_watermark_at_or_above_zero: false,
    });
    assert_eq!(
        plan,
        SyncPlan::Incremental { ingest: vec!["b".to_string()], purge: vec![] }
    );
}

#[test]
fn orphan_watermark_is_purged_incrementally() {
    let plan = decide_sync_plan(&SyncInputs {
        event_count: 4,
        watermark_count: 2,
        known_workspace_ids: ids(&["a"]),
        watermark_workspace_ids: ids(&["a", "gone"]),
        has_any_watermark_at_or_above_zero: false,
    });
    assert_eq!(
        plan,
        SyncPlan::Incremental { ingest: vec![], purge: vec!["gone".to_string()] }
    );
}

#[test]
fn covered_state_is_noop() {
    let plan = decide_sync_plan(&SyncInputs {
        event_count: 9,
        watermark_count: 2,
        known_workspace_ids: ids(&["a", "b"]),
        watermark_workspace_ids: ids(&["a", "b"]),
        has_any_watermark_at_or_above_zero: false,
    });
    assert_eq!(plan, SyncPlan::Noop);
}
