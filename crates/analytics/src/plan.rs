// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pure backfill and sync planning.
//!
//! Watermarks record, per workspace, how far analytics ingestion got. These
//! decisions compare the watermark table against the workspaces and events
//! actually on disk; they touch no I/O so every branch is table-testable.

use std::collections::BTreeSet;

/// Inputs for the one-shot startup backfill decision.
#[derive(Debug, Clone, Default)]
pub struct BackfillInputs {
    pub event_count: u64,
    pub watermark_count: u64,
    /// Workspaces that currently exist.
    pub live_workspace_ids: BTreeSet<String>,
    /// Workspaces that have session data on disk.
    pub session_workspace_ids: BTreeSet<String>,
    /// Workspaces covered by a watermark.
    pub watermark_workspace_ids: BTreeSet<String>,
    /// True when some watermark has `last_sequence >= 0`, proving events
    /// were ingested at some point.
    pub has_any_watermark_at_or_above_zero: bool,
}

/// Whether startup should rebuild the analytics tables from scratch.
pub fn should_run_initial_backfill(inputs: &BackfillInputs) -> bool {
    if inputs.live_workspace_ids.is_empty() {
        // Nothing lives anymore: rebuild only to purge stale rows.
        return inputs.watermark_count > 0 || inputs.event_count > 0;
    }
    if inputs.watermark_count == 0 {
        return true;
    }
    if inputs
        .session_workspace_ids
        .iter()
        .any(|id| !inputs.watermark_workspace_ids.contains(id))
    {
        return true;
    }
    if inputs
        .watermark_workspace_ids
        .iter()
        .any(|id| !inputs.live_workspace_ids.contains(id))
    {
        return true;
    }
    // Watermarks prove ingestion happened, yet the events table is empty:
    // it was wiped out from under us.
    if inputs.event_count == 0 && inputs.has_any_watermark_at_or_above_zero {
        return true;
    }
    false
}

/// Inputs for the steady-state sync decision.
#[derive(Debug, Clone, Default)]
pub struct SyncInputs {
    pub event_count: u64,
    pub watermark_count: u64,
    pub known_workspace_ids: BTreeSet<String>,
    pub watermark_workspace_ids: BTreeSet<String>,
    pub has_any_watermark_at_or_above_zero: bool,
}

/// What the sync pass should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncPlan {
    FullRebuild,
    Incremental { ingest: Vec<String>, purge: Vec<String> },
    Noop,
}

/// Decide between a full rebuild, targeted ingest/purge, and doing nothing.
pub fn decide_sync_plan(inputs: &SyncInputs) -> SyncPlan {
    // Events without watermarks: provenance is unknown, start over.
    if inputs.event_count > 0 && inputs.watermark_count == 0 {
        return SyncPlan::FullRebuild;
    }
    // Watermarks without events: the events table was wiped.
    if inputs.event_count == 0 && inputs.has_any_watermark_at_or_above_zero {
        return SyncPlan::FullRebuild;
    }

    let ingest: Vec<String> = inputs
        .known_workspace_ids
        .difference(&inputs.watermark_workspace_ids)
        .cloned()
        .collect();
    let purge: Vec<String> = inputs
        .watermark_workspace_ids
        .difference(&inputs.known_workspace_ids)
        .cloned()
        .collect();

    if ingest.is_empty() && purge.is_empty() {
        SyncPlan::Noop
    } else {
        SyncPlan::Incremental { ingest, purge }
    }
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod tests;
