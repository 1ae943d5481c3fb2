// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Analytics scenarios: backfill decisions and the worker dispatch path.

use mux_analytics::{
    decide_sync_plan, should_run_initial_backfill, AnalyticsConfig, AnalyticsDispatcher,
    AnalyticsEngine, BackfillInputs, SyncInputs, SyncPlan,
};
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

fn ids(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|s| s.to_string()).collect()
}

#[test]
fn backfill_decision_matches_the_contract() {
    // Events exist but nothing is watermarked: rebuild.
    assert!(should_run_initial_backfill(&BackfillInputs {
        event_count: 5,
        watermark_count: 0,
        live_workspace_ids: ids(&["a"]),
        session_workspace_ids: ids(&["a"]),
        ..Default::default()
    }));

    // Pristine state: skip.
    assert!(!should_run_initial_backfill(&BackfillInputs::default()));
}

#[test]
fn sync_plan_matches_the_contract() {
    assert_eq!(decide_sync_plan(&SyncInputs::default()), SyncPlan::Noop);

    assert_eq!(
        decide_sync_plan(&SyncInputs {
            event_count: 10,
            watermark_count: 0,
            known_workspace_ids: ids(&["a"]),
            ..Default::default()
        }),
        SyncPlan::FullRebuild
    );

    assert_eq!(
        decide_sync_plan(&SyncInputs {
            event_count: 1,
            watermark_count: 1,
            known_workspace_ids: ids(&["a", "b"]),
            watermark_workspace_ids: ids(&["a"]),
            has_any_watermark_at_or_above_zero: false,
        }),
        SyncPlan::Incremental { ingest: vec!["b".to_string()], purge: vec![] }
    );
}

/// Counting engine standing in for the embedded database.
struct CountingEngine;

impl AnalyticsEngine for CountingEngine {
    fn init(&mut self, _db_path: &Path) -> Result<(), String> {
        Ok(())
    }

    fn query(
        &mut self,
        query_name: &str,
        params: &serde_json::Value,
    ) -> Result<serde_json::Value, String> {
        Ok(json!({"query": query_name, "params": params}))
    }

    fn rebuild_all(
        &mut self,
        _sessions_dir: &Path,
        _workspace_meta_by_id: &HashMap<String, serde_json::Value>,
    ) -> Result<serde_json::Value, String> {
        Ok(json!(true))
    }

    fn ingest(&mut self, events: &[serde_json::Value]) -> Result<serde_json::Value, String> {
        Ok(json!(events.len()))
    }

    fn clear_workspace(&mut self, _workspace_id: &str) -> Result<(), String> {
        Ok(())
    }

    fn needs_backfill(&mut self, _sessions_dir: &Path) -> Result<bool, String> {
        Ok(false)
    }
}

#[tokio::test]
async fn query_round_trips_through_the_worker() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = AnalyticsDispatcher::new(
        AnalyticsConfig {
            db_dir: dir.path().join("analytics"),
            db_file_name: "analytics.db".to_string(),
            sessions_dir: dir.path().join("sessions"),
            workspace_meta_by_id: HashMap::new(),
        },
        || Box::new(CountingEngine),
    );

    let result =
        dispatcher.execute_query("usage_by_day", json!({"days": 30})).await.unwrap();
    assert_eq!(result["query"], "usage_by_day");
    assert_eq!(result["params"]["days"], 30);

    dispatcher.dispose().await;
    assert!(dispatcher.execute_query("after", json!(null)).await.is_err());
}
