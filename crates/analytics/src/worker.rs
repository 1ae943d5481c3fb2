// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The analytics worker thread.
//!
//! Hosts an [`AnalyticsEngine`] (the seam in front of the embedded OLAP
//! bindings) and processes requests strictly in order, one at a time.
//! Replies flow back over an async channel keyed by message id.

use crate::protocol::{RequestEnvelope, ResponseEnvelope, WorkerError, WorkerRequest};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::mpsc;

/// Engine seam: what the worker needs from the embedded database.
///
/// Query names and SQL live behind this boundary; the dispatch layer only
/// carries opaque parameters and results.
pub trait AnalyticsEngine: Send + 'static {
    fn init(&mut self, db_path: &Path) -> Result<(), String>;
    fn query(
        &mut self,
        query_name: &str,
        params: &serde_json::Value,
    ) -> Result<serde_json::Value, String>;
    fn rebuild_all(
        &mut self,
        sessions_dir: &Path,
        workspace_meta_by_id: &HashMap<String, serde_json::Value>,
    ) -> Result<serde_json::Value, String>;
    fn ingest(&mut self, events: &[serde_json::Value]) -> Result<serde_json::Value, String>;
    fn clear_workspace(&mut self, workspace_id: &str) -> Result<(), String>;
    fn needs_backfill(&mut self, sessions_dir: &Path) -> Result<bool, String>;
}

/// Handle used by the dispatcher to feed the worker.
pub(crate) struct WorkerHandle {
    pub(crate) request_tx: std::sync::mpsc::Sender<RequestEnvelope>,
}

/// Spawn the worker thread. Replies (and the implicit "worker exited"
/// signal, when the reply channel closes) arrive on the returned receiver.
pub(crate) fn spawn_worker(
    mut engine: Box<dyn AnalyticsEngine>,
) -> (WorkerHandle, mpsc::UnboundedReceiver<ResponseEnvelope>) {
    let (request_tx, request_rx) = std::sync::mpsc::channel::<RequestEnvelope>();
    let (reply_tx, reply_rx) = mpsc::unbounded_channel();

    std::thread::Builder::new()
        .name("mux-analytics".to_string())
        .spawn(move || {
            while let Ok(envelope) = request_rx.recv() {
                let message_id = envelope.message_id;
                if matches!(envelope.request, WorkerRequest::Shutdown) {
                    let _ = reply_tx.send(ResponseEnvelope::ok(
                        message_id,
                        serde_json::Value::Null,
                    ));
                    break;
                }
                let response = match handle(&mut *engine, envelope.request) {
                    Ok(result) => ResponseEnvelope::ok(message_id, result),
                    Err(error) => ResponseEnvelope::err(message_id, error),
                };
                if reply_tx.send(response).is_err() {
                    break;
                }
            }
            tracing::debug!("analytics worker thread exiting");
        })
        .map(|_| ())
        .unwrap_or_else(|error| {
            tracing::error!(error = %error, "failed to spawn analytics worker thread");
        });

    (WorkerHandle { request_tx }, reply_rx)
}

fn handle(
    engine: &mut dyn AnalyticsEngine,
    request: WorkerRequest,
) -> Result<serde_json::Value, WorkerError> {
    let task = request.task_name();
    let result = match request {
        WorkerRequest::Init { db_path } => {
            engine.init(&db_path).map(|_| serde_json::Value::Null)
        }
        WorkerRequest::Query { query_name, params } => engine.query(&query_name, &params),
        WorkerRequest::RebuildAll { sessions_dir, workspace_meta_by_id } => {
            engine.rebuild_all(&sessions_dir, &workspace_meta_by_id)
        }
        WorkerRequest::Ingest { events } => engine.ingest(&events),
        WorkerRequest::ClearWorkspace { workspace_id } => {
            engine.clear_workspace(&workspace_id).map(|_| serde_json::Value::Null)
        }
        WorkerRequest::NeedsBackfill { sessions_dir } => {
            engine.needs_backfill(&sessions_dir).map(serde_json::Value::Bool)
        }
        WorkerRequest::Shutdown => Ok(serde_json::Value::Null),
    };
    result.map_err(|message| {
        tracing::warn!(task, error = %message, "analytics task failed");
        WorkerError::new(message)
    })
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
