// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Main-side dispatcher for the analytics worker.
//!
//! Startup is one-shot and serialized: concurrent `ensure_worker` calls
//! converge on the same client. A worker crash rejects everything pending
//! and re-arms startup for the next call. A disposed dispatcher rejects all
//! further calls.

use crate::protocol::{MessageId, RequestEnvelope, ResponseEnvelope, WorkerError, WorkerRequest};
use crate::worker::{spawn_worker, AnalyticsEngine, WorkerHandle};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("analytics service is disposed")]
    Disposed,
    #[error("analytics worker exited")]
    WorkerExited,
    #[error("analytics task failed: {}", .0.message)]
    Worker(WorkerError),
    #[error("analytics I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Where the database and the session data live.
#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    pub db_dir: PathBuf,
    pub db_file_name: String,
    pub sessions_dir: PathBuf,
    /// Metadata handed to `rebuildAll` so rebuilt rows can be labeled.
    pub workspace_meta_by_id: HashMap<String, serde_json::Value>,
}

impl AnalyticsConfig {
    pub fn db_path(&self) -> PathBuf {
        self.db_dir.join(&self.db_file_name)
    }
}

enum PendingFailure {
    Task(WorkerError),
    Disposed,
}

type PendingMap =
    Arc<Mutex<HashMap<MessageId, oneshot::Sender<Result<serde_json::Value, PendingFailure>>>>>;

/// A live worker plus the correlation state for in-flight requests.
struct WorkerClient {
    handle: WorkerHandle,
    pending: PendingMap,
    next_id: AtomicU32,
    alive: Arc<AtomicBool>,
}

impl WorkerClient {
    fn start(engine: Box<dyn AnalyticsEngine>) -> Arc<Self> {
        let (handle, mut reply_rx) = spawn_worker(engine);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));

        let pump_pending = Arc::clone(&pending);
        let pump_alive = Arc::clone(&alive);
        tokio::spawn(async move {
            while let Some(reply) = reply_rx.recv().await {
                let waiter = pump_pending.lock().remove(&reply.message_id);
                match waiter {
                    Some(tx) => {
                        let outcome = match reply.error {
                            Some(error) => Err(PendingFailure::Task(error)),
                            None => Ok(reply.result.unwrap_or(serde_json::Value::Null)),
                        };
                        let _ = tx.send(outcome);
                    }
                    None => {
                        tracing::warn!(
                            message_id = reply.message_id,
                            "dropping reply with unknown message id"
                        );
                    }
                }
            }
            // Worker gone: dropping the waiters rejects everything pending
            // with the exit error.
            pump_alive.store(false, Ordering::SeqCst);
            pump_pending.lock().clear();
        });

        Arc::new(Self { handle, pending, next_id: AtomicU32::new(1), alive })
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn request(
        &self,
        request: WorkerRequest,
    ) -> Result<serde_json::Value, AnalyticsError> {
        let message_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(message_id, tx);

        let envelope = RequestEnvelope { message_id, request };
        if self.handle.request_tx.send(envelope).is_err() {
            self.pending.lock().remove(&message_id);
            return Err(AnalyticsError::WorkerExited);
        }

        match rx.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(PendingFailure::Task(error))) => Err(AnalyticsError::Worker(error)),
            Ok(Err(PendingFailure::Disposed)) => Err(AnalyticsError::Disposed),
            Err(_) => Err(AnalyticsError::WorkerExited),
        }
    }

    fn reject_pending(&self) {
        let drained: Vec<_> = self.pending.lock().drain().collect();
        for (_, tx) in drained {
            let _ = tx.send(Err(PendingFailure::Disposed));
        }
    }
}

/// The in-process analytics service.
pub struct AnalyticsDispatcher {
    config: AnalyticsConfig,
    engine_factory: Box<dyn Fn() -> Box<dyn AnalyticsEngine> + Send + Sync>,
    client: tokio::sync::Mutex<Option<Arc<WorkerClient>>>,
    disposed: AtomicBool,
}

impl AnalyticsDispatcher {
    pub fn new(
        config: AnalyticsConfig,
        engine_factory: impl Fn() -> Box<dyn AnalyticsEngine> + Send + Sync + 'static,
    ) -> Self {
        Self {
            config,
            engine_factory: Box::new(engine_factory),
            client: tokio::sync::Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    /// Start the worker if needed. Idempotent; concurrent callers converge
    /// on one startup. Re-arms after a crash.
    async fn ensure_worker(&self) -> Result<Arc<WorkerClient>, AnalyticsError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(AnalyticsError::Disposed);
        }

        let mut slot = self.client.lock().await;
        if let Some(client) = slot.as_ref() {
            if client.is_alive() {
                return Ok(Arc::clone(client));
            }
            tracing::warn!("analytics worker died; restarting");
            *slot = None;
        }

        tokio::fs::create_dir_all(&self.config.db_dir).await?;

        let client = WorkerClient::start((self.engine_factory)());
        client.request(WorkerRequest::Init { db_path: self.config.db_path() }).await?;

        let needs_backfill = client
            .request(WorkerRequest::NeedsBackfill {
                sessions_dir: self.config.sessions_dir.clone(),
            })
            .await?;
        if needs_backfill.as_bool().unwrap_or(false) {
            // Best-effort bounded-startup backfill; failures are logged and
            // the worker stays usable.
            let rebuilt = client
                .request(WorkerRequest::RebuildAll {
                    sessions_dir: self.config.sessions_dir.clone(),
                    workspace_meta_by_id: self.config.workspace_meta_by_id.clone(),
                })
                .await;
            if let Err(error) = rebuilt {
                tracing::warn!(error = %error, "initial analytics backfill failed");
            }
        }

        *slot = Some(Arc::clone(&client));
        Ok(client)
    }

    /// Run a named query on the worker.
    pub async fn execute_query(
        &self,
        query_name: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, AnalyticsError> {
        let client = self.ensure_worker().await?;
        client
            .request(WorkerRequest::Query { query_name: query_name.to_string(), params })
            .await
    }

    pub async fn ingest(
        &self,
        events: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value, AnalyticsError> {
        let client = self.ensure_worker().await?;
        client.request(WorkerRequest::Ingest { events }).await
    }

    pub async fn clear_workspace(&self, workspace_id: &str) -> Result<(), AnalyticsError> {
        let client = self.ensure_worker().await?;
        client
            .request(WorkerRequest::ClearWorkspace { workspace_id: workspace_id.to_string() })
            .await
            .map(|_| ())
    }

    /// Warm up the worker without issuing a query.
    pub async fn ready(&self) -> Result<(), AnalyticsError> {
        self.ensure_worker().await.map(|_| ())
    }

    /// Reject pending requests, post a best-effort shutdown, detach.
    pub async fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        let mut slot = self.client.lock().await;
        if let Some(client) = slot.take() {
            client.reject_pending();
            let envelope = RequestEnvelope {
                message_id: client.next_id.fetch_add(1, Ordering::SeqCst),
                request: WorkerRequest::Shutdown,
            };
            let _ = client.handle.request_tx.send(envelope);
        }
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
