// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SSH pool scenarios: backoff under repeated dial failures.

use async_trait::async_trait;
use mux_core::{RuntimeError, SshConnectionConfig};
use mux_ssh::pool::{AcquireOptions, Connection, ConnectionPool, Dialer, PoolTuning};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

struct ScriptedDialer {
    results: Mutex<VecDeque<Result<(), String>>>,
    dial_times: Mutex<Vec<Instant>>,
}

#[async_trait]
impl Dialer for ScriptedDialer {
    async fn dial(
        &self,
        config: &SshConnectionConfig,
        _timeout: Duration,
    ) -> Result<Connection, RuntimeError> {
        self.dial_times.lock().push(Instant::now());
        match self.results.lock().pop_front() {
            Some(Err(message)) => Err(RuntimeError::Network(message)),
            _ => Ok(Connection::new(config.clone(), PathBuf::from("/tmp/ctl.sock"))),
        }
    }
}

fn harness(results: Vec<Result<(), String>>) -> (Arc<ScriptedDialer>, ConnectionPool) {
    let dialer = Arc::new(ScriptedDialer {
        results: Mutex::new(results.into_iter().collect()),
        dial_times: Mutex::new(Vec::new()),
    });
    let tuning = PoolTuning {
        backoff_base: Duration::from_secs(1),
        backoff_cap: Duration::from_secs(30),
        jitter: 0.0,
        ..PoolTuning::default()
    };
    let pool = ConnectionPool::new(Arc::clone(&dialer) as Arc<dyn Dialer>, tuning);
    (dialer, pool)
}

fn target() -> SshConnectionConfig {
    SshConnectionConfig::new("backoff.example.com")
}

#[tokio::test(start_paused = true)]
async fn acquisition_during_backoff_waits_out_the_window() {
    // Three consecutive dial failures, then one success.
    let (dialer, pool) = harness(vec![
        Err("dial refused".into()),
        Err("dial refused".into()),
        Err("dial refused".into()),
        Ok(()),
    ]);

    for _ in 0..3 {
        let error = pool.acquire(&target(), AcquireOptions::default()).await.unwrap_err();
        assert_eq!(error.class(), mux_core::ErrorClass::Network);
    }

    // The fourth acquisition arrives during backoff and must wait the full
    // 4-second window (1s → 2s → 4s) before re-dialing.
    let issued = Instant::now();
    pool.acquire(&target(), AcquireOptions::default()).await.unwrap();

    let times = dialer.dial_times.lock().clone();
    assert_eq!(times.len(), 4);
    let waited = times[3] - issued;
    assert!(waited >= Duration::from_secs(4), "waited only {:?}", waited);
    assert!(waited < Duration::from_secs(6), "waited too long {:?}", waited);
}

#[tokio::test(start_paused = true)]
async fn cancellation_is_honored_while_backing_off() {
    let (_dialer, pool) = harness(vec![Err("dial refused".into())]);
    let _ = pool.acquire(&target(), AcquireOptions::default()).await;

    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
    });

    let error = pool
        .acquire(
            &target(),
            AcquireOptions { cancel: Some(token), ..AcquireOptions::default() },
        )
        .await
        .unwrap_err();
    assert_eq!(error.class(), mux_core::ErrorClass::Aborted);
}

#[tokio::test(start_paused = true)]
async fn success_resets_the_failure_streak() {
    let (dialer, pool) = harness(vec![Err("dial refused".into()), Ok(()), Ok(())]);

    let _ = pool.acquire(&target(), AcquireOptions::default()).await;
    pool.acquire(&target(), AcquireOptions::default()).await.unwrap();

    // Fresh failure after a success starts back at the base window.
    pool.report_failure(&target(), "probe failed");
    let issued = Instant::now();
    pool.acquire(&target(), AcquireOptions::default()).await.unwrap();

    let times = dialer.dial_times.lock().clone();
    let waited = *times.last().unwrap() - issued;
    assert!(waited >= Duration::from_secs(1) && waited < Duration::from_secs(2));
}
