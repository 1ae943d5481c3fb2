// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

fn test_tuning() -> PoolTuning {
    PoolTuning {
        backoff_base: Duration::from_secs(1),
        backoff_cap: Duration::from_secs(30),
        jitter: 0.0,
        idle_close: Duration::from_secs(600),
        default_max_wait: Duration::from_secs(120),
    }
}

fn config() -> SshConnectionConfig {
    SshConnectionConfig { user: Some("u".into()), ..SshConnectionConfig::new("dev.example.com") }
}

struct ScriptedDialer {
    results: Mutex<VecDeque<Result<(), String>>>,
    dials: AtomicUsize,
    dial_times: Mutex<Vec<Instant>>,
}

impl ScriptedDialer {
    fn new(results: Vec<Result<(), String>>) -> Arc<Self> {
        Arc::new(Self {
            results: Mutex::new(results.into_iter().collect()),
            dials: AtomicUsize::new(0),
            dial_times: Mutex::new(Vec::new()),
        })
    }

    fn dial_count(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    fn dial_times(&self) -> Vec<Instant> {
        self.dial_times.lock().clone()
    }
}

#[async_trait]
impl Dialer for ScriptedDialer {
    async fn dial(
        &self,
        config: &SshConnectionConfig,
        _timeout: Duration,
    ) -> Result<Connection, RuntimeError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        self.dial_times.lock().push(Instant::now());
        match self.results.lock().pop_front() {
            Some(Err(message)) => Err(RuntimeError::Network(message)),
            Some(Ok(())) | None => {
                Ok(Connection::new(config.clone(), PathBuf::from("/tmp/fake.sock")))
            }
        }
    }
}

fn pool_with(dialer: &Arc<ScriptedDialer>) -> Arc<ConnectionPool> {
    Arc::new(ConnectionPool::new(Arc::clone(dialer) as Arc<dyn Dialer>, test_tuning()))
}

#[tokio::test(start_paused = true)]
async fn healthy_connection_is_reused() {
    let dialer = ScriptedDialer::new(vec![Ok(())]);
    let pool = pool_with(&dialer);

    let a = pool.acquire(&config(), AcquireOptions::default()).await.unwrap();
    let b = pool.acquire(&config(), AcquireOptions::default()).await.unwrap();

    assert_eq!(dialer.dial_count(), 1);
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(pool.liveness(&config()), Some(Liveness::Healthy));
}

#[tokio::test(start_paused = true)]
async fn same_semantic_target_shares_an_entry() {
    let dialer = ScriptedDialer::new(vec![Ok(())]);
    let pool = pool_with(&dialer);

    let explicit_port =
        SshConnectionConfig { port: Some(22), ..config() };
    pool.acquire(&config(), AcquireOptions::default()).await.unwrap();
    pool.acquire(&explicit_port, AcquireOptions::default()).await.unwrap();

    assert_eq!(dialer.dial_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn dial_failure_is_recorded_before_error_propagates() {
    let dialer = ScriptedDialer::new(vec![Err("connection refused".into())]);
    let pool = pool_with(&dialer);

    let error = pool.acquire(&config(), AcquireOptions::default()).await.unwrap_err();
    assert_eq!(error.class(), mux_core::ErrorClass::Network);
    assert_eq!(pool.liveness(&config()), Some(Liveness::Degraded));
}

#[tokio::test(start_paused = true)]
async fn acquire_waits_out_backoff_before_redialing() {
    let dialer = ScriptedDialer::new(vec![Err("refused".into()), Ok(())]);
    let pool = pool_with(&dialer);

    let _ = pool.acquire(&config(), AcquireOptions::default()).await;
    pool.acquire(&config(), AcquireOptions::default()).await.unwrap();

    let times = dialer.dial_times();
    assert_eq!(times.len(), 2);
    // One failure → one base backoff window between dials.
    assert!(times[1] - times[0] >= Duration::from_secs(1));
    assert!(times[1] - times[0] < Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn backoff_grows_exponentially_across_failures() {
    let dialer = ScriptedDialer::new(vec![
        Err("refused".into()),
        Err("refused".into()),
        Err("refused".into()),
        Ok(()),
    ]);
    let pool = pool_with(&dialer);

    for _ in 0..3 {
        let _ = pool.acquire(&config(), AcquireOptions::default()).await;
    }
    assert_eq!(pool.liveness(&config()), Some(Liveness::Failed));

    pool.acquire(&config(), AcquireOptions::default()).await.unwrap();

    let times = dialer.dial_times();
    assert!(times[1] - times[0] >= Duration::from_secs(1), "second dial after 1s");
    assert!(times[2] - times[1] >= Duration::from_secs(2), "third dial after 2s");
    assert!(times[3] - times[2] >= Duration::from_secs(4), "fourth dial after 4s");
    assert_eq!(pool.liveness(&config()), Some(Liveness::Healthy));
}

#[tokio::test(start_paused = true)]
async fn backoff_is_capped() {
    let tuning = PoolTuning { backoff_cap: Duration::from_secs(3), ..test_tuning() };
    let delay = backoff_delay(&tuning, 10);
    assert_eq!(delay, Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_backoff_wait() {
    let dialer = ScriptedDialer::new(vec![Err("refused".into()), Ok(())]);
    let pool = pool_with(&dialer);
    let _ = pool.acquire(&config(), AcquireOptions::default()).await;

    let token = CancellationToken::new();
    token.cancel();
    let error = pool
        .acquire(
            &config(),
            AcquireOptions { cancel: Some(token), ..AcquireOptions::default() },
        )
        .await
        .unwrap_err();
    assert_eq!(error.class(), mux_core::ErrorClass::Aborted);
    // The cancelled acquire never re-dialed.
    assert_eq!(dialer.dial_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn max_wait_bounds_backoff_waiting() {
    let dialer = ScriptedDialer::new(vec![Err("refused".into()), Ok(())]);
    let pool = pool_with(&dialer);
    let _ = pool.acquire(&config(), AcquireOptions::default()).await;

    let error = pool
        .acquire(
            &config(),
            AcquireOptions {
                max_wait: Some(Duration::from_millis(100)),
                ..AcquireOptions::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(error.class(), mux_core::ErrorClass::Network);
    assert_eq!(dialer.dial_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn on_wait_reports_remaining_time() {
    let tuning = PoolTuning { backoff_base: Duration::from_secs(3), ..test_tuning() };
    let dialer = ScriptedDialer::new(vec![Err("refused".into()), Ok(())]);
    let pool =
        Arc::new(ConnectionPool::new(Arc::clone(&dialer) as Arc<dyn Dialer>, tuning));
    let _ = pool.acquire(&config(), AcquireOptions::default()).await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    pool.acquire(
        &config(),
        AcquireOptions {
            on_wait: Some(Box::new(move |remaining| sink.lock().push(remaining))),
            ..AcquireOptions::default()
        },
    )
    .await
    .unwrap();

    let seen = seen.lock();
    assert!(seen.len() >= 3, "coarse 1s callbacks over a 3s window: {:?}", seen);
    assert!(seen[0] <= Duration::from_secs(3));
    // Remaining time decreases monotonically.
    for pair in seen.windows(2) {
        assert!(pair[1] <= pair[0]);
    }
}

#[tokio::test(start_paused = true)]
async fn mark_healthy_clears_backoff() {
    let dialer = ScriptedDialer::new(vec![Err("refused".into()), Err("refused".into()), Ok(())]);
    let pool = pool_with(&dialer);
    let _ = pool.acquire(&config(), AcquireOptions::default()).await;
    let _ = pool.acquire(&config(), AcquireOptions::default()).await;

    pool.mark_healthy(&config());
    assert_eq!(pool.liveness(&config()), Some(Liveness::Healthy));

    let before = Instant::now();
    pool.acquire(&config(), AcquireOptions::default()).await.unwrap();
    // No backoff wait: the dial happened immediately.
    assert_eq!(Instant::now(), before);
}

#[tokio::test(start_paused = true)]
async fn idle_masters_are_closed_by_the_sweep() {
    let dialer = ScriptedDialer::new(vec![Ok(()), Ok(())]);
    let pool = pool_with(&dialer);

    pool.acquire(&config(), AcquireOptions::default()).await.unwrap();
    tokio::time::advance(Duration::from_secs(601)).await;
    pool.close_idle();

    pool.acquire(&config(), AcquireOptions::default()).await.unwrap();
    assert_eq!(dialer.dial_count(), 2);
}
