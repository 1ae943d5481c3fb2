// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Multiplexed SSH connection pool.
//!
//! One master connection per semantic target, with liveness tracking and
//! exponential backoff. Waits use tokio's clock, so tests drive the pool
//! deterministically with paused time and a scripted dialer.

use async_trait::async_trait;
use mux_core::{RuntimeError, SshConnectionConfig};
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_DIAL_TIMEOUT: Duration = Duration::from_secs(60);

/// Operational knobs. The defaults are the production values; tests shrink
/// them and zero the jitter.
#[derive(Debug, Clone)]
pub struct PoolTuning {
    /// First-failure backoff.
    pub backoff_base: Duration,
    /// Upper bound on a single backoff window.
    pub backoff_cap: Duration,
    /// Fractional jitter applied to each window (±).
    pub jitter: f64,
    /// Masters idle beyond this are closed by the sweep.
    pub idle_close: Duration,
    /// Cap on how long one acquisition may wait out backoff.
    pub default_max_wait: Duration,
}

impl Default for PoolTuning {
    fn default() -> Self {
        Self {
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(30),
            jitter: 0.2,
            idle_close: Duration::from_secs(600),
            default_max_wait: Duration::from_secs(120),
        }
    }
}

/// Health of one pooled target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Healthy,
    Degraded,
    Failed,
}

use Liveness::{Degraded, Failed, Healthy};

/// An open multiplexed master connection.
///
/// Commands attach to it through the control socket; the pool closes it when
/// idle or failed.
#[derive(Debug)]
pub struct Connection {
    config: SshConnectionConfig,
    control_path: PathBuf,
    master: Mutex<Option<tokio::process::Child>>,
}

impl Connection {
    pub fn new(config: SshConnectionConfig, control_path: PathBuf) -> Self {
        Self { config, control_path, master: Mutex::new(None) }
    }

    pub fn with_master(self, master: tokio::process::Child) -> Self {
        *self.master.lock() = Some(master);
        self
    }

    pub fn config(&self) -> &SshConnectionConfig {
        &self.config
    }

    pub fn control_path(&self) -> &Path {
        &self.control_path
    }

    pub fn destination(&self) -> String {
        self.config.destination()
    }

    /// Kill the master process (the control socket dies with it).
    pub fn close(&self) {
        if let Some(mut master) = self.master.lock().take() {
            let _ = master.start_kill();
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Dials master connections. The system dialer shells out to `ssh`; tests
/// substitute a scripted one.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    async fn dial(
        &self,
        config: &SshConnectionConfig,
        timeout: Duration,
    ) -> Result<Connection, RuntimeError>;
}

/// Options for a single acquisition.
#[derive(Default)]
pub struct AcquireOptions {
    pub cancel: Option<CancellationToken>,
    /// Connect timeout, usually derived from the caller's exec timeout.
    pub timeout: Option<Duration>,
    /// Cap on waiting out backoff; defaults to the pool tuning.
    pub max_wait: Option<Duration>,
    /// Invoked with the remaining wait at coarse intervals while backed off.
    pub on_wait: Option<Box<dyn Fn(Duration) + Send + Sync>>,
}

struct PoolEntry {
    connection: Option<Arc<Connection>>,
    liveness: Liveness,
    failure_count: u32,
    backoff_until: Option<Instant>,
    last_used_at: Instant,
    acquirers: usize,
    dial_lock: Arc<tokio::sync::Mutex<()>>,
}

impl PoolEntry {
    fn new() -> Self {
        Self {
            connection: None,
            liveness: Healthy,
            failure_count: 0,
            backoff_until: None,
            last_used_at: Instant::now(),
            acquirers: 0,
            dial_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }
}

/// The shared pool: one per process.
pub struct ConnectionPool {
    dialer: Arc<dyn Dialer>,
    tuning: PoolTuning,
    entries: Mutex<HashMap<String, PoolEntry>>,
}

impl ConnectionPool {
    pub fn new(dialer: Arc<dyn Dialer>, tuning: PoolTuning) -> Self {
        Self { dialer, tuning, entries: Mutex::new(HashMap::new()) }
    }

    pub fn with_system_dialer() -> Self {
        Self::new(Arc::new(SystemSshDialer::default()), PoolTuning::default())
    }

    fn with_entry<T>(&self, key: &str, f: impl FnOnce(&mut PoolEntry) -> T) -> T {
        let mut entries = self.entries.lock();
        let entry = entries.entry(key.to_string()).or_insert_with(PoolEntry::new);
        f(entry)
    }

    /// Current liveness for a target (`None` until first use).
    pub fn liveness(&self, config: &SshConnectionConfig) -> Option<Liveness> {
        self.entries.lock().get(&config.identity_key()).map(|entry| entry.liveness)
    }

    /// A successful command went through this target.
    pub fn mark_healthy(&self, config: &SshConnectionConfig) {
        self.with_entry(&config.identity_key(), |entry| {
            entry.failure_count = 0;
            entry.backoff_until = None;
            entry.liveness = Healthy;
        });
    }

    /// A transport-level failure was observed; enter (or extend) backoff and
    /// drop the master.
    pub fn report_failure(&self, config: &SshConnectionConfig, reason: &str) {
        let key = config.identity_key();
        let (count, delay) = self.with_entry(&key, |entry| {
            entry.failure_count += 1;
            entry.liveness = if entry.failure_count == 1 { Degraded } else { Failed };
            let delay = backoff_delay(&self.tuning, entry.failure_count);
            entry.backoff_until = Some(Instant::now() + delay);
            if let Some(connection) = entry.connection.take() {
                connection.close();
            }
            (entry.failure_count, delay)
        });
        tracing::warn!(
            host = %config.host,
            reason,
            failures = count,
            backoff_ms = delay.as_millis() as u64,
            "ssh connection failure"
        );
    }

    /// Return a usable connection, dialing if necessary.
    ///
    /// Honors the entry's backoff window before re-dialing, invoking
    /// `on_wait` with the remaining wait while blocked. A dial failure is
    /// recorded via [`report_failure`](Self::report_failure) before the
    /// error propagates.
    pub async fn acquire(
        &self,
        config: &SshConnectionConfig,
        options: AcquireOptions,
    ) -> Result<Arc<Connection>, RuntimeError> {
        let key = config.identity_key();
        self.with_entry(&key, |entry| entry.acquirers += 1);
        let result = self.acquire_inner(&key, config, &options).await;
        self.with_entry(&key, |entry| entry.acquirers = entry.acquirers.saturating_sub(1));
        result
    }

    async fn acquire_inner(
        &self,
        key: &str,
        config: &SshConnectionConfig,
        options: &AcquireOptions,
    ) -> Result<Arc<Connection>, RuntimeError> {
        let started = Instant::now();
        let max_wait = options.max_wait.unwrap_or(self.tuning.default_max_wait);

        loop {
            if let Some(connection) = self.open_connection(key) {
                return Ok(connection);
            }

            if let Some(deadline) = self.backoff_deadline(key) {
                let now = Instant::now();
                if deadline > now {
                    let wait = deadline - now;
                    if started.elapsed() + wait > max_wait {
                        return Err(RuntimeError::Network(format!(
                            "connection to {} is backing off beyond the allowed wait",
                            config.host
                        )));
                    }
                    self.wait_out(deadline, options).await?;
                }
            }

            let dial_lock = self.with_entry(key, |entry| Arc::clone(&entry.dial_lock));
            let guard = match &options.cancel {
                Some(token) => tokio::select! {
                    _ = token.cancelled() => return Err(RuntimeError::Aborted),
                    guard = dial_lock.lock() => guard,
                },
                None => dial_lock.lock().await,
            };

            // Someone else may have dialed (or failed) while we held back.
            if let Some(connection) = self.open_connection(key) {
                return Ok(connection);
            }
            if self.backoff_deadline(key).is_some_and(|deadline| deadline > Instant::now()) {
                drop(guard);
                continue;
            }

            let dial_timeout =
                options.timeout.map(|t| t.min(MAX_DIAL_TIMEOUT)).unwrap_or(DEFAULT_DIAL_TIMEOUT);
            match self.dialer.dial(config, dial_timeout).await {
                Ok(connection) => {
                    let connection = Arc::new(connection);
                    self.with_entry(key, |entry| {
                        entry.connection = Some(Arc::clone(&connection));
                        entry.liveness = Healthy;
                        entry.failure_count = 0;
                        entry.backoff_until = None;
                        entry.last_used_at = Instant::now();
                    });
                    tracing::info!(host = %config.host, "ssh master connected");
                    return Ok(connection);
                }
                Err(error) => {
                    self.report_failure(config, &error.to_string());
                    return Err(error);
                }
            }
        }
    }

    fn open_connection(&self, key: &str) -> Option<Arc<Connection>> {
        self.with_entry(key, |entry| {
            if entry.liveness == Healthy {
                if let Some(connection) = &entry.connection {
                    entry.last_used_at = Instant::now();
                    return Some(Arc::clone(connection));
                }
            }
            None
        })
    }

    fn backoff_deadline(&self, key: &str) -> Option<Instant> {
        self.with_entry(key, |entry| entry.backoff_until)
    }

    async fn wait_out(
        &self,
        deadline: Instant,
        options: &AcquireOptions,
    ) -> Result<(), RuntimeError> {
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            let remaining = deadline - now;
            if let Some(on_wait) = &options.on_wait {
                on_wait(remaining);
            }
            let step = remaining.min(Duration::from_secs(1));
            match &options.cancel {
                Some(token) => tokio::select! {
                    _ = token.cancelled() => return Err(RuntimeError::Aborted),
                    _ = tokio::time::sleep(step) => {}
                },
                None => tokio::time::sleep(step).await,
            }
        }
    }

    /// Close masters idle beyond the tuning threshold.
    pub fn close_idle(&self) {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        for (key, entry) in entries.iter_mut() {
            let idle_long_enough = now.duration_since(entry.last_used_at) >= self.tuning.idle_close;
            if entry.acquirers == 0 && idle_long_enough {
                if let Some(connection) = entry.connection.take() {
                    connection.close();
                    tracing::debug!(key = %key, "closed idle ssh master");
                }
            }
        }
    }

    /// Background sweep driving [`close_idle`](Self::close_idle). Stops when
    /// the pool is dropped.
    pub fn spawn_idle_sweep(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let pool = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                match pool.upgrade() {
                    Some(pool) => pool.close_idle(),
                    None => break,
                }
            }
        })
    }
}

/// Exponential backoff: base doubled per failure, capped, with ± jitter.
fn backoff_delay(tuning: &PoolTuning, failure_count: u32) -> Duration {
    if failure_count == 0 {
        return Duration::ZERO;
    }
    let exponent = (failure_count - 1).min(16) as i32;
    let raw = tuning.backoff_base.as_secs_f64() * 2f64.powi(exponent);
    let capped = raw.min(tuning.backoff_cap.as_secs_f64());
    let jittered = if tuning.jitter > 0.0 {
        use rand::Rng;
        let factor = 1.0 + rand::rng().random_range(-tuning.jitter..=tuning.jitter);
        capped * factor
    } else {
        capped
    };
    Duration::from_secs_f64(jittered.max(0.0))
}

/// Dials masters by shelling out to the system `ssh` binary with
/// `ControlMaster` multiplexing.
pub struct SystemSshDialer {
    control_dir: PathBuf,
}

impl Default for SystemSshDialer {
    fn default() -> Self {
        let control_dir = dirs::home_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(".mux")
            .join("ssh");
        Self { control_dir }
    }
}

impl SystemSshDialer {
    pub fn new(control_dir: PathBuf) -> Self {
        Self { control_dir }
    }

    /// Control paths must stay short (unix socket limit), so the key is
    /// hashed rather than embedded.
    fn control_path_for(&self, config: &SshConnectionConfig) -> PathBuf {
        let mut hasher = DefaultHasher::new();
        config.identity_key().hash(&mut hasher);
        self.control_dir.join(format!("{:016x}.sock", hasher.finish()))
    }

    async fn check(control_path: &Path, destination: &str) -> bool {
        let output = tokio::process::Command::new("ssh")
            .arg("-O")
            .arg("check")
            .arg("-o")
            .arg(format!("ControlPath={}", control_path.display()))
            .arg(destination)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .await;
        matches!(output, Ok(out) if out.status.success())
    }
}

#[async_trait]
impl Dialer for SystemSshDialer {
    async fn dial(
        &self,
        config: &SshConnectionConfig,
        timeout: Duration,
    ) -> Result<Connection, RuntimeError> {
        tokio::fs::create_dir_all(&self.control_dir)
            .await
            .map_err(|e| RuntimeError::Network(format!("cannot create control dir: {}", e)))?;

        let control_path = self.control_path_for(config);
        let destination = config.destination();

        let mut command = tokio::process::Command::new("ssh");
        command
            .arg("-N")
            .arg("-T")
            .arg("-o")
            .arg("ControlMaster=yes")
            .arg("-o")
            .arg(format!("ControlPath={}", control_path.display()))
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg("StrictHostKeyChecking=accept-new")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", timeout.as_secs().max(1)))
            .arg("-o")
            .arg("ConnectionAttempts=1");
        if let Some(port) = config.port {
            command.arg("-p").arg(port.to_string());
        }
        if let Some(identity) = &config.identity_file {
            command.arg("-i").arg(identity);
        }
        if !config.jump_hosts.is_empty() {
            command.arg("-J").arg(config.jump_hosts.join(","));
        }
        if let Some(proxy) = &config.proxy_command {
            command.arg("-o").arg(format!("ProxyCommand={}", proxy));
        }
        command
            .arg(&destination)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut master = command
            .spawn()
            .map_err(|e| RuntimeError::Network(format!("failed to spawn ssh: {}", e)))?;

        // Wait for the control socket to come up, watching for early exits.
        let deadline = Instant::now() + timeout + Duration::from_secs(2);
        loop {
            if let Ok(Some(status)) = master.try_wait() {
                let stderr = read_child_stderr(&mut master).await;
                return Err(RuntimeError::Network(format!(
                    "ssh master for {} exited with {}: {}",
                    destination,
                    status.code().unwrap_or(-1),
                    stderr.trim()
                )));
            }
            if Self::check(&control_path, &destination).await {
                return Ok(Connection::new(config.clone(), control_path).with_master(master));
            }
            if Instant::now() >= deadline {
                let _ = master.start_kill();
                return Err(RuntimeError::Network(format!(
                    "timed out establishing ssh master for {}",
                    destination
                )));
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }
}

async fn read_child_stderr(child: &mut tokio::process::Child) -> String {
    use tokio::io::AsyncReadExt;
    let mut buf = Vec::new();
    if let Some(mut stderr) = child.stderr.take() {
        let _ = stderr.read_to_end(&mut buf).await;
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
