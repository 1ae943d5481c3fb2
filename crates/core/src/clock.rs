// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction so backoff windows and recency stamps are testable.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Source of monotonic and wall-clock time.
pub trait Clock: Clone + Send + Sync + 'static {
    /// Monotonic instant, for measuring durations.
    fn now(&self) -> Instant;
    /// Milliseconds since the Unix epoch, for persisted stamps.
    fn epoch_ms(&self) -> u64;
}

/// Real system clock.
#[derive(Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn epoch_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Manually advanced clock for tests.
///
/// Time never moves on its own; call [`FakeClock::advance`] to step both the
/// monotonic and epoch views together.
#[derive(Clone)]
pub struct FakeClock {
    base: Instant,
    offset_ms: Arc<AtomicU64>,
    epoch_base_ms: Arc<AtomicU64>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset_ms: Arc::new(AtomicU64::new(0)),
            epoch_base_ms: Arc::new(AtomicU64::new(1_700_000_000_000)),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.offset_ms.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    /// Pin the epoch view to a specific value (monotonic view is unaffected).
    pub fn set_epoch_ms(&self, ms: u64) {
        let offset = self.offset_ms.load(Ordering::SeqCst);
        self.epoch_base_ms.store(ms.saturating_sub(offset), Ordering::SeqCst);
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.base + Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
    }

    fn epoch_ms(&self) -> u64 {
        self.epoch_base_ms.load(Ordering::SeqCst) + self.offset_ms.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
