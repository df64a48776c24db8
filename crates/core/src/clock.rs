// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction for testable time handling

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// A clock that provides the current time and drives delays.
///
/// Every component that sleeps (scheduler fires, library polls, heartbeat
/// ticks, restart backoff) goes through this trait so tests can accelerate
/// or pin time.
#[async_trait]
pub trait Clock: Clone + Send + Sync + 'static {
    fn now(&self) -> Instant;
    fn epoch_ms(&self) -> u64;

    /// Sleep for the given duration.
    async fn sleep(&self, duration: Duration);

    /// Current wall-clock time in the local timezone.
    fn now_local(&self) -> chrono::DateTime<chrono::Local> {
        use chrono::TimeZone;
        chrono::Local
            .timestamp_millis_opt(self.epoch_ms() as i64)
            .single()
            .unwrap_or_else(chrono::Local::now)
    }
}

/// Real system clock
#[derive(Clone, Default)]
pub struct SystemClock;

#[async_trait]
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

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn now_local(&self) -> chrono::DateTime<chrono::Local> {
        chrono::Local::now()
    }
}

/// Fake clock for testing with controllable time.
///
/// `sleep` advances the fake epoch by the full requested duration, then
/// parks for at most `sleep_cap` of real time (zero by default, so sleeps
/// complete immediately after a yield). `accelerated` builds a clock whose
/// sleeps take a fixed real duration regardless of the requested one, which
/// is how scheduler cadence tests compress hours into seconds.
#[derive(Clone)]
pub struct FakeClock {
    current: Arc<Mutex<Instant>>,
    epoch_ms: Arc<Mutex<u64>>,
    sleep_cap: Duration,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            current: Arc::new(Mutex::new(Instant::now())),
            epoch_ms: Arc::new(Mutex::new(1_000_000)),
            sleep_cap: Duration::ZERO,
        }
    }

    /// Clock whose sleeps take `real` wall time each, however long the
    /// requested delay.
    pub fn accelerated(real: Duration) -> Self {
        Self { sleep_cap: real, ..Self::new() }
    }

    /// Advance the clock by the given duration
    pub fn advance(&self, duration: Duration) {
        *self.current.lock() += duration;
        *self.epoch_ms.lock() += duration.as_millis() as u64;
    }

    /// Set the epoch milliseconds value
    pub fn set_epoch_ms(&self, ms: u64) {
        *self.epoch_ms.lock() = ms;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for FakeClock {
    fn now(&self) -> Instant {
        *self.current.lock()
    }

    fn epoch_ms(&self) -> u64 {
        *self.epoch_ms.lock()
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        if self.sleep_cap.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.sleep_cap.min(duration)).await;
        }
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
