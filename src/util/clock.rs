//! # Time Source Abstraction
//!
//! Every wait in the engine (regulatory backoff, settle delays, receive-window
//! polling, channel failure aging) goes through a [`Clock`] so the same code can
//! run against the tokio timer in production and against a virtual clock in
//! tests.
//!
//! ```rust
//! use lora_reliable::util::clock::{Clock, ManualClock};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let clock = ManualClock::new();
//! let start = clock.now();
//! clock.sleep(Duration::from_secs(10)).await; // returns immediately
//! assert_eq!(clock.now() - start, Duration::from_secs(10));
//! # });
//! ```

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Source of monotonic time and of delays.
///
/// The contract of [`Clock::sleep`] is "at least `duration` elapses before the
/// call returns", measured on this clock.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current monotonic instant.
    fn now(&self) -> Instant;

    /// Wait for `duration`.
    async fn sleep(&self, duration: Duration);

    /// Milliseconds elapsed since `since`.
    fn elapsed_ms(&self, since: Instant) -> u64 {
        self.now().saturating_duration_since(since).as_millis() as u64
    }
}

/// Wall clock backed by `tokio::time`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Virtual clock: `sleep` advances time instantly and records the request.
///
/// Clones share the same timeline.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    offset: Arc<Mutex<Duration>>,
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        ManualClock {
            origin: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
            sleeps: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Move virtual time forward without recording a sleep.
    pub fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap() += by;
    }

    /// Every duration passed to `sleep`, in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    /// Sum of all recorded sleeps.
    pub fn total_slept(&self) -> Duration {
        self.sleeps.lock().unwrap().iter().sum()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        self.advance(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manual_clock_sleep_advances_time() {
        let clock = ManualClock::new();
        let t0 = clock.now();

        clock.sleep(Duration::from_millis(200)).await;
        clock.sleep(Duration::from_millis(800)).await;

        assert_eq!(clock.elapsed_ms(t0), 1000);
        assert_eq!(clock.sleeps().len(), 2);
        assert_eq!(clock.total_slept(), Duration::from_secs(1));
    }

    #[test]
    fn test_manual_clock_clones_share_timeline() {
        let clock = ManualClock::new();
        let other = clock.clone();
        let t0 = clock.now();

        other.advance(Duration::from_secs(1800));
        assert_eq!(clock.now() - t0, Duration::from_secs(1800));
        assert!(clock.sleeps().is_empty());
    }
}
