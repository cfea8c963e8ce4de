// Self-imposed request pacing
//
// Paged listings and per-id lookups acquire the pacer before each call so that
// consecutive calls are spaced by a random interval in [min, max].

use rand::Rng;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Minimum-spacing rate limiter with jittered intervals
pub struct Pacer {
    min_ms: u64,
    max_ms: u64,

    /// When the previous permit was handed out
    last: Mutex<Option<Instant>>,

    /// Permits handed out so far
    acquired: AtomicU32,
}

impl Pacer {
    /// Create a pacer spacing calls by `min..=max`
    pub fn new(min: Duration, max: Duration) -> Self {
        let (a, b) = (min.as_millis() as u64, max.as_millis() as u64);
        Self {
            min_ms: a.min(b),
            max_ms: a.max(b),
            last: Mutex::new(None),
            acquired: AtomicU32::new(0),
        }
    }

    /// Pacer that never waits
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Wait until the next call is allowed
    ///
    /// The first permit is immediate.
    pub async fn acquire(&self) {
        let mut last = self.last.lock().await;

        if let Some(prev) = *last {
            let interval = self.next_interval();
            let elapsed = prev.elapsed();
            if interval > elapsed {
                let wait = interval - elapsed;
                tracing::trace!(wait_ms = wait.as_millis() as u64, "Pacing next request");
                tokio::time::sleep(wait).await;
            }
        }

        *last = Some(Instant::now());
        self.acquired.fetch_add(1, Ordering::SeqCst);
    }

    /// Permits handed out since construction
    pub fn acquisitions(&self) -> u32 {
        self.acquired.load(Ordering::SeqCst)
    }

    fn next_interval(&self) -> Duration {
        if self.max_ms == 0 {
            return Duration::ZERO;
        }
        let ms = rand::thread_rng().gen_range(self.min_ms..=self.max_ms);
        Duration::from_millis(ms)
    }
}
