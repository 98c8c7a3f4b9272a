//! Gateway rate limiting.
//!
//! The gateway bounds both outbound payloads per shard (120 per 60 seconds)
//! and connection starts across shards (`max_concurrency` per 5 seconds).
//! Both use the same fixed-window counter.

use std::time::Duration;
use tokio::time::{sleep, Instant};

/// A fixed-window rate limiter: at most `rate` admissions per `per` window.
///
/// [`wait`] admits immediately while the current window has budget and
/// otherwise suspends until the window rolls. Waiters queue in FIFO order.
///
/// [`wait`]: FixedWindowLimiter::wait
pub struct FixedWindowLimiter {
    rate: u32,
    per: Duration,
    window: tokio::sync::Mutex<Window>,
}

struct Window {
    started_at: Instant,
    used: u32,
}

impl FixedWindowLimiter {
    /// Create a limiter admitting `rate` per `per` (rate floors at 1).
    pub fn new(rate: u32, per: Duration) -> Self {
        Self {
            rate: rate.max(1),
            per,
            window: tokio::sync::Mutex::new(Window {
                started_at: Instant::now(),
                used: 0,
            }),
        }
    }

    /// Acquire one admission, suspending until the window has budget.
    pub async fn wait(&self) {
        let mut window = self.window.lock().await;
        let now = Instant::now();

        if now.duration_since(window.started_at) >= self.per {
            window.started_at = now;
            window.used = 1;
            return;
        }

        if window.used < self.rate {
            window.used += 1;
            return;
        }

        // Window exhausted: sleep it out while holding the lock so later
        // callers stay queued behind this one.
        let reopen = window.started_at + self.per;
        sleep(reopen.saturating_duration_since(Instant::now())).await;

        window.started_at = Instant::now();
        window.used = 1;
    }
}

/// Calculate backoff duration with exponential increase.
///
/// `attempt` is 0-indexed; the delay doubles per attempt and caps at `max_ms`.
pub fn exponential_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let delay_ms = base_ms.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(delay_ms.min(max_ms))
}

/// Add random jitter to a duration.
///
/// `jitter_factor` 0.0 adds nothing; 1.0 adds up to the full duration again.
pub fn with_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    use rand::Rng;

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let jitter_range = (duration.as_millis() as f64 * jitter_factor) as u64;
    let jitter = rand::rng().random_range(0..=jitter_range);
    duration + Duration::from_millis(jitter)
}
