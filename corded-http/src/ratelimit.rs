//! HTTP rate limiting.
//!
//! Implements the bucket-based rate-limit contract: requests on the same
//! bucket run strictly one at a time, a finished request can schedule its
//! bucket to reopen once the server-reported window has passed, and a
//! server-reported global limit closes every bucket at once.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Coordinates per-bucket serialization and the process-wide global gate.
///
/// Buckets are created lazily on first use and live for the process
/// lifetime. Within a bucket, [`acquire`] admits callers strictly in FIFO
/// order; distinct buckets proceed in parallel.
///
/// [`acquire`]: Ratelimiter::acquire
pub struct Ratelimiter {
    /// Per-route buckets.
    buckets: DashMap<String, Arc<Bucket>>,
    /// Process-wide gate, closed while a global limit is in force.
    global: GlobalGate,
}

/// A rate limit bucket for one route class.
struct Bucket {
    /// Single-permit semaphore; tokio semaphores queue waiters FIFO.
    gate: Semaphore,
}

impl Ratelimiter {
    /// Create a new rate limiter with an open global gate.
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
            global: GlobalGate::new(),
        }
    }

    /// Acquire exclusive use of the given bucket.
    ///
    /// Suspends until both the bucket is free and the global gate is open.
    /// Every acquire must be paired with exactly one [`release`].
    ///
    /// [`release`]: Ratelimiter::release
    pub async fn acquire(&self, bucket: &str) -> Result<(), crate::HttpError> {
        let entry = self
            .buckets
            .entry(bucket.to_string())
            .or_insert_with(|| {
                Arc::new(Bucket {
                    gate: Semaphore::new(1),
                })
            })
            .clone();

        let permit = entry
            .gate
            .acquire()
            .await
            .map_err(|_| crate::HttpError::Client("rate limit semaphore closed".to_string()))?;
        // The permit is returned by `release`, not by guard drop.
        permit.forget();

        self.global.wait_open().await;

        Ok(())
    }

    /// Release the bucket, reopening it `after` from now (zero = immediately).
    pub fn release(&self, bucket: &str, after: Duration) {
        let Some(entry) = self.buckets.get(bucket) else {
            warn!(bucket = %bucket, "Release of unknown bucket ignored");
            return;
        };
        let entry = entry.clone();

        if after.is_zero() {
            entry.gate.add_permits(1);
        } else {
            debug!(bucket = %bucket, after_ms = after.as_millis() as u64, "Deferring bucket release");
            tokio::spawn(async move {
                sleep(after).await;
                entry.gate.add_permits(1);
            });
        }
    }

    /// Close the global gate for `duration`.
    ///
    /// Concurrent calls extend the closure to the latest requested deadline;
    /// the gate reopens on its own once the deadline passes.
    pub fn lock_global(&self, duration: Duration) {
        warn!(duration_ms = duration.as_millis() as u64, "Global rate limit engaged");
        self.global.close_for(duration);
    }
}

impl Default for Ratelimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// A latch that is either open or closed until a deadline.
struct GlobalGate {
    closed_until: Mutex<Option<Instant>>,
}

impl GlobalGate {
    fn new() -> Self {
        Self {
            closed_until: Mutex::new(None),
        }
    }

    fn close_for(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        let mut until = self.closed_until.lock();
        *until = Some(until.map_or(deadline, |current| current.max(deadline)));
    }

    async fn wait_open(&self) {
        loop {
            let remaining = {
                let until = self.closed_until.lock();
                until.and_then(|t| t.checked_duration_since(Instant::now()))
            };

            match remaining {
                None => return,
                // Re-check after sleeping: the deadline may have been extended.
                Some(wait) => sleep(wait).await,
            }
        }
    }
}
