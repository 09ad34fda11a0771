//! Byte-budget throttling for download copy loops.
//!
//! Tracks cumulative bytes against elapsed time and sleeps the calling task
//! whenever observed throughput exceeds the configured limit. A limit of `0`
//! disables throttling entirely.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Shared rate limiter for a single download invocation.
///
/// Cloning shares the underlying budget, so all chunk tasks of one download
/// count against the same limit.
#[derive(Debug, Clone, Default)]
pub struct Throttle {
    state: Option<Arc<Mutex<ThrottleState>>>,
}

#[derive(Debug)]
struct ThrottleState {
    start: Instant,
    bytes: u64,
    limit_bytes_per_sec: u64,
}

impl Throttle {
    /// Creates a throttle for `limit_bytes_per_sec`; `0` means unlimited.
    #[must_use]
    pub fn new(limit_bytes_per_sec: u64) -> Self {
        let state = (limit_bytes_per_sec > 0).then(|| {
            Arc::new(Mutex::new(ThrottleState {
                start: Instant::now(),
                bytes: 0,
                limit_bytes_per_sec,
            }))
        });
        Self { state }
    }

    /// Accounts `bytes` against the budget and sleeps if ahead of schedule.
    ///
    /// The lock is only held to compute the required sleep; the sleep itself
    /// happens outside the lock.
    pub async fn throttle(&self, bytes: u64) {
        let Some(state) = &self.state else {
            return;
        };

        let sleep = {
            let Ok(mut guard) = state.lock() else {
                return;
            };
            guard.bytes = guard.bytes.saturating_add(bytes);
            #[allow(clippy::cast_precision_loss)]
            let expected = guard.bytes as f64 / guard.limit_bytes_per_sec as f64;
            let elapsed = guard.start.elapsed().as_secs_f64();
            if expected > elapsed {
                Duration::from_secs_f64(expected - elapsed)
            } else {
                Duration::ZERO
            }
        };

        if sleep > Duration::ZERO {
            tokio::time::sleep(sleep).await;
        }
    }
}
