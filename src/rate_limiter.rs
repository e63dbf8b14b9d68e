//! Minimum-interval rate limiting for outbound navigation actions
//!
//! The target application throttles aggressive clients, so every navigation
//! action is gated on a fixed minimum spacing since the previous one. The
//! limiter is an explicit instance owned by the pipeline and injected into
//! stages, never hidden global state, so repeated or concurrent runs can be
//! isolated in tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Enforces a minimum interval between grants
///
/// `acquire()` suspends the caller until at least the configured interval has
/// elapsed since the previous grant, then records the new grant time and
/// returns. This operation cannot fail, only delay.
///
/// # Implementation
///
/// A single `AtomicU64` holds the last grant time in nanoseconds since an
/// arbitrary process epoch (monotonic, unaffected by system clock changes).
/// The stored value is offset by one so that zero means "never granted".
/// Clones share state.
#[derive(Clone)]
pub struct RateLimiter {
    /// Minimum spacing between grants
    min_interval: Duration,
    /// Last grant time as `nanos + 1` (0 = no grant yet)
    last_granted: Arc<AtomicU64>,
}

impl RateLimiter {
    /// Create a new RateLimiter with the given minimum interval
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_granted: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The configured minimum spacing
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until the minimum interval has elapsed since the previous grant,
    /// then record the new grant and return
    pub async fn acquire(&self) {
        let min_nanos = self.min_interval.as_nanos() as u64;

        loop {
            let last = self.last_granted.load(Ordering::SeqCst);
            let now = Self::now_nanos();

            // last is stored as nanos + 1; 0 means no grant has happened yet
            let elapsed = match last {
                0 => None,
                stamp => Some(now.saturating_sub(stamp - 1)),
            };

            if let Some(elapsed) = elapsed
                && elapsed < min_nanos
            {
                tokio::time::sleep(Duration::from_nanos(min_nanos - elapsed)).await;
                continue;
            }

            if self
                .last_granted
                .compare_exchange(last, now + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return;
            }
            // Another caller was granted in between; re-evaluate the spacing
        }
    }

    /// Current monotonic time in nanoseconds since an arbitrary process epoch
    fn now_nanos() -> u64 {
        static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
        let start = START.get_or_init(Instant::now);
        start.elapsed().as_nanos() as u64
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_acquire_is_immediate() {
        let limiter = RateLimiter::new(Duration::from_secs(3));

        let start = Instant::now();
        limiter.acquire().await;
        let elapsed = start.elapsed();

        assert!(
            elapsed < Duration::from_millis(50),
            "first acquire should not wait, took {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn consecutive_grants_are_spaced_by_min_interval() {
        let min_interval = Duration::from_millis(100);
        let limiter = RateLimiter::new(min_interval);

        let mut grant_times = Vec::new();
        for _ in 0..4 {
            limiter.acquire().await;
            grant_times.push(Instant::now());
        }

        for pair in grant_times.windows(2) {
            let spacing = pair[1] - pair[0];
            assert!(
                spacing >= min_interval,
                "grants spaced {spacing:?}, expected at least {min_interval:?}"
            );
        }
    }

    #[tokio::test]
    async fn clone_shares_grant_state() {
        let min_interval = Duration::from_millis(100);
        let limiter = RateLimiter::new(min_interval);
        let clone = limiter.clone();

        limiter.acquire().await;
        let first_grant = Instant::now();

        // The clone must observe the original's grant and wait
        clone.acquire().await;
        let second_grant = Instant::now();

        assert!(
            second_grant - first_grant >= min_interval,
            "clone should honor the original's last grant time"
        );
    }

    #[tokio::test]
    async fn independent_limiters_do_not_interfere() {
        let a = RateLimiter::new(Duration::from_secs(3));
        let b = RateLimiter::new(Duration::from_secs(3));

        a.acquire().await;

        let start = Instant::now();
        b.acquire().await;
        assert!(
            start.elapsed() < Duration::from_millis(50),
            "separate limiter instances must not share grant state"
        );
    }
}
