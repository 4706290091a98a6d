//! Rate limiter for outgoing Bot API calls.
//!
//! Spaces outgoing messages and honours Telegram's flood-wait hints.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Rate limiter that enforces minimum intervals between operations.
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum duration between allowed operations.
    min_interval: Duration,

    /// Earliest instant the next operation may start.
    next_allowed: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a new rate limiter with the specified minimum interval.
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_allowed: Mutex::new(None),
        }
    }

    /// Creates a rate limiter from milliseconds.
    #[must_use]
    pub fn from_millis(millis: u64) -> Self {
        Self::new(Duration::from_millis(millis))
    }

    /// Waits until an operation is allowed, then reserves the next slot.
    ///
    /// Returns the duration waited (0 if no wait was needed).
    pub async fn wait_and_acquire(&self) -> Duration {
        let mut next = self.next_allowed.lock().await;

        let wait_duration = next
            .map(|at| at.saturating_duration_since(Instant::now()))
            .unwrap_or_default();

        if !wait_duration.is_zero() {
            debug!(
                "Rate limiter: waiting {:?} before next operation",
                wait_duration
            );
            tokio::time::sleep(wait_duration).await;
        }

        *next = Some(Instant::now() + self.min_interval);
        wait_duration
    }

    /// Checks if an operation is currently allowed without blocking.
    pub async fn is_allowed(&self) -> bool {
        let next = self.next_allowed.lock().await;
        next.is_none_or(|at| Instant::now() >= at)
    }

    /// Returns the time remaining until the next operation is allowed.
    pub async fn time_until_allowed(&self) -> Duration {
        let next = self.next_allowed.lock().await;
        next.map(|at| at.saturating_duration_since(Instant::now()))
            .unwrap_or_default()
    }

    /// Blocks further operations for the flood-wait period Telegram asked for.
    pub async fn handle_flood_wait(&self, wait_seconds: u32) {
        warn!(
            "Received flood wait from Telegram: {} seconds",
            wait_seconds
        );
        let mut next = self.next_allowed.lock().await;
        let until = Instant::now() + Duration::from_secs(u64::from(wait_seconds));
        if next.is_none_or(|at| at < until) {
            *next = Some(until);
        }
    }

    /// Resets the rate limiter, allowing immediate operation.
    pub async fn reset(&self) {
        let mut next = self.next_allowed.lock().await;
        *next = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rate_limiter_first_operation() {
        let limiter = RateLimiter::from_millis(1000);
        assert!(limiter.is_allowed().await);

        let waited = limiter.wait_and_acquire().await;
        assert_eq!(waited, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_rate_limiter_subsequent_operation() {
        let limiter = RateLimiter::from_millis(100);

        limiter.wait_and_acquire().await;

        assert!(!limiter.is_allowed().await);
        assert!(limiter.time_until_allowed().await > Duration::ZERO);
    }

    #[tokio::test]
    async fn test_flood_wait_blocks_and_reset_clears() {
        let limiter = RateLimiter::from_millis(10);

        limiter.handle_flood_wait(30).await;
        assert!(!limiter.is_allowed().await);
        assert!(limiter.time_until_allowed().await > Duration::from_secs(29));

        limiter.reset().await;
        assert!(limiter.is_allowed().await);
    }
}
