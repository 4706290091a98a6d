//! Runtime status of the cache syncer.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// What the syncer last did.
#[derive(Debug, Default)]
pub struct SyncStatus {
    /// Whether a sync is running right now.
    pub in_progress: bool,

    /// Completed syncs since startup.
    pub syncs_completed: u64,

    /// Failures since the last success.
    pub consecutive_failures: u32,

    /// Error of the last failed sync, cleared on success.
    pub last_error: Option<String>,

    /// Wall-clock time of the last success (for display).
    pub last_success_at: Option<DateTime<Utc>>,

    /// Rows read by the last successful sync.
    pub last_rows: usize,

    /// Monotonic time of the last success (for staleness).
    last_success: Option<Instant>,
}

impl SyncStatus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_started(&mut self) {
        self.in_progress = true;
    }

    pub fn mark_succeeded(&mut self, rows: usize) {
        self.in_progress = false;
        self.syncs_completed += 1;
        self.consecutive_failures = 0;
        self.last_error = None;
        self.last_rows = rows;
        self.last_success = Some(Instant::now());
        self.last_success_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: impl ToString) {
        self.in_progress = false;
        self.consecutive_failures += 1;
        self.last_error = Some(error.to_string());
    }

    /// Time since the last success, `None` before the first one.
    #[must_use]
    pub fn since_last_success(&self) -> Option<Duration> {
        self.last_success.map(|t| t.elapsed())
    }

    /// True if there was no success within `max_age`.
    #[must_use]
    pub fn is_stale(&self, max_age: Duration) -> bool {
        self.since_last_success().is_none_or(|age| age > max_age)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_status_is_stale() {
        let status = SyncStatus::new();
        assert!(status.is_stale(Duration::from_secs(300)));
        assert!(status.since_last_success().is_none());
    }

    #[test]
    fn test_success_resets_failures() {
        let mut status = SyncStatus::new();
        status.mark_started();
        status.mark_failed("boom");
        status.mark_failed("boom again");
        assert_eq!(status.consecutive_failures, 2);
        assert_eq!(status.last_error.as_deref(), Some("boom again"));

        status.mark_started();
        status.mark_succeeded(12);
        assert!(!status.in_progress);
        assert_eq!(status.consecutive_failures, 0);
        assert!(status.last_error.is_none());
        assert_eq!(status.last_rows, 12);
        assert_eq!(status.syncs_completed, 1);
        assert!(!status.is_stale(Duration::from_secs(300)));
    }
}
