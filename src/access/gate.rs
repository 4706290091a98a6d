//! Whitelist gate applied to every message and callback query.

use thiserror::Error;
use tracing::{info, warn};

use crate::config::AdminIds;

/// Reasons an update is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessDenied {
    #[error("User not in whitelist")]
    NotWhitelisted { user_id: i64 },

    #[error("Update has no sender")]
    NoSender,
}

/// Checks senders against the configured allow-list.
#[derive(Debug, Clone)]
pub struct AccessGate {
    allowed: AdminIds,
}

impl AccessGate {
    /// Creates a gate for the given allow-list.
    #[must_use]
    pub fn new(allowed: AdminIds) -> Self {
        if allowed.is_empty() {
            warn!("ADMIN_IDS is empty: every user will be rejected");
        } else {
            info!("Access gate initialized. Allowed IDs: {}", allowed);
        }
        Self { allowed }
    }

    /// Checks whether the sender of an update may proceed.
    ///
    /// # Errors
    ///
    /// Returns why access was denied.
    pub fn check(&self, user_id: Option<i64>) -> Result<(), AccessDenied> {
        let user_id = user_id.ok_or(AccessDenied::NoSender)?;

        if self.allowed.contains(user_id) {
            Ok(())
        } else {
            Err(AccessDenied::NotWhitelisted { user_id })
        }
    }

    /// Returns true if the user is allowed.
    #[must_use]
    pub fn is_allowed(&self, user_id: i64) -> bool {
        self.allowed.contains(user_id)
    }

    /// Number of allowed users.
    #[must_use]
    pub fn allowed_count(&self) -> usize {
        self.allowed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(raw: &str) -> AccessGate {
        AccessGate::new(AdminIds::parse(raw).unwrap())
    }

    #[test]
    fn test_listed_users_are_allowed() {
        let gate = gate("906038550,123456789");
        assert!(gate.check(Some(906_038_550)).is_ok());
        assert!(gate.check(Some(123_456_789)).is_ok());
    }

    #[test]
    fn test_unlisted_users_are_denied() {
        let gate = gate("906038550,123456789");
        for id in [0, 1, -906_038_550, 555_555_555, i64::MAX] {
            assert_eq!(
                gate.check(Some(id)),
                Err(AccessDenied::NotWhitelisted { user_id: id })
            );
        }
    }

    #[test]
    fn test_denial_message() {
        let gate = gate("1");
        let err = gate.check(Some(2)).unwrap_err();
        assert_eq!(err.to_string(), "User not in whitelist");
    }

    #[test]
    fn test_missing_sender_is_denied() {
        let gate = gate("1");
        assert_eq!(gate.check(None), Err(AccessDenied::NoSender));
    }

    #[test]
    fn test_empty_list_denies_everyone() {
        let gate = gate("");
        assert_eq!(gate.allowed_count(), 0);
        assert!(!gate.is_allowed(906_038_550));
    }

    #[test]
    fn test_new_list_applies_to_new_gate() {
        let before = gate("1");
        let after = gate("1,2");
        assert!(!before.is_allowed(2));
        assert!(after.is_allowed(2));
    }
}
