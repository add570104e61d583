//! Role-based inactivity timeouts

use crate::types::Role;
use std::time::Duration;

const MINUTE: u64 = 60;

/// Inactivity timeout table
///
/// `None` means no timeout is enforced for that role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    pub admin: Option<Duration>,
    pub senior_manager: Option<Duration>,
    pub junior_manager: Option<Duration>,
    pub learner: Option<Duration>,
}

impl SessionPolicy {
    pub fn timeout_for(&self, role: Role) -> Option<Duration> {
        match role {
            Role::Admin => self.admin,
            Role::SeniorManager => self.senior_manager,
            Role::JuniorManager => self.junior_manager,
            Role::Student | Role::User => self.learner,
        }
    }

    /// Whether `idle_ms` of inactivity exceeds the role's timeout
    pub fn is_expired(&self, role: Role, idle_ms: i64) -> bool {
        match self.timeout_for(role) {
            Some(timeout) => idle_ms > 0 && idle_ms as u128 > timeout.as_millis(),
            None => false,
        }
    }

    /// Manager timeout override, applied to both manager tiers
    #[must_use]
    pub fn with_manager_timeout(mut self, timeout: Duration) -> Self {
        self.senior_manager = Some(timeout);
        self.junior_manager = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_learner_timeout(mut self, timeout: Duration) -> Self {
        self.learner = Some(timeout);
        self
    }
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            admin: None,
            senior_manager: Some(Duration::from_secs(15 * MINUTE)),
            junior_manager: Some(Duration::from_secs(15 * MINUTE)),
            learner: Some(Duration::from_secs(60 * MINUTE)),
        }
    }
}
