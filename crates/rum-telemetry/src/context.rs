//! Read-side RUM context and the clock and identity sources scopes depend on.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Snapshot of the identifiers describing the deepest active scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RumContext {
    /// RUM application identifier, fixed for the lifetime of the monitor.
    pub rum_application_id: String,
    /// Current session identifier; the nil UUID before any session exists.
    pub session_id: Uuid,
    /// Identifier of the active view.
    pub active_view_id: Option<Uuid>,
    /// URI of the active view.
    pub active_view_uri: Option<String>,
    /// Identifier of the active user action.
    pub active_user_action_id: Option<Uuid>,
}

impl RumContext {
    /// Creates the root context of an application with no session.
    pub fn new(rum_application_id: impl Into<String>) -> Self {
        Self {
            rum_application_id: rum_application_id.into(),
            session_id: Uuid::nil(),
            active_view_id: None,
            active_view_uri: None,
            active_user_action_id: None,
        }
    }

    /// Returns whether a session has been started.
    pub fn has_session(&self) -> bool {
        !self.session_id.is_nil()
    }
}

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Clock reading the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to, for deterministic tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Creates a clock frozen at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: std::time::Duration) {
        let by = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
        let mut now = self.now.lock();
        *now = now.checked_add_signed(by).unwrap_or(*now);
    }

    /// Sets the clock to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Source of scope identifiers.
pub trait IdGenerator: Send + Sync {
    /// Returns a new unique identifier.
    fn generate(&self) -> Uuid;
}

/// Generates random (v4) UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate(&self) -> Uuid {
        Uuid::new_v4()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_root_context() {
        let context = RumContext::new("abc-123");

        assert_eq!(context.rum_application_id, "abc-123");
        assert!(context.session_id.is_nil());
        assert!(!context.has_session());
        assert!(context.active_view_id.is_none());
        assert!(context.active_view_uri.is_none());
        assert!(context.active_user_action_id.is_none());
    }

    #[test]
    fn test_manual_clock_advances() {
        let start = Utc::now();
        let clock = ManualClock::new(start);

        clock.advance(Duration::from_secs(90));
        assert_eq!(clock.now() - start, chrono::Duration::seconds(90));

        clock.set(start);
        assert_eq!(clock.now(), start);
    }

    #[test]
    fn test_uuid_generator_is_unique() {
        let generator = UuidGenerator;
        assert_ne!(generator.generate(), generator.generate());
    }
}
