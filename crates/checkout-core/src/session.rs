//! Session Tracking
//!
//! Tracks whether a payment-link checkout is still live. Sessions use a
//! sliding idle timeout: every successful validation pushes `lastActivity`
//! forward.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::storage::KeyValueStore;

/// Default idle timeout: 30 minutes
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Storage key for a payment's session
pub fn storage_key(payment_id: &str) -> String {
    format!("payment_session_{payment_id}")
}

/// Unique session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// `session_{paymentId}_{epochMillis}_{random}`
    pub fn generate(payment_id: &str, now_millis: i64) -> Self {
        let suffix: String = uuid::Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(9)
            .collect();
        Self(format!("session_{payment_id}_{now_millis}_{suffix}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Persisted session record (timestamps in epoch millis)
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    pub id: SessionId,
    pub payment_id: String,
    pub created_at: i64,
    pub last_activity: i64,
    pub is_active: bool,
}

/// Session tracker over durable storage
pub struct SessionTracker {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    /// Serialises record rewrites across mounts
    write_lock: Mutex<()>,
}

impl SessionTracker {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            timeout: SESSION_TIMEOUT,
            write_lock: Mutex::new(()),
        }
    }

    /// Override the idle timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Create (or replace) the session for `payment_id`
    pub fn create_session(&self, payment_id: &str) -> Result<SessionId> {
        let now = self.clock.now_millis();
        let session = CheckoutSession {
            id: SessionId::generate(payment_id, now),
            payment_id: payment_id.to_string(),
            created_at: now,
            last_activity: now,
            is_active: true,
        };

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.store
            .set(&storage_key(payment_id), &serde_json::to_string(&session)?)?;
        tracing::debug!(payment_id, session_id = %session.id, "Created checkout session");
        Ok(session.id)
    }

    /// Check the session is live and refresh its activity timestamp
    ///
    /// Unreadable records count as "no valid session".
    pub fn validate_session(&self, payment_id: &str) -> bool {
        match self.try_validate(payment_id) {
            Ok(valid) => valid,
            Err(e) => {
                tracing::warn!(payment_id, error = %e, "Unreadable checkout session");
                false
            }
        }
    }

    fn try_validate(&self, payment_id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let key = storage_key(payment_id);
        let Some(raw) = self.store.get(&key)? else {
            return Ok(false);
        };

        let mut session: CheckoutSession = serde_json::from_str(&raw)?;
        let now = self.clock.now_millis();
        let timeout_ms = i64::try_from(self.timeout.as_millis()).unwrap_or(i64::MAX);

        if now - session.last_activity > timeout_ms {
            self.store.remove(&key)?;
            tracing::debug!(payment_id, "Checkout session expired");
            return Ok(false);
        }

        session.last_activity = now;
        self.store.set(&key, &serde_json::to_string(&session)?)?;
        Ok(session.is_active)
    }

    /// Load the session record without touching it
    pub fn get(&self, payment_id: &str) -> Option<CheckoutSession> {
        self.store
            .get(&storage_key(payment_id))
            .ok()
            .flatten()
            .and_then(|raw| serde_json::from_str(&raw).ok())
    }

    /// Delete the session (no-op when absent)
    pub fn clear_session(&self, payment_id: &str) {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = self.store.remove(&storage_key(payment_id)) {
            tracing::warn!(payment_id, error = %e, "Failed to clear checkout session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStore;

    fn tracker() -> (Arc<ManualClock>, Arc<MemoryStore>, SessionTracker) {
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(MemoryStore::new());
        let tracker = SessionTracker::with_clock(store.clone(), clock.clone());
        (clock, store, tracker)
    }

    #[test]
    fn test_session_id_format() {
        let id = SessionId::generate("p1", 1_700_000_000_000);
        assert!(id.as_str().starts_with("session_p1_1700000000000_"));
        assert_eq!(id.as_str().rsplit('_').next().unwrap().len(), 9);
    }

    #[test]
    fn test_missing_session_is_invalid() {
        let (_clock, _store, tracker) = tracker();
        assert!(!tracker.validate_session("p1"));
    }

    #[test]
    fn test_sliding_expiration() {
        let (clock, store, tracker) = tracker();
        tracker.create_session("p1").unwrap();

        for _ in 0..6 {
            clock.advance(chrono::Duration::minutes(29));
            assert!(tracker.validate_session("p1"));
        }

        clock.advance(chrono::Duration::minutes(31));
        assert!(!tracker.validate_session("p1"));
        assert!(store.get(&storage_key("p1")).unwrap().is_none());
    }

    #[test]
    fn test_validate_refreshes_activity() {
        let (clock, _store, tracker) = tracker();
        tracker.create_session("p1").unwrap();
        let created = tracker.get("p1").unwrap();

        clock.advance_millis(5_000);
        assert!(tracker.validate_session("p1"));

        let refreshed = tracker.get("p1").unwrap();
        assert_eq!(refreshed.created_at, created.created_at);
        assert_eq!(refreshed.last_activity - created.last_activity, 5_000);
    }

    #[test]
    fn test_corrupt_record_is_invalid() {
        let (_clock, store, tracker) = tracker();
        store.set(&storage_key("p1"), "{not json").unwrap();
        assert!(!tracker.validate_session("p1"));
    }

    #[test]
    fn test_inactive_session_is_invalid() {
        let (_clock, store, tracker) = tracker();
        tracker.create_session("p1").unwrap();
        let mut session = tracker.get("p1").unwrap();
        session.is_active = false;
        store
            .set(&storage_key("p1"), &serde_json::to_string(&session).unwrap())
            .unwrap();

        assert!(!tracker.validate_session("p1"));
    }

    #[test]
    fn test_concurrent_validation_after_clear_stays_cleared() {
        let (_clock, store, tracker) = tracker();
        tracker.create_session("p1").unwrap();
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..20 {
                        tracker.validate_session("p1");
                    }
                });
            }
            scope.spawn(|| tracker.clear_session("p1"));
        });
        // a validation racing the clear never writes the record back
        assert!(store.get(&storage_key("p1")).unwrap().is_none());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let (_clock, _store, tracker) = tracker();
        tracker.create_session("p1").unwrap();
        tracker.clear_session("p1");
        tracker.clear_session("p1");
        assert!(tracker.get("p1").is_none());
    }
}
