//! Diagnostics Log
//!
//! Capped, persisted logs of analytics events, error reports and
//! record-transaction calls that failed. Each entry is also emitted as a
//! `tracing` event. Writing a diagnostic never fails the caller; storage
//! problems are logged and dropped.

use std::sync::{Arc, Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::storage::KeyValueStore;

pub const ANALYTICS_KEY: &str = "payment_analytics";
pub const ERRORS_KEY: &str = "payment_errors";
pub const FAILED_TRANSACTIONS_KEY: &str = "failed_transactions";

pub const ANALYTICS_CAP: usize = 100;
pub const ERRORS_CAP: usize = 50;
pub const FAILED_TRANSACTIONS_CAP: usize = 10;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    pub event: String,
    pub properties: Value,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub message: String,
    pub detail: String,
    pub timestamp: i64,
    pub context: Value,
}

/// A request worth replaying later
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedTransaction {
    pub id: String,
    pub url: String,
    pub body: String,
    pub timestamp: i64,
}

/// Diagnostics sink shared by every checkout mount
pub struct Diagnostics {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    /// Held across each load-push-store
    write_lock: Mutex<()>,
}

impl Diagnostics {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            write_lock: Mutex::new(()),
        }
    }

    /// Record an analytics event
    pub fn track(&self, event: &str, properties: Value) {
        self.track_in_session(event, properties, None);
    }

    pub fn track_in_session(&self, event: &str, properties: Value, session_id: Option<&str>) {
        tracing::info!(event, properties = %properties, "Checkout event");
        let entry = AnalyticsEvent {
            event: event.to_string(),
            properties,
            timestamp: self.clock.now_millis(),
            session_id: session_id.map(str::to_string),
        };
        if let Err(e) = self.append(ANALYTICS_KEY, entry, ANALYTICS_CAP) {
            tracing::warn!(event, error = %e, "Failed to track event");
        }
    }

    /// Record an error with its full detail and context
    pub fn report_error(&self, error: &dyn std::error::Error, context: Value) {
        let detail = format!("{error:?}");
        tracing::error!(error = %error, context = %context, "Checkout error reported");
        let report = ErrorReport {
            message: error.to_string(),
            detail,
            timestamp: self.clock.now_millis(),
            context,
        };
        if let Err(e) = self.append(ERRORS_KEY, report, ERRORS_CAP) {
            tracing::warn!(error = %e, "Failed to store error report");
        }
    }

    /// Queue a request for a later retry
    pub fn store_failed_transaction(&self, id: &str, url: &str, body: &str) {
        tracing::warn!(id, url, "Queued failed transaction");
        let failed = FailedTransaction {
            id: id.to_string(),
            url: url.to_string(),
            body: body.to_string(),
            timestamp: self.clock.now_millis(),
        };
        if let Err(e) = self.append(FAILED_TRANSACTIONS_KEY, failed, FAILED_TRANSACTIONS_CAP) {
            tracing::warn!(id, error = %e, "Failed to store failed transaction");
        }
    }

    pub fn analytics(&self) -> Vec<AnalyticsEvent> {
        self.load(ANALYTICS_KEY).unwrap_or_default()
    }

    pub fn errors(&self) -> Vec<ErrorReport> {
        self.load(ERRORS_KEY).unwrap_or_default()
    }

    pub fn failed_transactions(&self) -> Vec<FailedTransaction> {
        self.load(FAILED_TRANSACTIONS_KEY).unwrap_or_default()
    }

    fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        match self.store.get(key)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    fn append<T: Serialize + DeserializeOwned>(&self, key: &str, item: T, cap: usize) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        // an unreadable log is started over rather than blocking new entries
        let mut items: Vec<T> = self.load(key).unwrap_or_default();
        items.push(item);
        if items.len() > cap {
            items.drain(..items.len() - cap);
        }
        self.store.set(key, &serde_json::to_string(&items)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CheckoutError;
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn diagnostics() -> (Arc<MemoryStore>, Diagnostics) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), Diagnostics::new(store))
    }

    #[test]
    fn test_analytics_capped_at_100() {
        let (_store, diagnostics) = diagnostics();
        for i in 0..105 {
            diagnostics.track("payment_data_loaded", json!({ "n": i }));
        }

        let events = diagnostics.analytics();
        assert_eq!(events.len(), ANALYTICS_CAP);
        assert_eq!(events[0].properties["n"], 5);
        assert_eq!(events[99].properties["n"], 104);
    }

    #[test]
    fn test_error_report_keeps_context() {
        let (_store, diagnostics) = diagnostics();
        let err = CheckoutError::Http {
            status: 502,
            body: "bad gateway".into(),
        };
        diagnostics.report_error(&err, json!({ "paymentId": "p1" }));

        let reports = diagnostics.errors();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].message, "HTTP 502: bad gateway");
        assert_eq!(reports[0].context["paymentId"], "p1");
    }

    #[test]
    fn test_failed_transactions_capped_at_10() {
        let (_store, diagnostics) = diagnostics();
        for i in 0..12 {
            diagnostics.store_failed_transaction(&format!("tx{i}"), "/record", "{}");
        }
        let queued = diagnostics.failed_transactions();
        assert_eq!(queued.len(), FAILED_TRANSACTIONS_CAP);
        assert_eq!(queued[0].id, "tx2");
    }

    #[test]
    fn test_concurrent_tracking_keeps_every_event() {
        let (_store, diagnostics) = diagnostics();
        std::thread::scope(|scope| {
            for worker in 0..8 {
                let diagnostics = &diagnostics;
                scope.spawn(move || {
                    for i in 0..10 {
                        diagnostics.track("payment_data_loaded", json!({ "worker": worker, "n": i }));
                    }
                });
            }
        });
        assert_eq!(diagnostics.analytics().len(), 80);
    }

    #[test]
    fn test_corrupt_log_is_restarted() {
        let (store, diagnostics) = diagnostics();
        store.set(ANALYTICS_KEY, "not json").unwrap();
        diagnostics.track("payment_error", json!({}));
        assert_eq!(diagnostics.analytics().len(), 1);
    }
}
