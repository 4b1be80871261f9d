//! Performance Monitor
//!
//! Named timings for checkout operations. Anything slower than
//! [`SLOW_THRESHOLD`] is logged at `warn`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

pub const SLOW_THRESHOLD: Duration = Duration::from_secs(1);

#[derive(Clone, Debug)]
pub struct Metric {
    pub name: String,
    pub started: Instant,
    pub duration: Option<Duration>,
    pub metadata: Option<Value>,
}

fn log_timing(name: &str, elapsed: Duration) {
    if elapsed > SLOW_THRESHOLD {
        tracing::warn!(
            operation = name,
            elapsed_ms = elapsed.as_millis(),
            "Slow operation detected"
        );
    } else {
        tracing::trace!(operation = name, elapsed_ms = elapsed.as_millis(), "Operation timed");
    }
}

#[derive(Debug, Default)]
pub struct PerformanceMonitor {
    metrics: Mutex<HashMap<String, Metric>>,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn metrics(&self) -> std::sync::MutexGuard<'_, HashMap<String, Metric>> {
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn start_timing(&self, name: &str, metadata: Option<Value>) {
        self.metrics().insert(
            name.to_string(),
            Metric {
                name: name.to_string(),
                started: Instant::now(),
                duration: None,
                metadata,
            },
        );
    }

    /// Stop a timing; `None` if it was never started
    pub fn end_timing(&self, name: &str) -> Option<Duration> {
        let mut metrics = self.metrics();
        let metric = metrics.get_mut(name)?;
        let elapsed = metric.started.elapsed();
        metric.duration = Some(elapsed);
        drop(metrics);

        log_timing(name, elapsed);
        Some(elapsed)
    }

    /// Store a finished timing that began at `started`
    pub fn record_timing(&self, name: &str, started: Instant) -> Duration {
        let elapsed = started.elapsed();
        self.metrics().insert(
            name.to_string(),
            Metric {
                name: name.to_string(),
                started,
                duration: Some(elapsed),
                metadata: None,
            },
        );
        log_timing(name, elapsed);
        elapsed
    }

    pub fn metric(&self, name: &str) -> Option<Metric> {
        self.metrics().get(name).cloned()
    }

    pub fn all(&self) -> Vec<Metric> {
        self.metrics().values().cloned().collect()
    }

    pub fn clear(&self) {
        self.metrics().clear();
    }

    /// Time an async operation under `name`
    pub async fn measure<F, T>(&self, name: &str, operation: F) -> T
    where
        F: Future<Output = T>,
    {
        self.start_timing(name, None);
        let output = operation.await;
        self.end_timing(name);
        output
    }
}
