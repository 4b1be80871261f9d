//! Local Cache
//!
//! In-memory TTL store for payment data and API responses. Entries live for
//! the lifetime of the process; nothing is written to disk.
//!
//! Expiry is lazy: an entry whose age has reached its TTL is treated as
//! absent and removed on the next `get`/`has`. A sweeper task
//! ([`LocalCache::spawn_sweeper`]) removes the rest periodically.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;

use crate::clock::{Clock, SystemClock};
use crate::error::Result;

/// Default entry lifetime: 5 minutes
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Default sweep period: 10 minutes
pub const DEFAULT_SWEEP_PERIOD: Duration = Duration::from_secs(10 * 60);

/// Cache key builders
pub mod keys {
    pub fn payment_data(id: &str) -> String {
        format!("payment_data_{id}")
    }
}

/// A cached value with its timestamps (epoch millis)
#[derive(Clone, Debug)]
struct CacheEntry {
    data: serde_json::Value,
    timestamp: i64,
    expires_at: i64,
}

impl CacheEntry {
    const fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

/// Per-entry statistics
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryStats {
    pub key: String,
    /// Milliseconds since the entry was written
    pub age_ms: i64,
    /// Milliseconds until expiry (negative once expired)
    pub ttl_ms: i64,
}

/// Cache statistics
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheStats {
    pub size: usize,
    pub entries: Vec<EntryStats>,
}

/// In-memory TTL cache
pub struct LocalCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl Default for LocalCache {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `data` under `key` for `ttl`
    pub fn set<T: Serialize>(&self, key: &str, data: &T, ttl: Duration) -> Result<()> {
        let data = serde_json::to_value(data)?;
        let now = self.clock.now_millis();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);

        self.entries().insert(
            key.to_string(),
            CacheEntry {
                data,
                timestamp: now,
                expires_at: now.saturating_add(ttl_ms),
            },
        );
        Ok(())
    }

    /// Store with the default 5 minute TTL
    pub fn set_default<T: Serialize>(&self, key: &str, data: &T) -> Result<()> {
        self.set(key, data, DEFAULT_TTL)
    }

    /// Read a live entry
    ///
    /// An entry that no longer decodes as `T` is treated as absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let now = self.clock.now_millis();
        let mut entries = self.entries();

        let entry = entries.get(key)?;
        if entry.is_expired(now) {
            entries.remove(key);
            return None;
        }

        match serde_json::from_value(entry.data.clone()) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "Cached value has unexpected shape");
                None
            }
        }
    }

    /// Whether a live entry exists
    pub fn has(&self, key: &str) -> bool {
        let now = self.clock.now_millis();
        let mut entries = self.entries();

        match entries.get(key) {
            None => false,
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                false
            }
            Some(_) => true,
        }
    }

    pub fn delete(&self, key: &str) {
        self.entries().remove(key);
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    /// Remove every expired entry
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now_millis();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now_millis();
        let entries = self.entries();

        CacheStats {
            size: entries.len(),
            entries: entries
                .iter()
                .map(|(key, entry)| EntryStats {
                    key: key.clone(),
                    age_ms: now - entry.timestamp,
                    ttl_ms: entry.expires_at - now,
                })
                .collect(),
        }
    }

    /// Start the periodic sweep; dropping the handle stops it
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> CacheSweeper {
        let cache = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // first tick fires immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = cache.cleanup();
                if removed > 0 {
                    tracing::debug!(removed, "Swept expired cache entries");
                }
            }
        });
        CacheSweeper { task }
    }
}

/// Handle for the periodic sweep task
#[derive(Debug)]
pub struct CacheSweeper {
    task: JoinHandle<()>,
}

impl CacheSweeper {
    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for CacheSweeper {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Read-through helper: return the cached value or fetch and cache it
pub async fn cached_fetch<T, F, Fut, E>(
    cache: &LocalCache,
    key: &str,
    ttl: Duration,
    fetcher: F,
) -> std::result::Result<T, E>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    if let Some(cached) = cache.get::<T>(key) {
        return Ok(cached);
    }

    let data = fetcher().await?;
    if let Err(e) = cache.set(key, &data, ttl) {
        tracing::warn!(key, error = %e, "Failed to cache fetched value");
    }
    Ok(data)
}
