//! Checkout Services
//!
//! Shared collaborators injected into every checkout mount.

use std::sync::{Arc, Mutex, PoisonError};

use checkout_core::cache::CacheSweeper;
use checkout_core::{
    CheckoutConfig, Clock, Connectivity, Diagnostics, HttpTransport, KeyValueStore, LocalCache,
    PerformanceMonitor, SessionTracker, SystemClock,
};

use crate::api::PaymentApi;
use crate::poller::VerificationPoller;

/// Page navigation performed on behalf of the checkout
pub trait Navigator: Send + Sync {
    /// Leave the checkout for `url`
    fn redirect(&self, url: &str);

    /// Go back to the previous page
    fn back(&self);
}

/// Navigation performed by a [`RecordingNavigator`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Navigation {
    Redirect(String),
    Back,
}

/// Navigator that only remembers what it was asked to do
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    history: Mutex<Vec<Navigation>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<Navigation> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn redirects(&self) -> Vec<String> {
        self.history()
            .into_iter()
            .filter_map(|n| match n {
                Navigation::Redirect(url) => Some(url),
                Navigation::Back => None,
            })
            .collect()
    }

    fn push(&self, navigation: Navigation) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(navigation);
    }
}

impl Navigator for RecordingNavigator {
    fn redirect(&self, url: &str) {
        self.push(Navigation::Redirect(url.to_string()));
    }

    fn back(&self) {
        self.push(Navigation::Back);
    }
}

/// Everything a checkout mount talks to
#[derive(Clone)]
pub struct CheckoutServices {
    pub config: Arc<CheckoutConfig>,
    pub api: PaymentApi,
    pub poller: Arc<VerificationPoller>,
    pub cache: Arc<LocalCache>,
    pub sessions: Arc<SessionTracker>,
    pub diagnostics: Arc<Diagnostics>,
    pub perf: Arc<PerformanceMonitor>,
    pub connectivity: Arc<Connectivity>,
    pub navigator: Arc<dyn Navigator>,
    pub clock: Arc<dyn Clock>,
    /// Stops the cache sweep once the last clone is dropped
    sweeper: Option<Arc<CacheSweeper>>,
}

impl CheckoutServices {
    pub fn new(
        config: CheckoutConfig,
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn KeyValueStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self::with_clock(config, transport, store, navigator, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: CheckoutConfig,
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn KeyValueStore>,
        navigator: Arc<dyn Navigator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let config = Arc::new(config);
        let sessions = SessionTracker::with_clock(store.clone(), clock.clone())
            .with_timeout(config.timings.session_idle_timeout);
        let cache = Arc::new(LocalCache::with_clock(clock.clone()));

        let sweeper = if tokio::runtime::Handle::try_current().is_ok() {
            Some(Arc::new(cache.spawn_sweeper(config.timings.cache_sweep_period)))
        } else {
            tracing::warn!("No async runtime; expired cache entries are only dropped on read");
            None
        };

        Self {
            api: PaymentApi::new(transport.clone(), config.clone()),
            poller: Arc::new(VerificationPoller::from_config(transport, &config)),
            cache,
            sessions: Arc::new(sessions),
            diagnostics: Arc::new(Diagnostics::with_clock(store, clock.clone())),
            perf: Arc::new(PerformanceMonitor::new()),
            connectivity: Arc::new(Connectivity::default()),
            navigator,
            clock,
            config,
            sweeper,
        }
    }

    /// Whether the periodic cache sweep is running
    pub fn is_sweeping(&self) -> bool {
        self.sweeper.as_ref().is_some_and(|s| s.is_running())
    }

    /// Share an existing connectivity signal
    #[must_use]
    pub fn with_connectivity(mut self, connectivity: Arc<Connectivity>) -> Self {
        self.connectivity = connectivity;
        self
    }
}
