//! Checkout Configuration
//!
//! Environment-driven settings for the checkout services. The binary loads
//! a `.env` file first; libraries only read the process environment.

use std::time::Duration;

use crate::error::{CheckoutError, Result};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000/api/v1";
pub const DEFAULT_VERIFICATION_URL: &str = "https://www.toronet.org/api/payment/toro/";

/// Timers and intervals used across the checkout
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutTimings {
    /// Gap between verification polls
    pub poll_interval: Duration,
    /// Window in which identical verification requests share one call
    pub dedupe_window: Duration,
    /// Absolute deadline for a transfer to be confirmed
    pub verification_timeout: Duration,
    /// Delay before redirecting after a fresh recording
    pub redirect_delay: Duration,
    /// Delay before redirecting when the transaction was already recorded
    pub already_recorded_redirect_delay: Duration,
    pub payment_cache_ttl: Duration,
    pub session_idle_timeout: Duration,
    pub cache_sweep_period: Duration,
    pub request_timeout: Duration,
}

impl Default for CheckoutTimings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            dedupe_window: Duration::from_secs(2),
            verification_timeout: Duration::from_secs(15 * 60),
            redirect_delay: Duration::from_secs(3),
            already_recorded_redirect_delay: Duration::from_secs(2),
            payment_cache_ttl: Duration::from_secs(5 * 60),
            session_idle_timeout: Duration::from_secs(30 * 60),
            cache_sweep_period: Duration::from_secs(10 * 60),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Checkout service configuration
#[derive(Clone, Debug)]
pub struct CheckoutConfig {
    /// Base URL of the proxy API, without a trailing slash
    pub api_base_url: String,
    /// Verification endpoint
    pub verification_url: String,
    /// Admin credentials sent with verification and recording calls
    pub admin: String,
    pub admin_pwd: String,
    /// Clear the payment session when a mount that reached success unmounts
    pub clear_session_on_success: bool,
    pub timings: CheckoutTimings,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.into(),
            verification_url: DEFAULT_VERIFICATION_URL.into(),
            admin: String::new(),
            admin_pwd: String::new(),
            clear_session_on_success: true,
            timings: CheckoutTimings::default(),
        }
    }
}

impl CheckoutConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable source
    ///
    /// Recognized variables: `CHECKOUT_API_BASE_URL`,
    /// `CHECKOUT_VERIFICATION_URL`, `CHECKOUT_ADMIN`, `CHECKOUT_ADMIN_PWD`,
    /// `CHECKOUT_CLEAR_SESSION_ON_SUCCESS`, `CHECKOUT_POLL_INTERVAL_MS`,
    /// `CHECKOUT_VERIFICATION_TIMEOUT_SECS`, `CHECKOUT_REQUEST_TIMEOUT_SECS`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(url) = get("CHECKOUT_API_BASE_URL") {
            config.api_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = get("CHECKOUT_VERIFICATION_URL") {
            config.verification_url = url;
        }
        config.admin = get("CHECKOUT_ADMIN").unwrap_or_default();
        config.admin_pwd = get("CHECKOUT_ADMIN_PWD").unwrap_or_default();
        if config.admin.is_empty() || config.admin_pwd.is_empty() {
            tracing::warn!("CHECKOUT_ADMIN/CHECKOUT_ADMIN_PWD not set; verification calls will be rejected");
        }

        if let Some(raw) = get("CHECKOUT_CLEAR_SESSION_ON_SUCCESS") {
            config.clear_session_on_success = parse_bool("CHECKOUT_CLEAR_SESSION_ON_SUCCESS", &raw)?;
        }
        if let Some(raw) = get("CHECKOUT_POLL_INTERVAL_MS") {
            config.timings.poll_interval =
                Duration::from_millis(parse_u64("CHECKOUT_POLL_INTERVAL_MS", &raw)?);
        }
        if let Some(raw) = get("CHECKOUT_VERIFICATION_TIMEOUT_SECS") {
            config.timings.verification_timeout =
                Duration::from_secs(parse_u64("CHECKOUT_VERIFICATION_TIMEOUT_SECS", &raw)?);
        }
        if let Some(raw) = get("CHECKOUT_REQUEST_TIMEOUT_SECS") {
            config.timings.request_timeout =
                Duration::from_secs(parse_u64("CHECKOUT_REQUEST_TIMEOUT_SECS", &raw)?);
        }

        if config.timings.poll_interval.is_zero() {
            return Err(CheckoutError::Configuration(
                "CHECKOUT_POLL_INTERVAL_MS must be greater than zero".into(),
            ));
        }
        Ok(config)
    }

    /// `{api_base}/{path}`
    pub fn api_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn parse_u64(key: &str, raw: &str) -> Result<u64> {
    raw.parse()
        .map_err(|_| CheckoutError::Configuration(format!("{key} must be a whole number, got '{raw}'")))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(CheckoutError::Configuration(format!(
            "{key} must be a boolean, got '{raw}'"
        ))),
    }
}
