//! Proxy Configuration

use std::time::Duration;

use crate::error::{ProxyError, Result};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// Backend used by the recording routes when no base URL is configured
pub const FALLBACK_BACKEND_URL: &str = "http://localhost:4000";

/// Proxy settings, read from the environment
#[derive(Clone, Debug)]
pub struct ProxyConfig {
    /// Backend origin, without a trailing slash
    pub api_base_url: Option<String>,
    /// `APP_ENV` or `NODE_ENV` is `production`
    pub production: bool,
    pub bind_addr: String,
    /// Applied to payment-link lookups
    pub backend_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            production: false,
            bind_addr: DEFAULT_BIND_ADDR.into(),
            backend_timeout: Duration::from_secs(10),
        }
    }
}

impl ProxyConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// `API_BASE_URL` wins over `NEXT_PUBLIC_API_BASE_URL`
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        config.api_base_url = get("API_BASE_URL")
            .or_else(|| get("NEXT_PUBLIC_API_BASE_URL"))
            .map(|url| url.trim_end_matches('/').to_string());

        config.production = get("APP_ENV")
            .or_else(|| get("NODE_ENV"))
            .is_some_and(|env| env.eq_ignore_ascii_case("production"));

        if let Some(addr) = get("BIND_ADDR") {
            config.bind_addr = addr;
        }

        if let Some(raw) = get("BACKEND_TIMEOUT_SECS") {
            let secs: u64 = raw.parse().map_err(|_| {
                ProxyError::Configuration(format!(
                    "BACKEND_TIMEOUT_SECS must be a whole number, got '{raw}'"
                ))
            })?;
            config.backend_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Backend origin for payment-link lookups, checked for production use
    pub fn payment_link_backend(&self) -> Result<&str> {
        let Some(url) = self.api_base_url.as_deref() else {
            return Err(ProxyError::Configuration(
                "API configuration error: Backend URL not configured".into(),
            ));
        };
        if self.production && url.contains("localhost") {
            return Err(ProxyError::Configuration(
                "API configuration error: Cannot use localhost URL in production".into(),
            ));
        }
        Ok(url)
    }

    /// Backend origin for the recording routes
    pub fn backend(&self) -> &str {
        self.api_base_url.as_deref().unwrap_or(FALLBACK_BACKEND_URL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ProxyConfig::from_lookup(lookup(&[])).unwrap();
        assert!(config.api_base_url.is_none());
        assert!(!config.production);
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(config.backend_timeout, Duration::from_secs(10));
        assert_eq!(config.backend(), FALLBACK_BACKEND_URL);
    }

    #[test]
    fn test_public_base_url_is_accepted() {
        let config = ProxyConfig::from_lookup(lookup(&[(
            "NEXT_PUBLIC_API_BASE_URL",
            "https://api.chainpaye.example/",
        )]))
        .unwrap();
        assert_eq!(
            config.api_base_url.as_deref(),
            Some("https://api.chainpaye.example")
        );
    }

    #[test]
    fn test_missing_backend_is_a_configuration_error() {
        let config = ProxyConfig::from_lookup(lookup(&[])).unwrap();
        let err = config.payment_link_backend().unwrap_err();
        assert_eq!(
            err.to_string(),
            "API configuration error: Backend URL not configured"
        );
    }

    #[test]
    fn test_localhost_rejected_in_production() {
        let config = ProxyConfig::from_lookup(lookup(&[
            ("API_BASE_URL", "http://localhost:4000"),
            ("NODE_ENV", "production"),
        ]))
        .unwrap();
        assert!(config.production);
        let err = config.payment_link_backend().unwrap_err();
        assert!(err.to_string().contains("Cannot use localhost URL in production"));

        let dev = ProxyConfig::from_lookup(lookup(&[("API_BASE_URL", "http://localhost:4000")]))
            .unwrap();
        assert_eq!(dev.payment_link_backend().unwrap(), "http://localhost:4000");
    }

    #[test]
    fn test_bad_timeout() {
        let result = ProxyConfig::from_lookup(lookup(&[("BACKEND_TIMEOUT_SECS", "soon")]));
        assert!(matches!(result, Err(ProxyError::Configuration(_))));
    }
}
