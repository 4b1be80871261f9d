//! Application State

use std::sync::Arc;

use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ProxyConfig>,

    /// Client used for every backend call
    pub client: reqwest::Client,
}

impl AppState {
    pub fn new(config: ProxyConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("checkout-server/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProxyError::Configuration(format!("HTTP client: {e}")))?;

        Ok(Self {
            config: Arc::new(config),
            client,
        })
    }
}
