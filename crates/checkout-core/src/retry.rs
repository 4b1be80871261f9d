//! Retry Client
//!
//! Wraps an [`HttpTransport`] with bounded retries and exponential backoff.
//!
//! When the server was reachable the caller always gets an [`HttpResponse`]
//! back, even after every attempt answered 5xx. Only when the server was never reached does the last
//! [`TransportError`] propagate.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};

/// Retry configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt (doubles on each retry)
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Same delay, different attempt count
    #[must_use]
    pub const fn with_attempts(self, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: self.base_delay,
        }
    }

    /// Backoff after the attempt at `index` (0-based)
    pub fn backoff(&self, index: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(index))
    }
}

/// HTTP client with retry semantics
#[derive(Clone)]
pub struct RetryClient {
    transport: Arc<dyn HttpTransport>,
    policy: RetryPolicy,
}

impl RetryClient {
    pub fn new(transport: Arc<dyn HttpTransport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// Default policy: 3 attempts, 1s base delay
    pub fn with_defaults(transport: Arc<dyn HttpTransport>) -> Self {
        Self::new(transport, RetryPolicy::default())
    }

    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Send with the client's policy
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.send_with(request, self.policy).await
    }

    /// Send with an explicit policy
    pub async fn send_with(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse, TransportError> {
        let attempts = policy.max_attempts.max(1);

        for index in 0..attempts {
            let is_last = index + 1 == attempts;

            match self.transport.execute(request.clone()).await {
                Ok(response) if response.is_ok() => {
                    if index > 0 {
                        debug!(url = %request.url, attempt = index + 1, "Request succeeded after retry");
                    }
                    return Ok(response);
                }
                Ok(response) if response.is_client_error() => {
                    debug!(url = %request.url, status = response.status, "Client error, not retrying");
                    return Ok(response);
                }
                Ok(response) => {
                    if is_last {
                        warn!(
                            url = %request.url,
                            status = response.status,
                            attempts,
                            "Request failed after max retries"
                        );
                        return Ok(response);
                    }
                    warn!(
                        url = %request.url,
                        status = response.status,
                        attempt = index + 1,
                        max_attempts = attempts,
                        backoff_ms = policy.backoff(index).as_millis(),
                        "Server error, retrying with backoff"
                    );
                }
                Err(error) => {
                    if is_last {
                        warn!(url = %request.url, %error, attempts, "Request unreachable after max retries");
                        return Err(error);
                    }
                    warn!(
                        url = %request.url,
                        %error,
                        attempt = index + 1,
                        max_attempts = attempts,
                        backoff_ms = policy.backoff(index).as_millis(),
                        "Transport error, retrying with backoff"
                    );
                }
            }

            sleep(policy.backoff(index)).await;
        }

        Err(TransportError::Other("Max retries exceeded".into()))
    }
}
