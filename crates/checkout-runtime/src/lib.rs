//! # checkout-runtime
//!
//! Runtime integrations for the Chainpaye checkout.
//!
//! ## Transports
//!
//! - **reqwest** (default): `HttpTransport` over a pooled `reqwest::Client`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use checkout_runtime::ReqwestTransport;
//!
//! let config = CheckoutConfig::from_env()?;
//! let transport = Arc::new(ReqwestTransport::from_config(&config)?);
//! let client = RetryClient::with_defaults(transport);
//! ```

#[cfg(feature = "reqwest")]
pub mod http;

#[cfg(feature = "reqwest")]
pub use http::ReqwestTransport;

// Re-export core types for convenience
pub use checkout_core::{
    CheckoutConfig, CheckoutError, HttpRequest, HttpResponse, HttpTransport, Result,
    RetryClient, RetryPolicy, TransportError,
};
