//! Error Types

use thiserror::Error;

use crate::transport::TransportError;

/// Result type alias for checkout operations
pub type Result<T> = std::result::Result<T, CheckoutError>;

/// Message shown when verification gives up.
pub const VERIFICATION_TIMEOUT_MESSAGE: &str =
    "Payment verification timed out. Please contact support if your payment was successful.";

/// Checkout error types
#[derive(Error, Debug)]
pub enum CheckoutError {
    /// Backend unreachable or misconfigured
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Sender details failed validation
    #[error("Validation error on {field}: {message}")]
    Validation { field: String, message: String },

    /// Request never produced a response
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Backend answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Backend rejected the payment link
    #[error("Invalid payment link: {0}")]
    InvalidLink(String),

    /// Payment record failed validation at the trust boundary
    #[error("Invalid payment record: {0}")]
    InvalidRecord(String),

    /// Verification did not succeed before the deadline
    #[error("Verification timed out after {0} seconds")]
    VerificationTimeout(u64),

    /// Durable storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl CheckoutError {
    /// Check if error is retryable
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Convert to a message safe to show the payer
    pub fn user_message(&self) -> String {
        match self {
            Self::Configuration(msg) => {
                format!("Configuration Error: {msg}. Please contact support.")
            }
            Self::Validation { message, .. } => message.clone(),
            Self::Transport(TransportError::Timeout(_)) => {
                "Request timed out. Please try again.".into()
            }
            Self::Transport(_) => {
                "Network connection failed. Please check your internet connection.".into()
            }
            Self::Http { status: 404, .. } => "Payment link not found or has expired.".into(),
            Self::Http { status: 429, .. } => {
                "Too many requests. Please wait a moment and try again.".into()
            }
            Self::Http { status, .. } if *status >= 500 => {
                "Server error. Please try again in a few moments.".into()
            }
            Self::InvalidLink(msg) => msg.clone(),
            Self::InvalidRecord(_) => {
                "This payment link is misconfigured. Please contact support.".into()
            }
            Self::VerificationTimeout(_) => VERIFICATION_TIMEOUT_MESSAGE.into(),
            _ => "An unexpected error occurred. Please try again.".into(),
        }
    }
}

impl From<anyhow::Error> for CheckoutError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages_hide_detail() {
        let err = CheckoutError::Http {
            status: 503,
            body: "upstream connect error".into(),
        };
        assert!(err.is_retryable());
        assert!(!err.user_message().contains("upstream"));

        let err = CheckoutError::Configuration("API configuration error: missing URL".into());
        assert_eq!(
            err.user_message(),
            "Configuration Error: API configuration error: missing URL. Please contact support."
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_not_found_message() {
        let err = CheckoutError::Http {
            status: 404,
            body: String::new(),
        };
        assert_eq!(err.user_message(), "Payment link not found or has expired.");
    }
}
