//! Proxy Errors
//!
//! Every error renders as `{ success: false, message, debug? }` with the
//! status the checkout expects for it.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProxyError>;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("{0}")]
    Configuration(String),

    #[error("Backend error: {} - {body}", .status.as_u16())]
    Backend { status: StatusCode, body: String },

    #[error("Invalid response format from backend")]
    InvalidResponse,

    #[error("Backend request timed out. Please try again.")]
    Timeout,

    #[error("Unable to connect to backend API. Please check your internet connection.")]
    Unavailable(String),

    #[error("Proxy error: {0}")]
    Proxy(String),
}

impl ProxyError {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Backend { status, .. } => *status,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Configuration(_) | Self::InvalidResponse | Self::Proxy(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn debug(&self) -> Option<Value> {
        match self {
            Self::Backend { status, .. } => Some(json!({ "status": status.as_u16() })),
            Self::Timeout => Some(json!({ "error": "timeout" })),
            Self::Unavailable(detail) => {
                Some(json!({ "error": "network_error", "message": detail }))
            }
            _ => None,
        }
    }

    /// Payment-link lookups tell timeouts and connect failures apart
    pub fn from_lookup(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Unavailable(err.to_string())
        } else {
            Self::Proxy(err.to_string())
        }
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        Self::Proxy(err.to_string())
    }
}

impl From<serde_json::Error> for ProxyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Proxy(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    debug: Option<Value>,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Proxy request failed");
        } else {
            tracing::warn!(status = status.as_u16(), error = %self, "Backend rejected request");
        }

        let body = ErrorBody {
            success: false,
            message: self.to_string(),
            debug: self.debug(),
        };
        (status, Json(body)).into_response()
    }
}
