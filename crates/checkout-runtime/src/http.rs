//! reqwest Transport
//!
//! Implementation of `HttpTransport` over `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use checkout_core::{
    CheckoutConfig,
    error::{CheckoutError, Result},
    transport::{HttpRequest, HttpResponse, HttpTransport, Method, TransportError},
};

/// HTTP transport backed by a shared `reqwest::Client`
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Create a transport with a per-request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CheckoutError::Configuration(format!("HTTP client: {e}")))?;
        Ok(Self { client, timeout })
    }

    pub fn from_config(config: &CheckoutConfig) -> Result<Self> {
        Self::new(config.timings.request_timeout)
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_config(&CheckoutConfig::from_env()?)
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    fn map_error(&self, e: &reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout(format!("no response within {:?}", self.timeout))
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else if e.is_builder() {
            TransportError::InvalidRequest(e.to_string())
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        tracing::debug!(method = request.method.as_str(), url = %request.url, "Sending request");
        let response = builder.send().await.map_err(|e| self.map_error(&e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.map_error(&e))?;
        tracing::debug!(url = %request.url, status = status.as_u16(), "Received response");

        Ok(HttpResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_post_forwards_headers_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/record-transaction/tx1"))
            .and(header("admin", "ops"))
            .and(body_json(serde_json::json!({ "senderName": "Ada" })))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"success":true}"#))
            .expect(1)
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();
        let request = HttpRequest::post(format!("{}/api/v1/record-transaction/tx1", server.uri()))
            .header("admin", "ops")
            .json(&serde_json::json!({ "senderName": "Ada" }))
            .unwrap();

        let response = transport.execute(request).await.unwrap();
        assert!(response.is_ok());
        assert_eq!(response.body, r#"{"success":true}"#);
    }

    #[tokio::test]
    async fn test_error_status_is_a_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();
        let response = transport
            .execute(HttpRequest::post(format!("{}/x", server.uri())))
            .await
            .unwrap();

        assert_eq!(response.status, 503);
        assert_eq!(response.reason, "Service Unavailable");
        assert_eq!(response.body, "down");
    }

    #[tokio::test]
    async fn test_slow_server_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new(Duration::from_millis(50)).unwrap();
        let result = transport
            .execute(HttpRequest::get(format!("{}/slow", server.uri())))
            .await;

        assert!(matches!(result, Err(TransportError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_connect_error() {
        let transport = ReqwestTransport::new(Duration::from_secs(2)).unwrap();
        let result = transport
            .execute(HttpRequest::get("http://127.0.0.1:9/unreachable"))
            .await;

        assert!(matches!(result, Err(TransportError::Connect(_))));
    }
}
