//! HTTP Handlers

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
};
use serde::Serialize;
use serde_json::{Value, json};

use crate::error::{ProxyError, Result};
use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub backend_configured: bool,
    pub production: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        backend_configured: state.config.api_base_url.is_some(),
        production: state.config.production,
    })
}

/// Look up a payment link on the backend
pub async fn payment_link(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let backend = state.config.payment_link_backend()?;
    let url = format!("{backend}/api/v1/payment-links/{id}");
    tracing::info!(payment_id = %id, %url, "Proxying payment link lookup");

    let response = state
        .client
        .post(&url)
        .header(CONTENT_TYPE, "application/json")
        .timeout(state.config.backend_timeout)
        .send()
        .await
        .map_err(|e| ProxyError::from_lookup(&e))?;

    let status = response.status();
    tracing::debug!(payment_id = %id, status = status.as_u16(), "Backend responded");

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProxyError::Backend { status, body });
    }

    let data: Value = response
        .json()
        .await
        .map_err(|e| ProxyError::from_lookup(&e))?;

    match data {
        Value::Object(_) | Value::Array(_) => Ok(Json(data)),
        _ => Err(ProxyError::InvalidResponse),
    }
}

/// Forward a completed payment to the backend
pub async fn complete_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>> {
    let payload: Value = serde_json::from_slice(&body)?;
    let url = format!("{}/api/v1/payment-links/{id}/complete", state.config.backend());
    tracing::info!(payment_id = %id, "Saving transaction result");

    let response = state.client.post(&url).json(&payload).send().await?;
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await?;
        return Err(ProxyError::Backend { status, body });
    }

    Ok(Json(response.json().await?))
}

/// Record a confirmed transfer, forwarding the admin credentials
///
/// A backend refusal that says the transaction is already recorded is
/// reported as success so the checkout treats retries as idempotent.
pub async fn record_transaction(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>)> {
    let payload: Value = serde_json::from_slice(&body)?;
    let url = format!(
        "{}/api/v1/record-transaction/{transaction_id}",
        state.config.backend()
    );
    tracing::info!(%transaction_id, "Recording transaction");

    let response = state
        .client
        .post(&url)
        .header("admin", header_str(&headers, "admin"))
        .header("adminpwd", header_str(&headers, "adminpwd"))
        .json(&payload)
        .send()
        .await?;

    let status = response.status();
    let text = response.text().await?;
    let data = serde_json::from_str::<Value>(&text).unwrap_or_else(|_| json!({ "message": text }));

    if status.is_success() {
        return Ok((StatusCode::OK, Json(json!({ "success": true, "data": data }))));
    }

    let message_says_recorded = data
        .get("message")
        .and_then(Value::as_str)
        .is_some_and(says_already_recorded);

    if says_already_recorded(&text) || message_says_recorded {
        tracing::info!(%transaction_id, "Transaction already recorded");
        return Ok((
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": "Transaction already recorded",
                "data": data,
            })),
        ));
    }

    tracing::warn!(%transaction_id, status = status.as_u16(), "Backend refused recording");
    Ok((
        status,
        Json(json!({
            "success": false,
            "message": format!("Backend error: {}", status.as_u16()),
            "error": text,
            "data": data,
        })),
    ))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

fn says_already_recorded(text: &str) -> bool {
    text.to_lowercase().contains("already recorded")
}
