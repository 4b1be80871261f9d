//! Payment API Client
//!
//! Calls to the proxy routes: fetching a payment link and recording a
//! confirmed bank transfer.

use std::sync::Arc;

use checkout_core::{
    CheckoutConfig, CheckoutError, HttpRequest, HttpTransport, PaymentRecord, Result,
    RetryClient, RetryPolicy, TransactionRecord,
    model::RawPaymentRecord,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Attempts for the payment-link fetch
pub const FETCH_ATTEMPTS: u32 = 3;

/// Attempts for recording a transaction
pub const RECORD_ATTEMPTS: u32 = 2;

const ALREADY_RECORDED: &str = "already recorded";

/// Envelope returned by the payment-link route
#[derive(Debug, Default, Deserialize)]
struct LinkEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    debug: Option<Value>,
}

/// Body returned by the record-transaction route (all fields optional)
#[derive(Debug, Default, Deserialize)]
struct RecordEnvelope {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// How the backend took a record-transaction call
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecordOutcome {
    Recorded,
    /// Recorded by an earlier call; treated like `Recorded`
    AlreadyRecorded,
    Rejected { status: u16, message: String },
}

impl RecordOutcome {
    pub const fn is_recorded(&self) -> bool {
        matches!(self, Self::Recorded | Self::AlreadyRecorded)
    }
}

fn mentions_already_recorded(text: Option<&str>) -> bool {
    text.is_some_and(|t| t.to_lowercase().contains(ALREADY_RECORDED))
}

/// Client for the checkout proxy API
#[derive(Clone)]
pub struct PaymentApi {
    client: RetryClient,
    config: Arc<CheckoutConfig>,
}

impl PaymentApi {
    pub fn new(transport: Arc<dyn HttpTransport>, config: Arc<CheckoutConfig>) -> Self {
        Self::with_client(RetryClient::with_defaults(transport), config)
    }

    pub const fn with_client(client: RetryClient, config: Arc<CheckoutConfig>) -> Self {
        Self { client, config }
    }

    pub fn payment_link_url(&self, payment_id: &str) -> String {
        self.config.api_url(&format!("payment-links/{payment_id}"))
    }

    pub fn record_url(&self, transaction_id: &str) -> String {
        self.config
            .api_url(&format!("record-transaction/{transaction_id}"))
    }

    /// Fetch and validate the terms of a payment link
    pub async fn fetch_payment_link(&self, payment_id: &str) -> Result<PaymentRecord> {
        if payment_id.trim().is_empty() {
            return Err(CheckoutError::InvalidLink("Payment ID is required".into()));
        }

        let policy = self.client.policy().with_attempts(FETCH_ATTEMPTS);
        let response = self
            .client
            .send_with(HttpRequest::post(self.payment_link_url(payment_id)), policy)
            .await?;

        if !response.is_ok() {
            return Err(CheckoutError::Http {
                status: response.status,
                body: response.body,
            });
        }

        let envelope: LinkEnvelope = response.parse()?;
        if !envelope.success {
            let message = envelope.message.unwrap_or_default();
            if message.contains("API configuration error") {
                return Err(CheckoutError::Configuration(message));
            }
            if let Some(detail) = envelope.debug {
                tracing::error!(payment_id, detail = %detail, "Payment link rejected");
            }
            return Err(CheckoutError::InvalidLink(if message.is_empty() {
                "Payment link is invalid".into()
            } else {
                message
            }));
        }

        let data = envelope
            .data
            .ok_or_else(|| CheckoutError::InvalidRecord("response has no data".into()))?;
        let raw: RawPaymentRecord = serde_json::from_value(data)
            .map_err(|e| CheckoutError::InvalidRecord(e.to_string()))?;
        let record = PaymentRecord::try_from(raw)?;

        tracing::info!(
            payment_id,
            currency = %record.currency,
            payment_type = %record.payment_type,
            "Fetched payment link"
        );
        Ok(record)
    }

    /// Record a confirmed transfer
    ///
    /// Only an unreachable backend is an error; every answer maps to a
    /// [`RecordOutcome`]. Any 2xx counts as recorded, whatever its body says.
    pub async fn record_transaction(
        &self,
        transaction_id: &str,
        record: &TransactionRecord,
    ) -> Result<RecordOutcome> {
        let request = HttpRequest::post(self.record_url(transaction_id))
            .header("admin", self.config.admin.as_str())
            .header("adminpwd", self.config.admin_pwd.as_str())
            .json(record)?;

        let policy: RetryPolicy = self.client.policy().with_attempts(RECORD_ATTEMPTS);
        let response = self.client.send_with(request, policy).await?;

        let envelope: RecordEnvelope = response.parse().unwrap_or_default();
        let outcome = if response.is_ok() {
            if mentions_already_recorded(envelope.message.as_deref()) {
                RecordOutcome::AlreadyRecorded
            } else {
                RecordOutcome::Recorded
            }
        } else if mentions_already_recorded(envelope.message.as_deref())
            || mentions_already_recorded(envelope.error.as_deref())
            || mentions_already_recorded(Some(&response.body))
        {
            RecordOutcome::AlreadyRecorded
        } else {
            let message = envelope
                .message
                .or(envelope.error)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| {
                    if response.body.is_empty() {
                        response.reason.clone()
                    } else {
                        response.body.clone()
                    }
                });
            RecordOutcome::Rejected {
                status: response.status,
                message,
            }
        };

        tracing::info!(transaction_id, ?outcome, "Recorded transaction");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use checkout_core::{HttpResponse, MockTransport, TransportError};
    use serde_json::json;

    fn api(transport: &Arc<MockTransport>) -> PaymentApi {
        let config = CheckoutConfig {
            admin: "ops".into(),
            admin_pwd: "secret".into(),
            ..CheckoutConfig::default()
        };
        PaymentApi::new(transport.clone(), Arc::new(config))
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_unwraps_envelope() {
        let transport = Arc::new(MockTransport::new().route("/payment-links/pl_1", |_| {
            Ok(HttpResponse::json(
                200,
                &json!({ "success": true, "data": fixtures::bank_link("pl_1", "NGN") }),
            ))
        }));

        let record = api(&transport).fetch_payment_link("pl_1").await.unwrap();
        assert_eq!(record.id, "pl_1");
        assert_eq!(record.currency, "NGN");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_retries_server_errors_three_times() {
        let transport = Arc::new(
            MockTransport::new()
                .route_sequence("/payment-links/", vec![Ok(HttpResponse::new(502, "bad gateway"))]),
        );

        let err = api(&transport).fetch_payment_link("pl_1").await.unwrap_err();
        assert!(matches!(err, CheckoutError::Http { status: 502, .. }));
        assert_eq!(transport.calls_to("/payment-links/"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_configuration_message_is_surfaced() {
        let transport = Arc::new(MockTransport::new().route("/payment-links/", |_| {
            Ok(HttpResponse::json(
                200,
                &json!({
                    "success": false,
                    "message": "API configuration error: Backend URL not configured"
                }),
            ))
        }));

        let err = api(&transport).fetch_payment_link("pl_1").await.unwrap_err();
        assert_eq!(
            err.user_message(),
            "Configuration Error: API configuration error: Backend URL not configured. Please contact support."
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_link_and_bad_record() {
        let transport = Arc::new(
            MockTransport::new()
                .route("/payment-links/gone", |_| {
                    Ok(HttpResponse::json(200, &json!({ "success": false })))
                })
                .route("/payment-links/mixed", |_| {
                    let mut data = fixtures::bank_link("mixed", "NGN");
                    data["paymentInitialization"]["toronetResponse"]["url"] =
                        json!("https://provider.example");
                    Ok(HttpResponse::json(200, &json!({ "success": true, "data": data })))
                }),
        );
        let api = api(&transport);

        let err = api.fetch_payment_link("gone").await.unwrap_err();
        assert_eq!(err.user_message(), "Payment link is invalid");

        let err = api.fetch_payment_link("mixed").await.unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidRecord(_)));

        let err = api.fetch_payment_link(" ").await.unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidLink(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_sends_credentials_and_body() {
        let transport = Arc::new(MockTransport::new().route("/record-transaction/tx_9", |req| {
            assert_eq!(req.header_value("admin"), Some("ops"));
            assert_eq!(req.header_value("adminpwd"), Some("secret"));
            Ok(HttpResponse::json(200, &json!({ "success": true })))
        }));

        let outcome = api(&transport)
            .record_transaction("tx_9", &fixtures::transaction())
            .await
            .unwrap();

        assert_eq!(outcome, RecordOutcome::Recorded);
        let body: Value = serde_json::from_str(
            transport.requests()[0].body.as_deref().unwrap_or_default(),
        )
        .unwrap();
        assert_eq!(body["senderName"], "Ada Obi");
    }

    #[tokio::test(start_paused = true)]
    async fn test_any_2xx_counts_as_recorded() {
        let transport = Arc::new(
            MockTransport::new()
                .route("/record-transaction/flagged", |_| {
                    Ok(HttpResponse::json(200, &json!({ "success": false, "message": "queued" })))
                })
                .route("/record-transaction/dup", |_| {
                    Ok(HttpResponse::json(
                        201,
                        &json!({ "success": false, "message": "Already recorded" }),
                    ))
                })
                .route("/record-transaction/plain", |_| Ok(HttpResponse::new(204, ""))),
        );
        let api = api(&transport);

        let flagged = api
            .record_transaction("flagged", &fixtures::transaction())
            .await
            .unwrap();
        assert_eq!(flagged, RecordOutcome::Recorded);

        let dup = api
            .record_transaction("dup", &fixtures::transaction())
            .await
            .unwrap();
        assert_eq!(dup, RecordOutcome::AlreadyRecorded);

        let plain = api
            .record_transaction("plain", &fixtures::transaction())
            .await
            .unwrap();
        assert_eq!(plain, RecordOutcome::Recorded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_conflict_already_recorded_is_success() {
        let transport = Arc::new(MockTransport::new().route("/record-transaction/", |_| {
            Ok(HttpResponse::json(
                409,
                &json!({ "message": "Transaction already recorded" }),
            ))
        }));

        let outcome = api(&transport)
            .record_transaction("tx_9", &fixtures::transaction())
            .await
            .unwrap();
        assert_eq!(outcome, RecordOutcome::AlreadyRecorded);
        assert!(outcome.is_recorded());
        assert_eq!(transport.calls_to("/record-transaction/"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_rejection_and_unreachable() {
        let transport = Arc::new(
            MockTransport::new()
                .route("/record-transaction/bad", |_| {
                    Ok(HttpResponse::json(400, &json!({ "error": "amount mismatch" })))
                })
                .route("/record-transaction/down", |_| {
                    Err(TransportError::Connect("refused".into()))
                }),
        );
        let api = api(&transport);

        let outcome = api
            .record_transaction("bad", &fixtures::transaction())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            RecordOutcome::Rejected {
                status: 400,
                message: "amount mismatch".into()
            }
        );

        let err = api
            .record_transaction("down", &fixtures::transaction())
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Transport(_)));
        assert_eq!(transport.calls_to("/record-transaction/down"), RECORD_ATTEMPTS as usize);
    }
}
