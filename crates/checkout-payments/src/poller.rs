//! Verification Poller
//!
//! Polls the provider's verification endpoint while a bank transfer is
//! being confirmed. A request goes out immediately and then on every tick
//! until a snapshot reports success or the handle is cancelled.
//!
//! Failed calls never raise: an error status, an unparseable body or a
//! network failure all become a failed [`VerificationResponse`] and the
//! next tick tries again.
//!
//! Identical requests (same currency, txid and payment type) that start
//! within the dedupe window, or while an earlier one is still in flight,
//! share that earlier call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use checkout_core::{
    CheckoutConfig, HttpRequest, HttpTransport, PaymentRecord, PaymentType,
};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Operation name the verification endpoint expects
const VERIFY_OP: &str = "recordfiattransaction";

/// What to verify
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VerificationParams {
    pub currency: String,
    pub txid: String,
    pub payment_type: PaymentType,
}

impl VerificationParams {
    pub fn from_record(record: &PaymentRecord) -> Self {
        Self {
            currency: record.currency.clone(),
            txid: record.txid().to_string(),
            payment_type: record.payment_type,
        }
    }

    fn dedupe_key(&self) -> String {
        format!("{}|{}|{}", self.currency, self.txid, self.payment_type)
    }
}

/// Verification endpoint answer, or the local failure standing in for one
///
/// The endpoint is loose about types (`"success": "true"`, a numeric
/// `status`), so every well-known field is kept as raw JSON and read
/// leniently. Any JSON object deserializes; other JSON does not.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "Value")]
pub struct VerificationResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_text: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TryFrom<Value> for VerificationResponse {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let mut fields = match value {
            Value::Object(fields) => fields,
            other => return Err(format!("expected a JSON object, got {other}")),
        };

        let response_text = match fields.remove("responseText") {
            Some(Value::String(text)) => Some(text),
            Some(other) => {
                fields.insert("responseText".into(), other);
                None
            }
            None => None,
        };

        Ok(Self {
            success: fields.remove("success"),
            status: fields.remove("status"),
            result: fields.remove("result"),
            error: fields.remove("error"),
            response_text,
            extra: fields,
        })
    }
}

/// `true`, or the string `"true"` in any case
fn is_true(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

impl VerificationResponse {
    /// Local failure result
    pub fn failed(error: impl Into<String>, response_text: Option<String>) -> Self {
        Self {
            success: Some(Value::Bool(false)),
            status: Some(Value::String("failed".into())),
            error: Some(Value::String(error.into())),
            response_text,
            ..Self::default()
        }
    }

    fn has_error(&self) -> bool {
        match &self.error {
            None | Some(Value::Null | Value::Bool(false)) => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }

    /// Status as text, when it is a string
    pub fn status_str(&self) -> Option<&str> {
        self.status.as_ref().and_then(Value::as_str)
    }

    fn status_is(&self, expected: &str) -> bool {
        self.status_str()
            .is_some_and(|s| s.trim().eq_ignore_ascii_case(expected))
    }

    /// Whether the transfer is confirmed
    ///
    /// Accepts any of the shapes the endpoint has been seen to use,
    /// including a bare object with no error and no failed status.
    pub fn is_success(&self) -> bool {
        is_true(self.success.as_ref())
            || self.status_is("success")
            || is_true(self.result.as_ref())
            || (!self.has_error() && !self.status_is("failed"))
    }

    pub fn error_message(&self) -> Option<String> {
        match &self.error {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        }
    }
}

/// Latest poll state
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PollSnapshot {
    pub data: Option<VerificationResponse>,
    /// Set only when the request could not be built
    pub error: Option<String>,
    pub is_success: bool,
    /// Number of completed polls
    pub polls: u32,
}

type VerifyOutcome = Result<VerificationResponse, String>;

/// Single verification call
#[derive(Clone)]
pub struct VerificationClient {
    transport: Arc<dyn HttpTransport>,
    url: String,
    admin: String,
    admin_pwd: String,
}

impl VerificationClient {
    pub fn new(transport: Arc<dyn HttpTransport>, config: &CheckoutConfig) -> Self {
        Self {
            transport,
            url: config.verification_url.clone(),
            admin: config.admin.clone(),
            admin_pwd: config.admin_pwd.clone(),
        }
    }

    fn build_request(&self, params: &VerificationParams) -> serde_json::Result<HttpRequest> {
        HttpRequest::post(self.url.as_str())
            .header("admin", self.admin.as_str())
            .header("adminpwd", self.admin_pwd.as_str())
            .json(&json!({
                "op": VERIFY_OP,
                "params": [
                    { "name": "currency", "value": params.currency },
                    { "name": "txid", "value": params.txid },
                    { "name": "paymenttype", "value": params.payment_type.as_str() },
                ]
            }))
    }

    /// Query the endpoint once
    ///
    /// `Err` only when the request could not be built.
    pub async fn verify(&self, params: &VerificationParams) -> VerifyOutcome {
        let request = self.build_request(params).map_err(|e| e.to_string())?;

        let response = match self.transport.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(txid = %params.txid, error = %e, "Verification request failed");
                return Ok(VerificationResponse::failed(e.to_string(), None));
            }
        };

        if !response.is_ok() {
            tracing::warn!(txid = %params.txid, status = response.status, "Verification rejected");
            return Ok(VerificationResponse::failed(
                format!("HTTP {}: {}", response.status, response.reason),
                Some(response.body),
            ));
        }

        match response.parse::<VerificationResponse>() {
            Ok(data) => {
                tracing::debug!(txid = %params.txid, success = data.is_success(), "Verification response");
                Ok(data)
            }
            Err(e) => {
                tracing::warn!(txid = %params.txid, error = %e, "Unparseable verification response");
                Ok(VerificationResponse::failed("Invalid JSON response", None))
            }
        }
    }
}

struct InFlight {
    started: Instant,
    call: Shared<BoxFuture<'static, VerifyOutcome>>,
}

/// Poll scheduler with request deduplication
pub struct VerificationPoller {
    client: VerificationClient,
    interval: Duration,
    dedupe_window: Duration,
    in_flight: Mutex<HashMap<String, InFlight>>,
}

impl VerificationPoller {
    pub fn new(client: VerificationClient, interval: Duration, dedupe_window: Duration) -> Self {
        Self {
            client,
            interval,
            dedupe_window,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(transport: Arc<dyn HttpTransport>, config: &CheckoutConfig) -> Self {
        Self::new(
            VerificationClient::new(transport, config),
            config.timings.poll_interval,
            config.timings.dedupe_window,
        )
    }

    /// Run one (possibly shared) verification request
    pub async fn request(&self, params: &VerificationParams) -> VerifyOutcome {
        let call = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            let key = params.dedupe_key();

            let shared = in_flight
                .get(&key)
                .filter(|entry| {
                    entry.started.elapsed() < self.dedupe_window || entry.call.peek().is_none()
                })
                .map(|entry| entry.call.clone());

            if let Some(call) = shared {
                tracing::trace!(key = %key, "Sharing in-flight verification request");
                call
            } else {
                let window = self.dedupe_window;
                in_flight.retain(|_, entry| {
                    entry.started.elapsed() < window || entry.call.peek().is_none()
                });
                let client = self.client.clone();
                let params = params.clone();
                let call = async move { client.verify(&params).await }.boxed().shared();
                in_flight.insert(
                    key,
                    InFlight {
                        started: Instant::now(),
                        call: call.clone(),
                    },
                );
                call
            }
        };
        call.await
    }

    /// Number of requests held for deduplication
    pub fn tracked_requests(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Start polling
    pub fn start(self: &Arc<Self>, params: VerificationParams) -> PollHandle {
        let (tx, rx) = watch::channel(PollSnapshot::default());
        let poller = Arc::clone(self);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poller.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut polls = 0u32;

            tracing::info!(txid = %params.txid, "Verification polling started");
            loop {
                ticker.tick().await;
                let outcome = poller.request(&params).await;
                polls = polls.saturating_add(1);

                let snapshot = match outcome {
                    Ok(data) => PollSnapshot {
                        is_success: data.is_success(),
                        data: Some(data),
                        error: None,
                        polls,
                    },
                    Err(error) => PollSnapshot {
                        data: tx.borrow().data.clone(),
                        error: Some(error),
                        is_success: false,
                        polls,
                    },
                };
                let done = snapshot.is_success;

                if tx.send(snapshot).is_err() {
                    break;
                }
                if done {
                    tracing::info!(txid = %params.txid, polls, "Transfer verified");
                    break;
                }
            }
        });

        PollHandle {
            task: Some(task),
            updates: rx,
        }
    }

    /// Start polling only when `should_poll` is set
    pub fn start_if(self: &Arc<Self>, params: VerificationParams, should_poll: bool) -> PollHandle {
        if should_poll {
            self.start(params)
        } else {
            PollHandle::inert()
        }
    }
}

/// Running poll; dropping it stops the polling
#[derive(Debug)]
pub struct PollHandle {
    task: Option<JoinHandle<()>>,
    updates: watch::Receiver<PollSnapshot>,
}

impl PollHandle {
    /// A handle that never polls
    pub fn inert() -> Self {
        let (_tx, updates) = watch::channel(PollSnapshot::default());
        Self {
            task: None,
            updates,
        }
    }

    /// Latest snapshot
    pub fn snapshot(&self) -> PollSnapshot {
        self.updates.borrow().clone()
    }

    /// Wait for the next snapshot; `None` once polling has ended
    pub async fn next(&mut self) -> Option<PollSnapshot> {
        self.updates.changed().await.ok()?;
        Some(self.updates.borrow_and_update().clone())
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop polling; no further snapshots are delivered
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}
