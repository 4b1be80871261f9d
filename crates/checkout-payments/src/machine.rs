//! Checkout State Machine
//!
//! One actor per mounted payment link. It owns the payment record, the
//! sender details and the current step, and processes commands, poll
//! snapshots, timers and connectivity changes strictly in sequence.
//!
//! ```text
//! loading ──▶ method ◀──▶ bank-details ──▶ confirming ──▶ success
//!    │                                        │
//!    └──────────────▶ error ◀─────────────────┘ (15 min)
//! ```

use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use checkout_core::{
    CheckoutError, MethodAvailability, PaymentMethod, PaymentRecord, Result, SenderInfo,
    SessionId, TransactionRecord, VERIFICATION_TIMEOUT_MESSAGE, ValidationError,
    cache::{cached_fetch, keys},
};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Sleep, sleep};

use crate::api::RecordOutcome;
use crate::poller::{PollHandle, PollSnapshot, VerificationParams};
use crate::services::CheckoutServices;

pub const CARD_REDIRECT_UNAVAILABLE: &str =
    "Card payment redirect URL not available. Please contact support.";

pub const FAULT_MESSAGE: &str = "Something went wrong";

/// Sender name shown on the receipt when none was given
const RECEIPT_ANONYMOUS: &str = "User";

/// Where the payer is in the checkout
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckoutStep {
    #[default]
    Loading,
    Method,
    BankDetails,
    Confirming,
    Success,
    Error,
    /// Unexpected failure inside the machine
    Fault,
}

/// Input from the UI
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckoutCommand {
    SelectMethod(PaymentMethod),
    /// Continue with the selected method
    Pay,
    /// bank-details → method
    Back,
    SetSenderName(String),
    SetSenderPhone(String),
    SubmitTransfer,
    DismissNotice,
    /// Remount from scratch
    Reload,
    /// Leave the checkout for the previous page
    NavigateBack,
}

/// Proof of payment shown on success
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub amount: String,
    pub reference: String,
    pub date: DateTime<Utc>,
    pub method: String,
    pub sender_name: String,
}

/// Observable state of a mount
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CheckoutView {
    pub payment_id: String,
    pub step: CheckoutStep,
    pub payment: Option<PaymentRecord>,
    pub availability: MethodAvailability,
    pub selected_method: Option<PaymentMethod>,
    pub sender: SenderInfo,
    pub validation_errors: Vec<ValidationError>,
    /// Message for the error and fault steps
    pub error: Option<String>,
    /// Blocking notice the payer has to dismiss
    pub notice: Option<String>,
    pub is_verifying: bool,
    /// A record-transaction call is in flight
    pub is_submitting: bool,
    pub is_offline: bool,
    pub verification: Option<PollSnapshot>,
    pub receipt: Option<Receipt>,
    pub record_outcome: Option<RecordOutcome>,
    /// Pending redirect after success
    pub redirect_to: Option<String>,
    pub session_id: Option<SessionId>,
}

impl CheckoutView {
    pub fn errors_for(&self, field: &str) -> Vec<&ValidationError> {
        self.validation_errors
            .iter()
            .filter(|e| e.field == field)
            .collect()
    }
}

/// Why the actor loop returned
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Exit {
    Unmounted,
    Reload,
}

type Commands = mpsc::UnboundedReceiver<CheckoutCommand>;

pub(crate) struct CheckoutMachine {
    services: CheckoutServices,
    view_tx: Arc<watch::Sender<CheckoutView>>,
    view: CheckoutView,
    poll: Option<PollHandle>,
    deadline: Option<Pin<Box<Sleep>>>,
    redirect: Option<(Pin<Box<Sleep>>, String)>,
    recording: Option<JoinHandle<Result<RecordOutcome>>>,
    connectivity: watch::Receiver<bool>,
    /// Set once the mount is gone; detached work checks it before writing
    disposed: Arc<AtomicBool>,
}

impl CheckoutMachine {
    pub(crate) fn new(
        services: CheckoutServices,
        payment_id: String,
        view_tx: Arc<watch::Sender<CheckoutView>>,
    ) -> Self {
        let connectivity = services.connectivity.subscribe();
        let view = CheckoutView {
            payment_id,
            is_offline: !services.connectivity.is_online(),
            ..CheckoutView::default()
        };
        Self {
            services,
            view_tx,
            view,
            poll: None,
            deadline: None,
            redirect: None,
            recording: None,
            connectivity,
            disposed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) async fn run(mut self, commands: &mut Commands) -> Exit {
        self.mount();
        self.publish();

        let fetch = fetch_payment(self.services.clone(), self.view.payment_id.clone());
        tokio::pin!(fetch);
        let fetched = loop {
            tokio::select! {
                result = &mut fetch => break result,
                command = commands.recv() => match command {
                    None => return self.unmount(),
                    Some(CheckoutCommand::Reload) => return Exit::Reload,
                    Some(CheckoutCommand::NavigateBack) => self.services.navigator.back(),
                    Some(other) => tracing::debug!(?other, "Ignoring command while loading"),
                },
                Ok(()) = self.connectivity.changed() => {
                    self.view.is_offline = !*self.connectivity.borrow_and_update();
                    self.publish();
                }
            }
        };
        self.on_loaded(fetched);

        loop {
            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    None => return self.unmount(),
                    Some(CheckoutCommand::Reload) => {
                        tracing::info!(payment_id = %self.view.payment_id, "Reloading checkout");
                        return Exit::Reload;
                    }
                    Some(command) => self.handle(command),
                },
                () = wait_deadline(&mut self.deadline) => self.on_timeout(),
                snapshot = next_snapshot(&mut self.poll) => self.on_snapshot(snapshot),
                outcome = wait_recording(&mut self.recording) => self.on_recorded(outcome),
                url = wait_redirect(&mut self.redirect) => self.on_redirect(&url),
                Ok(()) = self.connectivity.changed() => {
                    self.view.is_offline = !*self.connectivity.borrow_and_update();
                }
            }
            self.publish();
        }
    }

    fn publish(&self) {
        self.view_tx.send_replace(self.view.clone());
    }

    fn track(&self, event: &str, properties: Value) {
        self.services.diagnostics.track_in_session(
            event,
            properties,
            self.view.session_id.as_ref().map(SessionId::as_str),
        );
    }

    fn mount(&mut self) {
        let payment_id = self.view.payment_id.clone();
        if !payment_id.is_empty() {
            let sessions = &self.services.sessions;
            self.view.session_id = if sessions.validate_session(&payment_id) {
                sessions.get(&payment_id).map(|s| s.id)
            } else {
                match sessions.create_session(&payment_id) {
                    Ok(id) => Some(id),
                    Err(e) => {
                        tracing::warn!(payment_id, error = %e, "Could not create checkout session");
                        None
                    }
                }
            };
        }

        self.track(
            "payment_page_view",
            json!({
                "paymentId": payment_id,
                "isOnline": !self.view.is_offline,
            }),
        );
        self.services
            .perf
            .start_timing("payment_page_load", Some(json!({ "paymentId": payment_id })));
    }

    fn unmount(&mut self) -> Exit {
        self.poll = None;
        self.deadline = None;
        self.redirect = None;
        // detached; the recording still completes but its result is dropped
        self.recording = None;

        if self.view.step == CheckoutStep::Success && self.services.config.clear_session_on_success
        {
            self.services.sessions.clear_session(&self.view.payment_id);
        }
        tracing::debug!(payment_id = %self.view.payment_id, step = ?self.view.step, "Checkout unmounted");
        Exit::Unmounted
    }

    fn on_loaded(&mut self, fetched: Result<(PaymentRecord, bool)>) {
        let payment_id = self.view.payment_id.clone();
        self.services.perf.end_timing("payment_page_load");

        match fetched {
            Ok((record, from_cache)) => {
                if from_cache {
                    self.track("payment_data_cached", json!({ "paymentId": payment_id }));
                } else {
                    self.track(
                        "payment_data_loaded",
                        json!({
                            "paymentId": payment_id,
                            "currency": record.currency,
                            "amount": record.amount.to_string(),
                            "paymentType": record.payment_type.as_str(),
                        }),
                    );
                }

                self.view.availability = record.availability();
                self.view.selected_method = self.view.availability.auto_select();
                self.view.payment = Some(record);
                self.view.step = CheckoutStep::Method;
            }
            Err(e) => {
                let message = e.user_message();
                self.services.diagnostics.report_error(
                    &e,
                    json!({ "context": "payment_data_fetch", "paymentId": payment_id }),
                );
                self.track(
                    "payment_error",
                    json!({ "error": "fetch_failed", "paymentId": payment_id, "message": message }),
                );
                self.view.error = Some(message);
                self.view.step = CheckoutStep::Error;
            }
        }
        self.publish();
    }

    fn handle(&mut self, command: CheckoutCommand) {
        let step = self.view.step;
        match (step, command) {
            (CheckoutStep::Method, CheckoutCommand::SelectMethod(method)) => {
                if self.view.availability.allows(method) {
                    self.view.selected_method = Some(method);
                } else {
                    tracing::debug!(?method, "Ignoring ineligible method");
                }
            }
            (CheckoutStep::Method, CheckoutCommand::Pay) => self.pay(),
            (CheckoutStep::BankDetails, CheckoutCommand::Back) => {
                self.view.step = CheckoutStep::Method;
            }
            (CheckoutStep::BankDetails, CheckoutCommand::SetSenderName(input)) => {
                self.view.sender.set_name(&input);
                self.view.validation_errors.retain(|e| e.field != "name");
            }
            (CheckoutStep::BankDetails, CheckoutCommand::SetSenderPhone(input)) => {
                self.view.sender.set_phone(&input);
                self.view.validation_errors.retain(|e| e.field != "phone");
            }
            (CheckoutStep::BankDetails, CheckoutCommand::SubmitTransfer) => self.submit_transfer(),
            (_, CheckoutCommand::DismissNotice) => self.view.notice = None,
            (_, CheckoutCommand::NavigateBack) => self.services.navigator.back(),
            (step, command) => {
                tracing::debug!(?step, ?command, "Command not valid in this step");
            }
        }
    }

    fn pay(&mut self) {
        let Some(record) = self.view.payment.as_ref() else {
            return;
        };
        let Some(method) = self.view.selected_method else {
            tracing::debug!("Pay pressed without a selected method");
            return;
        };

        self.track(
            "payment_method_selected",
            json!({
                "method": method.as_str(),
                "paymentId": record.id,
                "currency": record.currency,
                "amount": record.amount.to_string(),
            }),
        );

        match method {
            PaymentMethod::Bank => self.view.step = CheckoutStep::BankDetails,
            PaymentMethod::Card => match record.card_redirect_url().map(str::to_string) {
                Some(url) => {
                    self.track(
                        "card_payment_redirect",
                        json!({
                            "paymentId": record.id,
                            "redirectUrl": url,
                            "currency": record.currency,
                        }),
                    );
                    self.services.navigator.redirect(&url);
                }
                None => {
                    self.services.diagnostics.report_error(
                        &CheckoutError::InvalidRecord(CARD_REDIRECT_UNAVAILABLE.into()),
                        json!({ "context": "card_payment_redirect", "paymentId": record.id }),
                    );
                    self.view.notice = Some(CARD_REDIRECT_UNAVAILABLE.into());
                }
            },
        }
    }

    fn submit_transfer(&mut self) {
        let Some(record) = self.view.payment.as_ref() else {
            return;
        };

        let errors = self.view.sender.validate();
        if !errors.is_empty() {
            let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
            self.track(
                "validation_error",
                json!({ "paymentId": record.id, "errors": fields }),
            );
            self.view.validation_errors = errors;
            return;
        }

        let params = VerificationParams::from_record(record);
        self.track(
            "payment_verification_started",
            json!({ "paymentId": record.id, "currency": record.currency, "txid": params.txid }),
        );

        self.view.validation_errors.clear();
        self.view.step = CheckoutStep::Confirming;
        self.view.is_verifying = true;
        self.poll = Some(self.services.poller.start(params));
        self.deadline = Some(Box::pin(sleep(
            self.services.config.timings.verification_timeout,
        )));
    }

    fn on_timeout(&mut self) {
        self.deadline = None;
        self.poll = None;
        if self.view.step != CheckoutStep::Confirming {
            return;
        }

        let timeout = self.services.config.timings.verification_timeout;
        let duration_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        tracing::warn!(payment_id = %self.view.payment_id, "Verification timed out");

        self.view.is_verifying = false;
        self.view.error = Some(VERIFICATION_TIMEOUT_MESSAGE.into());
        self.view.step = CheckoutStep::Error;

        self.track(
            "payment_verification_timeout",
            json!({ "paymentId": self.view.payment_id, "duration": duration_ms }),
        );
        self.services.diagnostics.report_error(
            &CheckoutError::VerificationTimeout(timeout.as_secs()),
            json!({
                "context": "payment_verification_timeout",
                "paymentId": self.view.payment_id,
                "duration": duration_ms,
            }),
        );
    }

    fn on_snapshot(&mut self, snapshot: PollSnapshot) {
        if let Some(error) = &snapshot.error {
            tracing::warn!(payment_id = %self.view.payment_id, error = %error, "Verification request could not be sent");
        }
        let verified = snapshot.is_success;
        self.view.verification = Some(snapshot);

        if verified && self.view.step == CheckoutStep::Confirming {
            self.on_verified();
        }
    }

    fn on_verified(&mut self) {
        // timeout first, then the poller
        self.deadline = None;
        self.poll = None;
        self.view.is_verifying = false;

        let Some(record) = self.view.payment.clone() else {
            return;
        };
        self.track(
            "payment_verification_success",
            json!({
                "paymentId": record.id,
                "currency": record.currency,
                "amount": record.amount.to_string(),
            }),
        );

        let paid_at = self.services.clock.now();
        let transaction = TransactionRecord::new(&record, &self.view.sender, paid_at);
        let sender_name = if self.view.sender.name.trim().is_empty() {
            RECEIPT_ANONYMOUS.to_string()
        } else {
            transaction.sender_name.clone()
        };

        self.view.receipt = Some(Receipt {
            amount: record.display_amount(),
            reference: record.transaction_id.clone(),
            date: paid_at,
            method: PaymentMethod::Bank.label().into(),
            sender_name,
        });
        self.view.step = CheckoutStep::Success;
        self.view.is_submitting = true;

        let services = self.services.clone();
        let disposed = Arc::clone(&self.disposed);
        self.recording = Some(tokio::spawn(async move {
            let started = Instant::now();
            let outcome = services
                .api
                .record_transaction(&record.transaction_id, &transaction)
                .await;
            if !disposed.load(Ordering::Acquire) {
                services.perf.record_timing("save_transaction", started);
            }
            outcome
        }));
    }

    fn on_recorded(&mut self, outcome: std::result::Result<Result<RecordOutcome>, String>) {
        self.recording = None;
        self.view.is_submitting = false;

        let Some(record) = self.view.payment.clone() else {
            return;
        };
        let redirect_delay = self.services.config.timings.redirect_delay;
        let already_recorded_delay = self.services.config.timings.already_recorded_redirect_delay;

        let failure = match outcome {
            Ok(Ok(RecordOutcome::Recorded)) => {
                self.track(
                    "transaction_saved",
                    json!({ "paymentId": record.id, "transactionId": record.transaction_id }),
                );
                self.schedule_redirect(&record, redirect_delay);
                self.view.record_outcome = Some(RecordOutcome::Recorded);
                return;
            }
            Ok(Ok(RecordOutcome::AlreadyRecorded)) => {
                self.track(
                    "transaction_already_recorded",
                    json!({ "paymentId": record.id, "transactionId": record.transaction_id }),
                );
                self.schedule_redirect(&record, already_recorded_delay);
                self.view.record_outcome = Some(RecordOutcome::AlreadyRecorded);
                return;
            }
            Ok(Ok(RecordOutcome::Rejected { status, message })) => {
                self.view.record_outcome = Some(RecordOutcome::Rejected {
                    status,
                    message: message.clone(),
                });
                CheckoutError::Http {
                    status,
                    body: format!("Transaction save failed: {message}"),
                }
            }
            Ok(Err(e)) => e,
            Err(join_error) => CheckoutError::Other(join_error),
        };

        self.services.diagnostics.report_error(
            &failure,
            json!({
                "context": "save_transaction",
                "paymentId": record.id,
                "transactionId": record.transaction_id,
            }),
        );
        let transaction = TransactionRecord::new(&record, &self.view.sender, self.services.clock.now());
        let body = serde_json::to_string(&transaction).unwrap_or_default();
        self.services.diagnostics.store_failed_transaction(
            &record.transaction_id,
            &self.services.api.record_url(&record.transaction_id),
            &body,
        );
    }

    fn schedule_redirect(&mut self, record: &PaymentRecord, delay: std::time::Duration) {
        if let Some(url) = record.success_url.clone() {
            self.view.redirect_to = Some(url.clone());
            self.redirect = Some((Box::pin(sleep(delay)), url));
        }
    }

    fn on_redirect(&mut self, url: &str) {
        self.redirect = None;
        tracing::info!(payment_id = %self.view.payment_id, url, "Redirecting to merchant");
        self.services.navigator.redirect(url);
    }
}

impl Drop for CheckoutMachine {
    fn drop(&mut self) {
        self.disposed.store(true, Ordering::Release);
    }
}

/// Cache first, network second; `true` when served from cache
async fn fetch_payment(
    services: CheckoutServices,
    payment_id: String,
) -> Result<(PaymentRecord, bool)> {
    if payment_id.trim().is_empty() {
        return Err(CheckoutError::InvalidLink("Payment ID is required".into()));
    }

    let mut fetched = false;
    let record = cached_fetch(
        &services.cache,
        &keys::payment_data(&payment_id),
        services.config.timings.payment_cache_ttl,
        || {
            fetched = true;
            services
                .perf
                .measure("fetch_payment_data", services.api.fetch_payment_link(&payment_id))
        },
    )
    .await?;

    if !fetched {
        tracing::debug!(payment_id, "Using cached payment data");
    }
    Ok((record, !fetched))
}

async fn wait_deadline(deadline: &mut Option<Pin<Box<Sleep>>>) {
    match deadline {
        Some(timer) => timer.as_mut().await,
        None => pending().await,
    }
}

async fn wait_redirect(redirect: &mut Option<(Pin<Box<Sleep>>, String)>) -> String {
    match redirect {
        Some((timer, url)) => {
            timer.as_mut().await;
            url.clone()
        }
        None => pending().await,
    }
}

async fn next_snapshot(poll: &mut Option<PollHandle>) -> PollSnapshot {
    if let Some(handle) = poll {
        if let Some(snapshot) = handle.next().await {
            return snapshot;
        }
    }
    pending().await
}

async fn wait_recording(
    recording: &mut Option<JoinHandle<Result<RecordOutcome>>>,
) -> std::result::Result<Result<RecordOutcome>, String> {
    match recording {
        Some(task) => task.await.map_err(|e| e.to_string()),
        None => pending().await,
    }
}
