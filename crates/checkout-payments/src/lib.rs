//! # checkout-payments
//!
//! Payment-link checkout for Chainpaye: fetch the link, let the payer pick
//! card or bank transfer, confirm the transfer by polling the verification
//! endpoint, record it, and show a receipt.
//!
//! ## Flow
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────────┐   ┌──────────┐
//! │ Payment  │──▶│ Bank details │──▶│  Verification │──▶│  Record  │
//! │  link    │   │  (sender)    │   │  poller (3s)  │   │  + receipt│
//! └──────────┘   └──────────────┘   └───────────────┘   └──────────┘
//!       │ card
//!       └──▶ provider hosted page
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use checkout_payments::{CheckoutCommand, CheckoutHandle, CheckoutServices};
//!
//! let services = CheckoutServices::new(config, transport, store, navigator);
//! let checkout = CheckoutHandle::mount(services, "pl_123");
//!
//! checkout.send(CheckoutCommand::Pay);
//! let view = checkout.view();
//! ```

mod api;
mod handle;
mod machine;
mod poller;
mod services;

#[cfg(test)]
mod fixtures;

pub use api::{FETCH_ATTEMPTS, PaymentApi, RECORD_ATTEMPTS, RecordOutcome};
pub use handle::CheckoutHandle;
pub use machine::{
    CARD_REDIRECT_UNAVAILABLE, CheckoutCommand, CheckoutStep, CheckoutView, FAULT_MESSAGE,
    Receipt,
};
pub use poller::{
    PollHandle, PollSnapshot, VerificationClient, VerificationParams, VerificationPoller,
    VerificationResponse,
};
pub use services::{CheckoutServices, Navigation, Navigator, RecordingNavigator};
