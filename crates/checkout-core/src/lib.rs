//! # checkout-core
//!
//! Domain model and local resiliency services for the Chainpaye checkout.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Checkout mount                           │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │ LocalCache  │  │  Session    │  │   RetryClient       │  │
//! │  │  (TTL)      │  │  Tracker    │──│   HttpTransport     │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘  │
//! │         Diagnostics · PerformanceMonitor · Connectivity      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `HttpTransport` trait keeps the network behind a seam: the runtime
//! crate provides a `reqwest` implementation, tests use [`MockTransport`].

pub mod cache;
pub mod clock;
pub mod config;
pub mod connectivity;
pub mod diagnostics;
pub mod error;
pub mod model;
pub mod perf;
pub mod retry;
pub mod session;
pub mod storage;
pub mod transport;
pub mod validation;

pub use cache::LocalCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CheckoutConfig, CheckoutTimings};
pub use connectivity::Connectivity;
pub use diagnostics::Diagnostics;
pub use error::{CheckoutError, Result, VERIFICATION_TIMEOUT_MESSAGE};
pub use model::{
    BankDetails, CardDetails, MethodAvailability, PaymentMethod, PaymentRecord, PaymentType,
    SettlementDetails, TransactionRecord,
};
pub use perf::PerformanceMonitor;
pub use retry::{RetryClient, RetryPolicy};
pub use session::{SessionId, SessionTracker};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use transport::mock::MockTransport;
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Method, TransportError};
pub use validation::{SenderInfo, ValidationError};
