//! # checkout-server
//!
//! Thin proxy between the hosted checkout and the Chainpaye payments
//! backend. It hides the backend origin, forwards admin credentials for
//! recording, and turns "already recorded" refusals into success.
//!
//! ## Routes
//!
//! | Method | Path                                       | Backend call                               |
//! |--------|--------------------------------------------|--------------------------------------------|
//! | GET    | `/health`                                  | none                                       |
//! | POST   | `/api/v1/payment-links/{id}`               | `POST /api/v1/payment-links/{id}`          |
//! | POST   | `/api/v1/payment-links/{id}/complete`      | `POST /api/v1/payment-links/{id}/complete` |
//! | POST   | `/api/v1/record-transaction/{transactionId}` | `POST /api/v1/record-transaction/{id}`   |

pub mod config;
pub mod error;
pub mod handlers;
pub mod state;

use axum::{Router, routing::{get, post}};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use config::ProxyConfig;
pub use error::{ProxyError, Result};
pub use state::AppState;

use crate::handlers::{complete_payment, health_check, payment_link, record_transaction};

/// Build the proxy router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/payment-links/{id}", post(payment_link))
        .route("/api/v1/payment-links/{id}/complete", post(complete_payment))
        .route(
            "/api/v1/record-transaction/{transaction_id}",
            post(record_transaction),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
