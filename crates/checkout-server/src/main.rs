//! checkout-server
//!
//! Axum proxy in front of the Chainpaye payments backend.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use checkout_server::{AppState, ProxyConfig, router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ProxyConfig::from_env()?;

    match config.payment_link_backend() {
        Ok(url) => tracing::info!("✓ Backend: {}", url),
        Err(e) => {
            tracing::warn!("⚠ {}", e);
            tracing::warn!("  Set API_BASE_URL in .env");
        }
    }
    if config.production {
        tracing::info!("Running in production mode");
    }

    let addr = config.bind_addr.clone();
    let app = router(AppState::new(config)?);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 checkout-server running on http://{}", addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                                  - Health check");
    tracing::info!("  POST /api/v1/payment-links/{{id}}               - Payment link lookup");
    tracing::info!("  POST /api/v1/payment-links/{{id}}/complete      - Save payment result");
    tracing::info!("  POST /api/v1/record-transaction/{{transactionId}} - Record transfer");
    tracing::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}
