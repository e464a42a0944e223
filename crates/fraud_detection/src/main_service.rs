// Rust guideline compliant 2026-10-13

//! Transactions service entry point.
//!
//! Serves the HTTP API over a SQLite store and publishes one analysis event
//! per created transaction. Requests keep being served while the broker is
//! down; creation then answers 503 until it comes back.
//!
//! # Usage
//!
//! ```text
//! RUST_LOG=info cargo run --bin transactions_service
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context as _;
use broker::ConnectionManager;
use fraud_detection::adapters::amqp_broker::AmqpConnector;
use fraud_detection::adapters::sqlite_repository::SqliteRepository;
use fraud_detection::config::ServiceConfig;
use fraud_detection::http::{AppState, router};
use fraud_detection::telemetry;
use producer::Producer;
use store::TransactionService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();
    let config = ServiceConfig::from_env()?;

    let repo = SqliteRepository::new(&config.database_url)
        .await
        .with_context(|| format!("failed to open SQLite store at {}", config.database_url))?;
    let manager = Arc::new(ConnectionManager::new(
        AmqpConnector::new(config.broker.url.clone()),
        config.broker.connection_config()?,
    ));
    if let Err(error) = manager.connect().await {
        tracing::warn!(%error, serving = true, "main.broker.unavailable");
    }

    let service = Arc::new(TransactionService::new(repo.clone()));
    let app = router(AppState::new(service, Producer::new(Arc::clone(&manager))));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "main.http.listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    manager.close().await;
    repo.close().await;
    tracing::info!("main.shutdown.complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "main.signal.failed");
        return;
    }
    tracing::info!(reason = "ctrl_c", "main.shutdown.requested");
}
