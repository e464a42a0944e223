// Rust guideline compliant 2026-10-13

//! Fraud worker entry point.
//!
//! Consumes the fraud-analysis queue, evaluates the rules and reports each
//! verdict to the transactions service. CTRL+C stops taking new deliveries,
//! settles the in-flight ones and closes the connection.
//!
//! # Usage
//!
//! ```text
//! TRANSACTIONS_SERVICE_URL=http://localhost:8000 RUST_LOG=info cargo run --bin fraud_worker
//! ```

use anyhow::Context as _;
use broker::ConnectionManager;
use fraud_detection::adapters::amqp_broker::AmqpConnector;
use fraud_detection::adapters::http_status_callback::HttpStatusCallback;
use fraud_detection::config::WorkerSettings;
use fraud_detection::telemetry;
use rule_engine::RuleEngine;
use tokio_util::sync::CancellationToken;
use tracing::Instrument as _;
use worker::FraudWorker;

// Deliveries are handled concurrently inside one task; one thread is enough.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();
    let settings = WorkerSettings::from_env()?;

    let manager = ConnectionManager::new(
        AmqpConnector::new(settings.broker.url.clone()),
        settings.connection_config()?,
    );
    let callback =
        HttpStatusCallback::new(settings.transactions_service_url.clone(), settings.callback_timeout)
            .context("failed to build the status callback client")?;
    let worker = FraudWorker::new(settings.worker_config()?, RuleEngine::default(), callback);

    tracing::info!(
        queue = %settings.broker.queue,
        prefetch = settings.prefetch,
        "main.worker.starting"
    );

    let shutdown = CancellationToken::new();
    let run = worker
        .run(&manager, &shutdown)
        .instrument(tracing::info_span!("worker"));
    tokio::pin!(run);

    tokio::select! {
        result = &mut run => return result.context("worker failed"),
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl_c")?;
            tracing::info!(reason = "ctrl_c", "main.shutdown.draining");
            shutdown.cancel();
        }
    }

    run.await.context("worker failed")
}
