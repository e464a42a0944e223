// Rust guideline compliant 2026-10-13

//! Load generator: submits random transactions to the transactions service.
//!
//! # Usage
//!
//! ```text
//! LOADGEN_COUNT=100 LOADGEN_SEED=7 RUST_LOG=info cargo run --bin fraud_loadgen
//! ```

use anyhow::Context as _;
use domain::Transaction;
use fraud_detection::config::LoadgenSettings;
use fraud_detection::telemetry;
use producer::generator::{GeneratorConfig, TransactionGenerator};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();
    let settings = LoadgenSettings::from_env()?;

    let mut builder = GeneratorConfig::builder();
    if let Some(seed) = settings.seed {
        builder = builder.seed(seed);
    }
    let generator = TransactionGenerator::new(builder.build()?);
    let client = reqwest::Client::new();
    let url = format!("{}/transactions", settings.transactions_service_url.trim_end_matches('/'));

    let submit_all = async {
        let mut accepted = 0u64;
        for n in 1..=settings.count {
            let new = generator.next_transaction();
            let response = client
                .post(&url)
                .json(&new)
                .send()
                .await
                .with_context(|| format!("failed to reach {url}"))?;
            let status = response.status();
            if status.is_success() {
                let tx: Transaction = response.json().await.context("unexpected response body")?;
                accepted += 1;
                tracing::info!(n, id = tx.id, amount = tx.amount, location = %tx.location, "loadgen.transaction.created");
            } else {
                tracing::warn!(n, status = status.as_u16(), "loadgen.transaction.refused");
            }
            tokio::time::sleep(settings.interval).await;
        }
        anyhow::Ok(accepted)
    };

    tokio::select! {
        result = submit_all => {
            let accepted = result?;
            tracing::info!(accepted, requested = settings.count, "loadgen.run.stopped");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(reason = "ctrl_c", "loadgen.run.stopped");
        }
    }
    Ok(())
}
